use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{
    application::{origin::OriginError, repos::RepoError},
    cache::Interrupted,
    config::LoadError,
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Failure of a resolution. Cloneable so one outcome can be delivered to the
/// owner of a coalesced resolution and to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("origin unavailable: {message}")]
    OriginUnavailable { message: String },
    #[error("origin returned status {status} for {url}")]
    OriginBadResponse { url: String, status: u16 },
    #[error("durable store write failed: {message}")]
    Persistence { message: String },
    #[error("`{resource}` was not found in any tier")]
    NotFound { resource: String },
    #[error("in-flight resolution was interrupted")]
    Interrupted,
}

impl PipelineError {
    pub fn persistence(err: &RepoError) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}

impl From<OriginError> for PipelineError {
    fn from(err: OriginError) -> Self {
        match err {
            OriginError::Status { url, status } => Self::OriginBadResponse { url, status },
            other => Self::OriginUnavailable {
                message: other.to_string(),
            },
        }
    }
}

impl From<Interrupted> for PipelineError {
    fn from(_: Interrupted) -> Self {
        Self::Interrupted
    }
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Transport error rendered as `{ "success": false, "error": "..." }`, with
/// the full cause chain attached as an [`ErrorReport`] extension.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "error": self.public_message }));
        let mut response = (self.status, body).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<PipelineError> for HttpError {
    fn from(error: PipelineError) -> Self {
        const SOURCE: &str = "application::error::pipeline_error_to_http_error";
        let (status, message) = match &error {
            PipelineError::OriginUnavailable { .. } => {
                (StatusCode::BAD_GATEWAY, "Upstream catalog is unavailable")
            }
            PipelineError::OriginBadResponse { .. } => {
                (StatusCode::BAD_GATEWAY, "Upstream catalog rejected the request")
            }
            PipelineError::Persistence { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist catalog data")
            }
            PipelineError::Interrupted => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Resolution was interrupted")
            }
            PipelineError::NotFound { .. } => (StatusCode::NOT_FOUND, "Resource not found"),
        };
        HttpError::from_error(SOURCE, status, message, &error)
    }
}

impl From<DomainError> for HttpError {
    fn from(error: DomainError) -> Self {
        HttpError::from_error(
            "application::error::domain_error_to_http_error",
            StatusCode::BAD_REQUEST,
            error.to_string(),
            &error,
        )
    }
}

/// Process-level failure reported by `main`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
