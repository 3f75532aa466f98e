use axum::{
    Json,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{
    HttpState,
    params::{ListingBody, NewestBody, current_year},
};
use crate::{
    application::{error::HttpError, resolver::Resolution},
    domain::{request::ResolutionRequest, types::Family},
};

const BLOB_CACHE_CONTROL: &str = "public, max-age=86400";

type JsonResult = Result<Json<Resolution>, HttpError>;

fn invalid_body(rejection: JsonRejection) -> HttpError {
    HttpError::new(
        "infra::http::handlers::invalid_body",
        StatusCode::BAD_REQUEST,
        format!("Invalid request parameters: {}", rejection.body_text()),
        rejection.to_string(),
    )
}

async fn resolve(state: &HttpState, request: ResolutionRequest) -> JsonResult {
    let resolution = state.resolver.resolve(&request).await?;
    Ok(Json(resolution))
}

async fn resolve_listing(
    state: &HttpState,
    family: Family,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> JsonResult {
    let Json(body) = body.map_err(invalid_body)?;
    let request = body.into_request(family, current_year())?;
    resolve(state, request).await
}

pub async fn healthz() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn readyz(State(state): State<HttpState>) -> Response {
    let Some(repositories) = state.repositories.as_ref() else {
        return Json(json!({ "status": "ready" })).into_response();
    };
    match repositories.health_check().await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(err) => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
                .into_response();
            crate::application::error::ErrorReport::from_error(
                "infra::http::handlers::readyz",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

pub async fn newest(
    State(state): State<HttpState>,
    body: Result<Json<NewestBody>, JsonRejection>,
) -> JsonResult {
    let Json(body) = body.map_err(invalid_body)?;
    resolve(&state, body.into_request()?).await
}

pub async fn list(
    State(state): State<HttpState>,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> JsonResult {
    resolve_listing(&state, Family::List, body).await
}

pub async fn search(
    State(state): State<HttpState>,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> JsonResult {
    resolve_listing(&state, Family::Search, body).await
}

pub async fn by_category(
    State(state): State<HttpState>,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> JsonResult {
    resolve_listing(&state, Family::Category, body).await
}

pub async fn by_country(
    State(state): State<HttpState>,
    body: Result<Json<ListingBody>, JsonRejection>,
) -> JsonResult {
    resolve_listing(&state, Family::Country, body).await
}

pub async fn categories(State(state): State<HttpState>) -> JsonResult {
    resolve(&state, ResolutionRequest::taxonomy(Family::Categories)?).await
}

pub async fn countries(State(state): State<HttpState>) -> JsonResult {
    resolve(&state, ResolutionRequest::taxonomy(Family::Countries)?).await
}

pub async fn detail(State(state): State<HttpState>, Path(slug): Path<String>) -> JsonResult {
    resolve(&state, ResolutionRequest::detail(slug)?).await
}

pub async fn static_blob(
    State(state): State<HttpState>,
    Path(path): Path<String>,
) -> Result<Response, HttpError> {
    let object = state.blobs.resolve(&path).await?;
    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, HeaderValue::from_static(BLOB_CACHE_CONTROL)),
        ],
        Body::from(object.bytes),
    )
        .into_response())
}
