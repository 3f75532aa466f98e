//! HTTP transport over the resolvers.

mod handlers;
mod middleware;
pub mod params;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::{
    application::{blobs::BlobResolver, resolver::ReadThroughResolver},
    infra::db::PostgresRepositories,
};

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub resolver: Arc<ReadThroughResolver>,
    pub blobs: Arc<BlobResolver>,
    /// Probed by `/readyz`; absent when running without a database.
    pub repositories: Option<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    let catalog = Router::new()
        .route("/moi-cap-nhat", post(handlers::newest))
        .route("/danh-sach", post(handlers::list))
        .route("/tim-kiem", post(handlers::search))
        .route("/the-loai", post(handlers::by_category))
        .route("/quoc-gia", post(handlers::by_country))
        .route("/categories", get(handlers::categories))
        .route("/country", get(handlers::countries))
        .route("/{slug}", get(handlers::detail));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1/phim", catalog)
        .route("/api/v1/static/{*path}", get(handlers::static_blob))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
