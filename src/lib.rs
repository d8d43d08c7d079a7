use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::openapi::OpenApi;
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;

pub mod api;
pub mod config;
pub mod database;
pub mod docs;
pub mod error;
pub mod models;
pub mod privileges;
pub mod request_state;
pub mod token;

use database::AppState;
use error::ServiceError;

/// Unmatched paths answer with the error envelope instead of an empty body.
async fn not_found() -> ServiceError {
    ServiceError::NotFound
}

/// Assemble the full application router, the same one used in production
/// and in the black box tests.
pub fn build_app(app_state: AppState) -> Router {
    aide::gen::on_error(|error| {
        log::error!("openapi generation error: {error}");
    });
    aide::gen::extract_schemas(true);

    let mut open_api = OpenApi::default();

    ApiRouter::new()
        .nest_api_service("/bratz", api::router(app_state))
        .nest_api_service("/docs", docs::docs_routes())
        .finish_api_with(&mut open_api, docs::api_docs)
        .fallback(not_found)
        .layer(Extension(Arc::new(open_api)))
        .layer(CorsLayer::permissive())
}
