use std::sync::Arc;

use aide::{
    axum::{
        routing::{get, get_with},
        ApiRouter, IntoApiResponse,
    },
    openapi::{OpenApi, Tag},
    redoc::Redoc,
    transform::TransformOpenApi,
};
use axum::{response::IntoResponse, Extension, Json};

pub fn api_docs(api: TransformOpenApi) -> TransformOpenApi {
    api.title("Bratz Market API")
        .summary("Backend for the Bratz market management platform")
        .description(
            "CRUD backend for a small retail platform: accounts with role-based \
             privileges, clients, products, stocks, suppliers and sales reporting. \
             All routes live under `/bratz` and respond with the uniform \
             `{status, message, data}` envelope.",
        )
        .tag(Tag {
            name: "auth".into(),
            description: Some("Public registration and login".into()),
            ..Default::default()
        })
        .tag(Tag {
            name: "accounts".into(),
            description: Some("Account administration".into()),
            ..Default::default()
        })
        .tag(Tag {
            name: "clients".into(),
            description: Some("Client records and discounts".into()),
            ..Default::default()
        })
        .tag(Tag {
            name: "products".into(),
            description: Some("Product catalog and inventory reports".into()),
            ..Default::default()
        })
        .tag(Tag {
            name: "suppliers".into(),
            description: Some("Supplier records".into()),
            ..Default::default()
        })
        .tag(Tag {
            name: "stocks".into(),
            description: Some("Stock locations and quantities".into()),
            ..Default::default()
        })
        .tag(Tag {
            name: "finances".into(),
            description: Some("Sale registration and finance reports".into()),
            ..Default::default()
        })
        .security_scheme(
            "BearerAuth",
            aide::openapi::SecurityScheme::Http {
                scheme: "bearer".into(),
                bearer_format: Some("JWT".into()),
                description: Some("Session token from /bratz/auth/login".into()),
                extensions: Default::default(),
            },
        )
}

pub fn docs_routes() -> ApiRouter {
    // Response inference is only sound for these two routes.
    aide::gen::infer_responses(true);

    let router = ApiRouter::new()
        .api_route_with(
            "/",
            get_with(
                Redoc::new("/docs/api.json")
                    .with_title("bratz-server")
                    .axum_handler(),
                |op| op.description("This documentation page."),
            ),
            |p| p.security_requirement("BearerAuth"),
        )
        .route("/api.json", get(serve_docs));

    aide::gen::infer_responses(false);

    router
}

async fn serve_docs(Extension(api): Extension<Arc<OpenApi>>) -> impl IntoApiResponse {
    Json(api).into_response()
}
