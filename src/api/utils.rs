use aide::gen::GenContext;
use aide::openapi::Operation;
use aide::{OperationInput, OperationOutput};
use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use schemars::JsonSchema;
use serde::Serialize;

use crate::error::ServiceError;

/// Uniform response envelope used by every endpoint.
///
/// ```json
/// {"status": "success", "message": "...", "data": ...}
/// ```
///
/// Error responses use the same shape with `"status": "error"`, see
/// `crate::error::ServiceError`.
#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip)]
    #[schemars(skip)]
    status_code: u16,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            status: "success",
            message: message.into(),
            data: Some(data),
            status_code: StatusCode::OK.as_u16(),
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            status: "success",
            message: message.into(),
            data: Some(data),
            status_code: StatusCode::CREATED.as_u16(),
        }
    }

    /// Success without a data payload, used by delete endpoints.
    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse {
            status: "success",
            message: message.into(),
            data: None,
            status_code: StatusCode::OK.as_u16(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}

impl<T: JsonSchema + Serialize> OperationOutput for ApiResponse<T> {
    type Inner = ApiResponse<T>;
}

/// `axum::Json` with the rejection mapped into the error envelope, so a
/// malformed or ill-typed request body answers with the same shape as any
/// other validation failure.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(ServiceError::Validation(rejection.body_text())),
        }
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: JsonSchema> OperationInput for Json<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        axum::Json::<T>::operation_input(ctx, operation);
    }
}

impl<T: Serialize + JsonSchema> OperationOutput for Json<T> {
    type Inner = T;

    fn operation_response(
        ctx: &mut GenContext,
        operation: &mut Operation,
    ) -> Option<aide::openapi::Response> {
        axum::Json::<T>::operation_response(ctx, operation)
    }

    fn inferred_responses(
        ctx: &mut GenContext,
        operation: &mut Operation,
    ) -> Vec<(Option<u16>, aide::openapi::Response)> {
        axum::Json::<T>::inferred_responses(ctx, operation)
    }
}
