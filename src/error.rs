use aide::OperationOutput;
use axum::{http::StatusCode, response::IntoResponse, Json};
use schemars::JsonSchema;
use serde_json::json;

/// Represent errors in the application
///
/// All `ServiceError`s can be transformed to http errors
/// using the uniform `{"status": "error", "message": ...}` envelope.
#[derive(Debug, Clone, PartialEq, JsonSchema)]
pub enum ServiceError {
    /// Malformed or missing input fields.
    Validation(String),
    /// Unknown `account_type` value.
    InvalidAccountType(String),
    /// Missing, invalid or expired token.
    Unauthorized(&'static str),
    /// Valid token but insufficient privileges.
    Forbidden(String),
    NotFound,
    /// Duplicate unique field, e.g. email or cpf.
    Conflict(String),
    InternalServerError(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ServiceError {}

/// Helper for `ServiceError` result
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = error {
            return ServiceError::NotFound;
        }

        if let Some(db_error) = error.as_database_error() {
            // 23505 = postgres unique constraint violation
            if db_error.code().as_deref() == Some("23505") {
                return ServiceError::Conflict(
                    "A record with this value already exists.".to_string(),
                );
            }
        }

        ServiceError::InternalServerError(error.to_string())
    }
}

impl OperationOutput for ServiceError {
    type Inner = String;
}
impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, message) = match self {
            ServiceError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ServiceError::InvalidAccountType(account_type) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid account type: {account_type}"),
            ),
            ServiceError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            ServiceError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ServiceError::NotFound => (
                StatusCode::NOT_FOUND,
                "The requested resource does not exist.".to_string(),
            ),
            ServiceError::Conflict(message) => (StatusCode::CONFLICT, message),
            ServiceError::InternalServerError(cause) => {
                log::error!("internal server error: {cause}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred.".to_string(),
                )
            }
        };

        (
            status_code,
            Json(json!({
                "status": "error",
                "message": message,
            })),
        )
            .into_response()
    }
}
