use aide::axum::routing::post_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::privileges::{AccountType, PrivilegeSet};
use crate::request_state::RequestState;

use super::accounts::AccountDto;
use super::utils::{ApiResponse, Json};
use super::{password_hash_create, password_hash_verify};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/auth/register", post_with(register, register_docs))
        .api_route("/auth/login", post_with(login, login_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct SessionDto {
    pub token: String,
    pub account: AccountDto,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct RegisterDto {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    /// Defaults to BASIC. Only unprivileged types are accepted here.
    pub account_type: Option<String>,
}

async fn register(
    mut state: RequestState,
    form: Json<RegisterDto>,
) -> ServiceResult<ApiResponse<SessionDto>> {
    let form = form.0;

    let email = form.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ServiceError::Validation(
            "A valid email address is required.".to_string(),
        ));
    }
    if form.password.len() < 8 {
        return Err(ServiceError::Validation(
            "Password must be at least 8 characters long.".to_string(),
        ));
    }
    if form.password != form.confirm_password {
        return Err(ServiceError::Validation(
            "Passwords do not match.".to_string(),
        ));
    }

    let account_type = AccountType::parse(form.account_type.as_deref().unwrap_or("BASIC"))?;
    if !account_type.is_public() {
        return Err(ServiceError::Forbidden(format!(
            "Account type '{}' is not allowed for public registration.",
            account_type.as_str()
        )));
    }

    if state.db.get_account_by_email(&email).await?.is_some() {
        return Err(ServiceError::Conflict(
            "This email is already registered.".to_string(),
        ));
    }

    let account = state
        .db
        .store_account(models::Account {
            id: 0,
            email,
            password_hash: password_hash_create(&form.password)?,
            account_type,
            privileges: PrivilegeSet::empty(),
            profile: serde_json::json!({}),
        })
        .await?;

    let token = state.tokens.issue(&account)?;
    Ok(ApiResponse::created(
        "Account registered successfully.",
        SessionDto {
            token,
            account: AccountDto::from(&account),
        },
    ))
}

fn register_docs(op: TransformOperation) -> TransformOperation {
    op.description("Register a new unprivileged account and return a session token.")
        .tag("auth")
        .response::<201, Json<ApiResponse<SessionDto>>>()
        .response_with::<400, (), _>(|res| res.description("Validation error."))
        .response_with::<409, (), _>(|res| res.description("Email already registered."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CredentialsDto {
    pub email: String,
    pub password: String,
}

async fn login(
    mut state: RequestState,
    form: Json<CredentialsDto>,
) -> ServiceResult<ApiResponse<SessionDto>> {
    let form = form.0;

    let email = form.email.trim().to_lowercase();
    let account = state.db.get_account_by_email(&email).await?;

    if let Some(account) = account {
        if password_hash_verify(&account.password_hash, &form.password)? {
            let token = state.tokens.issue(&account)?;
            return Ok(ApiResponse::ok(
                "Login successful.",
                SessionDto {
                    token,
                    account: AccountDto::from(&account),
                },
            ));
        }
    }

    Err(ServiceError::Unauthorized("Invalid email or password."))
}

fn login_docs(op: TransformOperation) -> TransformOperation {
    op.description("Login with email and password.")
        .tag("auth")
        .response::<200, Json<ApiResponse<SessionDto>>>()
        .response_with::<401, (), _>(|res| res.description("Invalid email or password."))
}
