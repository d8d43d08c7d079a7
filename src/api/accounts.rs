use std::collections::BTreeMap;

use aide::axum::routing::{get_with, patch_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::{AppState, DatabaseConnection};
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::privileges::{self, AccountType, Permission, PrivilegeSet};
use crate::request_state::RequestState;

use super::password_hash_create;
use super::utils::{ApiResponse, Json};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/accounts",
            get_with(list_accounts, list_accounts_docs)
                .post_with(create_account, create_account_docs),
        )
        .api_route(
            "/accounts/:id",
            get_with(get_account, get_account_docs).delete_with(delete_account, delete_account_docs),
        )
        .api_route(
            "/accounts/:id/profile",
            patch_with(update_account_profile, update_account_profile_docs),
        )
        .api_route(
            "/accounts/:id/privileges",
            patch_with(update_account_privileges, update_account_privileges_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct AccountDto {
    pub id: i64,
    pub email: String,
    pub account_type: String,
    /// Effective privileges, resolved from the account type (CUSTOM accounts
    /// carry their stored set).
    pub privileges: PrivilegeSet,
    pub profile: serde_json::Value,
}

impl From<&models::Account> for AccountDto {
    fn from(value: &models::Account) -> Self {
        AccountDto {
            id: value.id,
            email: value.email.clone(),
            account_type: value.account_type.as_str().to_string(),
            privileges: privileges::resolve_privileges(value.account_type, &value.privileges),
            profile: value.profile.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct AccountListDto {
    pub accounts: Vec<AccountDto>,
}

async fn list_accounts(mut state: RequestState) -> ServiceResult<ApiResponse<AccountListDto>> {
    state.session_require_admin()?;

    let accounts = state.db.get_all_accounts().await?;
    Ok(ApiResponse::ok(
        "Accounts retrieved successfully.",
        AccountListDto {
            accounts: accounts.iter().map(AccountDto::from).collect(),
        },
    ))
}

fn list_accounts_docs(op: TransformOperation) -> TransformOperation {
    op.description("List all accounts.")
        .tag("accounts")
        .response::<200, Json<ApiResponse<AccountListDto>>>()
        .response_with::<403, (), _>(|res| res.description("Requires the ADMIN privilege."))
}

async fn get_account(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<AccountDto>> {
    state.session_require_admin()?;

    let account = state
        .db
        .get_account_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;
    Ok(ApiResponse::ok(
        "Account retrieved successfully.",
        AccountDto::from(&account),
    ))
}

fn get_account_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a single account by id.")
        .tag("accounts")
        .response::<200, Json<ApiResponse<AccountDto>>>()
        .response_with::<404, (), _>(|res| res.description("No account with this id."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateAccountDto {
    pub email: String,
    pub password: String,
    pub account_type: String,
    /// Required for CUSTOM accounts, ignored otherwise.
    pub privileges: Option<BTreeMap<String, bool>>,
    /// Required for CAIXA, STORAGE and SUPERVISOR accounts.
    pub profile: Option<serde_json::Value>,
}

async fn create_account(
    mut state: RequestState,
    form: Json<CreateAccountDto>,
) -> ServiceResult<ApiResponse<AccountDto>> {
    state.session_require_privilege(Permission::AccountCreator)?;
    let form = form.0;

    let email = form.email.trim().to_lowercase();
    if email.is_empty() || form.password.is_empty() {
        return Err(ServiceError::Validation(
            "Fields 'email', 'password' and 'account_type' are required.".to_string(),
        ));
    }
    let account_type = AccountType::parse(&form.account_type)?;

    if state.db.get_account_by_email(&email).await?.is_some() {
        return Err(ServiceError::Conflict(
            "This email is already registered.".to_string(),
        ));
    }

    let privileges = if account_type == AccountType::Custom {
        let map = form.privileges.ok_or_else(|| {
            ServiceError::Validation(
                "Field 'privileges' is required for CUSTOM accounts.".to_string(),
            )
        })?;
        privileges::build_custom_privileges(&map)?
    } else {
        account_type.default_privileges()
    };

    let profile = match account_type {
        AccountType::Caixa | AccountType::Storage | AccountType::Supervisor => {
            let payload = form.profile.ok_or_else(|| {
                ServiceError::Validation(format!(
                    "Field 'profile' is required for {} accounts.",
                    account_type.as_str()
                ))
            })?;
            validate_profile(&mut state.db, account_type, &payload, 0).await?
        }
        _ => serde_json::json!({}),
    };

    let account = state
        .db
        .store_account(models::Account {
            id: 0,
            email,
            password_hash: password_hash_create(&form.password)?,
            account_type,
            privileges,
            profile,
        })
        .await?;

    Ok(ApiResponse::created(
        "Account created successfully.",
        AccountDto::from(&account),
    ))
}

fn create_account_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create an account with a specific type, privileges and profile.")
        .tag("accounts")
        .response::<201, Json<ApiResponse<AccountDto>>>()
        .response_with::<400, (), _>(|res| res.description("Validation error."))
        .response_with::<409, (), _>(|res| res.description("Email already registered."))
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct ProfileDto {
    pub profile: serde_json::Value,
}

async fn update_account_profile(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<serde_json::Value>,
) -> ServiceResult<ApiResponse<ProfileDto>> {
    state.session_require_admin()?;

    let mut account = state
        .db
        .get_account_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    match account.account_type {
        AccountType::Caixa | AccountType::Storage | AccountType::Supervisor => {}
        other => {
            return Err(ServiceError::Validation(format!(
                "Accounts of type '{}' do not have an editable profile.",
                other.as_str()
            )))
        }
    }

    account.profile = validate_profile(&mut state.db, account.account_type, &form.0, id).await?;
    let account = state.db.store_account(account).await?;

    Ok(ApiResponse::ok(
        "Account profile updated successfully.",
        ProfileDto {
            profile: account.profile,
        },
    ))
}

fn update_account_profile_docs(op: TransformOperation) -> TransformOperation {
    op.description("Replace the profile of a CAIXA, STORAGE or SUPERVISOR account.")
        .tag("accounts")
        .response::<200, Json<ApiResponse<ProfileDto>>>()
        .response_with::<400, (), _>(|res| res.description("Validation error."))
        .response_with::<404, (), _>(|res| res.description("No account with this id."))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdatePrivilegesDto {
    pub privileges: BTreeMap<String, bool>,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PrivilegesDto {
    pub privileges: PrivilegeSet,
}

async fn update_account_privileges(
    mut state: RequestState,
    Path(id): Path<i64>,
    form: Json<UpdatePrivilegesDto>,
) -> ServiceResult<ApiResponse<PrivilegesDto>> {
    state.session_require_privilege(Permission::PanelModifier)?;

    let mut account = state
        .db
        .get_account_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if account.account_type != AccountType::Custom {
        return Err(ServiceError::Validation(
            "Only CUSTOM accounts can have their privileges modified.".to_string(),
        ));
    }

    account.privileges = privileges::build_custom_privileges(&form.0.privileges)?;
    let account = state.db.store_account(account).await?;

    Ok(ApiResponse::ok(
        "Account privileges updated successfully.",
        PrivilegesDto {
            privileges: account.privileges,
        },
    ))
}

fn update_account_privileges_docs(op: TransformOperation) -> TransformOperation {
    op.description("Replace the privilege set of a CUSTOM account.")
        .tag("accounts")
        .response::<200, Json<ApiResponse<PrivilegesDto>>>()
        .response_with::<400, (), _>(|res| res.description("Target account is not CUSTOM."))
        .response_with::<403, (), _>(|res| {
            res.description("Requires the PANEL_MODIFIER privilege.")
        })
}

async fn delete_account(
    mut state: RequestState,
    Path(id): Path<i64>,
) -> ServiceResult<ApiResponse<()>> {
    let current = state.session_require_admin()?;

    if current.id == id {
        return Err(ServiceError::Forbidden(
            "You cannot delete your own account.".to_string(),
        ));
    }

    let account = state
        .db
        .get_account_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    if account.account_type == AccountType::Owner {
        return Err(ServiceError::Forbidden(
            "The system owner account cannot be deleted.".to_string(),
        ));
    }

    state.db.delete_account(id).await?;
    Ok(ApiResponse::message("Account deleted successfully."))
}

fn delete_account_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete an account. Self-deletion and the OWNER account are refused.")
        .tag("accounts")
        .response::<200, Json<ApiResponse<()>>>()
        .response_with::<403, (), _>(|res| {
            res.description("Self-deletion or OWNER deletion attempted.")
        })
        .response_with::<404, (), _>(|res| res.description("No account with this id."))
}

// ------------------------------------------------------------------
// profile validation

#[derive(Debug, Deserialize)]
struct CaixaProfile {
    register_number: Option<i64>,
    operator_name: Option<String>,
    #[serde(default)]
    fast_lane: bool,
    #[serde(default)]
    preferential: bool,
}

#[derive(Debug, Deserialize)]
struct StorageProfile {
    operator_name: Option<String>,
    sector_id: Option<serde_json::Value>,
    restrict_to_sector: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CashRegisterRange {
    start: i64,
    end: i64,
}

#[derive(Debug, Deserialize)]
struct SupervisorProfile {
    operator_name: Option<String>,
    cash_register_range: Option<CashRegisterRange>,
    restrict_to_range: Option<bool>,
}

fn required_operator_name(value: Option<String>) -> ServiceResult<String> {
    let name = value.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::Validation(
            "profile.operator_name must be a non-empty string.".to_string(),
        ));
    }
    Ok(name)
}

/// Validate and normalize a profile payload for the given account type.
///
/// `exclude_account_id` skips that account in the CAIXA register number
/// uniqueness check (0 for new accounts).
async fn validate_profile(
    db: &mut DatabaseConnection,
    account_type: AccountType,
    payload: &serde_json::Value,
    exclude_account_id: i64,
) -> ServiceResult<serde_json::Value> {
    if !payload.is_object() {
        return Err(ServiceError::Validation(format!(
            "Field 'profile' must be an object for {} accounts.",
            account_type.as_str()
        )));
    }

    match account_type {
        AccountType::Caixa => {
            let profile: CaixaProfile = serde_json::from_value(payload.clone())
                .map_err(|err| ServiceError::Validation(format!("Invalid profile: {err}")))?;

            let register_number = profile.register_number.ok_or_else(|| {
                ServiceError::Validation(
                    "profile.register_number must be an integer.".to_string(),
                )
            })?;
            let operator_name = required_operator_name(profile.operator_name)?;

            if db
                .register_number_in_use(register_number, exclude_account_id)
                .await?
            {
                return Err(ServiceError::Conflict(format!(
                    "Register number '{register_number}' is already in use."
                )));
            }

            Ok(serde_json::json!({
                "register_number": register_number,
                "operator_name": operator_name,
                "fast_lane": profile.fast_lane,
                "preferential": profile.preferential,
            }))
        }
        AccountType::Storage => {
            let profile: StorageProfile = serde_json::from_value(payload.clone())
                .map_err(|err| ServiceError::Validation(format!("Invalid profile: {err}")))?;

            let operator_name = required_operator_name(profile.operator_name)?;
            if let Some(sector_id) = &profile.sector_id {
                if !sector_id.is_i64() && !sector_id.is_string() {
                    return Err(ServiceError::Validation(
                        "profile.sector_id must be an integer or a string.".to_string(),
                    ));
                }
            }
            let restrict_to_sector = profile
                .restrict_to_sector
                .unwrap_or(profile.sector_id.is_some());

            Ok(serde_json::json!({
                "operator_name": operator_name,
                "sector_id": profile.sector_id,
                "restrict_to_sector": restrict_to_sector,
            }))
        }
        AccountType::Supervisor => {
            let profile: SupervisorProfile = serde_json::from_value(payload.clone())
                .map_err(|err| ServiceError::Validation(format!("Invalid profile: {err}")))?;

            let operator_name = required_operator_name(profile.operator_name)?;
            if let Some(range) = &profile.cash_register_range {
                if range.start > range.end {
                    return Err(ServiceError::Validation(
                        "profile.cash_register_range.start cannot be greater than .end."
                            .to_string(),
                    ));
                }
            }
            let restrict_to_range = profile
                .restrict_to_range
                .unwrap_or(profile.cash_register_range.is_some());

            let range = profile
                .cash_register_range
                .map(|r| serde_json::json!({"start": r.start, "end": r.end}));
            Ok(serde_json::json!({
                "operator_name": operator_name,
                "cash_register_range": range,
                "restrict_to_range": restrict_to_range,
            }))
        }
        other => Err(ServiceError::Validation(format!(
            "Accounts of type '{}' do not have an editable profile.",
            other.as_str()
        ))),
    }
}
