use aide::operation::OperationInput;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::RequestPartsExt;
use axum_extra::TypedHeader;
use headers::authorization::Bearer;
use headers::Authorization;

use crate::database::{AppState, DatabaseConnection};
use crate::error::{ServiceError, ServiceResult};
use crate::models::Account;
use crate::privileges::{self, Permission};
use crate::token::{Claims, TokenIssuer};

/// Per request context: a database connection and, when the request carried
/// a valid bearer token, the authenticated account.
pub struct RequestState {
    pub db: DatabaseConnection,
    pub session: Option<Session>,
    pub tokens: TokenIssuer,
}

pub struct Session {
    pub claims: Claims,
    pub account: Account,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestState
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let connection = app_state
            .pool
            .acquire()
            .await
            .map_err(|e| ServiceError::InternalServerError(e.to_string()))?;
        let mut db = DatabaseConnection { connection };

        let session = if let Ok(TypedHeader(Authorization(bearer))) =
            parts.extract::<TypedHeader<Authorization<Bearer>>>().await
        {
            let claims = app_state.tokens.verify(bearer.token())?;
            let account = db
                .get_account_by_id(claims.sub)
                .await?
                .ok_or(ServiceError::Unauthorized("Account no longer exists."))?;
            Some(Session { claims, account })
        } else {
            None
        };

        Ok(RequestState {
            db,
            session,
            tokens: app_state.tokens.clone(),
        })
    }
}

impl OperationInput for RequestState {}

impl RequestState {
    /// Require any authenticated account.
    pub fn session_require(&self) -> ServiceResult<&Account> {
        match &self.session {
            Some(session) => Ok(&session.account),
            None => Err(ServiceError::Unauthorized(
                "A valid session token is required.",
            )),
        }
    }

    /// Require an authenticated account holding the given privilege.
    pub fn session_require_privilege(&self, required: Permission) -> ServiceResult<&Account> {
        let account = self.session_require()?;
        privileges::authorize(account.account_type, &account.privileges, required)?;
        Ok(account)
    }

    pub fn session_require_admin(&self) -> ServiceResult<&Account> {
        self.session_require_privilege(Permission::Admin)
    }
}
