use aide::axum::ApiRouter;
use argon2rs::verifier::Encoded;

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};

pub mod accounts;
pub mod auth;
pub mod clients;
pub mod finances;
pub mod products;
pub mod stocks;
pub mod suppliers;
pub mod utils;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .merge(auth::router(app_state.clone()))
        .merge(accounts::router(app_state.clone()))
        .merge(clients::router(app_state.clone()))
        .merge(products::router(app_state.clone()))
        .merge(suppliers::router(app_state.clone()))
        .merge(stocks::router(app_state.clone()))
        .merge(finances::router(app_state))
}

pub fn password_hash_create(password: &str) -> ServiceResult<String> {
    let salt: [u8; 16] = rand::random();
    let hash = Encoded::default2i(password.as_bytes(), &salt, b"", b"").to_u8();
    String::from_utf8(hash).map_err(|err| ServiceError::InternalServerError(err.to_string()))
}

pub fn password_hash_verify(hash: &str, password: &str) -> ServiceResult<bool> {
    let encoded = Encoded::from_u8(hash.as_bytes())
        .map_err(|err| ServiceError::InternalServerError(format!("{err:?}")))?;
    Ok(encoded.verify(password.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hashes_verify_and_reject() {
        let hash = password_hash_create("correct horse battery staple").unwrap();
        assert!(password_hash_verify(&hash, "correct horse battery staple").unwrap());
        assert!(!password_hash_verify(&hash, "wrong password").unwrap());
    }

    #[test]
    fn password_hashes_are_salted() {
        let a = password_hash_create("password123").unwrap();
        let b = password_hash_create("password123").unwrap();
        assert_ne!(a, b);
    }
}
