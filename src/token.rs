//! Stateless session tokens.
//!
//! Successful logins are answered with a signed, time-bound JWT carrying the
//! account id and role. No session state is persisted; every request is
//! verified against the signature and expiry only.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};
use crate::models::Account;
use crate::privileges::AccountType;

/// Identity data embedded in a verified token.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id.
    pub sub: i64,
    pub email: String,
    pub account_type: AccountType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_minutes: i64) -> TokenIssuer {
        TokenIssuer {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issue a token for a valid account. Never fails for well-formed input.
    pub fn issue(&self, account: &Account) -> ServiceResult<String> {
        self.issue_with_ttl(account, self.ttl)
    }

    fn issue_with_ttl(&self, account: &Account, ttl: Duration) -> ServiceResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            account_type: account.account_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalServerError(format!("token signing failed: {e}")))
    }

    /// Verify signature and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> ServiceResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(ServiceError::Unauthorized("Session token has expired."))
                }
                _ => Err(ServiceError::Unauthorized("Invalid session token.")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privileges::PrivilegeSet;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", 30)
    }

    fn account() -> Account {
        Account {
            id: 42,
            email: "owner@market.com".to_string(),
            password_hash: String::new(),
            account_type: AccountType::Owner,
            privileges: PrivilegeSet::empty(),
            profile: serde_json::json!({}),
        }
    }

    #[test]
    fn issued_tokens_verify_before_expiry() {
        let issuer = issuer();
        let token = issuer.issue(&account()).unwrap();
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "owner@market.com");
        assert_eq!(claims.account_type, AccountType::Owner);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = issuer();
        let token = issuer
            .issue_with_ttl(&account(), Duration::minutes(-5))
            .unwrap();

        let error = issuer.verify(&token).unwrap_err();
        assert_eq!(
            error,
            ServiceError::Unauthorized("Session token has expired.")
        );
    }

    #[test]
    fn foreign_and_malformed_tokens_are_rejected() {
        let issuer = issuer();
        let other = TokenIssuer::new("other-secret", 30);

        let token = other.issue(&account()).unwrap();
        assert!(issuer.verify(&token).is_err());
        assert!(issuer.verify("not-a-token").is_err());

        // tampered payload
        let token = issuer.issue(&account()).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = "eyJzdWIiOjF9";
        parts[1] = forged;
        assert!(issuer.verify(&parts.join(".")).is_err());
    }
}
