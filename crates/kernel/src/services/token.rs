//! Bearer token signing and verification.
//!
//! Tokens are HS256 JWTs carrying the caller id in `sub` and the role in a
//! `role` claim. Issuing exists for the `token` CLI subcommand and tests;
//! session issuance lives elsewhere.

use std::fmt;

use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Caller, Role};

/// JWT issuer claim value.
const ISSUER: &str = "talentdesk";

/// Default token lifetime in seconds (1 hour).
pub const DEFAULT_TOKEN_LIFETIME: i64 = 3600;

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    pub iss: String,
    /// Subject (caller id).
    pub sub: String,
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a token for `caller` valid for `lifetime_secs`.
    pub fn issue(&self, caller: Caller, lifetime_secs: i64) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: caller.id.to_string(),
            role: caller.role,
            iat: now,
            exp: now + lifetime_secs,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode token")
    }

    /// Verify signature, issuer and expiry, and return the caller.
    pub fn verify(&self, token: &str) -> Result<Caller> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .context("invalid token")?;

        let id = data
            .claims
            .sub
            .parse::<Uuid>()
            .context("token subject is not a uuid")?;

        Ok(Caller::new(id, data.claims.role))
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let tokens = TokenService::new(b"0123456789abcdef0123456789abcdef");
        let caller = Caller::new(Uuid::now_v7(), Role::Candidate);

        let token = tokens.issue(caller, DEFAULT_TOKEN_LIFETIME).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), caller);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let signer = TokenService::new(b"secret-one-secret-one-secret-one");
        let verifier = TokenService::new(b"secret-two-secret-two-secret-two");
        let token = signer
            .issue(Caller::new(Uuid::now_v7(), Role::Admin), DEFAULT_TOKEN_LIFETIME)
            .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new(b"0123456789abcdef0123456789abcdef");
        let token = tokens
            .issue(Caller::new(Uuid::now_v7(), Role::Recruiter), -3600)
            .unwrap();
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let tokens = TokenService::new(b"0123456789abcdef0123456789abcdef");
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: "not-a-uuid".to_string(),
            role: Role::Admin,
            iat: now,
            exp: now + 60,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"0123456789abcdef0123456789abcdef"),
        )
        .unwrap();
        assert!(tokens.verify(&token).is_err());
    }
}
