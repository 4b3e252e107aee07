//! Bearer-token validation.
//!
//! Tokens are HS256 JWTs carrying the external user id in `sub`. Issuer and
//! audience are enforced when configured.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::{AuthnError, AuthnResult};

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Validates bearer tokens and extracts the subject.
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        if let Some(aud) = audience {
            validation.set_audience(&[aud]);
        } else {
            validation.validate_aud = false;
        }
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Returns the token's subject (the external user id).
    pub fn validate(&self, token: &str) -> AuthnResult<String> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            AuthnError::InvalidToken {
                message: e.to_string(),
            }
        })?;
        if data.claims.sub.is_empty() {
            return Err(AuthnError::InvalidToken {
                message: "empty subject".to_string(),
            });
        }
        Ok(data.claims.sub)
    }
}
