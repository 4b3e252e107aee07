//! Request authentication.
//!
//! Three boundary modes converge on the same [`User`] shape before any
//! policy decision: validated bearer tokens (jwt), gateway-injected headers
//! (header), and a development default admin. Identity-endpoint failures are
//! the only locally recoverable fault: fail-open turns them into the
//! anonymous user, fail-closed turns them into 401. Invalid credentials are
//! rejected in both modes.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::warn;

use feedgate_authn::{
    AuthnError, AuthnResult, Gatekeeper, GatekeeperConfig, IdentityClient, TokenValidator, User,
};

use crate::config::AuthnSettings;

/// Gateway-injected user id header (header mode).
pub const USER_HEADER: &str = "x-feedgate-user";
/// Gateway-injected comma-separated roles header (header mode).
pub const ROLES_HEADER: &str = "x-feedgate-roles";

/// Authentication boundary mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Jwt,
    Header,
    Admin,
}

impl AuthMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "jwt" => Some(AuthMode::Jwt),
            "header" => Some(AuthMode::Header),
            "admin" => Some(AuthMode::Admin),
            _ => None,
        }
    }
}

/// Resolves inbound requests to users.
pub struct Authenticator {
    mode: AuthMode,
    validator: Option<TokenValidator>,
    gatekeeper: Gatekeeper,
    fail_open: bool,
}

impl Authenticator {
    pub fn new(
        mode: AuthMode,
        validator: Option<TokenValidator>,
        gatekeeper: Gatekeeper,
        fail_open: bool,
    ) -> Self {
        Self {
            mode,
            validator,
            gatekeeper,
            fail_open,
        }
    }

    /// Builds an authenticator from config settings and an identity client.
    pub fn from_settings(
        settings: &AuthnSettings,
        client: Arc<dyn IdentityClient>,
    ) -> Option<Self> {
        let mode = AuthMode::parse(&settings.mode)?;
        let validator = settings.jwt_secret.as_deref().map(|secret| {
            TokenValidator::new(
                secret,
                settings.jwt_issuer.as_deref(),
                settings.jwt_audience.as_deref(),
            )
        });
        let gatekeeper = Gatekeeper::new(
            client,
            GatekeeperConfig {
                recheck_ttl: Duration::from_secs(settings.recheck_ttl_secs),
                expire_ttl: Duration::from_secs(settings.expire_ttl_secs),
                sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
                refresh_workers: settings.refresh_workers,
            },
        );
        Some(Self::new(mode, validator, gatekeeper, settings.fail_open))
    }

    /// The identity cache, for spawning the background sweeper.
    pub fn gatekeeper(&self) -> &Gatekeeper {
        &self.gatekeeper
    }

    /// Resolves the request's user. `Ok(User::anonymous())` means the
    /// request proceeds unauthenticated; `Err` means 401.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthnResult<User> {
        match self.mode {
            AuthMode::Admin => Ok(User {
                id: "admin".to_string(),
                name: "Default Admin".to_string(),
                roles: vec!["admin".to_string()],
                ..Default::default()
            }),
            AuthMode::Header => {
                let Some(id) = headers.get(USER_HEADER).and_then(|v| v.to_str().ok()) else {
                    return Ok(User::anonymous());
                };
                if id.is_empty() {
                    return Ok(User::anonymous());
                }
                let roles = headers
                    .get(ROLES_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| {
                        v.split(',')
                            .map(|r| r.trim().to_string())
                            .filter(|r| !r.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(User {
                    id: id.to_string(),
                    roles,
                    ..Default::default()
                })
            }
            AuthMode::Jwt => {
                let Some(token) = bearer_token(headers) else {
                    return Ok(User::anonymous());
                };
                let validator =
                    self.validator
                        .as_ref()
                        .ok_or_else(|| AuthnError::InvalidToken {
                            message: "token validation is not configured".to_string(),
                        })?;
                // Invalid credentials are rejected regardless of the
                // fail-open flag; it covers endpoint failures only.
                let subject = validator.validate(token)?;
                match self.gatekeeper.resolve(&subject).await {
                    Ok(Some(user)) => Ok(user),
                    // Valid token for a user the identity endpoint does not
                    // know: authenticated, but without roles.
                    Ok(None) => Ok(User::new(subject)),
                    Err(err) if self.fail_open => {
                        warn!(error = %err, "identity resolution failed, continuing anonymous");
                        Ok(User::anonymous())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}
