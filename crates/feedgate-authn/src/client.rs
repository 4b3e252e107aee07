//! Identity endpoint clients.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use tracing::instrument;

use crate::error::{AuthnError, AuthnResult};
use crate::user::User;

/// Resolves external user ids to enriched user records.
///
/// `user` distinguishes "unknown user" (Ok(None)) from endpoint failure
/// (Err), because the two feed different recovery paths in the gatekeeper.
#[async_trait]
pub trait IdentityClient: Send + Sync + 'static {
    async fn user(&self, id: &str) -> AuthnResult<Option<User>>;
    async fn users(&self, query: &str) -> AuthnResult<Vec<User>>;
}

/// HTTP identity client with a bounded per-call timeout.
pub struct HttpIdentityClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn endpoint_error(&self, err: reqwest::Error) -> AuthnError {
        if err.is_timeout() {
            AuthnError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            AuthnError::Endpoint {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    #[instrument(skip(self))]
    async fn user(&self, id: &str) -> AuthnResult<Option<User>> {
        let url = format!("{}/users/{}", self.base_url.trim_end_matches('/'), id);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.endpoint_error(e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(|e| self.endpoint_error(e))?;
        let user: User = response.json().await.map_err(|e| self.endpoint_error(e))?;
        Ok(Some(user))
    }

    #[instrument(skip(self))]
    async fn users(&self, query: &str) -> AuthnResult<Vec<User>> {
        let url = format!("{}/users", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.endpoint_error(e))?
            .error_for_status()
            .map_err(|e| self.endpoint_error(e))?;
        let users: Vec<User> = response.json().await.map_err(|e| self.endpoint_error(e))?;
        Ok(users)
    }
}

/// Fixed user set, for tests and single-tenant development.
#[derive(Debug, Default)]
pub struct StaticIdentityClient {
    users: DashMap<String, User>,
}

impl StaticIdentityClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let client = Self::new();
        for user in users {
            client.users.insert(user.id.clone(), user);
        }
        client
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl IdentityClient for StaticIdentityClient {
    async fn user(&self, id: &str) -> AuthnResult<Option<User>> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn users(&self, query: &str) -> AuthnResult<Vec<User>> {
        let query = query.to_lowercase();
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|u| u.value().clone())
            .filter(|u| {
                query.is_empty()
                    || u.id.to_lowercase().contains(&query)
                    || u.name.to_lowercase().contains(&query)
                    || u.email.to_lowercase().contains(&query)
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}
