//! The user record every authentication mode converges on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An authenticated (or anonymous) user.
///
/// The id is the external identity provider's identifier; roles and the
/// external-id map come from the identity endpoint and may be empty for
/// users the endpoint does not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// The anonymous user: no id, no roles. Produced by fail-open identity
    /// resolution and by unauthenticated requests.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_user() {
        let user = User::anonymous();
        assert!(user.is_anonymous());
        assert!(user.roles.is_empty());
    }

    #[test]
    fn test_has_role() {
        let user = User {
            id: "alice".to_string(),
            roles: vec!["admin".to_string()],
            ..Default::default()
        };
        assert!(user.has_role("admin"));
        assert!(!user.has_role("editor"));
        assert!(!user.is_anonymous());
    }
}
