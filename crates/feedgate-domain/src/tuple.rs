//! Core tuple vocabulary: object types, relations, actions, entity keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use feedgate_storage::StoredTuple;

/// Wildcard entity name; `user:*` denotes any authenticated user.
pub const WILDCARD: &str = "*";

/// The closed set of object types the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    User,
    Tenant,
    Group,
    Feed,
    FeedVersion,
}

impl ObjectType {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Tenant => "tenant",
            ObjectType::Group => "group",
            ObjectType::Feed => "feed",
            ObjectType::FeedVersion => "feed_version",
        }
    }
}

impl FromStr for ObjectType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ObjectType::User),
            "tenant" => Ok(ObjectType::Tenant),
            "group" => Ok(ObjectType::Group),
            "feed" => Ok(ObjectType::Feed),
            "feed_version" => Ok(ObjectType::FeedVersion),
            other => Err(EngineError::InvalidObjectType {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Admin,
    Member,
    Manager,
    Editor,
    Viewer,
    Parent,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Admin => "admin",
            Relation::Member => "member",
            Relation::Manager => "manager",
            Relation::Editor => "editor",
            Relation::Viewer => "viewer",
            Relation::Parent => "parent",
        }
    }
}

impl FromStr for Relation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Relation::Admin),
            "member" => Ok(Relation::Member),
            "manager" => Ok(Relation::Manager),
            "editor" => Ok(Relation::Editor),
            "viewer" => Ok(Relation::Viewer),
            "parent" => Ok(Relation::Parent),
            other => Err(EngineError::InvalidRelation {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of actions the outer API may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CanView,
    CanEdit,
    CanEditMembers,
    CanCreateFeed,
    CanDeleteFeed,
    CanCreateFeedVersion,
    CanDeleteFeedVersion,
    CanSetGroup,
    CanCreateOrg,
    CanDeleteOrg,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CanView => "can_view",
            Action::CanEdit => "can_edit",
            Action::CanEditMembers => "can_edit_members",
            Action::CanCreateFeed => "can_create_feed",
            Action::CanDeleteFeed => "can_delete_feed",
            Action::CanCreateFeedVersion => "can_create_feed_version",
            Action::CanDeleteFeedVersion => "can_delete_feed_version",
            Action::CanSetGroup => "can_set_group",
            Action::CanCreateOrg => "can_create_org",
            Action::CanDeleteOrg => "can_delete_org",
        }
    }
}

impl FromStr for Action {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "can_view" => Ok(Action::CanView),
            "can_edit" => Ok(Action::CanEdit),
            "can_edit_members" => Ok(Action::CanEditMembers),
            "can_create_feed" => Ok(Action::CanCreateFeed),
            "can_delete_feed" => Ok(Action::CanDeleteFeed),
            "can_create_feed_version" => Ok(Action::CanCreateFeedVersion),
            "can_delete_feed_version" => Ok(Action::CanDeleteFeedVersion),
            "can_set_group" => Ok(Action::CanSetGroup),
            "can_create_org" => Ok(Action::CanCreateOrg),
            "can_delete_org" => Ok(Action::CanDeleteOrg),
            other => Err(EngineError::InvalidAction {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed reference to an entity, e.g. `tenant:5` or `tenant:5#member`.
///
/// The optional `ref_relation` turns the key into a subject-set: the set of
/// subjects holding that relation on the referenced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    #[serde(rename = "type")]
    pub kind: ObjectType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_relation: Option<Relation>,
}

impl EntityKey {
    pub fn new(kind: ObjectType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ref_relation: None,
        }
    }

    /// A subject-set key, e.g. `tenant:5#member`.
    pub fn subject_set(kind: ObjectType, name: impl Into<String>, relation: Relation) -> Self {
        Self {
            kind,
            name: name.into(),
            ref_relation: Some(relation),
        }
    }

    /// The wildcard subject `user:*` matching any authenticated user.
    pub fn any_user() -> Self {
        Self::new(ObjectType::User, WILDCARD)
    }

    /// A concrete user key.
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(ObjectType::User, name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == ObjectType::User && self.name == WILDCARD
    }

    pub fn is_subject_set(&self) -> bool {
        self.ref_relation.is_some()
    }

    /// The key without its subject-set qualifier.
    pub fn base(&self) -> EntityKey {
        EntityKey::new(self.kind, self.name.clone())
    }

    /// Parses `type:name` or `type:name#relation`.
    pub fn parse(value: &str) -> EngineResult<Self> {
        let (head, rel) = match value.split_once('#') {
            Some((head, rel)) => (head, Some(rel)),
            None => (value, None),
        };
        let (kind, name) = head.split_once(':').ok_or_else(|| EngineError::InvalidKey {
            value: value.to_string(),
        })?;
        if name.is_empty() {
            return Err(EngineError::InvalidKey {
                value: value.to_string(),
            });
        }
        let kind: ObjectType = kind.parse()?;
        let ref_relation = rel.map(Relation::from_str).transpose()?;
        Ok(Self {
            kind,
            name: name.to_string(),
            ref_relation,
        })
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ref_relation {
            Some(rel) => write!(f, "{}:{}#{}", self.kind, self.name, rel),
            None => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

/// A tuple key: subject, object, and exactly one of relation or action.
///
/// In storage and writes the relation is populated; in checks the action is.
/// Wildcard read queries may leave endpoints or both verbs empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub subject: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<EntityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

impl TupleKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: EntityKey) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_object(mut self, object: EntityKey) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self.action = None;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self.relation = None;
        self
    }

    /// Validates the structural contract: known endpoint types, at least one
    /// endpoint populated, and when both endpoints are present exactly one
    /// of relation/action.
    pub fn validate(&self) -> EngineResult<()> {
        if self.subject.is_none() && self.object.is_none() {
            return Err(EngineError::InvalidTuple {
                message: "tuple has no endpoints".to_string(),
            });
        }
        if let Some(subject) = &self.subject {
            if subject.is_wildcard() && subject.ref_relation.is_some() {
                return Err(EngineError::InvalidUserType {
                    value: subject.to_string(),
                });
            }
        }
        if self.subject.is_some() && self.object.is_some() {
            match (self.relation, self.action) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(EngineError::InvalidTuple {
                        message: "exactly one of relation or action must be set".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Converts a relation-bearing tuple into its storage representation.
    pub fn to_stored(&self) -> EngineResult<StoredTuple> {
        let subject = self.subject.as_ref().ok_or_else(|| EngineError::InvalidTuple {
            message: "stored tuple requires a subject".to_string(),
        })?;
        let object = self.object.as_ref().ok_or_else(|| EngineError::InvalidTuple {
            message: "stored tuple requires an object".to_string(),
        })?;
        let relation = self.relation.ok_or_else(|| EngineError::InvalidTuple {
            message: "stored tuple requires a relation".to_string(),
        })?;
        Ok(StoredTuple {
            object_type: object.kind.as_str().to_string(),
            object_name: object.name.clone(),
            relation: relation.as_str().to_string(),
            subject_type: subject.kind.as_str().to_string(),
            subject_name: subject.name.clone(),
            subject_relation: subject.ref_relation.map(|r| r.as_str().to_string()),
        })
    }

    /// Reconstructs a tuple key from its storage representation.
    pub fn from_stored(stored: &StoredTuple) -> EngineResult<Self> {
        let subject_kind: ObjectType = stored.subject_type.parse()?;
        let object_kind: ObjectType = stored.object_type.parse()?;
        let relation: Relation = stored.relation.parse()?;
        let ref_relation = stored
            .subject_relation
            .as_deref()
            .map(Relation::from_str)
            .transpose()?;
        Ok(TupleKey {
            subject: Some(EntityKey {
                kind: subject_kind,
                name: stored.subject_name.clone(),
                ref_relation,
            }),
            object: Some(EntityKey::new(object_kind, stored.object_name.clone())),
            relation: Some(relation),
            action: None,
        })
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = self
            .subject
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default();
        let object = self
            .object
            .as_ref()
            .map(|o| o.to_string())
            .unwrap_or_default();
        let verb = match (self.relation, self.action) {
            (Some(r), _) => r.to_string(),
            (None, Some(a)) => a.to_string(),
            (None, None) => String::new(),
        };
        write!(f, "{subject}|{verb}|{object}")
    }
}
