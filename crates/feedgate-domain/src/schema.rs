//! The closed type-relation schema and action rewrites.
//!
//! The vocabulary is fixed by the domain model, so the schema is a set of
//! match arms rather than a parsed authorization model. Parent edges only
//! point down the containment hierarchy (tenant → group → feed →
//! feed_version), which keeps the object-type graph acyclic by construction;
//! any write outside the table below is rejected, so no tuple can introduce
//! a cycle at the type level.

use crate::error::{EngineError, EngineResult};
use crate::tuple::{Action, EntityKey, ObjectType, Relation, TupleKey};

/// Validates a relation-bearing tuple against the type-relation schema.
///
/// Subject-sets are checked at the type level (e.g. `tenant#member` is a
/// legal viewer of a group regardless of which tenant), matching write-time
/// enforcement rather than concrete-tuple inspection.
pub fn validate_write(tk: &TupleKey) -> EngineResult<()> {
    tk.validate()?;
    let subject = tk.subject.as_ref().ok_or_else(|| EngineError::InvalidTuple {
        message: "write requires a subject".to_string(),
    })?;
    let object = tk.object.as_ref().ok_or_else(|| EngineError::InvalidTuple {
        message: "write requires an object".to_string(),
    })?;
    let relation = tk.relation.ok_or_else(|| EngineError::InvalidTuple {
        message: "write requires a relation".to_string(),
    })?;
    if subject_allowed(object.kind, subject, relation) {
        Ok(())
    } else {
        Err(EngineError::SchemaViolation {
            subject: subject.to_string(),
            relation: relation.as_str().to_string(),
            object: object.to_string(),
        })
    }
}

/// The schema table from the domain model.
fn subject_allowed(object: ObjectType, subject: &EntityKey, relation: Relation) -> bool {
    use ObjectType::*;
    use Relation::*;
    match object {
        Tenant => match (subject.kind, subject.ref_relation, subject.is_wildcard()) {
            (User, None, true) => relation == Member,
            (User, None, false) => matches!(relation, Admin | Member),
            _ => false,
        },
        Group => match (subject.kind, subject.ref_relation, subject.is_wildcard()) {
            (User, None, true) => matches!(relation, Viewer | Editor | Member),
            (User, None, false) => matches!(relation, Viewer | Editor | Manager),
            (Tenant, Some(Member), _) => matches!(relation, Viewer | Editor),
            (Tenant, None, _) => relation == Parent,
            _ => false,
        },
        Feed => match (subject.kind, subject.ref_relation) {
            (Group, None) => relation == Parent,
            _ => false,
        },
        FeedVersion => match (subject.kind, subject.ref_relation, subject.is_wildcard()) {
            (User, None, false) => matches!(relation, Viewer | Editor),
            (Tenant, Some(Member), _) => matches!(relation, Viewer | Editor),
            (Group, Some(Viewer | Editor | Member), _) => matches!(relation, Viewer | Editor),
            (Feed, None, _) => relation == Parent,
            _ => false,
        },
        User => false,
    }
}

/// Direct relations that satisfy an action on an object type.
///
/// Parent-derived grants (tenant admin on groups, group relations on feeds
/// and feed versions) are structural and handled by the engine; this table
/// covers only tuples stored against the object itself.
pub fn direct_relations(object: ObjectType, action: Action) -> &'static [Relation] {
    use Action::*;
    use Relation::*;
    match object {
        ObjectType::Tenant => match action {
            CanView => &[Admin, Member],
            CanEdit | CanEditMembers | CanCreateOrg | CanDeleteOrg => &[Admin],
            _ => &[],
        },
        ObjectType::Group => match action {
            CanView => &[Viewer, Editor, Manager],
            CanEdit => &[Editor, Manager],
            CanEditMembers | CanCreateFeed | CanDeleteFeed => &[Manager],
            _ => &[],
        },
        // Feeds carry no direct user relations; everything derives from the
        // parent group.
        ObjectType::Feed => &[],
        ObjectType::FeedVersion => match action {
            CanView => &[Viewer, Editor],
            CanEdit => &[Editor],
            _ => &[],
        },
        ObjectType::User => &[],
    }
}

/// Relation expansion for subject-set resolution: which stored relations on
/// an object satisfy "holds `relation`".
///
/// A subject-set references the relation's own expansion: stronger roles
/// imply weaker ones (manager ⊇ editor ⊇ viewer on groups, editor ⊇ viewer
/// on feed versions), while tenant `member` and `admin` stay independent.
pub fn relation_expansion(object: ObjectType, relation: Relation) -> &'static [Relation] {
    use Relation::*;
    match object {
        ObjectType::Tenant => match relation {
            Admin => &[Admin],
            Member => &[Member],
            _ => &[],
        },
        ObjectType::Group => match relation {
            Viewer => &[Viewer, Editor, Manager],
            Editor => &[Editor, Manager],
            Manager => &[Manager],
            // Groups have no stored member relation; `group#member`
            // subject-sets are legal to write but expand to nothing.
            Member => &[],
            _ => &[],
        },
        ObjectType::FeedVersion => match relation {
            Viewer => &[Viewer, Editor],
            Editor => &[Editor],
            _ => &[],
        },
        _ => &[],
    }
}

/// Whether holding `relation` on a group is implied by being admin of the
/// group's parent tenant.
pub fn group_relation_from_tenant_admin(relation: Relation) -> bool {
    matches!(relation, Relation::Viewer | Relation::Editor | Relation::Manager)
}

/// Maps a feed action to the equivalent action on its parent group.
pub fn feed_action_on_group(action: Action) -> Option<Action> {
    use Action::*;
    match action {
        CanView => Some(CanView),
        CanEdit | CanCreateFeedVersion => Some(CanEdit),
        CanDeleteFeedVersion | CanSetGroup => Some(CanEditMembers),
        _ => None,
    }
}

/// Maps a feed-version action to the equivalent action on its parent feed.
pub fn feed_version_action_on_feed(action: Action) -> Option<Action> {
    use Action::*;
    match action {
        CanView => Some(CanView),
        CanEdit => Some(CanEdit),
        CanEditMembers => Some(CanDeleteFeedVersion),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tk(subject: &str, relation: Relation, object: &str) -> TupleKey {
        TupleKey::new()
            .with_subject(EntityKey::parse(subject).unwrap())
            .with_object(EntityKey::parse(object).unwrap())
            .with_relation(relation)
    }

    #[test]
    fn test_tenant_schema() {
        assert!(validate_write(&tk("user:alice", Relation::Admin, "tenant:1")).is_ok());
        assert!(validate_write(&tk("user:alice", Relation::Member, "tenant:1")).is_ok());
        assert!(validate_write(&tk("user:*", Relation::Member, "tenant:1")).is_ok());
        // Wildcard admin is never legal.
        assert!(validate_write(&tk("user:*", Relation::Admin, "tenant:1")).is_err());
        assert!(validate_write(&tk("user:alice", Relation::Viewer, "tenant:1")).is_err());
    }

    #[test]
    fn test_group_schema() {
        assert!(validate_write(&tk("user:bob", Relation::Manager, "group:2")).is_ok());
        assert!(validate_write(&tk("tenant:1#member", Relation::Viewer, "group:2")).is_ok());
        assert!(validate_write(&tk("tenant:1", Relation::Parent, "group:2")).is_ok());
        assert!(validate_write(&tk("user:*", Relation::Viewer, "group:2")).is_ok());
        // Subject-sets cannot hold manager.
        assert!(validate_write(&tk("tenant:1#member", Relation::Manager, "group:2")).is_err());
        assert!(validate_write(&tk("user:*", Relation::Manager, "group:2")).is_err());
    }

    #[test]
    fn test_feed_schema_only_group_parent() {
        assert!(validate_write(&tk("group:2", Relation::Parent, "feed:3")).is_ok());
        assert!(validate_write(&tk("user:bob", Relation::Viewer, "feed:3")).is_err());
        assert!(validate_write(&tk("tenant:1", Relation::Parent, "feed:3")).is_err());
    }

    #[test]
    fn test_feed_version_schema() {
        assert!(validate_write(&tk("user:bob", Relation::Editor, "feed_version:4")).is_ok());
        assert!(validate_write(&tk("group:2#viewer", Relation::Viewer, "feed_version:4")).is_ok());
        assert!(validate_write(&tk("feed:3", Relation::Parent, "feed_version:4")).is_ok());
        assert!(validate_write(&tk("user:bob", Relation::Manager, "feed_version:4")).is_err());
    }

    #[test]
    fn test_parent_edges_stay_acyclic() {
        // Upward or sideways parent edges are all schema violations.
        assert!(validate_write(&tk("feed:3", Relation::Parent, "group:2")).is_err());
        assert!(validate_write(&tk("feed_version:4", Relation::Parent, "feed:3")).is_err());
        assert!(validate_write(&tk("group:2", Relation::Parent, "tenant:1")).is_err());
        assert!(validate_write(&tk("group:2", Relation::Parent, "group:9")).is_err());
    }

    #[test]
    fn test_direct_relations_table() {
        assert_eq!(
            direct_relations(ObjectType::Tenant, Action::CanView),
            &[Relation::Admin, Relation::Member]
        );
        assert_eq!(
            direct_relations(ObjectType::Group, Action::CanEditMembers),
            &[Relation::Manager]
        );
        assert!(direct_relations(ObjectType::Feed, Action::CanView).is_empty());
    }

    #[test]
    fn test_relation_expansion_implication() {
        assert_eq!(
            relation_expansion(ObjectType::Group, Relation::Viewer),
            &[Relation::Viewer, Relation::Editor, Relation::Manager]
        );
        assert_eq!(
            relation_expansion(ObjectType::Tenant, Relation::Member),
            &[Relation::Member]
        );
        assert!(relation_expansion(ObjectType::Group, Relation::Member).is_empty());
    }
}
