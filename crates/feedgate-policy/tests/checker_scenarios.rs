//! End-to-end policy scenarios over the in-memory engine and entity DB.

use std::sync::Arc;

use feedgate_authn::{StaticIdentityClient, User};
use feedgate_domain::{Action, EntityKey, Relation, RelationEngine, TupleKey};
use feedgate_policy::{
    Checker, CheckerConfig, Cursor, Feed, FeedVersion, Group, MemoryEntityDb, PermFilter,
    PolicyError, Tenant,
};
use feedgate_storage::MemoryTupleStore;

struct Fixture {
    engine: RelationEngine<MemoryTupleStore>,
    db: Arc<MemoryEntityDb>,
    checker: Checker<MemoryTupleStore, MemoryEntityDb>,
}

fn fixture() -> Fixture {
    let store = MemoryTupleStore::new_shared();
    let engine = RelationEngine::new(store);
    let db = Arc::new(MemoryEntityDb::new());
    let identity = Arc::new(StaticIdentityClient::with_users(
        ["alice", "bob", "carol", "dave", "erin", "mandy"]
            .into_iter()
            .map(User::new),
    ));
    let checker = Checker::new(
        engine.clone(),
        Arc::clone(&db),
        identity,
        CheckerConfig {
            global_admins: vec!["root".to_string()],
            ..Default::default()
        },
    );
    Fixture {
        engine,
        db,
        checker,
    }
}

fn user(id: &str) -> User {
    User::new(id)
}

fn tk(subject: &str, relation: Relation, object: &str) -> TupleKey {
    TupleKey::new()
        .with_subject(EntityKey::parse(subject).unwrap())
        .with_object(EntityKey::parse(object).unwrap())
        .with_relation(relation)
}

async fn seed(engine: &RelationEngine<MemoryTupleStore>, tuples: &[TupleKey]) {
    for t in tuples {
        engine.write_tuple(t).await.unwrap();
    }
}

/// Tenant 1 "acme" with alice as admin.
async fn seed_acme(fx: &Fixture) {
    fx.db.insert_tenant(Tenant {
        id: 1,
        name: "acme".to_string(),
    });
    seed(&fx.engine, &[tk("user:alice", Relation::Admin, "tenant:1")]).await;
}

// Scenario: tenant admin adds a user.
#[tokio::test]
async fn test_tenant_admin_adds_member() {
    let fx = fixture();
    seed_acme(&fx).await;

    fx.checker
        .tenant_add_permission(
            &user("alice"),
            1,
            EntityKey::parse("user:bob").unwrap(),
            Relation::Member,
        )
        .await
        .unwrap();

    let tuples = fx
        .engine
        .get_object_tuples(&EntityKey::parse("tenant:1").unwrap())
        .await
        .unwrap();
    assert!(tuples.contains(&tk("user:bob", Relation::Member, "tenant:1")));

    // And bob now shows up in the permission view.
    let perms = fx.checker.tenant_permissions(&user("alice"), 1).await.unwrap();
    assert_eq!(perms.members.len(), 1);
    assert_eq!(perms.members[0].subject, "user:bob");
    assert!(perms.members[0].user.is_some(), "member should be hydrated");
    assert!(perms.actions.can_edit_members);
}

// A plain member holds can_view but not the mutation admission check.
#[tokio::test]
async fn test_member_cannot_edit_members() {
    let fx = fixture();
    seed_acme(&fx).await;
    seed(&fx.engine, &[tk("user:bob", Relation::Member, "tenant:1")]).await;

    let err = fx
        .checker
        .tenant_add_permission(
            &user("bob"),
            1,
            EntityKey::parse("user:carol").unwrap(),
            Relation::Member,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::Unauthorized));

    // The denied mutation left no tuple behind.
    let tuples = fx
        .engine
        .get_object_tuples(&EntityKey::parse("tenant:1").unwrap())
        .await
        .unwrap();
    assert!(!tuples
        .iter()
        .any(|t| t.subject.as_ref().is_some_and(|s| s.name == "carol")));
}

// Scenario: inherited group viewer through a tenant#member subject-set.
#[tokio::test]
async fn test_inherited_group_viewer() {
    let fx = fixture();
    seed_acme(&fx).await;
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    seed(
        &fx.engine,
        &[
            tk("tenant:1", Relation::Parent, "group:2"),
            tk("tenant:1#member", Relation::Viewer, "group:2"),
            tk("user:carol", Relation::Member, "tenant:1"),
        ],
    )
    .await;

    let perms = fx.checker.group_permissions(&user("carol"), 2).await.unwrap();
    assert!(perms.actions.can_view);
    assert!(!perms.actions.can_edit);
    assert_eq!(perms.tenant.as_ref().map(|t| t.id), Some(1));

    let groups = fx.checker.group_list(&user("carol")).await.unwrap();
    assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![2]);
}

// Scenario: role upgrade via Replace semantics.
#[tokio::test]
async fn test_role_upgrade_replaces_old_relation() {
    let fx = fixture();
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    seed(
        &fx.engine,
        &[
            tk("user:mandy", Relation::Manager, "group:2"),
            tk("user:dave", Relation::Viewer, "group:2"),
        ],
    )
    .await;

    fx.checker
        .group_add_permission(
            &user("mandy"),
            2,
            EntityKey::parse("user:dave").unwrap(),
            Relation::Editor,
        )
        .await
        .unwrap();

    let dave_tuples: Vec<TupleKey> = fx
        .engine
        .get_object_tuples(&EntityKey::parse("group:2").unwrap())
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.subject.as_ref().is_some_and(|s| s.name == "dave"))
        .collect();
    assert_eq!(dave_tuples.len(), 1, "exactly one tuple for dave remains");
    assert_eq!(dave_tuples[0].relation, Some(Relation::Editor));
}

// Scenario: feed-version permission inherited through the contextual parent.
#[tokio::test]
async fn test_feed_version_inherits_through_contextual_parent() {
    let fx = fixture();
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    fx.db.insert_feed(Feed {
        id: 3,
        onestop_id: "f-ba".to_string(),
        public: false,
    });
    fx.db.insert_feed_version(FeedVersion {
        id: 42,
        feed_id: 3,
        sha1: "c0ffee".to_string(),
    });
    seed(
        &fx.engine,
        &[
            tk("group:2", Relation::Parent, "feed:3"),
            tk("user:erin", Relation::Editor, "group:2"),
        ],
    )
    .await;

    // No feed-version tuple exists anywhere; the parent comes from the DB row.
    let perms = fx
        .checker
        .feed_version_permissions(&user("erin"), 42)
        .await
        .unwrap();
    assert!(perms.actions.can_view);
    assert!(perms.actions.can_edit);
    assert!(!perms.actions.can_edit_members, "editor is not a manager");
}

// Scenario: unauthorized masks not-found.
#[tokio::test]
async fn test_unauthorized_masks_not_found() {
    let fx = fixture();

    let err = fx
        .checker
        .tenant_permissions(&User::anonymous(), 999)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::Unauthorized));

    // An authenticated user without a grant gets the same answer.
    let err = fx
        .checker
        .tenant_permissions(&user("bob"), 999)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::Unauthorized));
}

// Scenario: the global admin sees a concrete not-found.
#[tokio::test]
async fn test_global_admin_sees_not_found() {
    let fx = fixture();

    let err = fx
        .checker
        .tenant_permissions(&user("root"), 999)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::NotFound));
}

// Global-admin decisions are independent of tuple state for objects that
// exist.
#[tokio::test]
async fn test_global_admin_overlay_ignores_tuples() {
    let fx = fixture();
    fx.db.insert_tenant(Tenant {
        id: 7,
        name: "empty".to_string(),
    });

    // Not a single tuple exists for this tenant.
    let perms = fx.checker.tenant_permissions(&user("root"), 7).await.unwrap();
    assert!(perms.actions.can_edit);
    assert!(perms.actions.can_delete_org);
    assert!(perms.admins.is_empty());

    // The role-based overlay behaves identically to the configured list.
    let role_admin = User {
        id: "ops".to_string(),
        roles: vec!["admin".to_string()],
        ..Default::default()
    };
    let perms = fx.checker.tenant_permissions(&role_admin, 7).await.unwrap();
    assert!(perms.actions.can_edit_members);
}

// Removing a relation that is only inherited is a schema violation, not a
// silent success.
#[tokio::test]
async fn test_remove_inherited_relation_rejected() {
    let fx = fixture();
    seed_acme(&fx).await;
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    seed(
        &fx.engine,
        &[
            tk("tenant:1", Relation::Parent, "group:2"),
            tk("tenant:1#member", Relation::Viewer, "group:2"),
            tk("user:carol", Relation::Member, "tenant:1"),
            tk("user:mandy", Relation::Manager, "group:2"),
        ],
    )
    .await;

    // carol views group 2 only through tenant:1#member; there is no direct
    // tuple to delete.
    let err = fx
        .checker
        .group_remove_permission(
            &user("mandy"),
            2,
            EntityKey::parse("user:carol").unwrap(),
            Relation::Viewer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::SchemaViolation { .. }));
}

#[tokio::test]
async fn test_tenant_create_group_writes_parent_tuple() {
    let fx = fixture();
    seed_acme(&fx).await;

    let group = fx
        .checker
        .tenant_create_group(&user("alice"), 1, "ferries")
        .await
        .unwrap();

    let tuples = fx
        .engine
        .get_object_tuples(&EntityKey::parse(&format!("group:{}", group.id)).unwrap())
        .await
        .unwrap();
    assert!(tuples.contains(&tk("tenant:1", Relation::Parent, &format!("group:{}", group.id))));

    // As tenant admin, alice manages the new group through the parent edge.
    let perms = fx
        .checker
        .group_permissions(&user("alice"), group.id)
        .await
        .unwrap();
    assert!(perms.actions.can_edit_members);
}

#[tokio::test]
async fn test_feed_set_group_replaces_assignment() {
    let fx = fixture();
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    fx.db.insert_group(Group {
        id: 5,
        name: "trams".to_string(),
    });
    fx.db.insert_feed(Feed {
        id: 3,
        onestop_id: "f-ba".to_string(),
        public: false,
    });
    seed(
        &fx.engine,
        &[
            tk("group:2", Relation::Parent, "feed:3"),
            tk("user:mandy", Relation::Manager, "group:2"),
        ],
    )
    .await;

    fx.checker
        .feed_set_group(&user("mandy"), 3, 5)
        .await
        .unwrap();

    let tuples = fx
        .engine
        .get_object_tuples(&EntityKey::parse("feed:3").unwrap())
        .await
        .unwrap();
    assert_eq!(tuples.len(), 1, "the feed has exactly one parent");
    assert_eq!(
        tuples[0].subject.as_ref().map(|s| s.to_string()),
        Some("group:5".to_string())
    );
}

#[tokio::test]
async fn test_wildcard_member_extends_tenant_list() {
    let fx = fixture();
    fx.db.insert_tenant(Tenant {
        id: 1,
        name: "acme".to_string(),
    });
    seed(&fx.engine, &[tk("user:*", Relation::Member, "tenant:1")]).await;

    // A user with no explicit tuples can still list and view the tenant.
    let tenants = fx.checker.tenant_list(&user("newcomer")).await.unwrap();
    assert_eq!(tenants.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
    let perms = fx
        .checker
        .tenant_permissions(&user("newcomer"), 1)
        .await
        .unwrap();
    assert!(perms.actions.can_view);
    assert!(!perms.actions.can_edit);
}

#[tokio::test]
async fn test_perm_filter_scopes_feed_lists() {
    let fx = fixture();
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    fx.db.insert_feed(Feed {
        id: 3,
        onestop_id: "f-private".to_string(),
        public: false,
    });
    fx.db.insert_feed(Feed {
        id: 4,
        onestop_id: "f-public".to_string(),
        public: true,
    });
    fx.db.insert_feed(Feed {
        id: 6,
        onestop_id: "f-other".to_string(),
        public: false,
    });
    fx.db.insert_feed_version(FeedVersion {
        id: 42,
        feed_id: 3,
        sha1: "c0ffee".to_string(),
    });
    seed(
        &fx.engine,
        &[
            tk("group:2", Relation::Parent, "feed:3"),
            tk("user:erin", Relation::Editor, "group:2"),
        ],
    )
    .await;

    let filter = fx.checker.perm_filter(&user("erin")).await.unwrap();
    assert_eq!(
        filter,
        PermFilter::Ids {
            feed_ids: vec![3],
            feed_version_ids: vec![]
        }
    );

    // erin: her granted feed plus the public one, never the third.
    let feeds = fx
        .checker
        .feed_list(&user("erin"), Cursor::default())
        .await
        .unwrap();
    assert_eq!(feeds.iter().map(|f| f.id).collect::<Vec<_>>(), vec![3, 4]);

    // The feed grant reaches versions through the feed id clause.
    let fvs = fx
        .checker
        .feed_version_list(&user("erin"), Cursor::default())
        .await
        .unwrap();
    assert_eq!(fvs.iter().map(|v| v.id).collect::<Vec<_>>(), vec![42]);

    // Anonymous callers see public rows only.
    let feeds = fx
        .checker
        .feed_list(&User::anonymous(), Cursor::default())
        .await
        .unwrap();
    assert_eq!(feeds.iter().map(|f| f.id).collect::<Vec<_>>(), vec![4]);

    // Global admins see everything.
    let feeds = fx
        .checker
        .feed_list(&user("root"), Cursor::default())
        .await
        .unwrap();
    assert_eq!(feeds.len(), 3);
}

#[tokio::test]
async fn test_feed_version_add_permission_requires_manager() {
    let fx = fixture();
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    fx.db.insert_feed(Feed {
        id: 3,
        onestop_id: "f-ba".to_string(),
        public: false,
    });
    fx.db.insert_feed_version(FeedVersion {
        id: 42,
        feed_id: 3,
        sha1: "c0ffee".to_string(),
    });
    seed(
        &fx.engine,
        &[
            tk("group:2", Relation::Parent, "feed:3"),
            tk("user:erin", Relation::Editor, "group:2"),
            tk("user:mandy", Relation::Manager, "group:2"),
        ],
    )
    .await;

    // Editors cannot grant feed-version permissions.
    let err = fx
        .checker
        .feed_version_add_permission(
            &user("erin"),
            42,
            EntityKey::parse("user:bob").unwrap(),
            Relation::Viewer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::Unauthorized));

    // Managers can, and the grant shows up for the grantee.
    fx.checker
        .feed_version_add_permission(
            &user("mandy"),
            42,
            EntityKey::parse("user:bob").unwrap(),
            Relation::Viewer,
        )
        .await
        .unwrap();
    let perms = fx
        .checker
        .feed_version_permissions(&user("bob"), 42)
        .await
        .unwrap();
    assert!(perms.actions.can_view);
    assert_eq!(perms.viewers.len(), 1);
}

#[tokio::test]
async fn test_group_set_tenant_reassigns_parent() {
    let fx = fixture();
    fx.db.insert_tenant(Tenant {
        id: 1,
        name: "acme".to_string(),
    });
    fx.db.insert_tenant(Tenant {
        id: 9,
        name: "globex".to_string(),
    });
    fx.db.insert_group(Group {
        id: 2,
        name: "buses".to_string(),
    });
    seed(&fx.engine, &[tk("tenant:1", Relation::Parent, "group:2")]).await;

    fx.checker
        .group_set_tenant(&user("root"), 2, 9)
        .await
        .unwrap();

    let tuples = fx
        .engine
        .get_object_tuples(&EntityKey::parse("group:2").unwrap())
        .await
        .unwrap();
    let parents: Vec<String> = tuples
        .iter()
        .filter(|t| t.relation == Some(Relation::Parent))
        .filter_map(|t| t.subject.as_ref().map(|s| s.to_string()))
        .collect();
    assert_eq!(parents, vec!["tenant:9".to_string()]);
}

#[tokio::test]
async fn test_schema_violation_surfaces_as_client_error() {
    let fx = fixture();
    seed_acme(&fx).await;

    // `viewer` is not a tenant relation.
    let err = fx
        .checker
        .tenant_add_permission(
            &user("alice"),
            1,
            EntityKey::parse("user:bob").unwrap(),
            Relation::Viewer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::SchemaViolation { .. }));
}

#[tokio::test]
async fn test_user_lookup_requires_authentication() {
    let fx = fixture();

    assert!(matches!(
        fx.checker.user(&User::anonymous(), "alice").await,
        Err(PolicyError::Unauthorized)
    ));
    let found = fx.checker.user(&user("bob"), "alice").await.unwrap();
    assert_eq!(found.id, "alice");
    assert!(matches!(
        fx.checker.user(&user("bob"), "nobody").await,
        Err(PolicyError::NotFound)
    ));

    let all = fx.checker.users(&user("bob"), "").await.unwrap();
    assert_eq!(all.len(), 6);
}

// ListObjects agrees with Check across the tenant/group chain (superset and
// equality up to ordering).
#[tokio::test]
async fn test_list_objects_consistent_with_checks() {
    let fx = fixture();
    for id in [1, 2, 3] {
        fx.db.insert_tenant(Tenant {
            id,
            name: format!("t{id}"),
        });
    }
    seed(
        &fx.engine,
        &[
            tk("user:alice", Relation::Admin, "tenant:1"),
            tk("user:alice", Relation::Member, "tenant:2"),
            tk("user:bob", Relation::Admin, "tenant:3"),
        ],
    )
    .await;

    let listed: Vec<i64> = fx
        .checker
        .tenant_list(&user("alice"))
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(listed, vec![1, 2]);

    for id in [1i64, 2] {
        let tk = TupleKey::new()
            .with_subject(EntityKey::user("alice"))
            .with_object(EntityKey::parse(&format!("tenant:{id}")).unwrap())
            .with_action(Action::CanView);
        assert!(fx.engine.check(&tk, &[]).await.unwrap());
    }
}
