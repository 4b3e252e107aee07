//! Admin-surface integration tests over the in-memory backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use feedgate_api::auth::{AuthMode, Authenticator, ROLES_HEADER, USER_HEADER};
use feedgate_api::routes::create_router;
use feedgate_api::state::AppState;
use feedgate_authn::{Gatekeeper, GatekeeperConfig, IdentityClient, StaticIdentityClient, User};
use feedgate_domain::{EntityKey, Relation, RelationEngine, TupleKey};
use feedgate_policy::{CheckerConfig, EntityDb, Feed, MemoryEntityDb, Tenant};
use feedgate_storage::MemoryTupleStore;

struct TestApp {
    router: axum::Router,
    engine: RelationEngine<MemoryTupleStore>,
    db: Arc<MemoryEntityDb>,
}

fn app() -> TestApp {
    let store = MemoryTupleStore::new_shared();
    let engine = RelationEngine::new(Arc::clone(&store));
    let db = Arc::new(MemoryEntityDb::new());
    let identity: Arc<dyn IdentityClient> = Arc::new(StaticIdentityClient::with_users([
        User::new("alice"),
        User::new("bob"),
    ]));
    let authenticator = Authenticator::new(
        AuthMode::Header,
        None,
        Gatekeeper::new(Arc::clone(&identity), GatekeeperConfig::default()),
        false,
    );
    let state = AppState::new(
        store,
        Arc::clone(&db),
        identity,
        authenticator,
        CheckerConfig {
            global_admins: vec!["root".to_string()],
            ..Default::default()
        },
    );
    TestApp {
        router: create_router(state, 1024 * 1024),
        engine,
        db,
    }
}

fn tk(subject: &str, relation: Relation, object: &str) -> TupleKey {
    TupleKey::new()
        .with_subject(EntityKey::parse(subject).unwrap())
        .with_object(EntityKey::parse(object).unwrap())
        .with_relation(relation)
}

async fn seed_acme(app: &TestApp) {
    app.db.insert_tenant(Tenant {
        id: 1,
        name: "acme".to_string(),
    });
    app.engine
        .write_tuple(&tk("user:alice", Relation::Admin, "tenant:1"))
        .await
        .unwrap();
}

fn request(method: &str, path: &str, user: Option<&str>, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_healthz_is_public() {
    let app = app();
    let (status, body) = send(&app, request("GET", "/healthz", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_tenant_list_requires_authentication() {
    let app = app();
    seed_acme(&app).await;

    let (status, body) = send(&app, request("GET", "/tenants", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_tenant_list_returns_viewable_tenants() {
    let app = app();
    seed_acme(&app).await;

    let (status, body) = send(&app, request("GET", "/tenants", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenants"][0]["id"], 1);
    assert_eq!(body["tenants"][0]["name"], "acme");

    // bob holds no tuples and sees an empty list.
    let (status, body) = send(&app, request("GET", "/tenants", Some("bob"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenants"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_tenant_permissions_view() {
    let app = app();
    seed_acme(&app).await;

    let (status, body) = send(&app, request("GET", "/tenants/1", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"]["id"], 1);
    assert_eq!(body["actions"]["can_edit"], true);
    assert_eq!(body["actions"]["can_edit_members"], true);
    assert_eq!(body["admins"][0]["subject"], "user:alice");
}

#[tokio::test]
async fn test_add_permission_round_trip() {
    let app = app();
    seed_acme(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/tenants/1/permissions/user/member/bob",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = send(&app, request("GET", "/tenants/1", Some("alice"), None)).await;
    assert_eq!(body["members"][0]["subject"], "user:bob");

    // And remove it again.
    let (status, _) = send(
        &app,
        request(
            "DELETE",
            "/tenants/1/permissions/user/member/bob",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, request("GET", "/tenants/1", Some("alice"), None)).await;
    assert_eq!(body["members"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_schema_violation_is_a_client_error() {
    let app = app();
    seed_acme(&app).await;

    // `viewer` is not a tenant relation.
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/tenants/1/permissions/user/viewer/bob",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "schema_violation");
}

#[tokio::test]
async fn test_not_found_masking_by_authorization() {
    let app = app();

    // Ordinary caller: unauthorized, existence not disclosed.
    let (status, body) = send(&app, request("GET", "/tenants/999", Some("bob"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    // Global admin: concrete not_found (distinct code, 500 per the surface
    // contract).
    let mut req = request("GET", "/tenants/999", Some("root"), None);
    req.headers_mut()
        .insert(ROLES_HEADER, "admin".parse().unwrap());
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_tenant_save_updates_row() {
    let app = app();
    seed_acme(&app).await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/tenants/1",
            Some("alice"),
            Some(r#"{"name":"acme-renamed"}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.db.tenant(1).await.unwrap().unwrap().name,
        "acme-renamed"
    );
}

#[tokio::test]
async fn test_create_group_and_inherit_admin() {
    let app = app();
    seed_acme(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/tenants/1/groups",
            Some("alice"),
            Some(r#"{"name":"buses"}"#),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let group_id = body["group"]["id"].as_i64().unwrap();

    // The tenant admin manages the new group through the parent edge.
    let (status, body) = send(
        &app,
        request("GET", &format!("/groups/{group_id}"), Some("alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actions"]["can_edit_members"], true);
    assert_eq!(body["tenant"]["id"], 1);
}

#[tokio::test]
async fn test_feed_list_is_permission_filtered() {
    let app = app();
    app.db.insert_feed(Feed {
        id: 4,
        onestop_id: "f-public".to_string(),
        public: true,
    });
    app.db.insert_feed(Feed {
        id: 5,
        onestop_id: "f-private".to_string(),
        public: false,
    });

    // Anonymous callers see public feeds only.
    let (status, body) = send(&app, request("GET", "/feeds", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let feeds = body["feeds"].as_array().unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0]["id"], 4);

    // A global admin sees everything.
    let mut req = request("GET", "/feeds", Some("root"), None);
    req.headers_mut()
        .insert(ROLES_HEADER, "admin".parse().unwrap());
    let (_, body) = send(&app, req).await;
    assert_eq!(body["feeds"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_relation_in_path_is_validation_error() {
    let app = app();
    seed_acme(&app).await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/tenants/1/permissions/user/pilot/bob",
            Some("alice"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}
