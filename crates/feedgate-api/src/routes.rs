//! HTTP route definitions and handlers.
//!
//! Status mapping follows the surface contract: 401 for unauthorized with
//! no detail, 400 for schema violations and malformed input, 500 for
//! everything else. `not_found` keeps its distinct error code in the body so
//! tooling can detect genuine absences.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error};

use feedgate_authn::User;
use feedgate_domain::{EntityKey, ObjectType, Relation};
use feedgate_policy::{Cursor, EntityDb, PolicyError};
use feedgate_storage::TupleStore;

use crate::state::AppState;

/// Stable error codes carried in JSON error bodies.
pub mod error_codes {
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const SCHEMA_VIOLATION: &str = "schema_violation";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            status,
        }
    }

    /// 401 with no detail beyond the code.
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            error_codes::UNAUTHORIZED,
            "unauthorized",
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_codes::VALIDATION_ERROR,
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({"error": {"code": self.code, "message": self.message}});
        (self.status, Json(body)).into_response()
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Unauthorized => ApiError::unauthorized(),
            PolicyError::NotFound => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::NOT_FOUND,
                "not found",
            ),
            PolicyError::SchemaViolation { message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                error_codes::SCHEMA_VIOLATION,
                message,
            ),
            PolicyError::Upstream { message } => {
                error!(error = %message, "upstream failure");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_codes::INTERNAL_ERROR,
                    "internal error",
                )
            }
            PolicyError::Cancelled => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "request cancelled",
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct Success {
    success: bool,
}

impl Success {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

#[derive(Debug, Deserialize)]
struct SaveBody {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    after: Option<i64>,
    limit: Option<i64>,
}

impl ListQuery {
    fn cursor(&self) -> Cursor {
        Cursor {
            after_id: self.after,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct UsersQuery {
    q: Option<String>,
}

/// Creates the admin-surface router. Every route except `/healthz` runs
/// behind the authentication middleware.
pub fn create_router<S: TupleStore, D: EntityDb>(
    state: AppState<S, D>,
    body_limit: usize,
) -> Router {
    let shared = Arc::new(state);
    let api = Router::new()
        .route("/users", get(list_users::<S, D>))
        .route("/users/:id", get(get_user::<S, D>))
        .route("/tenants", get(tenant_list::<S, D>))
        .route(
            "/tenants/:id",
            get(tenant_permissions::<S, D>).post(tenant_save::<S, D>),
        )
        .route("/tenants/:id/groups", post(tenant_create_group::<S, D>))
        .route(
            "/tenants/:id/permissions/:type/:relation/:name",
            post(tenant_add_permission::<S, D>).delete(tenant_remove_permission::<S, D>),
        )
        .route("/groups", get(group_list::<S, D>))
        .route(
            "/groups/:id",
            get(group_permissions::<S, D>).post(group_save::<S, D>),
        )
        .route("/groups/:id/tenant/:tenant_id", post(group_set_tenant::<S, D>))
        .route(
            "/groups/:id/permissions/:type/:relation/:name",
            post(group_add_permission::<S, D>).delete(group_remove_permission::<S, D>),
        )
        .route("/feeds", get(feed_list::<S, D>))
        .route("/feeds/:id", get(feed_permissions::<S, D>))
        .route("/feeds/:id/group/:group_id", post(feed_set_group::<S, D>))
        .route("/feed_versions", get(feed_version_list::<S, D>))
        .route("/feed_versions/:id", get(feed_version_permissions::<S, D>))
        .route(
            "/feed_versions/:id/permissions/:type/:relation/:name",
            post(feed_version_add_permission::<S, D>)
                .delete(feed_version_remove_permission::<S, D>),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&shared),
            auth_middleware::<S, D>,
        ))
        .with_state(shared);

    let public = Router::new().route("/healthz", get(healthz));

    api.merge(public)
        .layer(RequestBodyLimitLayer::new(body_limit))
}

async fn auth_middleware<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.authenticator.authenticate(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(err) => {
            debug!(error = %err, "authentication failed");
            ApiError::unauthorized().into_response()
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

// ============================================================
// Path parsing
// ============================================================

fn parse_relation(value: &str) -> Result<Relation, ApiError> {
    Relation::from_str(value).map_err(|e| ApiError::validation(e.to_string()))
}

/// Parses the `{type}/{relation}/{name}` subject segments. The name may
/// carry a subject-set qualifier (`1#member`) or be a full `type:name` key.
fn parse_subject(kind: &str, name: &str) -> Result<EntityKey, ApiError> {
    if name.contains(':') {
        return EntityKey::parse(name).map_err(|e| ApiError::validation(e.to_string()));
    }
    let kind = ObjectType::from_str(kind).map_err(|e| ApiError::validation(e.to_string()))?;
    match name.split_once('#') {
        Some((base, rel)) => {
            let rel = parse_relation(rel)?;
            if base.is_empty() {
                return Err(ApiError::validation("empty subject name"));
            }
            Ok(EntityKey::subject_set(kind, base, rel))
        }
        None => {
            if name.is_empty() {
                return Err(ApiError::validation("empty subject name"));
            }
            Ok(EntityKey::new(kind, name))
        }
    }
}

// ============================================================
// Users
// ============================================================

async fn list_users<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let users = state
        .checker
        .users(&caller, query.q.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(json!({"users": users})))
}

async fn get_user<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.checker.user(&caller, &id).await?;
    Ok(Json(json!({"user": user})))
}

// ============================================================
// Tenants
// ============================================================

async fn tenant_list<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenants = state.checker.tenant_list(&caller).await?;
    Ok(Json(json!({"tenants": tenants})))
}

async fn tenant_permissions<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let perms = state.checker.tenant_permissions(&caller, id).await?;
    Ok(Json(perms))
}

async fn tenant_save<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
    Json(body): Json<SaveBody>,
) -> Result<Json<Success>, ApiError> {
    state.checker.tenant_save(&caller, id, &body.name).await?;
    Ok(Success::ok())
}

async fn tenant_create_group<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
    Json(body): Json<SaveBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let group = state
        .checker
        .tenant_create_group(&caller, id, &body.name)
        .await?;
    Ok(Json(json!({"group": group})))
}

async fn tenant_add_permission<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, kind, relation, name)): Path<(i64, String, String, String)>,
) -> Result<Json<Success>, ApiError> {
    let subject = parse_subject(&kind, &name)?;
    let relation = parse_relation(&relation)?;
    state
        .checker
        .tenant_add_permission(&caller, id, subject, relation)
        .await?;
    Ok(Success::ok())
}

async fn tenant_remove_permission<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, kind, relation, name)): Path<(i64, String, String, String)>,
) -> Result<Json<Success>, ApiError> {
    let subject = parse_subject(&kind, &name)?;
    let relation = parse_relation(&relation)?;
    state
        .checker
        .tenant_remove_permission(&caller, id, subject, relation)
        .await?;
    Ok(Success::ok())
}

// ============================================================
// Groups
// ============================================================

async fn group_list<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let groups = state.checker.group_list(&caller).await?;
    Ok(Json(json!({"groups": groups})))
}

async fn group_permissions<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let perms = state.checker.group_permissions(&caller, id).await?;
    Ok(Json(perms))
}

async fn group_save<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
    Json(body): Json<SaveBody>,
) -> Result<Json<Success>, ApiError> {
    state.checker.group_save(&caller, id, &body.name).await?;
    Ok(Success::ok())
}

async fn group_set_tenant<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, tenant_id)): Path<(i64, i64)>,
) -> Result<Json<Success>, ApiError> {
    state.checker.group_set_tenant(&caller, id, tenant_id).await?;
    Ok(Success::ok())
}

async fn group_add_permission<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, kind, relation, name)): Path<(i64, String, String, String)>,
) -> Result<Json<Success>, ApiError> {
    let subject = parse_subject(&kind, &name)?;
    let relation = parse_relation(&relation)?;
    state
        .checker
        .group_add_permission(&caller, id, subject, relation)
        .await?;
    Ok(Success::ok())
}

async fn group_remove_permission<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, kind, relation, name)): Path<(i64, String, String, String)>,
) -> Result<Json<Success>, ApiError> {
    let subject = parse_subject(&kind, &name)?;
    let relation = parse_relation(&relation)?;
    state
        .checker
        .group_remove_permission(&caller, id, subject, relation)
        .await?;
    Ok(Success::ok())
}

// ============================================================
// Feeds
// ============================================================

async fn feed_list<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let feeds = state.checker.feed_list(&caller, query.cursor()).await?;
    Ok(Json(json!({"feeds": feeds})))
}

async fn feed_permissions<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let perms = state.checker.feed_permissions(&caller, id).await?;
    Ok(Json(perms))
}

async fn feed_set_group<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, group_id)): Path<(i64, i64)>,
) -> Result<Json<Success>, ApiError> {
    state.checker.feed_set_group(&caller, id, group_id).await?;
    Ok(Success::ok())
}

// ============================================================
// Feed versions
// ============================================================

async fn feed_version_list<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let feed_versions = state
        .checker
        .feed_version_list(&caller, query.cursor())
        .await?;
    Ok(Json(json!({"feed_versions": feed_versions})))
}

async fn feed_version_permissions<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let perms = state.checker.feed_version_permissions(&caller, id).await?;
    Ok(Json(perms))
}

async fn feed_version_add_permission<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, kind, relation, name)): Path<(i64, String, String, String)>,
) -> Result<Json<Success>, ApiError> {
    let subject = parse_subject(&kind, &name)?;
    let relation = parse_relation(&relation)?;
    state
        .checker
        .feed_version_add_permission(&caller, id, subject, relation)
        .await?;
    Ok(Success::ok())
}

async fn feed_version_remove_permission<S: TupleStore, D: EntityDb>(
    State(state): State<Arc<AppState<S, D>>>,
    Extension(caller): Extension<User>,
    Path((id, kind, relation, name)): Path<(i64, String, String, String)>,
) -> Result<Json<Success>, ApiError> {
    let subject = parse_subject(&kind, &name)?;
    let relation = parse_relation(&relation)?;
    state
        .checker
        .feed_version_remove_permission(&caller, id, subject, relation)
        .await?;
    Ok(Success::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subject_plain_user() {
        let subject = parse_subject("user", "alice").unwrap();
        assert_eq!(subject.to_string(), "user:alice");
    }

    #[test]
    fn test_parse_subject_wildcard() {
        let subject = parse_subject("user", "*").unwrap();
        assert!(subject.is_wildcard());
    }

    #[test]
    fn test_parse_subject_subject_set() {
        let subject = parse_subject("tenant", "1#member").unwrap();
        assert_eq!(subject.to_string(), "tenant:1#member");
    }

    #[test]
    fn test_parse_subject_full_key() {
        let subject = parse_subject("user", "tenant:1#member").unwrap();
        assert_eq!(subject.to_string(), "tenant:1#member");
    }

    #[test]
    fn test_parse_subject_rejects_garbage() {
        assert!(parse_subject("spaceship", "x").is_err());
        assert!(parse_subject("user", "").is_err());
        assert!(parse_subject("tenant", "1#pilot").is_err());
    }
}
