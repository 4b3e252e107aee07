//! Relation engine: check, reverse lookup, and tuple mutations.
//!
//! The engine is the only component that reads or writes tuples. Checks
//! resolve through the fixed containment hierarchy (tenant → group → feed →
//! feed_version), so traversal depth is bounded by the schema rather than a
//! configured limit. Contextual tuples are merged into the read view for the
//! duration of a single call and never persisted.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::instrument;

use feedgate_storage::{StorageError, StoredTuple, TupleFilter, TupleStore};

use crate::error::{EngineError, EngineResult};
use crate::schema;
use crate::tuple::{Action, EntityKey, ObjectType, Relation, TupleKey};

/// Type alias for boxed futures to handle async recursion.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Relation engine over a tuple store.
pub struct RelationEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for RelationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Read view merging stored tuples with per-call contextual tuples.
struct TupleView<'a, S> {
    store: &'a S,
    ctx: Vec<TupleKey>,
}

impl<'a, S: TupleStore> TupleView<'a, S> {
    /// All tuples whose object matches, stored plus contextual.
    async fn object_tuples(&self, object: &EntityKey) -> EngineResult<Vec<TupleKey>> {
        let filter = TupleFilter {
            object_type: Some(object.kind.as_str().to_string()),
            object_name: Some(object.name.clone()),
            ..Default::default()
        };
        let mut tuples = Vec::new();
        for stored in self.store.read_tuples(&filter).await? {
            tuples.push(TupleKey::from_stored(&stored)?);
        }
        for ctx in &self.ctx {
            let matches = ctx
                .object
                .as_ref()
                .is_some_and(|o| o.kind == object.kind && o.name == object.name);
            if matches && !tuples.contains(ctx) {
                tuples.push(ctx.clone());
            }
        }
        Ok(tuples)
    }

    /// The parent entity of an object, if a parent tuple is visible.
    async fn parent_of(&self, object: &EntityKey) -> EngineResult<Option<EntityKey>> {
        let tuples = self.object_tuples(object).await?;
        Ok(tuples
            .into_iter()
            .filter(|t| t.relation == Some(Relation::Parent))
            .filter_map(|t| t.subject)
            .map(|s| s.base())
            .next())
    }
}

/// Does `user` hold any of `relations` on `object`, directly, via the
/// wildcard subject, or through a subject-set?
fn has_any_relation<'a, S: TupleStore>(
    view: &'a TupleView<'a, S>,
    user: &'a str,
    object: &'a EntityKey,
    relations: &'a [Relation],
) -> BoxFuture<'a, EngineResult<bool>> {
    Box::pin(async move {
        let tuples = view.object_tuples(object).await?;
        for tuple in tuples {
            let Some(relation) = tuple.relation else {
                continue;
            };
            if !relations.contains(&relation) {
                continue;
            }
            let Some(subject) = tuple.subject else {
                continue;
            };
            // All engine subjects are authenticated users, so the wildcard
            // always matches.
            if subject.is_wildcard() {
                return Ok(true);
            }
            if subject.kind == ObjectType::User && subject.name == user {
                return Ok(true);
            }
            if let Some(ref_relation) = subject.ref_relation {
                if check_relation(view, user, subject.base(), ref_relation).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    })
}

/// Does `user` hold `relation` on `entity`, using the relation's expansion
/// (stronger roles imply weaker ones) and the parent-tenant-admin rule for
/// groups?
fn check_relation<'a, S: TupleStore>(
    view: &'a TupleView<'a, S>,
    user: &'a str,
    entity: EntityKey,
    relation: Relation,
) -> BoxFuture<'a, EngineResult<bool>> {
    Box::pin(async move {
        let expansion = schema::relation_expansion(entity.kind, relation);
        if !expansion.is_empty() && has_any_relation(view, user, &entity, expansion).await? {
            return Ok(true);
        }
        if entity.kind == ObjectType::Group && schema::group_relation_from_tenant_admin(relation) {
            if let Some(parent) = view.parent_of(&entity).await? {
                if parent.kind == ObjectType::Tenant {
                    return check_relation(view, user, parent, Relation::Admin).await;
                }
            }
        }
        Ok(false)
    })
}

/// Does `user` have `action` on `object`?
fn check_action<'a, S: TupleStore>(
    view: &'a TupleView<'a, S>,
    user: &'a str,
    object: EntityKey,
    action: Action,
) -> BoxFuture<'a, EngineResult<bool>> {
    Box::pin(async move {
        match object.kind {
            ObjectType::Tenant => {
                let direct = schema::direct_relations(object.kind, action);
                has_any_relation(view, user, &object, direct).await
            }
            ObjectType::Group => {
                let direct = schema::direct_relations(object.kind, action);
                if !direct.is_empty() && has_any_relation(view, user, &object, direct).await? {
                    return Ok(true);
                }
                // Every group action is granted to admins of the parent
                // tenant; an action outside the group vocabulary stays
                // denied even for them.
                if direct.is_empty() {
                    return Ok(false);
                }
                if let Some(parent) = view.parent_of(&object).await? {
                    if parent.kind == ObjectType::Tenant {
                        return check_relation(view, user, parent, Relation::Admin).await;
                    }
                }
                Ok(false)
            }
            ObjectType::Feed => {
                let Some(group_action) = schema::feed_action_on_group(action) else {
                    return Ok(false);
                };
                match view.parent_of(&object).await? {
                    Some(parent) if parent.kind == ObjectType::Group => {
                        check_action(view, user, parent, group_action).await
                    }
                    _ => Ok(false),
                }
            }
            ObjectType::FeedVersion => {
                let direct = schema::direct_relations(object.kind, action);
                if !direct.is_empty() && has_any_relation(view, user, &object, direct).await? {
                    return Ok(true);
                }
                let Some(feed_action) = schema::feed_version_action_on_feed(action) else {
                    return Ok(false);
                };
                match view.parent_of(&object).await? {
                    Some(parent) if parent.kind == ObjectType::Feed => {
                        check_action(view, user, parent, feed_action).await
                    }
                    _ => Ok(false),
                }
            }
            ObjectType::User => Ok(false),
        }
    })
}

impl<S: TupleStore> RelationEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Answers whether the tuple's subject has the tuple's action on the
    /// tuple's object. `ctx_tuples` are borrowed for this call only and must
    /// be schema-legal.
    #[instrument(skip(self, ctx_tuples), fields(tuple = %tk))]
    pub async fn check(&self, tk: &TupleKey, ctx_tuples: &[TupleKey]) -> EngineResult<bool> {
        tk.validate()?;
        let subject = self.concrete_user(tk)?;
        let object = tk.object.clone().ok_or_else(|| EngineError::InvalidTuple {
            message: "check requires an object".to_string(),
        })?;
        let action = tk.action.ok_or_else(|| EngineError::InvalidTuple {
            message: "check requires an action".to_string(),
        })?;
        for ctx in ctx_tuples {
            schema::validate_write(ctx)?;
        }
        let view = TupleView {
            store: self.store.as_ref(),
            ctx: ctx_tuples.to_vec(),
        };
        check_action(&view, &subject, object, action).await
    }

    /// Reverse index: every object of the pattern's type on which the
    /// pattern's subject has the pattern's action. The pattern's object
    /// carries the type with an empty name.
    #[instrument(skip(self), fields(pattern = %pattern))]
    pub async fn list_objects(&self, pattern: &TupleKey) -> EngineResult<Vec<TupleKey>> {
        let subject = self.concrete_user(pattern)?;
        let object = pattern
            .object
            .as_ref()
            .ok_or_else(|| EngineError::InvalidTuple {
                message: "list pattern requires an object type".to_string(),
            })?;
        let action = pattern.action.ok_or_else(|| EngineError::InvalidTuple {
            message: "list pattern requires an action".to_string(),
        })?;
        let view = TupleView {
            store: self.store.as_ref(),
            ctx: Vec::new(),
        };
        let mut names: Vec<String> = self
            .object_names(&view, &subject, object.kind, action)
            .await?
            .into_iter()
            .collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| TupleKey {
                subject: pattern.subject.clone(),
                object: Some(EntityKey::new(object.kind, name)),
                relation: None,
                action: Some(action),
            })
            .collect())
    }

    /// Every stored tuple whose object matches, across all subjects and
    /// relations.
    pub async fn get_object_tuples(&self, object: &EntityKey) -> EngineResult<Vec<TupleKey>> {
        let filter = TupleFilter {
            object_type: Some(object.kind.as_str().to_string()),
            object_name: Some(object.name.clone()),
            ..Default::default()
        };
        let mut tuples = Vec::new();
        for stored in self.store.read_tuples(&filter).await? {
            tuples.push(TupleKey::from_stored(&stored)?);
        }
        Ok(tuples)
    }

    /// Point write; fails if the tuple is already stored.
    #[instrument(skip(self), fields(tuple = %tk))]
    pub async fn write_tuple(&self, tk: &TupleKey) -> EngineResult<()> {
        schema::validate_write(tk)?;
        self.store
            .write_tuple(tk.to_stored()?)
            .await
            .map_err(|e| map_store_error(e, tk))
    }

    /// Point delete; fails if the tuple is not stored.
    #[instrument(skip(self), fields(tuple = %tk))]
    pub async fn delete_tuple(&self, tk: &TupleKey) -> EngineResult<()> {
        tk.validate()?;
        self.store
            .delete_tuple(&tk.to_stored()?)
            .await
            .map_err(|e| map_store_error(e, tk))
    }

    /// Establishes `tk` as the only tuple for its (subject, object) pair.
    /// Idempotent: reapplying yields the same tuple set.
    #[instrument(skip(self), fields(tuple = %tk))]
    pub async fn replace_tuple(&self, tk: &TupleKey) -> EngineResult<()> {
        schema::validate_write(tk)?;
        let stored = tk.to_stored()?;
        let existing = self.object_stored_tuples(tk).await?;
        let deletes: Vec<StoredTuple> = existing
            .into_iter()
            .filter(|t| t.same_subject(&stored))
            .collect();
        self.store.apply(deletes, vec![stored]).await?;
        Ok(())
    }

    /// Within the relation class `relations`, `tk` becomes the sole tuple on
    /// its object for its subject.
    #[instrument(skip(self, relations), fields(tuple = %tk))]
    pub async fn set_exclusive_subject_relation(
        &self,
        tk: &TupleKey,
        relations: &[Relation],
    ) -> EngineResult<()> {
        schema::validate_write(tk)?;
        let stored = tk.to_stored()?;
        let class: HashSet<&str> = relations.iter().map(|r| r.as_str()).collect();
        let existing = self.object_stored_tuples(tk).await?;
        let deletes: Vec<StoredTuple> = existing
            .into_iter()
            .filter(|t| t.same_subject(&stored) && class.contains(t.relation.as_str()))
            .collect();
        self.store.apply(deletes, vec![stored]).await?;
        Ok(())
    }

    /// Makes `tk.relation` unique on `tk.object`: any other subject holding
    /// the same relation on the object is dropped. Used to enforce
    /// single-parent invariants.
    #[instrument(skip(self), fields(tuple = %tk))]
    pub async fn set_exclusive_relation(&self, tk: &TupleKey) -> EngineResult<()> {
        schema::validate_write(tk)?;
        let stored = tk.to_stored()?;
        let existing = self.object_stored_tuples(tk).await?;
        let deletes: Vec<StoredTuple> = existing
            .into_iter()
            .filter(|t| t.relation == stored.relation)
            .collect();
        self.store.apply(deletes, vec![stored]).await?;
        Ok(())
    }

    /// Stored tuples for the tuple's object.
    async fn object_stored_tuples(&self, tk: &TupleKey) -> EngineResult<Vec<StoredTuple>> {
        let object = tk.object.as_ref().ok_or_else(|| EngineError::InvalidTuple {
            message: "mutation requires an object".to_string(),
        })?;
        let filter = TupleFilter {
            object_type: Some(object.kind.as_str().to_string()),
            object_name: Some(object.name.clone()),
            ..Default::default()
        };
        Ok(self.store.read_tuples(&filter).await?)
    }

    /// Extracts the pattern's subject as a concrete user name.
    fn concrete_user(&self, tk: &TupleKey) -> EngineResult<String> {
        let subject = tk.subject.as_ref().ok_or_else(|| EngineError::InvalidTuple {
            message: "a subject is required".to_string(),
        })?;
        if subject.kind != ObjectType::User || subject.is_wildcard() || subject.is_subject_set() {
            return Err(EngineError::InvalidUserType {
                value: subject.to_string(),
            });
        }
        Ok(subject.name.clone())
    }

    /// All stored tuples with objects of the given type.
    async fn type_tuples(&self, kind: ObjectType) -> EngineResult<Vec<TupleKey>> {
        let filter = TupleFilter {
            object_type: Some(kind.as_str().to_string()),
            ..Default::default()
        };
        let mut tuples = Vec::new();
        for stored in self.store.read_tuples(&filter).await? {
            tuples.push(TupleKey::from_stored(&stored)?);
        }
        Ok(tuples)
    }

    /// Object names of `kind` on which `user` has `action`.
    fn object_names<'a>(
        &'a self,
        view: &'a TupleView<'a, S>,
        user: &'a str,
        kind: ObjectType,
        action: Action,
    ) -> BoxFuture<'a, EngineResult<HashSet<String>>> {
        Box::pin(async move {
            match kind {
                ObjectType::Tenant => {
                    let tuples = self.type_tuples(kind).await?;
                    let direct = schema::direct_relations(kind, action);
                    collect_matching(view, user, &tuples, direct).await
                }
                ObjectType::Group => {
                    let tuples = self.type_tuples(kind).await?;
                    let direct = schema::direct_relations(kind, action);
                    let mut names = collect_matching(view, user, &tuples, direct).await?;
                    if !direct.is_empty() {
                        // Groups owned by tenants the user administers.
                        let admin_tenants =
                            collect_matching(view, user, &self.type_tuples(ObjectType::Tenant).await?, &[Relation::Admin])
                                .await?;
                        for tuple in &tuples {
                            if tuple.relation != Some(Relation::Parent) {
                                continue;
                            }
                            let (Some(subject), Some(object)) = (&tuple.subject, &tuple.object)
                            else {
                                continue;
                            };
                            if subject.kind == ObjectType::Tenant
                                && admin_tenants.contains(&subject.name)
                            {
                                names.insert(object.name.clone());
                            }
                        }
                    }
                    Ok(names)
                }
                ObjectType::Feed => {
                    let Some(group_action) = schema::feed_action_on_group(action) else {
                        return Ok(HashSet::new());
                    };
                    let groups = self
                        .object_names(view, user, ObjectType::Group, group_action)
                        .await?;
                    let mut names = HashSet::new();
                    for tuple in self.type_tuples(kind).await? {
                        if tuple.relation != Some(Relation::Parent) {
                            continue;
                        }
                        let (Some(subject), Some(object)) = (&tuple.subject, &tuple.object) else {
                            continue;
                        };
                        if subject.kind == ObjectType::Group && groups.contains(&subject.name) {
                            names.insert(object.name.clone());
                        }
                    }
                    Ok(names)
                }
                ObjectType::FeedVersion => {
                    let tuples = self.type_tuples(kind).await?;
                    let direct = schema::direct_relations(kind, action);
                    let mut names = collect_matching(view, user, &tuples, direct).await?;
                    // Feed versions whose materialized parent feed is
                    // reachable. Parents synthesized from the domain DB are
                    // not visible here; list callers splice those in via the
                    // permission filter's feed id set.
                    if let Some(feed_action) = schema::feed_version_action_on_feed(action) {
                        let feeds = self
                            .object_names(view, user, ObjectType::Feed, feed_action)
                            .await?;
                        for tuple in &tuples {
                            if tuple.relation != Some(Relation::Parent) {
                                continue;
                            }
                            let (Some(subject), Some(object)) = (&tuple.subject, &tuple.object)
                            else {
                                continue;
                            };
                            if subject.kind == ObjectType::Feed && feeds.contains(&subject.name) {
                                names.insert(object.name.clone());
                            }
                        }
                    }
                    Ok(names)
                }
                ObjectType::User => Err(EngineError::InvalidObjectType {
                    value: kind.as_str().to_string(),
                }),
            }
        })
    }
}

/// Object names from `tuples` whose relation is in `relations` and whose
/// subject matches `user` directly, via wildcard, or via subject-set.
async fn collect_matching<S: TupleStore>(
    view: &TupleView<'_, S>,
    user: &str,
    tuples: &[TupleKey],
    relations: &[Relation],
) -> EngineResult<HashSet<String>> {
    let mut names = HashSet::new();
    for tuple in tuples {
        let Some(relation) = tuple.relation else {
            continue;
        };
        if !relations.contains(&relation) {
            continue;
        }
        let (Some(subject), Some(object)) = (&tuple.subject, &tuple.object) else {
            continue;
        };
        if names.contains(&object.name) {
            continue;
        }
        let matched = if subject.is_wildcard() {
            true
        } else if subject.kind == ObjectType::User && subject.name == user {
            true
        } else if let Some(ref_relation) = subject.ref_relation {
            check_relation(view, user, subject.base(), ref_relation).await?
        } else {
            false
        };
        if matched {
            names.insert(object.name.clone());
        }
    }
    Ok(names)
}

fn map_store_error(err: StorageError, tk: &TupleKey) -> EngineError {
    match err {
        StorageError::DuplicateTuple { .. } => EngineError::TupleExists {
            tuple: tk.to_string(),
        },
        StorageError::TupleNotFound { .. } => EngineError::TupleNotFound {
            tuple: tk.to_string(),
        },
        other => EngineError::Store(other),
    }
}
