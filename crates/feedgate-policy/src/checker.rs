//! The policy decision layer.
//!
//! Every operation follows the same skeleton: reject anonymous callers,
//! short-circuit global admins (who still see `not found` for missing
//! targets), otherwise ask the relation engine, and for mutations re-check
//! the sufficient action before touching tuples. A caller who cannot view an
//! object receives `unauthorized` even when the object does not exist, so
//! existence cannot be probed.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use feedgate_authn::{IdentityClient, User};
use feedgate_domain::{
    Action, EngineError, EntityKey, ObjectType, Relation, RelationEngine, TupleKey,
};
use feedgate_storage::TupleStore;

use crate::entities::{Cursor, EntityDb, Feed, FeedVersion, Group, Tenant};
use crate::error::{PolicyError, PolicyResult};
use crate::filter::PermFilter;

/// Global-admin overlay configuration.
///
/// The overlay is evaluated before engine dispatch and is independent of
/// tuple state; it never bypasses entity existence checks.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// User names granted every action on every object.
    pub global_admins: Vec<String>,
    /// Role name that also grants the overlay.
    pub admin_role: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            global_admins: Vec::new(),
            admin_role: "admin".to_string(),
        }
    }
}

/// One subject's grant on an object, hydrated with the user record when the
/// subject is a concrete user the identity endpoint knows.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectGrant {
    pub subject: String,
    pub relation: Relation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TenantActions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_edit_members: bool,
    pub can_create_org: bool,
    pub can_delete_org: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantPermissions {
    pub tenant: Tenant,
    pub admins: Vec<SubjectGrant>,
    pub members: Vec<SubjectGrant>,
    pub actions: TenantActions,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GroupActions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_edit_members: bool,
    pub can_create_feed: bool,
    pub can_delete_feed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupPermissions {
    pub group: Group,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Tenant>,
    pub managers: Vec<SubjectGrant>,
    pub editors: Vec<SubjectGrant>,
    pub viewers: Vec<SubjectGrant>,
    pub actions: GroupActions,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FeedActions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_set_group: bool,
    pub can_create_feed_version: bool,
    pub can_delete_feed_version: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPermissions {
    pub feed: Feed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    pub actions: FeedActions,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FeedVersionActions {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_edit_members: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedVersionPermissions {
    pub feed_version: FeedVersion,
    pub editors: Vec<SubjectGrant>,
    pub viewers: Vec<SubjectGrant>,
    pub actions: FeedVersionActions,
}

/// Domain-aware authorization checker composing identity, the relation
/// engine, and the domain database.
pub struct Checker<S: TupleStore, D: EntityDb> {
    engine: RelationEngine<S>,
    db: Arc<D>,
    identity: Arc<dyn IdentityClient>,
    config: CheckerConfig,
}

fn tenant_key(id: i64) -> EntityKey {
    EntityKey::new(ObjectType::Tenant, id.to_string())
}

fn group_key(id: i64) -> EntityKey {
    EntityKey::new(ObjectType::Group, id.to_string())
}

fn feed_key(id: i64) -> EntityKey {
    EntityKey::new(ObjectType::Feed, id.to_string())
}

fn feed_version_key(id: i64) -> EntityKey {
    EntityKey::new(ObjectType::FeedVersion, id.to_string())
}

/// The contextual parent tuple for a feed version, synthesized from the DB
/// row so the engine never needs a persisted copy of `feed_versions.feed_id`.
fn feed_version_ctx(fv: &FeedVersion) -> Vec<TupleKey> {
    vec![TupleKey::new()
        .with_subject(feed_key(fv.feed_id))
        .with_object(feed_version_key(fv.id))
        .with_relation(Relation::Parent)]
}

impl<S: TupleStore, D: EntityDb> Checker<S, D> {
    pub fn new(
        engine: RelationEngine<S>,
        db: Arc<D>,
        identity: Arc<dyn IdentityClient>,
        config: CheckerConfig,
    ) -> Self {
        Self {
            engine,
            db,
            identity,
            config,
        }
    }

    pub fn is_global_admin(&self, user: &User) -> bool {
        !user.is_anonymous()
            && (self.config.global_admins.iter().any(|n| n == &user.id)
                || user.has_role(&self.config.admin_role))
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn user(&self, caller: &User, id: &str) -> PolicyResult<User> {
        if caller.is_anonymous() {
            return Err(PolicyError::Unauthorized);
        }
        self.identity
            .user(id)
            .await?
            .ok_or(PolicyError::NotFound)
    }

    pub async fn users(&self, caller: &User, query: &str) -> PolicyResult<Vec<User>> {
        if caller.is_anonymous() {
            return Err(PolicyError::Unauthorized);
        }
        Ok(self.identity.users(query).await?)
    }

    // ------------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------------

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn tenant_list(&self, caller: &User) -> PolicyResult<Vec<Tenant>> {
        if caller.is_anonymous() {
            return Err(PolicyError::Unauthorized);
        }
        if self.is_global_admin(caller) {
            return Ok(self.db.all_tenants().await?);
        }
        let ids = self.viewable_ids(caller, ObjectType::Tenant).await?;
        Ok(self.db.tenants_by_ids(&ids).await?)
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn tenant_permissions(
        &self,
        caller: &User,
        id: i64,
    ) -> PolicyResult<TenantPermissions> {
        let tenant = self.db.tenant(id).await?;
        self.authorize(caller, Action::CanView, &tenant_key(id), &[], tenant.is_some())
            .await?;
        let tenant = tenant.ok_or(PolicyError::NotFound)?;

        let tuples = self.engine.get_object_tuples(&tenant_key(id)).await?;
        Ok(TenantPermissions {
            admins: self.subject_grants(&tuples, Relation::Admin).await,
            members: self.subject_grants(&tuples, Relation::Member).await,
            actions: TenantActions {
                can_view: true,
                can_edit: self.allowed(caller, Action::CanEdit, &tenant_key(id), &[]).await?,
                can_edit_members: self
                    .allowed(caller, Action::CanEditMembers, &tenant_key(id), &[])
                    .await?,
                can_create_org: self
                    .allowed(caller, Action::CanCreateOrg, &tenant_key(id), &[])
                    .await?,
                can_delete_org: self
                    .allowed(caller, Action::CanDeleteOrg, &tenant_key(id), &[])
                    .await?,
            },
            tenant,
        })
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn tenant_save(&self, caller: &User, id: i64, name: &str) -> PolicyResult<()> {
        let exists = self.db.tenant(id).await?.is_some();
        self.authorize(caller, Action::CanEdit, &tenant_key(id), &[], exists)
            .await?;
        self.db.save_tenant(id, name).await?;
        Ok(())
    }

    /// Adds a tenant relation with Replace semantics: a subject that already
    /// holds another relation on the tenant is atomically upgraded.
    #[instrument(skip(self, caller), fields(user = %caller.id, subject = %subject))]
    pub async fn tenant_add_permission(
        &self,
        caller: &User,
        id: i64,
        subject: EntityKey,
        relation: Relation,
    ) -> PolicyResult<()> {
        let exists = self.db.tenant(id).await?.is_some();
        self.authorize(caller, Action::CanEditMembers, &tenant_key(id), &[], exists)
            .await?;
        let tk = TupleKey::new()
            .with_subject(subject)
            .with_object(tenant_key(id))
            .with_relation(relation);
        self.engine.replace_tuple(&tk).await?;
        Ok(())
    }

    #[instrument(skip(self, caller), fields(user = %caller.id, subject = %subject))]
    pub async fn tenant_remove_permission(
        &self,
        caller: &User,
        id: i64,
        subject: EntityKey,
        relation: Relation,
    ) -> PolicyResult<()> {
        let exists = self.db.tenant(id).await?.is_some();
        self.authorize(caller, Action::CanEditMembers, &tenant_key(id), &[], exists)
            .await?;
        let tk = TupleKey::new()
            .with_subject(subject)
            .with_object(tenant_key(id))
            .with_relation(relation);
        // A relation that is inherited rather than directly granted is not
        // stored here; deleting it reports a schema violation, never silent
        // success.
        self.engine.delete_tuple(&tk).await?;
        Ok(())
    }

    /// Creates a group under the tenant. The DB insert precedes the tuple
    /// write so a concurrent reader never sees a tuple referencing a
    /// nonexistent group.
    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn tenant_create_group(
        &self,
        caller: &User,
        id: i64,
        name: &str,
    ) -> PolicyResult<Group> {
        let exists = self.db.tenant(id).await?.is_some();
        self.authorize(caller, Action::CanCreateOrg, &tenant_key(id), &[], exists)
            .await?;
        let group = self.db.create_group(name).await?;
        let tk = TupleKey::new()
            .with_subject(tenant_key(id))
            .with_object(group_key(group.id))
            .with_relation(Relation::Parent);
        match self.engine.write_tuple(&tk).await {
            Ok(()) => {}
            // A replayed mutation already installed the tuple.
            Err(EngineError::TupleExists { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn group_list(&self, caller: &User) -> PolicyResult<Vec<Group>> {
        if caller.is_anonymous() {
            return Err(PolicyError::Unauthorized);
        }
        if self.is_global_admin(caller) {
            return Ok(self.db.all_groups().await?);
        }
        let ids = self.viewable_ids(caller, ObjectType::Group).await?;
        Ok(self.db.groups_by_ids(&ids).await?)
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn group_permissions(&self, caller: &User, id: i64) -> PolicyResult<GroupPermissions> {
        let group = self.db.group(id).await?;
        self.authorize(caller, Action::CanView, &group_key(id), &[], group.is_some())
            .await?;
        let group = group.ok_or(PolicyError::NotFound)?;

        let tuples = self.engine.get_object_tuples(&group_key(id)).await?;
        let tenant = match parent_id(&tuples, ObjectType::Tenant) {
            Some(tenant_id) => self.db.tenant(tenant_id).await?,
            None => None,
        };
        Ok(GroupPermissions {
            managers: self.subject_grants(&tuples, Relation::Manager).await,
            editors: self.subject_grants(&tuples, Relation::Editor).await,
            viewers: self.subject_grants(&tuples, Relation::Viewer).await,
            actions: GroupActions {
                can_view: true,
                can_edit: self.allowed(caller, Action::CanEdit, &group_key(id), &[]).await?,
                can_edit_members: self
                    .allowed(caller, Action::CanEditMembers, &group_key(id), &[])
                    .await?,
                can_create_feed: self
                    .allowed(caller, Action::CanCreateFeed, &group_key(id), &[])
                    .await?,
                can_delete_feed: self
                    .allowed(caller, Action::CanDeleteFeed, &group_key(id), &[])
                    .await?,
            },
            tenant,
            group,
        })
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn group_save(&self, caller: &User, id: i64, name: &str) -> PolicyResult<()> {
        let exists = self.db.group(id).await?.is_some();
        self.authorize(caller, Action::CanEdit, &group_key(id), &[], exists)
            .await?;
        self.db.save_group(id, name).await?;
        Ok(())
    }

    #[instrument(skip(self, caller), fields(user = %caller.id, subject = %subject))]
    pub async fn group_add_permission(
        &self,
        caller: &User,
        id: i64,
        subject: EntityKey,
        relation: Relation,
    ) -> PolicyResult<()> {
        let exists = self.db.group(id).await?.is_some();
        self.authorize(caller, Action::CanEditMembers, &group_key(id), &[], exists)
            .await?;
        let tk = TupleKey::new()
            .with_subject(subject)
            .with_object(group_key(id))
            .with_relation(relation);
        self.engine.replace_tuple(&tk).await?;
        Ok(())
    }

    #[instrument(skip(self, caller), fields(user = %caller.id, subject = %subject))]
    pub async fn group_remove_permission(
        &self,
        caller: &User,
        id: i64,
        subject: EntityKey,
        relation: Relation,
    ) -> PolicyResult<()> {
        let exists = self.db.group(id).await?.is_some();
        self.authorize(caller, Action::CanEditMembers, &group_key(id), &[], exists)
            .await?;
        let tk = TupleKey::new()
            .with_subject(subject)
            .with_object(group_key(id))
            .with_relation(relation);
        self.engine.delete_tuple(&tk).await?;
        Ok(())
    }

    /// Reassigns the group to a tenant, replacing the previous parent tuple.
    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn group_set_tenant(
        &self,
        caller: &User,
        id: i64,
        tenant_id: i64,
    ) -> PolicyResult<()> {
        let group_exists = self.db.group(id).await?.is_some();
        self.authorize(caller, Action::CanEditMembers, &group_key(id), &[], group_exists)
            .await?;
        // Ownership lands under the destination tenant, so the caller also
        // needs org-creation authority there.
        let tenant_exists = self.db.tenant(tenant_id).await?.is_some();
        self.authorize(
            caller,
            Action::CanCreateOrg,
            &tenant_key(tenant_id),
            &[],
            tenant_exists,
        )
        .await?;
        let tk = TupleKey::new()
            .with_subject(tenant_key(tenant_id))
            .with_object(group_key(id))
            .with_relation(Relation::Parent);
        self.engine.set_exclusive_relation(&tk).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Feeds
    // ------------------------------------------------------------------

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn feed_list(&self, caller: &User, cursor: Cursor) -> PolicyResult<Vec<Feed>> {
        let filter = self.perm_filter(caller).await?;
        Ok(self.db.list_feeds(&filter, cursor).await?)
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn feed_permissions(&self, caller: &User, id: i64) -> PolicyResult<FeedPermissions> {
        let feed = self.db.feed(id).await?;
        self.authorize(caller, Action::CanView, &feed_key(id), &[], feed.is_some())
            .await?;
        let feed = feed.ok_or(PolicyError::NotFound)?;

        let tuples = self.engine.get_object_tuples(&feed_key(id)).await?;
        let group = match parent_id(&tuples, ObjectType::Group) {
            Some(group_id) => self.db.group(group_id).await?,
            None => None,
        };
        Ok(FeedPermissions {
            actions: FeedActions {
                can_view: true,
                can_edit: self.allowed(caller, Action::CanEdit, &feed_key(id), &[]).await?,
                can_set_group: self
                    .allowed(caller, Action::CanSetGroup, &feed_key(id), &[])
                    .await?,
                can_create_feed_version: self
                    .allowed(caller, Action::CanCreateFeedVersion, &feed_key(id), &[])
                    .await?,
                can_delete_feed_version: self
                    .allowed(caller, Action::CanDeleteFeedVersion, &feed_key(id), &[])
                    .await?,
            },
            group,
            feed,
        })
    }

    /// Assigns the feed to a group. The parent relation is exclusive: any
    /// previous group assignment is removed in the same batch.
    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn feed_set_group(
        &self,
        caller: &User,
        id: i64,
        group_id: i64,
    ) -> PolicyResult<()> {
        let feed_exists = self.db.feed(id).await?.is_some();
        self.authorize(caller, Action::CanSetGroup, &feed_key(id), &[], feed_exists)
            .await?;
        if self.db.group(group_id).await?.is_none() {
            return Err(PolicyError::NotFound);
        }
        let tk = TupleKey::new()
            .with_subject(group_key(group_id))
            .with_object(feed_key(id))
            .with_relation(Relation::Parent);
        self.engine.set_exclusive_relation(&tk).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Feed versions
    // ------------------------------------------------------------------

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn feed_version_list(
        &self,
        caller: &User,
        cursor: Cursor,
    ) -> PolicyResult<Vec<FeedVersion>> {
        let filter = self.perm_filter(caller).await?;
        Ok(self.db.list_feed_versions(&filter, cursor).await?)
    }

    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn feed_version_permissions(
        &self,
        caller: &User,
        id: i64,
    ) -> PolicyResult<FeedVersionPermissions> {
        let fv = self.db.feed_version(id).await?;
        let ctx = fv.as_ref().map(feed_version_ctx).unwrap_or_default();
        self.authorize(caller, Action::CanView, &feed_version_key(id), &ctx, fv.is_some())
            .await?;
        let fv = fv.ok_or(PolicyError::NotFound)?;

        let tuples = self.engine.get_object_tuples(&feed_version_key(id)).await?;
        Ok(FeedVersionPermissions {
            editors: self.subject_grants(&tuples, Relation::Editor).await,
            viewers: self.subject_grants(&tuples, Relation::Viewer).await,
            actions: FeedVersionActions {
                can_view: true,
                can_edit: self
                    .allowed(caller, Action::CanEdit, &feed_version_key(id), &ctx)
                    .await?,
                can_edit_members: self
                    .allowed(caller, Action::CanEditMembers, &feed_version_key(id), &ctx)
                    .await?,
            },
            feed_version: fv,
        })
    }

    #[instrument(skip(self, caller), fields(user = %caller.id, subject = %subject))]
    pub async fn feed_version_add_permission(
        &self,
        caller: &User,
        id: i64,
        subject: EntityKey,
        relation: Relation,
    ) -> PolicyResult<()> {
        let fv = self.db.feed_version(id).await?;
        let ctx = fv.as_ref().map(feed_version_ctx).unwrap_or_default();
        self.authorize(
            caller,
            Action::CanEditMembers,
            &feed_version_key(id),
            &ctx,
            fv.is_some(),
        )
        .await?;
        let tk = TupleKey::new()
            .with_subject(subject)
            .with_object(feed_version_key(id))
            .with_relation(relation);
        self.engine.replace_tuple(&tk).await?;
        Ok(())
    }

    #[instrument(skip(self, caller), fields(user = %caller.id, subject = %subject))]
    pub async fn feed_version_remove_permission(
        &self,
        caller: &User,
        id: i64,
        subject: EntityKey,
        relation: Relation,
    ) -> PolicyResult<()> {
        let fv = self.db.feed_version(id).await?;
        let ctx = fv.as_ref().map(feed_version_ctx).unwrap_or_default();
        self.authorize(
            caller,
            Action::CanEditMembers,
            &feed_version_key(id),
            &ctx,
            fv.is_some(),
        )
        .await?;
        let tk = TupleKey::new()
            .with_subject(subject)
            .with_object(feed_version_key(id))
            .with_relation(relation);
        self.engine.delete_tuple(&tk).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Permission filter
    // ------------------------------------------------------------------

    /// Builds the per-request allowed-ids bundle for list queries: one
    /// ListObjects call per object type instead of a Check per row.
    #[instrument(skip(self, caller), fields(user = %caller.id))]
    pub async fn perm_filter(&self, caller: &User) -> PolicyResult<PermFilter> {
        if caller.is_anonymous() {
            return Ok(PermFilter::anonymous());
        }
        if self.is_global_admin(caller) {
            return Ok(PermFilter::GlobalAdmin);
        }
        Ok(PermFilter::Ids {
            feed_ids: self.viewable_ids(caller, ObjectType::Feed).await?,
            feed_version_ids: self.viewable_ids(caller, ObjectType::FeedVersion).await?,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// The uniform admission check. `exists` is whether the target row is in
    /// the domain DB; callers who pass the permission check on a missing row
    /// (global admins, or holders of stale tuples) get `NotFound`, everyone
    /// else gets `Unauthorized`.
    async fn authorize(
        &self,
        caller: &User,
        action: Action,
        object: &EntityKey,
        ctx: &[TupleKey],
        exists: bool,
    ) -> PolicyResult<()> {
        if caller.is_anonymous() {
            return Err(PolicyError::Unauthorized);
        }
        if self.is_global_admin(caller) {
            return if exists {
                Ok(())
            } else {
                Err(PolicyError::NotFound)
            };
        }
        let tk = TupleKey::new()
            .with_subject(EntityKey::user(&caller.id))
            .with_object(object.clone())
            .with_action(action);
        if !self.engine.check(&tk, ctx).await? {
            return Err(PolicyError::Unauthorized);
        }
        if !exists {
            return Err(PolicyError::NotFound);
        }
        Ok(())
    }

    /// Overlay-aware action evaluation for permission views.
    async fn allowed(
        &self,
        caller: &User,
        action: Action,
        object: &EntityKey,
        ctx: &[TupleKey],
    ) -> PolicyResult<bool> {
        if caller.is_anonymous() {
            return Ok(false);
        }
        if self.is_global_admin(caller) {
            return Ok(true);
        }
        let tk = TupleKey::new()
            .with_subject(EntityKey::user(&caller.id))
            .with_object(object.clone())
            .with_action(action);
        Ok(self.engine.check(&tk, ctx).await?)
    }

    /// Object ids of `kind` the caller may view, from the engine's reverse
    /// index. Names that are not integer ids are skipped.
    async fn viewable_ids(&self, caller: &User, kind: ObjectType) -> PolicyResult<Vec<i64>> {
        let pattern = TupleKey::new()
            .with_subject(EntityKey::user(&caller.id))
            .with_object(EntityKey::new(kind, ""))
            .with_action(Action::CanView);
        let listed = self.engine.list_objects(&pattern).await?;
        Ok(listed
            .iter()
            .filter_map(|t| t.object.as_ref())
            .filter_map(|o| o.name.parse().ok())
            .collect())
    }

    /// Grants of one relation from an object's tuples, hydrated best-effort:
    /// an identity outage degrades the view to bare ids instead of failing
    /// the read.
    async fn subject_grants(&self, tuples: &[TupleKey], relation: Relation) -> Vec<SubjectGrant> {
        let mut grants = Vec::new();
        for tuple in tuples {
            if tuple.relation != Some(relation) {
                continue;
            }
            let Some(subject) = &tuple.subject else {
                continue;
            };
            let user = if subject.kind == ObjectType::User
                && !subject.is_wildcard()
                && !subject.is_subject_set()
            {
                self.identity.user(&subject.name).await.ok().flatten()
            } else {
                None
            };
            grants.push(SubjectGrant {
                subject: subject.to_string(),
                relation,
                user,
            });
        }
        grants.sort_by(|a, b| a.subject.cmp(&b.subject));
        grants
    }
}

/// The parent id of the expected kind from an object's tuples.
fn parent_id(tuples: &[TupleKey], kind: ObjectType) -> Option<i64> {
    tuples
        .iter()
        .filter(|t| t.relation == Some(Relation::Parent))
        .filter_map(|t| t.subject.as_ref())
        .filter(|s| s.kind == kind)
        .find_map(|s| s.name.parse().ok())
}
