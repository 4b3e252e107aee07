//! Domain entity rows and the database seam.
//!
//! The engine references entities only by integer id embedded in an entity
//! key's name; rows themselves are owned by the external relational DB
//! behind the `EntityDb` trait.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::DbResult;
use crate::filter::PermFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub onestop_id: String,
    /// Mirrors the feed-state public flag used by the list predicate.
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedVersion {
    pub id: i64,
    pub feed_id: i64,
    pub sha1: String,
}

/// Cursor arguments for list queries. The cursor is independent of the
/// permission filter so pagination stays stable across callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursor {
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}

impl Cursor {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(100).clamp(1, 1000)
    }
}

/// The domain database seam.
///
/// List queries for feeds and feed versions take the permission filter and
/// apply it as a predicate, never as a post-filter.
#[async_trait]
pub trait EntityDb: Send + Sync + 'static {
    async fn tenant(&self, id: i64) -> DbResult<Option<Tenant>>;
    async fn tenants_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Tenant>>;
    async fn all_tenants(&self) -> DbResult<Vec<Tenant>>;
    async fn save_tenant(&self, id: i64, name: &str) -> DbResult<()>;

    async fn create_group(&self, name: &str) -> DbResult<Group>;
    async fn group(&self, id: i64) -> DbResult<Option<Group>>;
    async fn groups_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Group>>;
    async fn all_groups(&self) -> DbResult<Vec<Group>>;
    async fn save_group(&self, id: i64, name: &str) -> DbResult<()>;

    async fn feed(&self, id: i64) -> DbResult<Option<Feed>>;
    async fn list_feeds(&self, filter: &PermFilter, cursor: Cursor) -> DbResult<Vec<Feed>>;

    async fn feed_version(&self, id: i64) -> DbResult<Option<FeedVersion>>;
    async fn list_feed_versions(
        &self,
        filter: &PermFilter,
        cursor: Cursor,
    ) -> DbResult<Vec<FeedVersion>>;
}

/// In-memory `EntityDb` for tests and single-process development.
///
/// Applies the same predicate the Postgres backend splices into SQL.
#[derive(Debug, Default)]
pub struct MemoryEntityDb {
    tenants: DashMap<i64, Tenant>,
    groups: DashMap<i64, Group>,
    feeds: DashMap<i64, Feed>,
    feed_versions: DashMap<i64, FeedVersion>,
    next_group_id: AtomicI64,
}

impl MemoryEntityDb {
    pub fn new() -> Self {
        Self {
            next_group_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn insert_group(&self, group: Group) {
        // Keep the allocator ahead of manually seeded ids.
        self.next_group_id
            .fetch_max(group.id + 1, Ordering::SeqCst);
        self.groups.insert(group.id, group);
    }

    pub fn insert_feed(&self, feed: Feed) {
        self.feeds.insert(feed.id, feed);
    }

    pub fn insert_feed_version(&self, fv: FeedVersion) {
        self.feed_versions.insert(fv.id, fv);
    }

    fn sorted_page<T: Clone>(items: Vec<(i64, T)>, cursor: Cursor) -> Vec<T> {
        let mut items = items;
        items.sort_by_key(|(id, _)| *id);
        items
            .into_iter()
            .filter(|(id, _)| cursor.after_id.map_or(true, |after| *id > after))
            .take(cursor.effective_limit() as usize)
            .map(|(_, item)| item)
            .collect()
    }
}

#[async_trait]
impl EntityDb for MemoryEntityDb {
    async fn tenant(&self, id: i64) -> DbResult<Option<Tenant>> {
        Ok(self.tenants.get(&id).map(|t| t.value().clone()))
    }

    async fn tenants_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Tenant>> {
        let mut tenants: Vec<Tenant> = ids
            .iter()
            .filter_map(|id| self.tenants.get(id).map(|t| t.value().clone()))
            .collect();
        tenants.sort_by_key(|t| t.id);
        Ok(tenants)
    }

    async fn all_tenants(&self) -> DbResult<Vec<Tenant>> {
        let mut tenants: Vec<Tenant> = self.tenants.iter().map(|t| t.value().clone()).collect();
        tenants.sort_by_key(|t| t.id);
        Ok(tenants)
    }

    async fn save_tenant(&self, id: i64, name: &str) -> DbResult<()> {
        if let Some(mut tenant) = self.tenants.get_mut(&id) {
            tenant.name = name.to_string();
        }
        Ok(())
    }

    async fn create_group(&self, name: &str) -> DbResult<Group> {
        let id = self.next_group_id.fetch_add(1, Ordering::SeqCst);
        let group = Group {
            id,
            name: name.to_string(),
        };
        self.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn group(&self, id: i64) -> DbResult<Option<Group>> {
        Ok(self.groups.get(&id).map(|g| g.value().clone()))
    }

    async fn groups_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Group>> {
        let mut groups: Vec<Group> = ids
            .iter()
            .filter_map(|id| self.groups.get(id).map(|g| g.value().clone()))
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn all_groups(&self) -> DbResult<Vec<Group>> {
        let mut groups: Vec<Group> = self.groups.iter().map(|g| g.value().clone()).collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn save_group(&self, id: i64, name: &str) -> DbResult<()> {
        if let Some(mut group) = self.groups.get_mut(&id) {
            group.name = name.to_string();
        }
        Ok(())
    }

    async fn feed(&self, id: i64) -> DbResult<Option<Feed>> {
        Ok(self.feeds.get(&id).map(|f| f.value().clone()))
    }

    async fn list_feeds(&self, filter: &PermFilter, cursor: Cursor) -> DbResult<Vec<Feed>> {
        let items: Vec<(i64, Feed)> = self
            .feeds
            .iter()
            .filter(|f| filter.allows(Some(f.id), None, f.public))
            .map(|f| (f.id, f.value().clone()))
            .collect();
        Ok(Self::sorted_page(items, cursor))
    }

    async fn feed_version(&self, id: i64) -> DbResult<Option<FeedVersion>> {
        Ok(self.feed_versions.get(&id).map(|fv| fv.value().clone()))
    }

    async fn list_feed_versions(
        &self,
        filter: &PermFilter,
        cursor: Cursor,
    ) -> DbResult<Vec<FeedVersion>> {
        let items: Vec<(i64, FeedVersion)> = self
            .feed_versions
            .iter()
            .filter(|fv| {
                let public = self
                    .feeds
                    .get(&fv.feed_id)
                    .map(|f| f.public)
                    .unwrap_or(false);
                filter.allows(Some(fv.feed_id), Some(fv.id), public)
            })
            .map(|fv| (fv.id, fv.value().clone()))
            .collect();
        Ok(Self::sorted_page(items, cursor))
    }
}
