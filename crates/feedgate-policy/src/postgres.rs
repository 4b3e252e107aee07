//! Postgres domain database.
//!
//! Feed list queries splice the permission predicate into the WHERE clause
//! with `QueryBuilder`, so the database returns only authorized rows and
//! cursors stay stable regardless of the caller's filter.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{QueryBuilder, Row};
use tracing::instrument;

use crate::entities::{Cursor, EntityDb, Feed, FeedVersion, Group, Tenant};
use crate::error::{DbError, DbResult};
use crate::filter::PermFilter;

/// Postgres implementation of `EntityDb`.
pub struct PostgresEntityDb {
    pool: PgPool,
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id          BIGSERIAL PRIMARY KEY,
    tenant_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS feed_groups (
    id         BIGSERIAL PRIMARY KEY,
    group_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS current_feeds (
    id         BIGSERIAL PRIMARY KEY,
    onestop_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS feed_states (
    feed_id BIGINT PRIMARY KEY REFERENCES current_feeds (id),
    public  BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS feed_versions (
    id      BIGSERIAL PRIMARY KEY,
    feed_id BIGINT NOT NULL REFERENCES current_feeds (id),
    sha1    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS feed_versions_feed_id_idx ON feed_versions (feed_id);
"#;

impl PostgresEntityDb {
    pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the domain tables if they do not exist (development setups;
    /// production owns these tables elsewhere).
    pub async fn ensure_schema(&self) -> DbResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Appends the permission predicate:
    /// `(public OR global_admin OR feed_id = ANY(..) OR feed_version_id = ANY(..))`.
    ///
    /// `fv_column` is None for queries that have no feed-version column in
    /// scope.
    fn push_perm_predicate<'a>(
        builder: &mut QueryBuilder<'a, sqlx::Postgres>,
        filter: &'a PermFilter,
        public_expr: &str,
        feed_column: &str,
        fv_column: Option<&str>,
    ) {
        builder.push(" AND (");
        builder.push(public_expr);
        match filter {
            PermFilter::GlobalAdmin => {
                builder.push(" OR TRUE");
            }
            PermFilter::Ids {
                feed_ids,
                feed_version_ids,
            } => {
                builder
                    .push(" OR ")
                    .push(feed_column)
                    .push(" = ANY(")
                    .push_bind(feed_ids.as_slice())
                    .push(")");
                if let Some(fv_column) = fv_column {
                    builder
                        .push(" OR ")
                        .push(fv_column)
                        .push(" = ANY(")
                        .push_bind(feed_version_ids.as_slice())
                        .push(")");
                }
            }
        }
        builder.push(")");
    }
}

#[async_trait]
impl EntityDb for PostgresEntityDb {
    async fn tenant(&self, id: i64) -> DbResult<Option<Tenant>> {
        let row = sqlx::query("SELECT id, tenant_name FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Tenant {
            id: r.get("id"),
            name: r.get("tenant_name"),
        }))
    }

    async fn tenants_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Tenant>> {
        let rows = sqlx::query("SELECT id, tenant_name FROM tenants WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Tenant {
                id: r.get("id"),
                name: r.get("tenant_name"),
            })
            .collect())
    }

    async fn all_tenants(&self) -> DbResult<Vec<Tenant>> {
        let rows = sqlx::query("SELECT id, tenant_name FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Tenant {
                id: r.get("id"),
                name: r.get("tenant_name"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn save_tenant(&self, id: i64, name: &str) -> DbResult<()> {
        sqlx::query("UPDATE tenants SET tenant_name = $2 WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_group(&self, name: &str) -> DbResult<Group> {
        let row = sqlx::query("INSERT INTO feed_groups (group_name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(Group {
            id: row.get("id"),
            name: name.to_string(),
        })
    }

    async fn group(&self, id: i64) -> DbResult<Option<Group>> {
        let row = sqlx::query("SELECT id, group_name FROM feed_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Group {
            id: r.get("id"),
            name: r.get("group_name"),
        }))
    }

    async fn groups_by_ids(&self, ids: &[i64]) -> DbResult<Vec<Group>> {
        let rows =
            sqlx::query("SELECT id, group_name FROM feed_groups WHERE id = ANY($1) ORDER BY id")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|r| Group {
                id: r.get("id"),
                name: r.get("group_name"),
            })
            .collect())
    }

    async fn all_groups(&self) -> DbResult<Vec<Group>> {
        let rows = sqlx::query("SELECT id, group_name FROM feed_groups ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Group {
                id: r.get("id"),
                name: r.get("group_name"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn save_group(&self, id: i64, name: &str) -> DbResult<()> {
        sqlx::query("UPDATE feed_groups SET group_name = $2 WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn feed(&self, id: i64) -> DbResult<Option<Feed>> {
        let row = sqlx::query(
            "SELECT f.id, f.onestop_id, COALESCE(fs.public, FALSE) AS public \
             FROM current_feeds f \
             LEFT JOIN feed_states fs ON fs.feed_id = f.id \
             WHERE f.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Feed {
            id: r.get("id"),
            onestop_id: r.get("onestop_id"),
            public: r.get("public"),
        }))
    }

    #[instrument(skip(self, filter))]
    async fn list_feeds(&self, filter: &PermFilter, cursor: Cursor) -> DbResult<Vec<Feed>> {
        let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "SELECT f.id, f.onestop_id, COALESCE(fs.public, FALSE) AS public \
             FROM current_feeds f \
             LEFT JOIN feed_states fs ON fs.feed_id = f.id \
             WHERE TRUE",
        );
        Self::push_perm_predicate(
            &mut builder,
            filter,
            "COALESCE(fs.public, FALSE)",
            "f.id",
            None,
        );
        if let Some(after) = cursor.after_id {
            builder.push(" AND f.id > ").push_bind(after);
        }
        builder
            .push(" ORDER BY f.id LIMIT ")
            .push_bind(cursor.effective_limit());
        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| Feed {
                id: r.get("id"),
                onestop_id: r.get("onestop_id"),
                public: r.get("public"),
            })
            .collect())
    }

    async fn feed_version(&self, id: i64) -> DbResult<Option<FeedVersion>> {
        let row = sqlx::query("SELECT id, feed_id, sha1 FROM feed_versions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| FeedVersion {
            id: r.get("id"),
            feed_id: r.get("feed_id"),
            sha1: r.get("sha1"),
        }))
    }

    #[instrument(skip(self, filter))]
    async fn list_feed_versions(
        &self,
        filter: &PermFilter,
        cursor: Cursor,
    ) -> DbResult<Vec<FeedVersion>> {
        let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "SELECT fv.id, fv.feed_id, fv.sha1 \
             FROM feed_versions fv \
             LEFT JOIN feed_states fs ON fs.feed_id = fv.feed_id \
             WHERE TRUE",
        );
        Self::push_perm_predicate(
            &mut builder,
            filter,
            "COALESCE(fs.public, FALSE)",
            "fv.feed_id",
            Some("fv.id"),
        );
        if let Some(after) = cursor.after_id {
            builder.push(" AND fv.id > ").push_bind(after);
        }
        builder
            .push(" ORDER BY fv.id LIMIT ")
            .push_bind(cursor.effective_limit());
        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| FeedVersion {
                id: r.get("id"),
                feed_id: r.get("feed_id"),
                sha1: r.get("sha1"),
            })
            .collect())
    }
}
