//! Postgres tuple store.
//!
//! One table holds every tuple; the unique index doubles as the
//! duplicate-write detector. `subject_relation` is stored as an empty string
//! rather than NULL so the index covers it.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{QueryBuilder, Row};
use tracing::instrument;

use crate::error::{StorageError, StorageResult};
use crate::traits::{StoredTuple, TupleFilter, TupleStore};

/// Connection settings for the Postgres tuple store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 5,
        }
    }
}

/// Postgres implementation of `TupleStore`.
pub struct PostgresTupleStore {
    pool: PgPool,
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS feedgate_tuples (
    object_type      TEXT NOT NULL,
    object_name      TEXT NOT NULL,
    relation         TEXT NOT NULL,
    subject_type     TEXT NOT NULL,
    subject_name     TEXT NOT NULL,
    subject_relation TEXT NOT NULL DEFAULT '',
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (object_type, object_name, relation, subject_type, subject_name, subject_relation)
);
CREATE INDEX IF NOT EXISTS feedgate_tuples_subject_idx
    ON feedgate_tuples (subject_type, subject_name, relation);
"#;

impl PostgresTupleStore {
    /// Connects a pool from config.
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tuple table and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_tuple(row: &sqlx::postgres::PgRow) -> StoredTuple {
        let subject_relation: String = row.get("subject_relation");
        StoredTuple {
            object_type: row.get("object_type"),
            object_name: row.get("object_name"),
            relation: row.get("relation"),
            subject_type: row.get("subject_type"),
            subject_name: row.get("subject_name"),
            subject_relation: if subject_relation.is_empty() {
                None
            } else {
                Some(subject_relation)
            },
        }
    }

    fn push_insert(builder: &mut QueryBuilder<'_, sqlx::Postgres>, tuple: &StoredTuple) {
        builder.push_values([tuple], |mut b, t| {
            b.push_bind(t.object_type.clone())
                .push_bind(t.object_name.clone())
                .push_bind(t.relation.clone())
                .push_bind(t.subject_type.clone())
                .push_bind(t.subject_name.clone())
                .push_bind(t.subject_relation.clone().unwrap_or_default());
        });
    }
}

#[async_trait]
impl TupleStore for PostgresTupleStore {
    #[instrument(skip(self, filter))]
    async fn read_tuples(&self, filter: &TupleFilter) -> StorageResult<Vec<StoredTuple>> {
        let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "SELECT object_type, object_name, relation, subject_type, subject_name, subject_relation \
             FROM feedgate_tuples WHERE TRUE",
        );
        if let Some(v) = &filter.object_type {
            builder.push(" AND object_type = ").push_bind(v.clone());
        }
        if let Some(v) = &filter.object_name {
            builder.push(" AND object_name = ").push_bind(v.clone());
        }
        if let Some(v) = &filter.relation {
            builder.push(" AND relation = ").push_bind(v.clone());
        }
        if let Some(v) = &filter.subject_type {
            builder.push(" AND subject_type = ").push_bind(v.clone());
        }
        if let Some(v) = &filter.subject_name {
            builder.push(" AND subject_name = ").push_bind(v.clone());
        }
        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_tuple).collect())
    }

    #[instrument(skip(self), fields(tuple = %tuple.render()))]
    async fn write_tuple(&self, tuple: StoredTuple) -> StorageResult<()> {
        let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO feedgate_tuples \
             (object_type, object_name, relation, subject_type, subject_name, subject_relation) ",
        );
        Self::push_insert(&mut builder, &tuple);
        builder.push(" ON CONFLICT DO NOTHING");
        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::DuplicateTuple {
                tuple: tuple.render(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tuple = %tuple.render()))]
    async fn delete_tuple(&self, tuple: &StoredTuple) -> StorageResult<()> {
        let result = sqlx::query(
            "DELETE FROM feedgate_tuples \
             WHERE object_type = $1 AND object_name = $2 AND relation = $3 \
               AND subject_type = $4 AND subject_name = $5 AND subject_relation = $6",
        )
        .bind(&tuple.object_type)
        .bind(&tuple.object_name)
        .bind(&tuple.relation)
        .bind(&tuple.subject_type)
        .bind(&tuple.subject_name)
        .bind(tuple.subject_relation.clone().unwrap_or_default())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::TupleNotFound {
                tuple: tuple.render(),
            });
        }
        Ok(())
    }

    async fn apply(
        &self,
        deletes: Vec<StoredTuple>,
        writes: Vec<StoredTuple>,
    ) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError {
                message: e.to_string(),
            })?;
        for tuple in &deletes {
            sqlx::query(
                "DELETE FROM feedgate_tuples \
                 WHERE object_type = $1 AND object_name = $2 AND relation = $3 \
                   AND subject_type = $4 AND subject_name = $5 AND subject_relation = $6",
            )
            .bind(&tuple.object_type)
            .bind(&tuple.object_name)
            .bind(&tuple.relation)
            .bind(&tuple.subject_type)
            .bind(&tuple.subject_name)
            .bind(tuple.subject_relation.clone().unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        }
        for tuple in &writes {
            let mut builder: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO feedgate_tuples \
                 (object_type, object_name, relation, subject_type, subject_name, subject_relation) ",
            );
            Self::push_insert(&mut builder, tuple);
            builder.push(" ON CONFLICT DO NOTHING");
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError {
                message: e.to_string(),
            })?;
        Ok(())
    }
}
