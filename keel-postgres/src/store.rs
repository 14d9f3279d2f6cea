//! PostgreSQL work-queue store
//!
//! Claims use `SELECT ... FOR UPDATE SKIP LOCKED` inside a transaction that
//! also performs the status update, so concurrent claimants never wait behind
//! each other and never see the same row.

use crate::config::PostgresConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{
    ItemId, ItemPayload, ItemStatus, QueueItem, QueueStore, StoreError, StoreResult, Transition,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info, trace};

/// Map a driver error onto the store taxonomy.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::unavailable(err.to_string()),
        sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::corrupt(err.to_string()),
        sqlx::Error::Configuration(_) => StoreError::config(err.to_string()),
        other => StoreError::command(other.to_string()),
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    id: i64,
    queue: String,
    name: String,
    payload: Json<serde_json::Value>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for QueueItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(QueueItem {
            id: row.id,
            queue: row.queue,
            name: row.name,
            payload: row.payload.0,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// SQL text, rendered once for the configured table.
#[derive(Debug, Clone)]
struct Queries {
    create_table: String,
    create_index: String,
    insert: String,
    select_pending: String,
    mark_in_progress: String,
    lock_status: String,
    update_status: String,
    fetch: String,
    count: String,
}

const COLUMNS: &str = "id, queue, name, payload, status, created_at, updated_at";

impl Queries {
    fn new(table: &str) -> Self {
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    queue TEXT NOT NULL,
                    name TEXT NOT NULL,
                    payload JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    status TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'in_progress', 'done', 'failed')),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )
                "#
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {table}_pending_idx \
                 ON {table} (queue, created_at, id) WHERE status = 'pending'"
            ),
            insert: format!(
                "INSERT INTO {table} (queue, name, payload) VALUES ($1, $2, $3) \
                 RETURNING {COLUMNS}"
            ),
            select_pending: format!(
                "SELECT id FROM {table} \
                 WHERE queue = $1 AND status = 'pending' \
                 ORDER BY created_at, id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED"
            ),
            mark_in_progress: format!(
                "UPDATE {table} SET status = 'in_progress', updated_at = now() \
                 WHERE id = $1 RETURNING {COLUMNS}"
            ),
            lock_status: format!(
                "SELECT status FROM {table} WHERE queue = $1 AND id = $2 FOR UPDATE"
            ),
            update_status: format!(
                "UPDATE {table} SET status = $2, updated_at = now() WHERE id = $1"
            ),
            fetch: format!("SELECT {COLUMNS} FROM {table} WHERE queue = $1 AND id = $2"),
            count: format!("SELECT count(*) FROM {table} WHERE queue = $1 AND status = $2"),
        }
    }
}

/// PostgreSQL-backed [`QueueStore`].
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
    queries: Queries,
}

impl PgQueueStore {
    /// Connect a new pool.
    pub async fn connect(config: PostgresConfig) -> StoreResult<Self> {
        config.validate()?;
        debug!(
            table = %config.table,
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(store_error)?;

        info!(table = %config.table, "PostgreSQL work queue ready");
        Self::from_pool(pool, &config.table)
    }

    /// Use an existing pool.
    pub fn from_pool(pool: PgPool, table: &str) -> StoreResult<Self> {
        PostgresConfig::default().with_table(table).validate()?;
        Ok(Self {
            pool,
            queries: Queries::new(table),
        })
    }

    /// Create the work table and its claim index if they do not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(&self.queries.create_table)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        sqlx::query(&self.queries.create_index)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn push(&self, queue: &str, name: &str, payload: &ItemPayload) -> StoreResult<QueueItem> {
        let row: ItemRow = sqlx::query_as(&self.queries.insert)
            .bind(queue)
            .bind(name)
            .bind(Json(payload.clone()))
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        trace!(queue = %queue, id = row.id, "Inserted queue row");
        row.try_into()
    }

    async fn claim_oldest_pending(&self, queue: &str) -> StoreResult<Option<QueueItem>> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let next: Option<(i64,)> = sqlx::query_as(&self.queries.select_pending)
            .bind(queue)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

        let Some((id,)) = next else {
            tx.rollback().await.map_err(store_error)?;
            return Ok(None);
        };

        let row: ItemRow = sqlx::query_as(&self.queries.mark_in_progress)
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;

        trace!(queue = %queue, id = id, "Claimed queue row");
        row.try_into().map(Some)
    }

    async fn transition(
        &self,
        queue: &str,
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    ) -> StoreResult<Transition> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let current: Option<(String,)> = sqlx::query_as(&self.queries.lock_status)
            .bind(queue)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

        let outcome = match current {
            None => Transition::Missing,
            Some((status,)) => {
                let status: ItemStatus = status.parse()?;
                if status == from {
                    sqlx::query(&self.queries.update_status)
                        .bind(id)
                        .bind(to.as_str())
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error)?;
                    Transition::Applied
                } else {
                    Transition::Rejected(status)
                }
            }
        };

        tx.commit().await.map_err(store_error)?;
        Ok(outcome)
    }

    async fn fetch(&self, queue: &str, id: ItemId) -> StoreResult<Option<QueueItem>> {
        let row: Option<ItemRow> = sqlx::query_as(&self.queries.fetch)
            .bind(queue)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(QueueItem::try_from).transpose()
    }

    async fn count(&self, queue: &str, status: ItemStatus) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as(&self.queries.count)
            .bind(queue)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(count.max(0) as u64)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

impl std::fmt::Debug for PgQueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgQueueStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_query_skips_locked_rows_in_order() {
        let queries = Queries::new("jobs");
        assert!(queries.select_pending.contains("FOR UPDATE SKIP LOCKED"));
        assert!(queries.select_pending.contains("ORDER BY created_at, id"));
        assert!(queries.select_pending.contains("LIMIT 1"));
    }

    #[test]
    fn test_queries_use_configured_table() {
        let queries = Queries::new("billing_jobs");
        assert!(queries.insert.starts_with("INSERT INTO billing_jobs"));
        assert!(queries.create_index.contains("billing_jobs_pending_idx"));
        assert!(queries.create_table.contains("'{}'::jsonb"));
    }

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(store_error(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(store_error(sqlx::Error::PoolClosed).is_unavailable());
        assert!(!store_error(sqlx::Error::RowNotFound).is_unavailable());
    }

    #[test]
    fn test_row_with_unknown_status_is_corrupt() {
        let now = Utc::now();
        let row = ItemRow {
            id: 1,
            queue: "q".to_string(),
            name: "n".to_string(),
            payload: Json(serde_json::Value::Null),
            status: "archived".to_string(),
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            QueueItem::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }
}
