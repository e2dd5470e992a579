use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;

use super::{DocumentStore, Documents, EntityKind};
use crate::error::{Result, SnifferError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        key TEXT PRIMARY KEY,
        body JSONB NOT NULL,
        connectivity TEXT,
        test_status TEXT,
        resolution TEXT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS channels_connectivity_idx ON channels (connectivity)",
    r#"
    CREATE TABLE IF NOT EXISTS channel_groups (
        key TEXT PRIMARY KEY,
        body JSONB NOT NULL,
        sort_order BIGINT,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS channel_groups_sort_idx ON channel_groups (sort_order)",
    r#"
    CREATE TABLE IF NOT EXISTS batch_runs (
        key TEXT PRIMARY KEY,
        body JSONB NOT NULL,
        status TEXT,
        created_at TIMESTAMPTZ,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS batch_runs_created_idx ON batch_runs (created_at)",
];

/// Postgres-backed document store. One table per collection, each row a
/// JSONB body plus a few promoted columns for indexing.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(self.pool()).await?;
        }
        info!("postgres document schema ready");
        Ok(())
    }

    fn table(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Channels => "channels",
            EntityKind::Groups => "channel_groups",
            EntityKind::Runs => "batch_runs",
        }
    }

    fn text_field(value: &Value, field: &str) -> Option<String> {
        value.get(field).and_then(Value::as_str).map(str::to_string)
    }

    fn timestamp_field(value: &Value, field: &str) -> Option<DateTime<Utc>> {
        value
            .get(field)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    async fn write_row(
        tx: &mut Transaction<'_, Postgres>,
        kind: EntityKind,
        key: &str,
        body: &Value,
    ) -> Result<()> {
        let query = match kind {
            EntityKind::Channels => sqlx::query(
                r#"
                INSERT INTO channels (key, body, connectivity, test_status, resolution, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (key) DO UPDATE SET
                    body = EXCLUDED.body,
                    connectivity = EXCLUDED.connectivity,
                    test_status = EXCLUDED.test_status,
                    resolution = EXCLUDED.resolution,
                    updated_at = NOW()
                "#,
            )
            .bind(key)
            .bind(body)
            .bind(Self::text_field(body, "connectivity"))
            .bind(Self::text_field(body, "test_status"))
            .bind(Self::text_field(body, "resolution")),
            EntityKind::Groups => sqlx::query(
                r#"
                INSERT INTO channel_groups (key, body, sort_order, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (key) DO UPDATE SET
                    body = EXCLUDED.body,
                    sort_order = EXCLUDED.sort_order,
                    updated_at = NOW()
                "#,
            )
            .bind(key)
            .bind(body)
            .bind(body.get("sort_order").and_then(Value::as_i64)),
            EntityKind::Runs => sqlx::query(
                r#"
                INSERT INTO batch_runs (key, body, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (key) DO UPDATE SET
                    body = EXCLUDED.body,
                    status = EXCLUDED.status,
                    updated_at = NOW()
                "#,
            )
            .bind(key)
            .bind(body)
            .bind(Self::text_field(body, "status"))
            .bind(Self::timestamp_field(body, "started_at")),
        };

        query.execute(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get_all(&self, kind: EntityKind) -> Result<Documents> {
        let sql = format!("SELECT key, body FROM {} ORDER BY key", Self::table(kind));
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;

        let mut documents = Documents::new();
        for row in rows {
            let key: String = row
                .try_get("key")
                .map_err(|e| SnifferError::Internal(format!("Failed to read key: {e}")))?;
            let body: Value = row
                .try_get("body")
                .map_err(|e| SnifferError::Internal(format!("Failed to read body: {e}")))?;
            documents.insert(key, body);
        }
        Ok(documents)
    }

    async fn save_all(&self, kind: EntityKind, documents: &Documents) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let keys: Vec<String> = documents.keys().cloned().collect();
        let prune = format!("DELETE FROM {} WHERE NOT (key = ANY($1))", Self::table(kind));
        sqlx::query(&prune).bind(&keys).execute(&mut *tx).await?;

        for (key, body) in documents {
            Self::write_row(&mut tx, kind, key, body).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert(&self, kind: EntityKind, key: &str, value: &Value) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        Self::write_row(&mut tx, kind, key, value).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = $1", Self::table(kind));
        let result = sqlx::query(&sql).bind(key).execute(self.pool()).await?;
        Ok(result.rows_affected() > 0)
    }
}
