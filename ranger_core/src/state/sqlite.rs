//! SQLite-backed watermark store: one row per (integration, action).

use crate::state::{Watermark, WatermarkKey, WatermarkStore};
use crate::time::parse_timestamp;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

#[derive(Clone)]
pub struct SqliteWatermarkStore {
    pool: SqlitePool,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS integration_state (
    integration_id TEXT NOT NULL,
    action_id TEXT NOT NULL,
    last_execution TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (integration_id, action_id)
);
"#;

impl SqliteWatermarkStore {
    /// Open (or create) the store at `path`, creating parent directories.
    #[tracing::instrument(level = "debug", skip(path))]
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::backend("sqlite_watermarks create dir", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
            .map_err(db_err)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(db_err)?;
        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::backend("sqlite_watermarks migration", e))?;
        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::backend("sqlite_watermarks", e)
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>> {
        let row = sqlx::query(
            "SELECT last_execution FROM integration_state
             WHERE integration_id = ?1 AND action_id = ?2",
        )
        .bind(key.integration_id.to_string())
        .bind(key.action.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("last_execution").map_err(db_err)?;
        Ok(Some(Watermark {
            last_execution: parse_timestamp(&raw)?,
        }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()> {
        sqlx::query(
            "INSERT INTO integration_state (integration_id, action_id, last_execution, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(integration_id, action_id)
             DO UPDATE SET last_execution = excluded.last_execution, updated_at = excluded.updated_at",
        )
        .bind(key.integration_id.to_string())
        .bind(key.action.as_str())
        .bind(
            watermark
                .last_execution
                .to_rfc3339_opts(SecondsFormat::AutoSi, false),
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
