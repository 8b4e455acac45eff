//! Per-(integration, action) watermarks bounding each pull's query window.
//!
//! Every `set` fully overwrites the previous value; no history is kept.
//! Backends must tolerate concurrent access to different keys. Concurrent
//! pulls on the same key are serialized by the dispatcher, not here.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryWatermarkStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisWatermarkStore;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteWatermarkStore;

use crate::Result;
use crate::models::{ActionId, IntegrationId};
use crate::time::iso8601;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatermarkKey {
    pub integration_id: IntegrationId,
    pub action: ActionId,
}

impl WatermarkKey {
    pub fn new(integration_id: IntegrationId, action: ActionId) -> Self {
        Self {
            integration_id,
            action,
        }
    }
}

impl fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.integration_id, self.action)
    }
}

/// Persisted cursor: start time of the last completed pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    #[serde(with = "iso8601")]
    pub last_execution: DateTime<FixedOffset>,
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// `None` when no pull has completed for this key yet.
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>>;

    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()>;
}
