use crate::Result;
use crate::state::{Watermark, WatermarkKey, WatermarkStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store. Lost on restart; used for dev and tests.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    inner: RwLock<HashMap<WatermarkKey, Watermark>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>> {
        Ok(self.inner.read().await.get(key).copied())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()> {
        self.inner.write().await.insert(*key, *watermark);
        Ok(())
    }
}
