use crate::state::{Watermark, WatermarkKey, WatermarkStore};
use crate::{Error, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Redis-backed store. Values are JSON `{"last_execution": "<iso8601>"}`
/// under `[prefix:]integration_state.{integration_id}.{action_id}`.
#[derive(Clone)]
pub struct RedisWatermarkStore {
    manager: ConnectionManager,
    prefix: Option<String>,
}

impl RedisWatermarkStore {
    #[tracing::instrument(level = "debug", skip(url))]
    pub async fn new(url: &str, prefix: Option<String>) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| Error::backend("redis client open", e))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::backend("redis connect", e))?;
        Ok(Self { manager, prefix })
    }

    pub(crate) fn scoped_key(prefix: Option<&str>, key: &WatermarkKey) -> String {
        let mut out = String::new();
        if let Some(p) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
            out.push_str(p);
            out.push(':');
        }
        out.push_str("integration_state.");
        out.push_str(&key.integration_id.to_string());
        out.push('.');
        out.push_str(key.action.as_str());
        out
    }
}

#[async_trait]
impl WatermarkStore for RedisWatermarkStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, key: &WatermarkKey) -> Result<Option<Watermark>> {
        let key = Self::scoped_key(self.prefix.as_deref(), key);
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| Error::backend("redis get", e))?;
        match raw.as_deref().map(str::trim) {
            None | Some("") | Some("{}") => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| Error::backend(format!("decode watermark at {key}"), e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set(&self, key: &WatermarkKey, watermark: &Watermark) -> Result<()> {
        let key = Self::scoped_key(self.prefix.as_deref(), key);
        let value = serde_json::to_string(watermark)
            .map_err(|e| Error::backend("encode watermark", e))?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| Error::backend("redis set", e))?;
        Ok(())
    }
}
