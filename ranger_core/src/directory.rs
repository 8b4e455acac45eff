//! Where integrations and their stored action configurations come from.

use crate::models::{Integration, IntegrationId};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

#[async_trait]
pub trait IntegrationDirectory: Send + Sync {
    async fn get_integration(&self, id: IntegrationId) -> Result<Integration>;

    async fn list_integrations(&self) -> Result<Vec<Integration>>;
}

/// In-memory directory, optionally seeded from a JSON file.
#[derive(Debug, Default)]
pub struct StaticIntegrations {
    inner: RwLock<BTreeMap<IntegrationId, Integration>>,
}

impl StaticIntegrations {
    pub fn new(integrations: impl IntoIterator<Item = Integration>) -> Self {
        Self {
            inner: RwLock::new(integrations.into_iter().map(|i| (i.id, i)).collect()),
        }
    }

    /// Load a JSON array of integrations.
    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::backend(format!("read integrations file {}", path.display()), e))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let integrations: Vec<Integration> = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidInput(format!("invalid integrations file: {e}")))?;
        for integration in &integrations {
            if integration.base_url.trim().is_empty() {
                tracing::warn!(integration_id = %integration.id, "integration has an empty base_url");
            }
        }
        Ok(Self::new(integrations))
    }
}

#[async_trait]
impl IntegrationDirectory for StaticIntegrations {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_integration(&self, id: IntegrationId) -> Result<Integration> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("integration {id}")))
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        Ok(self.inner.read().await.values().cloned().collect())
    }
}
