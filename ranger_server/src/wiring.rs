//! Builds the action runner from process configuration.

use ranger_core::actions::{ActionRunner, PullPipeline};
use ranger_core::config::{RangerConfig, StateBackend};
use ranger_core::directory::{IntegrationDirectory, StaticIntegrations};
use ranger_core::hub::Hub;
use ranger_core::site::SiteConnector;
use ranger_core::state::{
    MemoryWatermarkStore, RedisWatermarkStore, SqliteWatermarkStore, WatermarkStore,
};
use ranger_integrations::{EarthRangerConnector, HubClient};
use serde::Serialize;
use std::sync::Arc;

#[tracing::instrument(level = "info", skip_all, fields(state_backend = cfg.state_backend.as_str()))]
pub async fn build_runner(cfg: &RangerConfig) -> anyhow::Result<ActionRunner> {
    let directory = load_directory(cfg).await?;
    let state = build_state(cfg).await?;
    let hub: Arc<dyn Hub> = Arc::new(HubClient::new(cfg.hub.url.clone(), cfg.hub.api_key.clone())?);
    let site: Arc<dyn SiteConnector> = Arc::new(EarthRangerConnector::new());

    let pipeline = PullPipeline::new(site.clone(), hub, state).with_batch_size(cfg.batch_size);
    Ok(ActionRunner::new(directory, site, pipeline).with_connect_timeout(cfg.site_connect_timeout))
}

pub async fn load_directory(cfg: &RangerConfig) -> anyhow::Result<Arc<dyn IntegrationDirectory>> {
    Ok(match &cfg.integrations_file {
        Some(path) => Arc::new(StaticIntegrations::from_json_file(path).await?),
        None => {
            tracing::warn!("RANGER_INTEGRATIONS_FILE not set; no integrations are registered");
            Arc::new(StaticIntegrations::default())
        }
    })
}

async fn build_state(cfg: &RangerConfig) -> anyhow::Result<Arc<dyn WatermarkStore>> {
    Ok(match cfg.state_backend {
        StateBackend::Memory => {
            tracing::warn!("using in-memory watermarks; state is lost on restart");
            Arc::new(MemoryWatermarkStore::new())
        }
        StateBackend::Sqlite => Arc::new(SqliteWatermarkStore::new(&cfg.sqlite_path).await?),
        StateBackend::Redis => {
            let url = cfg
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("RANGER_REDIS_URL is required for redis state"))?;
            Arc::new(RedisWatermarkStore::new(url, cfg.redis_key_prefix.clone()).await?)
        }
    })
}

/// One line of `ranger integrations` output. Configuration data is omitted.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct IntegrationSummary {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub actions: Vec<String>,
}

pub async fn integration_summaries(
    directory: &dyn IntegrationDirectory,
) -> anyhow::Result<Vec<IntegrationSummary>> {
    Ok(directory
        .list_integrations()
        .await?
        .into_iter()
        .map(|i| IntegrationSummary {
            id: i.id.to_string(),
            name: i.name,
            base_url: i.base_url,
            actions: i
                .configurations
                .iter()
                .map(|c| c.action.to_string())
                .collect(),
        })
        .collect())
}

/// Keep the first and last four characters of a secret-bearing value.
pub fn redact(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}
