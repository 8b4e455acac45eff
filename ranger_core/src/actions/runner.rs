//! Dispatches one action invocation for one integration.

use crate::actions::config::{PullWindowConfig, ShowPermissionsConfig, parse_config};
use crate::actions::credentials::{CredentialsCheck, validate_credentials};
use crate::actions::permissions::{PermissionsReport, show_permissions};
use crate::actions::pull::{EventsExtracted, ObservationsExtracted, PullPipeline};
use crate::directory::IntegrationDirectory;
use crate::models::{ActionId, Integration, IntegrationId};
use crate::site::SiteConnector;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of any action, serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionOutput {
    Credentials(CredentialsCheck),
    Events(EventsExtracted),
    Observations(ObservationsExtracted),
    Permissions(PermissionsReport),
}

#[derive(Clone)]
pub struct ActionRunner {
    directory: Arc<dyn IntegrationDirectory>,
    site: Arc<dyn SiteConnector>,
    pipeline: PullPipeline,
    connect_timeout: Duration,
}

impl ActionRunner {
    pub fn new(
        directory: Arc<dyn IntegrationDirectory>,
        site: Arc<dyn SiteConnector>,
        pipeline: PullPipeline,
    ) -> Self {
        Self {
            directory,
            site,
            pipeline,
            connect_timeout: crate::actions::credentials::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.pipeline = self.pipeline.with_connect_timeout(timeout);
        self
    }

    pub fn directory(&self) -> &Arc<dyn IntegrationDirectory> {
        &self.directory
    }

    /// Load the integration, merge `overrides` over the stored configuration
    /// for `action`, validate and run the handler.
    ///
    /// Emits `action.started` and then `action.succeeded` or `action.failed`.
    #[tracing::instrument(level = "info", skip(self, overrides))]
    pub async fn execute(
        &self,
        integration_id: IntegrationId,
        action: ActionId,
        overrides: Option<Value>,
    ) -> Result<ActionOutput> {
        let started = Instant::now();
        tracing::info!(activity = "action.started", %integration_id, %action, "action started");

        let result = self.dispatch(integration_id, action, overrides).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(
                activity = "action.succeeded",
                %integration_id,
                %action,
                elapsed_ms,
                "action succeeded"
            ),
            Err(e) => tracing::error!(
                activity = "action.failed",
                %integration_id,
                %action,
                elapsed_ms,
                error = %e,
                "action failed"
            ),
        }
        result
    }

    async fn dispatch(
        &self,
        integration_id: IntegrationId,
        action: ActionId,
        overrides: Option<Value>,
    ) -> Result<ActionOutput> {
        let integration = self.directory.get_integration(integration_id).await?;
        let data = merged_config(&integration, action, overrides)?;

        match action {
            ActionId::Auth => Ok(ActionOutput::Credentials(
                validate_credentials(self.site.as_ref(), &integration, data, self.connect_timeout)
                    .await,
            )),
            ActionId::PullEvents => {
                let config: PullWindowConfig = parse_config(action, data)?;
                let out = self.pipeline.pull_events(&integration, &config).await?;
                Ok(ActionOutput::Events(out))
            }
            ActionId::PullObservations => {
                let config: PullWindowConfig = parse_config(action, data)?;
                let out = self
                    .pipeline
                    .pull_observations(&integration, &config)
                    .await?;
                Ok(ActionOutput::Observations(out))
            }
            ActionId::ShowPermissions => {
                let config: ShowPermissionsConfig = parse_config(action, data)?;
                let out = show_permissions(
                    self.site.as_ref(),
                    &integration,
                    &config,
                    self.connect_timeout,
                )
                .await?;
                Ok(ActionOutput::Permissions(out))
            }
        }
    }
}

/// Stored configuration with override keys shallow-merged on top.
pub fn merged_config(
    integration: &Integration,
    action: ActionId,
    overrides: Option<Value>,
) -> Result<Value> {
    let mut merged = match integration.config_for(action).map(|c| &c.data) {
        Some(Value::Object(stored)) => stored.clone(),
        Some(Value::Null) | None => Map::new(),
        Some(other) => {
            return Err(Error::InvalidInput(format!(
                "stored {action} configuration must be an object, found {other}"
            )));
        }
    };
    match overrides {
        None | Some(Value::Null) => {}
        Some(Value::Object(extra)) => merged.extend(extra),
        Some(other) => {
            return Err(Error::InvalidInput(format!(
                "config overrides must be an object, found {other}"
            )));
        }
    }
    Ok(Value::Object(merged))
}
