//! Gundi-style ingestion hub client.

use async_trait::async_trait;
use ranger_core::actions::transform::{CanonicalEvent, CanonicalObservation};
use ranger_core::hub::{Hub, HubAck};
use ranger_core::models::IntegrationId;
use ranger_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header naming the integration a batch was pulled for.
pub const INTEGRATION_HEADER: &str = "x-integration-id";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Acks {
    Many(Vec<HubAck>),
    One(HubAck),
}

#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HubClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::backend("build hub http client", e))?;
        let base_url: String = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn headers(&self, integration_id: IntegrationId) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(
            INTEGRATION_HEADER,
            HeaderValue::from_str(&integration_id.to_string())
                .map_err(|e| Error::backend("invalid integration id header", e))?,
        );
        if let Some(key) = &self.api_key {
            h.insert(
                "apikey",
                HeaderValue::from_str(key.expose_secret())
                    .map_err(|e| Error::backend("invalid hub api key header", e))?,
            );
        }
        Ok(h)
    }

    #[tracing::instrument(level = "debug", skip(self, records), fields(count = records.len()))]
    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        integration_id: IntegrationId,
        records: &[T],
    ) -> Result<Vec<HubAck>> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let resp = self
            .http
            .post(&url)
            .headers(self.headers(integration_id)?)
            .json(records)
            .send()
            .await
            .map_err(|e| Error::backend(format!("post {url}"), e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Hub(format!(
                "{url} returned {status} for integration {integration_id}: {body}"
            )));
        }
        let acks: Acks = resp
            .json()
            .await
            .map_err(|e| Error::backend(format!("decode acks from {url}"), e))?;
        let acks = match acks {
            Acks::Many(acks) => acks,
            Acks::One(ack) => vec![ack],
        };
        tracing::debug!(%integration_id, acked = acks.len(), "hub accepted batch");
        Ok(acks)
    }
}

#[async_trait]
impl Hub for HubClient {
    async fn post_events(
        &self,
        integration_id: IntegrationId,
        events: &[CanonicalEvent],
    ) -> Result<Vec<HubAck>> {
        self.post("v2/events/", integration_id, events).await
    }

    async fn post_observations(
        &self,
        integration_id: IntegrationId,
        observations: &[CanonicalObservation],
    ) -> Result<Vec<HubAck>> {
        self.post("v2/observations/", integration_id, observations)
            .await
    }
}
