//! Contract with the downstream ingestion hub.

use crate::Result;
use crate::actions::transform::{CanonicalEvent, CanonicalObservation};
use crate::models::IntegrationId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-record acknowledgement returned by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubAck {
    pub object_id: String,
    pub created_at: String,
}

/// Receives transformed records. One call forwards one batch.
#[async_trait]
pub trait Hub: Send + Sync {
    async fn post_events(
        &self,
        integration_id: IntegrationId,
        events: &[CanonicalEvent],
    ) -> Result<Vec<HubAck>>;

    async fn post_observations(
        &self,
        integration_id: IntegrationId,
        observations: &[CanonicalObservation],
    ) -> Result<Vec<HubAck>>;
}
