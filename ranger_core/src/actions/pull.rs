//! Incremental pull of events and observations.
//!
//! One invocation: resolve credentials, read the watermark, stream batches
//! from the site in order, transform and forward each non-empty batch, then
//! advance the watermark to the time the pull began. Any site or hub error
//! aborts the pull before the watermark moves, so a retry resumes from the
//! previous window (at-least-once delivery).

use crate::actions::config::PullWindowConfig;
use crate::actions::credentials::{
    DEFAULT_CONNECT_TIMEOUT, connection_params, site_endpoints, stored_auth_mode,
};
use crate::actions::transform::{
    CanonicalEvent, CanonicalObservation, transform_events, transform_observations,
};
use crate::hub::{Hub, HubAck};
use crate::models::{ActionId, Integration, IntegrationId};
use crate::site::{BatchStream, EventFilter, ObservationQuery, SiteClient, SiteConnector};
use crate::state::{Watermark, WatermarkKey, WatermarkStore};
use crate::time::{Clock, SystemClock};
use crate::Result;
use chrono::{DateTime, FixedOffset};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsExtracted {
    pub events_extracted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationsExtracted {
    pub observations_extracted: usize,
}

/// One kind of pullable record.
trait PullTarget {
    type Record: Send + Sync;

    const ACTION: ActionId;
    const NOUN: &'static str;

    fn stream<'a>(
        client: &'a dyn SiteClient,
        lower: DateTime<FixedOffset>,
        upper: Option<DateTime<FixedOffset>>,
        batch_size: usize,
    ) -> BatchStream<'a>;

    fn transform(batch: &[serde_json::Value]) -> Vec<Self::Record>;

    fn forward(
        hub: &dyn Hub,
        integration_id: IntegrationId,
        records: &[Self::Record],
    ) -> impl Future<Output = Result<Vec<HubAck>>> + Send;
}

struct Events;

impl PullTarget for Events {
    type Record = CanonicalEvent;

    const ACTION: ActionId = ActionId::PullEvents;
    const NOUN: &'static str = "events";

    fn stream<'a>(
        client: &'a dyn SiteClient,
        lower: DateTime<FixedOffset>,
        upper: Option<DateTime<FixedOffset>>,
        batch_size: usize,
    ) -> BatchStream<'a> {
        client.get_events(EventFilter::between(lower, upper), batch_size)
    }

    fn transform(batch: &[serde_json::Value]) -> Vec<CanonicalEvent> {
        transform_events(batch)
    }

    async fn forward(
        hub: &dyn Hub,
        integration_id: IntegrationId,
        records: &[CanonicalEvent],
    ) -> Result<Vec<HubAck>> {
        hub.post_events(integration_id, records).await
    }
}

struct Observations;

impl PullTarget for Observations {
    type Record = CanonicalObservation;

    const ACTION: ActionId = ActionId::PullObservations;
    const NOUN: &'static str = "observations";

    fn stream<'a>(
        client: &'a dyn SiteClient,
        lower: DateTime<FixedOffset>,
        upper: Option<DateTime<FixedOffset>>,
        batch_size: usize,
    ) -> BatchStream<'a> {
        let query = ObservationQuery {
            start: lower,
            end: upper,
        };
        client.get_observations(query, batch_size)
    }

    fn transform(batch: &[serde_json::Value]) -> Vec<CanonicalObservation> {
        transform_observations(batch)
    }

    async fn forward(
        hub: &dyn Hub,
        integration_id: IntegrationId,
        records: &[CanonicalObservation],
    ) -> Result<Vec<HubAck>> {
        hub.post_observations(integration_id, records).await
    }
}

#[derive(Clone)]
pub struct PullPipeline {
    site: Arc<dyn SiteConnector>,
    hub: Arc<dyn Hub>,
    state: Arc<dyn WatermarkStore>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    connect_timeout: Duration,
}

impl PullPipeline {
    pub fn new(
        site: Arc<dyn SiteConnector>,
        hub: Arc<dyn Hub>,
        state: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            site,
            hub,
            state,
            clock: Arc::new(SystemClock),
            batch_size: DEFAULT_BATCH_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[tracing::instrument(level = "info", skip_all, fields(integration_id = %integration.id))]
    pub async fn pull_events(
        &self,
        integration: &Integration,
        config: &PullWindowConfig,
    ) -> Result<EventsExtracted> {
        let events_extracted = self.run::<Events>(integration, config).await?;
        Ok(EventsExtracted { events_extracted })
    }

    #[tracing::instrument(level = "info", skip_all, fields(integration_id = %integration.id))]
    pub async fn pull_observations(
        &self,
        integration: &Integration,
        config: &PullWindowConfig,
    ) -> Result<ObservationsExtracted> {
        let observations_extracted = self.run::<Observations>(integration, config).await?;
        Ok(ObservationsExtracted {
            observations_extracted,
        })
    }

    async fn run<T: PullTarget>(
        &self,
        integration: &Integration,
        config: &PullWindowConfig,
    ) -> Result<usize> {
        let started_at = self.clock.now().fixed_offset();

        let mode = stored_auth_mode(integration)?;
        let endpoints = site_endpoints(&integration.base_url)?;

        let key = WatermarkKey::new(integration.id, T::ACTION);
        let previous = self.state.get(&key).await?;
        tracing::debug!(%key, ?previous, "watermark loaded");

        let lower = match previous {
            Some(w) if !config.force_run_since_start => w.last_execution,
            _ => config.start_datetime,
        };
        let upper = config.end_datetime;
        tracing::info!(
            noun = T::NOUN,
            lower = %lower,
            upper = ?upper,
            "extracting records"
        );

        let params = connection_params(endpoints, &mode, self.connect_timeout);
        let client = self.site.connect(params).await?;
        let drained = self
            .drain::<T>(client.as_ref(), integration.id, lower, upper)
            .await;
        client.close().await;
        let total = drained?;

        let next = match previous {
            Some(prev) if prev.last_execution > started_at => {
                tracing::warn!(
                    %key,
                    previous = %prev.last_execution,
                    %started_at,
                    "clock is behind stored watermark; keeping previous value"
                );
                prev.last_execution
            }
            _ => started_at,
        };
        self.state
            .set(&key, &Watermark { last_execution: next })
            .await?;

        tracing::info!(noun = T::NOUN, total, "extraction finished");
        Ok(total)
    }

    async fn drain<T: PullTarget>(
        &self,
        client: &dyn SiteClient,
        integration_id: IntegrationId,
        lower: DateTime<FixedOffset>,
        upper: Option<DateTime<FixedOffset>>,
    ) -> Result<usize> {
        let mut batches = T::stream(client, lower, upper, self.batch_size);
        let mut total = 0usize;
        while let Some(batch) = batches.next().await {
            let batch = batch?;
            let records = T::transform(&batch);
            if records.is_empty() {
                continue;
            }
            tracing::info!(noun = T::NOUN, count = records.len(), "sending batch to hub");
            T::forward(self.hub.as_ref(), integration_id, &records).await?;
            total += records.len();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::site::SiteError;
    use crate::state::MemoryWatermarkStore;
    use crate::test_support::{
        FakeSite, FixedClock, RecordingHub, event_batches, integration, integration_id,
        observation_batches, ts,
    };
    use serde_json::json;

    struct Harness {
        site: Arc<FakeSite>,
        hub: Arc<RecordingHub>,
        state: Arc<MemoryWatermarkStore>,
    }

    impl Harness {
        fn new(site: FakeSite, hub: RecordingHub) -> Self {
            Self {
                site: Arc::new(site),
                hub: Arc::new(hub),
                state: Arc::new(MemoryWatermarkStore::new()),
            }
        }

        fn pipeline(&self, now: &str) -> PullPipeline {
            PullPipeline::new(self.site.clone(), self.hub.clone(), self.state.clone())
                .with_clock(Arc::new(FixedClock::at(now)))
        }

        async fn watermark(&self, action: ActionId) -> Option<DateTime<FixedOffset>> {
            self.state
                .get(&WatermarkKey::new(integration_id(), action))
                .await
                .unwrap()
                .map(|w| w.last_execution)
        }

        async fn seed(&self, action: ActionId, at: &str) {
            self.state
                .set(
                    &WatermarkKey::new(integration_id(), action),
                    &Watermark {
                        last_execution: ts(at),
                    },
                )
                .await
                .unwrap();
        }
    }

    fn window(start: &str) -> PullWindowConfig {
        PullWindowConfig {
            start_datetime: ts(start),
            end_datetime: None,
            force_run_since_start: false,
        }
    }

    #[tokio::test]
    async fn two_event_batches_are_forwarded_separately() {
        let h = Harness::new(
            FakeSite::new().with_event_batches(event_batches()),
            RecordingHub::new(),
        );
        let out = h
            .pipeline("2023-11-17T09:20:00Z")
            .pull_events(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-16T00:00:00-03:00"),
            )
            .await
            .unwrap();

        assert_eq!(out, EventsExtracted { events_extracted: 4 });
        let sent = h.hub.event_batches();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][0].event_type, Some(json!("rainfall_rep")));
        assert_eq!(h.site.calls.closed(), 1);
        assert_eq!(
            h.watermark(ActionId::PullEvents).await,
            Some(ts("2023-11-17T09:20:00Z"))
        );
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            json!({"events_extracted": 4})
        );
    }

    #[tokio::test]
    async fn two_observation_batches_are_forwarded_separately() {
        let h = Harness::new(
            FakeSite::new().with_observation_batches(observation_batches()),
            RecordingHub::new(),
        );
        let mut config = window("2023-11-16T00:00:00-03:00");
        config.end_datetime = Some(ts("2023-11-20T00:00:00-03:00"));

        let out = h
            .pipeline("2023-11-17T09:20:00Z")
            .pull_observations(&integration("https://gundi-er.pamdas.org"), &config)
            .await
            .unwrap();

        assert_eq!(out.observations_extracted, 4);
        let sent = h.hub.observation_batches();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().flatten().all(|o| o.source.as_deref()
            == Some("er-src-192b457f-fa25-4674-ae3e-8fae8d775d61")));

        let queries = h.site.calls.observation_queries();
        assert_eq!(queries[0].start, ts("2023-11-16T00:00:00-03:00"));
        assert_eq!(queries[0].end, Some(ts("2023-11-20T00:00:00-03:00")));
    }

    #[tokio::test]
    async fn empty_pull_still_advances_watermark_to_start_time() {
        let h = Harness::new(FakeSite::new(), RecordingHub::new());
        h.seed(ActionId::PullEvents, "2023-11-17T11:20:00+0200").await;
        let integration = integration("https://gundi-er.pamdas.org");
        let config = window("2023-11-01T00:00:00Z");

        let out = h
            .pipeline("2023-11-18T00:00:00Z")
            .pull_events(&integration, &config)
            .await
            .unwrap();
        assert_eq!(out.events_extracted, 0);
        assert!(h.hub.event_batches().is_empty());
        assert_eq!(
            h.watermark(ActionId::PullEvents).await,
            Some(ts("2023-11-18T00:00:00Z"))
        );

        // The next pull queries from the new watermark.
        h.pipeline("2023-11-19T00:00:00Z")
            .pull_events(&integration, &config)
            .await
            .unwrap();
        let filters = h.site.calls.event_filters();
        assert_eq!(filters[0].date_range.lower, ts("2023-11-17T11:20:00+0200"));
        assert_eq!(filters[1].date_range.lower, ts("2023-11-18T00:00:00Z"));
    }

    #[tokio::test]
    async fn force_run_since_start_ignores_watermark() {
        let h = Harness::new(FakeSite::new(), RecordingHub::new());
        h.seed(ActionId::PullEvents, "2023-11-17T11:20:00+0200").await;
        let mut config = window("2023-01-01T00:00:00Z");
        config.force_run_since_start = true;
        config.end_datetime = Some(ts("2023-02-01T00:00:00Z"));

        h.pipeline("2023-11-18T00:00:00Z")
            .pull_events(&integration("https://gundi-er.pamdas.org"), &config)
            .await
            .unwrap();

        let filter = &h.site.calls.event_filters()[0];
        assert_eq!(filter.date_range.lower, ts("2023-01-01T00:00:00Z"));
        assert_eq!(filter.date_range.upper, Some(ts("2023-02-01T00:00:00Z")));
    }

    #[tokio::test]
    async fn malformed_records_are_dropped_from_count_and_output() {
        let mut batches = event_batches();
        batches[0].push(json!(["not", "an", "event"]));
        batches[1].insert(0, json!({"title": "broken", "location": 42}));
        let h = Harness::new(
            FakeSite::new().with_event_batches(batches),
            RecordingHub::new(),
        );

        let out = h
            .pipeline("2023-11-17T09:20:00Z")
            .pull_events(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-16T00:00:00Z"),
            )
            .await
            .unwrap();

        assert_eq!(out.events_extracted, 4);
        let sizes: Vec<usize> = h.hub.event_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[tokio::test]
    async fn batches_that_transform_to_nothing_are_not_sent() {
        let batches = vec![vec![json!(1), json!(null)], event_batches().remove(0)];
        let h = Harness::new(
            FakeSite::new().with_event_batches(batches),
            RecordingHub::new(),
        );
        let out = h
            .pipeline("2023-11-17T09:20:00Z")
            .pull_events(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-16T00:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(out.events_extracted, 2);
        assert_eq!(h.hub.event_batches().len(), 1);
    }

    #[tokio::test]
    async fn stream_error_is_fatal_and_keeps_watermark() {
        let h = Harness::new(
            FakeSite::new()
                .with_event_batches(event_batches())
                .with_event_stream_error(SiteError::Http {
                    status: 500,
                    message: "Internal Server Error".to_string(),
                }),
            RecordingHub::new(),
        );
        h.seed(ActionId::PullEvents, "2023-11-17T11:20:00+0200").await;

        let err = h
            .pipeline("2023-11-18T00:00:00Z")
            .pull_events(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-01T00:00:00Z"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Site(SiteError::Http { status: 500, .. })));
        // Batches before the failure were already delivered.
        assert_eq!(h.hub.event_batches().len(), 2);
        assert_eq!(h.site.calls.closed(), 1);
        assert_eq!(
            h.watermark(ActionId::PullEvents).await,
            Some(ts("2023-11-17T11:20:00+0200"))
        );
    }

    #[tokio::test]
    async fn hub_failure_aborts_remaining_batches() {
        let h = Harness::new(
            FakeSite::new().with_event_batches(event_batches()),
            RecordingHub::failing_on_call(0),
        );
        let err = h
            .pipeline("2023-11-18T00:00:00Z")
            .pull_events(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-01T00:00:00Z"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Hub(_)));
        assert_eq!(h.site.calls.batches_pulled(), 1);
        assert_eq!(h.watermark(ActionId::PullEvents).await, None);
    }

    #[tokio::test]
    async fn missing_auth_config_fails_before_connecting() {
        let h = Harness::new(FakeSite::new(), RecordingHub::new());
        let mut integration = integration("https://gundi-er.pamdas.org");
        integration
            .configurations
            .retain(|c| c.action != ActionId::Auth);

        let err = h
            .pipeline("2023-11-18T00:00:00Z")
            .pull_observations(&integration, &window("2023-11-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(h.site.calls.connects(), 0);
    }

    #[tokio::test]
    async fn empty_base_url_fails_before_connecting() {
        let h = Harness::new(FakeSite::new(), RecordingHub::new());
        let err = h
            .pipeline("2023-11-18T00:00:00Z")
            .pull_events(&integration("https:///"), &window("2023-11-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(h.site.calls.connects(), 0);
    }

    #[tokio::test]
    async fn watermark_never_moves_backwards() {
        let h = Harness::new(FakeSite::new(), RecordingHub::new());
        h.seed(ActionId::PullObservations, "2030-01-01T00:00:00Z").await;

        h.pipeline("2023-11-18T00:00:00Z")
            .pull_observations(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-01T00:00:00Z"),
            )
            .await
            .unwrap();

        assert_eq!(
            h.watermark(ActionId::PullObservations).await,
            Some(ts("2030-01-01T00:00:00Z"))
        );
    }

    #[tokio::test]
    async fn watermarks_are_scoped_per_action() {
        let h = Harness::new(
            FakeSite::new().with_event_batches(event_batches()),
            RecordingHub::new(),
        );
        h.pipeline("2023-11-18T00:00:00Z")
            .pull_events(
                &integration("https://gundi-er.pamdas.org"),
                &window("2023-11-01T00:00:00Z"),
            )
            .await
            .unwrap();
        assert!(h.watermark(ActionId::PullEvents).await.is_some());
        assert!(h.watermark(ActionId::PullObservations).await.is_none());
    }

    #[tokio::test]
    async fn connection_uses_stored_token_and_derived_endpoints() {
        let h = Harness::new(FakeSite::new(), RecordingHub::new());
        h.pipeline("2023-11-18T00:00:00Z")
            .with_batch_size(50)
            .pull_events(
                &integration("https://gundi-er.pamdas.org/"),
                &window("2023-11-01T00:00:00Z"),
            )
            .await
            .unwrap();

        let params = h.site.calls.params.lock().unwrap().clone();
        assert_eq!(params[0].service_root, "https://gundi-er.pamdas.org/api/v1.0");
        assert_eq!(params[0].token_url, "https://gundi-er.pamdas.org/oauth2/token");
        assert_eq!(params[0].client_id, "das_web_client");
        assert!(params[0].token.is_some());
        assert!(params[0].username.is_none());
    }
}
