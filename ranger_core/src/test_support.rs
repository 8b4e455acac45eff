#![cfg(test)]

use crate::actions::transform::{CanonicalEvent, CanonicalObservation};
use crate::hub::{Hub, HubAck};
use crate::models::{ActionConfiguration, ActionId, Integration, IntegrationId};
use crate::site::{
    Batch, BatchStream, ConnectionParams, EventFilter, EventType, ObservationQuery, SiteClient,
    SiteConnector, SiteError, SubjectGroup, UserProfile,
};
use crate::time::{Clock, parse_timestamp};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const INTEGRATION_ID: &str = "779ff3ab-5589-4f4c-9e0a-ae8d6c9edff0";

pub fn integration_id() -> IntegrationId {
    INTEGRATION_ID.parse().unwrap()
}

/// An integration with token auth and both pull actions configured.
pub fn integration(base_url: &str) -> Integration {
    Integration {
        id: integration_id(),
        name: "Gundi ER".to_string(),
        base_url: base_url.to_string(),
        configurations: vec![
            ActionConfiguration {
                action: ActionId::Auth,
                data: json!({"authentication_type": "token", "token": "1b4c1e9c-5ee0-44db-c7f1-177ede2f854a"}),
            },
            ActionConfiguration {
                action: ActionId::PullEvents,
                data: json!({"start_datetime": "2023-11-16T00:00:00-03:00"}),
            },
            ActionConfiguration {
                action: ActionId::PullObservations,
                data: json!({"start_datetime": "2023-11-16T00:00:00-03:00", "end_datetime": "2023-11-20T00:00:00-03:00"}),
            },
        ],
    }
}

pub fn event_batches() -> Vec<Batch> {
    vec![
        vec![
            json!({
                "id": "3a4c8b5e-26a7-4dce-a8a4-3b0a5f6c7d01",
                "serial_number": 1201,
                "event_type": "rainfall_rep",
                "title": "Rainfall",
                "created_at": "2023-11-16T12:10:04.111333-03:00",
                "time": "2023-11-16T12:10:00-03:00",
                "location": {"latitude": -51.688645, "longitude": -72.704440},
                "event_details": {"amount_mm": 6, "height_m": 3},
                "priority": 0,
                "state": "new"
            }),
            json!({
                "id": "3a4c8b5e-26a7-4dce-a8a4-3b0a5f6c7d02",
                "serial_number": 1202,
                "event_type": "animals",
                "title": "Animal Detected",
                "created_at": "2023-11-16T12:30:00-03:00",
                "location": {"latitude": -51.688646, "longitude": -72.704441},
                "event_details": {"species": "puma"},
                "priority": 100,
                "state": "active"
            }),
        ],
        vec![
            json!({
                "id": "3a4c8b5e-26a7-4dce-a8a4-3b0a5f6c7d03",
                "event_type": "fire_rep",
                "title": "Fire",
                "created_at": "2023-11-16T13:00:00-03:00",
                "location": null,
                "geojson": {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-72.7, -51.6]}},
                "priority": 300
            }),
            json!({
                "id": "3a4c8b5e-26a7-4dce-a8a4-3b0a5f6c7d04",
                "event_type": "rainfall_rep",
                "title": "Rainfall",
                "created_at": "2023-11-16T14:00:00-03:00",
                "event_details": {"amount_mm": 2},
                "priority": 0
            }),
        ],
    ]
}

pub fn observation_batches() -> Vec<Batch> {
    let observation = |id: &str, recorded_at: &str, lon: f64, lat: f64| {
        json!({
            "id": id,
            "location": {"latitude": lat, "longitude": lon},
            "created_at": "2023-11-16T12:00:05-03:00",
            "recorded_at": recorded_at,
            "source": "192b457f-fa25-4674-ae3e-8fae8d775d61",
            "exclusion_flags": 0,
            "observation_details": {}
        })
    };
    vec![
        vec![
            observation("c6f3a8e0-0001-4f2b-9c1d-1a2b3c4d5e01", "2023-11-16T11:00:00-03:00", 35.43, -1.99),
            observation("c6f3a8e0-0001-4f2b-9c1d-1a2b3c4d5e02", "2023-11-16T11:10:00-03:00", 35.44, -1.98),
        ],
        vec![
            observation("c6f3a8e0-0001-4f2b-9c1d-1a2b3c4d5e03", "2023-11-16T11:20:00-03:00", 35.45, -1.97),
            observation("c6f3a8e0-0001-4f2b-9c1d-1a2b3c4d5e04", "2023-11-16T11:30:00-03:00", 35.46, -1.96),
        ],
    ]
}

pub fn ts(s: &str) -> chrono::DateTime<chrono::FixedOffset> {
    parse_timestamp(s).unwrap()
}

pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at(s: &str) -> Self {
        Self(ts(s).with_timezone(&Utc))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// What the fake site answers.
#[derive(Clone)]
struct Script {
    me: std::result::Result<UserProfile, SiteError>,
    login: std::result::Result<bool, SiteError>,
    connect_error: Option<SiteError>,
    events: Vec<std::result::Result<Batch, SiteError>>,
    observations: Vec<std::result::Result<Batch, SiteError>>,
    event_types: Vec<EventType>,
    subject_groups: std::result::Result<Vec<SubjectGroup>, SiteError>,
}

#[derive(Default)]
pub struct SiteCalls {
    connects: AtomicUsize,
    get_me: AtomicUsize,
    login: AtomicUsize,
    closed: AtomicUsize,
    batches_pulled: AtomicUsize,
    pub event_filters: Mutex<Vec<EventFilter>>,
    pub observation_queries: Mutex<Vec<ObservationQuery>>,
    pub subjectgroup_flags: Mutex<Vec<bool>>,
    pub params: Mutex<Vec<ConnectionParams>>,
}

impl SiteCalls {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
    pub fn get_me(&self) -> usize {
        self.get_me.load(Ordering::SeqCst)
    }
    pub fn login(&self) -> usize {
        self.login.load(Ordering::SeqCst)
    }
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
    pub fn batches_pulled(&self) -> usize {
        self.batches_pulled.load(Ordering::SeqCst)
    }
    pub fn event_filters(&self) -> Vec<EventFilter> {
        self.event_filters.lock().unwrap().clone()
    }
    pub fn observation_queries(&self) -> Vec<ObservationQuery> {
        self.observation_queries.lock().unwrap().clone()
    }
}

pub struct FakeSite {
    script: Script,
    pub calls: Arc<SiteCalls>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self {
            script: Script {
                me: Ok(UserProfile {
                    id: Some("c7d1bd9b-4b3d-4a57-a6b8-2cdd0b5f2bd7".to_string()),
                    username: Some("gundi_serviceaccount".to_string()),
                    is_active: true,
                    permissions: Default::default(),
                }),
                login: Ok(true),
                connect_error: None,
                events: Vec::new(),
                observations: Vec::new(),
                event_types: Vec::new(),
                subject_groups: Ok(Vec::new()),
            },
            calls: Arc::new(SiteCalls::default()),
        }
    }

    pub fn with_me(mut self, me: UserProfile) -> Self {
        self.script.me = Ok(me);
        self
    }

    pub fn with_me_error(mut self, e: SiteError) -> Self {
        self.script.me = Err(e);
        self
    }

    pub fn with_login_result(mut self, r: std::result::Result<bool, SiteError>) -> Self {
        self.script.login = r;
        self
    }

    pub fn with_connect_error(mut self, e: SiteError) -> Self {
        self.script.connect_error = Some(e);
        self
    }

    pub fn with_event_batches(mut self, batches: Vec<Batch>) -> Self {
        self.script.events = batches.into_iter().map(Ok).collect();
        self
    }

    pub fn with_observation_batches(mut self, batches: Vec<Batch>) -> Self {
        self.script.observations = batches.into_iter().map(Ok).collect();
        self
    }

    /// Append a failing batch after the scripted event batches.
    pub fn with_event_stream_error(mut self, e: SiteError) -> Self {
        self.script.events.push(Err(e));
        self
    }

    pub fn with_event_types(mut self, types: Vec<EventType>) -> Self {
        self.script.event_types = types;
        self
    }

    pub fn with_subject_groups(
        mut self,
        groups: std::result::Result<Vec<SubjectGroup>, SiteError>,
    ) -> Self {
        self.script.subject_groups = groups;
        self
    }
}

#[async_trait]
impl SiteConnector for FakeSite {
    async fn connect(
        &self,
        params: ConnectionParams,
    ) -> std::result::Result<Box<dyn SiteClient>, SiteError> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        self.calls.params.lock().unwrap().push(params);
        if let Some(e) = &self.script.connect_error {
            return Err(e.clone());
        }
        Ok(Box::new(FakeClient {
            script: self.script.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct FakeClient {
    script: Script,
    calls: Arc<SiteCalls>,
}

impl FakeClient {
    fn replay(&self, batches: Vec<std::result::Result<Batch, SiteError>>) -> BatchStream<'_> {
        let calls = self.calls.clone();
        futures_util::stream::iter(batches)
            .inspect(move |_| {
                calls.batches_pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

#[async_trait]
impl SiteClient for FakeClient {
    async fn get_me(&self) -> std::result::Result<UserProfile, SiteError> {
        self.calls.get_me.fetch_add(1, Ordering::SeqCst);
        self.script.me.clone()
    }

    async fn login(&self) -> std::result::Result<bool, SiteError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        self.script.login.clone()
    }

    fn get_events(&self, filter: EventFilter, _batch_size: usize) -> BatchStream<'_> {
        self.calls.event_filters.lock().unwrap().push(filter);
        self.replay(self.script.events.clone())
    }

    fn get_observations(&self, query: ObservationQuery, _batch_size: usize) -> BatchStream<'_> {
        self.calls.observation_queries.lock().unwrap().push(query);
        self.replay(self.script.observations.clone())
    }

    async fn get_event_types(&self) -> std::result::Result<Vec<EventType>, SiteError> {
        Ok(self.script.event_types.clone())
    }

    async fn get_subjectgroups(
        &self,
        flat: bool,
    ) -> std::result::Result<Vec<SubjectGroup>, SiteError> {
        self.calls.subjectgroup_flags.lock().unwrap().push(flat);
        self.script.subject_groups.clone()
    }

    async fn close(&self) {
        self.calls.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hub double that records every forwarded batch.
#[derive(Default)]
pub struct RecordingHub {
    pub events: Mutex<Vec<Vec<CanonicalEvent>>>,
    pub observations: Mutex<Vec<Vec<CanonicalObservation>>>,
    /// Fail the n-th (0-based) post call.
    fail_on_call: Option<usize>,
    posts: AtomicUsize,
}

impl RecordingHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_call(n: usize) -> Self {
        Self {
            fail_on_call: Some(n),
            ..Self::default()
        }
    }

    pub fn event_batches(&self) -> Vec<Vec<CanonicalEvent>> {
        self.events.lock().unwrap().clone()
    }

    pub fn observation_batches(&self) -> Vec<Vec<CanonicalObservation>> {
        self.observations.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        let n = self.posts.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(n) {
            return Err(Error::Hub("503 Service Unavailable".to_string()));
        }
        Ok(())
    }

    fn acks(n: usize) -> Vec<HubAck> {
        (0..n)
            .map(|i| HubAck {
                object_id: format!("obj-{i}"),
                created_at: "2023-11-17T09:20:00.000000Z".to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl Hub for RecordingHub {
    async fn post_events(
        &self,
        _integration_id: IntegrationId,
        events: &[CanonicalEvent],
    ) -> Result<Vec<HubAck>> {
        self.check()?;
        self.events.lock().unwrap().push(events.to_vec());
        Ok(Self::acks(events.len()))
    }

    async fn post_observations(
        &self,
        _integration_id: IntegrationId,
        observations: &[CanonicalObservation],
    ) -> Result<Vec<HubAck>> {
        self.check()?;
        self.observations
            .lock()
            .unwrap()
            .push(observations.to_vec());
        Ok(Self::acks(observations.len()))
    }
}
