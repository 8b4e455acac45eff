//! Raw site records -> canonical hub schema.
//!
//! Pure and per-record: a record that cannot be mapped is logged and dropped,
//! its siblings are kept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const OBSERVATION_SOURCE_PREFIX: &str = "er-src-";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("record is not a JSON object (found {0})")]
    NotAnObject(&'static str),
    #[error("field '{field}' has unexpected type {found}")]
    UnexpectedType { field: &'static str, found: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lon: Value,
    pub lat: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub additional: Map<String, Value>,
}

impl CanonicalEvent {
    fn promoted_keys(&self) -> Vec<&'static str> {
        [
            ("event_type", self.event_type.is_some()),
            ("title", self.title.is_some()),
            ("recorded_at", self.recorded_at.is_some()),
            ("geometry", self.geometry.is_some()),
            ("event_details", self.event_details.is_some()),
            ("location", self.location.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, present)| present.then_some(key))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub additional: Map<String, Value>,
}

impl CanonicalObservation {
    fn promoted_keys(&self) -> Vec<&'static str> {
        [
            ("recorded_at", self.recorded_at.is_some()),
            ("source", self.source.is_some()),
            ("location", self.location.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, present)| present.then_some(key))
        .collect()
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(records = events.len()))]
pub fn transform_events(events: &[Value]) -> Vec<CanonicalEvent> {
    events
        .iter()
        .filter_map(|raw| match transform_event(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::error!(
                    attention_needed = true,
                    error = %e,
                    record = %raw,
                    "error transforming event"
                );
                None
            }
        })
        .collect()
}

#[tracing::instrument(level = "debug", skip_all, fields(records = observations.len()))]
pub fn transform_observations(observations: &[Value]) -> Vec<CanonicalObservation> {
    observations
        .iter()
        .filter_map(|raw| match transform_observation(raw) {
            Ok(observation) => Some(observation),
            Err(e) => {
                tracing::error!(
                    attention_needed = true,
                    error = %e,
                    record = %raw,
                    "error transforming observation"
                );
                None
            }
        })
        .collect()
}

pub fn transform_event(raw: &Value) -> Result<CanonicalEvent, TransformError> {
    let record = as_record(raw)?;
    let mut event = CanonicalEvent {
        event_type: truthy(record, "event_type"),
        title: truthy(record, "title"),
        recorded_at: truthy(record, "created_at"),
        geometry: truthy(record, "geojson"),
        event_details: truthy(record, "event_details"),
        location: location(record)?,
        additional: Map::new(),
    };
    event.additional = leftovers(record, &event.promoted_keys());
    Ok(event)
}

pub fn transform_observation(raw: &Value) -> Result<CanonicalObservation, TransformError> {
    let record = as_record(raw)?;
    let source = truthy(record, "source").map(|source| match source {
        Value::String(s) => format!("{OBSERVATION_SOURCE_PREFIX}{s}"),
        other => format!("{OBSERVATION_SOURCE_PREFIX}{other}"),
    });
    let mut observation = CanonicalObservation {
        recorded_at: truthy(record, "recorded_at"),
        source,
        location: location(record)?,
        additional: Map::new(),
    };
    observation.additional = leftovers(record, &observation.promoted_keys());
    Ok(observation)
}

fn as_record(raw: &Value) -> Result<&Map<String, Value>, TransformError> {
    raw.as_object()
        .ok_or_else(|| TransformError::NotAnObject(type_name(raw)))
}

fn truthy(record: &Map<String, Value>, key: &str) -> Option<Value> {
    record.get(key).filter(|v| is_truthy(v)).cloned()
}

fn location(record: &Map<String, Value>) -> Result<Option<Location>, TransformError> {
    let Some(raw) = record.get("location").filter(|v| is_truthy(v)) else {
        return Ok(None);
    };
    let fields = raw.as_object().ok_or(TransformError::UnexpectedType {
        field: "location",
        found: type_name(raw),
    })?;
    Ok(Some(Location {
        lon: fields.get("longitude").cloned().unwrap_or(Value::Null),
        lat: fields.get("latitude").cloned().unwrap_or(Value::Null),
    }))
}

/// Every source field whose key the canonical output does not already carry.
fn leftovers(record: &Map<String, Value>, promoted: &[&str]) -> Map<String, Value> {
    record
        .iter()
        .filter(|(key, _)| !promoted.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
