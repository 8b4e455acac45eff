use crate::time::iso8601;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    /// Raw grants: permission key -> granted actions.
    #[serde(default)]
    pub permissions: BTreeMap<String, Vec<String>>,
}

/// Event filter as the site expects it, serialized to JSON on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFilter {
    pub date_range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    #[serde(with = "iso8601")]
    pub lower: DateTime<FixedOffset>,
    #[serde(
        with = "iso8601::option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub upper: Option<DateTime<FixedOffset>>,
}

impl EventFilter {
    pub fn between(lower: DateTime<FixedOffset>, upper: Option<DateTime<FixedOffset>>) -> Self {
        Self {
            date_range: DateRange { lower, upper },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCategory {
    pub value: String,
    #[serde(default)]
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub value: String,
    #[serde(default)]
    pub display: String,
    pub category: EventCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub subgroups: Vec<SubjectGroup>,
}
