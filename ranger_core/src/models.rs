use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
}

/// Identity of a configured connection to one site.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationId(pub Uuid);

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for IntegrationId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for IntegrationId {
    type Err = IdParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let id = Uuid::parse_str(s).map_err(|_| IdParseError::InvalidUuid(s.to_string()))?;
        Ok(Self(id))
    }
}

/// The actions this connector can execute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    Auth,
    PullEvents,
    PullObservations,
    ShowPermissions,
}

impl ActionId {
    pub const ALL: [ActionId; 4] = [
        ActionId::Auth,
        ActionId::PullEvents,
        ActionId::PullObservations,
        ActionId::ShowPermissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionId::Auth => "auth",
            ActionId::PullEvents => "pull_events",
            ActionId::PullObservations => "pull_observations",
            ActionId::ShowPermissions => "show_permissions",
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ActionId::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidInput(format!("unknown action '{s}'")))
    }
}

/// Stored configuration for one (integration, action) pair.
///
/// `data` stays untyped here; each handler validates it against its own
/// typed schema after overrides are merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfiguration {
    pub action: ActionId,
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A connection to one site: identity, base address and per-action settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    #[serde(default)]
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub configurations: Vec<ActionConfiguration>,
}

impl Integration {
    pub fn config_for(&self, action: ActionId) -> Option<&ActionConfiguration> {
        self.configurations.iter().find(|c| c.action == action)
    }
}
