//! Typed, validated action configurations.

use crate::time::iso8601;
use crate::{Error, Result};
use chrono::{DateTime, FixedOffset};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationType {
    Token,
    UsernamePassword,
}

/// Credential mode for the site API.
#[derive(Debug, Clone)]
pub enum AuthMode {
    Token {
        token: SecretString,
    },
    UsernamePassword {
        username: String,
        password: SecretString,
    },
}

/// Stored shape of the auth configuration, current or legacy.
///
/// The legacy layout carries no `authentication_type` flag; the mode is
/// inferred from which fields are populated.
#[derive(Debug, Default, Deserialize)]
pub struct RawAuthConfig {
    #[serde(default)]
    pub authentication_type: Option<AuthenticationType>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub token: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawAuthConfig")]
pub struct AuthenticateConfig {
    pub mode: AuthMode,
}

impl TryFrom<RawAuthConfig> for AuthenticateConfig {
    type Error = Error;

    fn try_from(raw: RawAuthConfig) -> Result<Self> {
        let token = non_empty_secret(raw.token);
        let username = raw.username.filter(|u| !u.trim().is_empty());
        let password = non_empty_secret(raw.password);

        let kind = match raw.authentication_type {
            Some(kind) => kind,
            None if token.is_some() => AuthenticationType::Token,
            None if username.is_some() || password.is_some() => {
                AuthenticationType::UsernamePassword
            }
            None => {
                return Err(Error::InvalidInput(
                    "Please provide either a token or username/password.".to_string(),
                ));
            }
        };

        let mode = match kind {
            AuthenticationType::Token => AuthMode::Token {
                token: token.ok_or_else(|| {
                    Error::InvalidInput("token is required for token authentication".to_string())
                })?,
            },
            AuthenticationType::UsernamePassword => match (username, password) {
                (Some(username), Some(password)) => AuthMode::UsernamePassword { username, password },
                (None, _) => {
                    return Err(Error::InvalidInput(
                        "username is required for username/password authentication".to_string(),
                    ));
                }
                (_, None) => {
                    return Err(Error::InvalidInput(
                        "password is required for username/password authentication".to_string(),
                    ));
                }
            },
        };
        Ok(Self { mode })
    }
}

fn non_empty_secret(secret: Option<SecretString>) -> Option<SecretString> {
    secret.filter(|s| !s.expose_secret().is_empty())
}

/// Window settings shared by both pull actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullWindowConfig {
    #[serde(with = "iso8601")]
    pub start_datetime: DateTime<FixedOffset>,
    #[serde(
        default,
        with = "iso8601::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_datetime: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub force_run_since_start: bool,
}

pub type PullEventsConfig = PullWindowConfig;
pub type PullObservationsConfig = PullWindowConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowPermissionsConfig {
    #[serde(default = "default_true")]
    pub include_subjects_from_subgroups_in_parent: bool,
}

impl Default for ShowPermissionsConfig {
    fn default() -> Self {
        Self {
            include_subjects_from_subgroups_in_parent: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Deserialize an action configuration from its merged JSON object.
pub fn parse_config<T: serde::de::DeserializeOwned>(
    action: crate::models::ActionId,
    data: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| Error::Configuration(format!("invalid {action} configuration: {e}")))
}
