//! Credential resolution and the auth action.

use crate::actions::config::{AuthMode, AuthenticateConfig, parse_config};
use crate::models::{ActionId, Integration};
use crate::site::{ConnectionParams, SiteClient, SiteConnector, SiteError};
use crate::{Error, Result};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const SERVICE_ROOT_PATH: &str = "/api/v1.0";
pub const TOKEN_PATH: &str = "/oauth2/token";
pub const CLIENT_ID: &str = "das_web_client";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Service root and token endpoint derived from an integration's base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEndpoints {
    pub service_root: String,
    pub token_url: String,
}

/// Rebuild the two fixed endpoints from scheme and host of `base_url`.
///
/// Path, query and credentials on the base address are discarded. An
/// explicit port is kept.
pub fn site_endpoints(base_url: &str) -> Result<SiteEndpoints> {
    let parsed = Url::parse(base_url.trim()).map_err(|e| {
        Error::configuration(format!("invalid base url '{base_url}': {e}"))
    })?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::configuration(format!("base url '{base_url}' has no host")))?;
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let origin = format!("{}://{}", parsed.scheme(), authority);
    Ok(SiteEndpoints {
        service_root: format!("{origin}{SERVICE_ROOT_PATH}"),
        token_url: format!("{origin}{TOKEN_PATH}"),
    })
}

/// The auth mode stored on the integration, required by every action that
/// talks to the site after the integration was set up.
pub fn stored_auth_mode(integration: &Integration) -> Result<AuthMode> {
    let stored = integration.config_for(ActionId::Auth).ok_or_else(|| {
        Error::configuration(format!(
            "Authentication settings for integration {} are missing. Please fix the integration setup in the portal.",
            integration.id
        ))
    })?;
    let config: AuthenticateConfig = parse_config(ActionId::Auth, stored.data.clone())?;
    Ok(config.mode)
}

pub fn connection_params(
    endpoints: SiteEndpoints,
    mode: &AuthMode,
    connect_timeout: Duration,
) -> ConnectionParams {
    let (username, password, token) = match mode {
        AuthMode::Token { token } => (None, None, Some(token.clone())),
        AuthMode::UsernamePassword { username, password } => {
            (Some(username.clone()), Some(password.clone()), None)
        }
    };
    ConnectionParams {
        service_root: endpoints.service_root,
        token_url: endpoints.token_url,
        client_id: CLIENT_ID.to_string(),
        username,
        password,
        token,
        connect_timeout,
    }
}

/// Result of the auth action. Credential problems never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsCheck {
    pub valid_credentials: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CredentialsCheck {
    pub fn valid(valid_credentials: bool) -> Self {
        Self {
            valid_credentials,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid_credentials: false,
            error: Some(error.into()),
        }
    }
}

/// Check the credentials in `data` against the integration's site.
///
/// Malformed addresses and incomplete configs are reported before any
/// connection is opened.
#[tracing::instrument(level = "debug", skip(connector, integration, data), fields(integration_id = %integration.id))]
pub async fn validate_credentials(
    connector: &dyn SiteConnector,
    integration: &Integration,
    data: serde_json::Value,
    connect_timeout: Duration,
) -> CredentialsCheck {
    let endpoints = match site_endpoints(&integration.base_url) {
        Ok(endpoints) => endpoints,
        Err(e) => return CredentialsCheck::invalid(e.to_string()),
    };
    let config: AuthenticateConfig = match serde_json::from_value(data) {
        Ok(config) => config,
        Err(e) => return CredentialsCheck::invalid(e.to_string()),
    };

    let params = connection_params(endpoints, &config.mode, connect_timeout);
    let client = match connector.connect(params).await {
        Ok(client) => client,
        Err(e) => return CredentialsCheck::invalid(e.to_string()),
    };
    let outcome = probe(client.as_ref(), &config.mode).await;
    client.close().await;

    match outcome {
        Ok(valid) => CredentialsCheck::valid(valid),
        Err(e) => {
            tracing::info!(error = %e, "site rejected credential probe");
            CredentialsCheck::invalid(e.to_string())
        }
    }
}

async fn probe(client: &dyn SiteClient, mode: &AuthMode) -> std::result::Result<bool, SiteError> {
    match mode {
        AuthMode::Token { token } => {
            tracing::debug!(token_len = token.expose_secret().len(), "checking token via user/me");
            Ok(client.get_me().await?.is_active)
        }
        AuthMode::UsernamePassword { username, .. } => {
            tracing::debug!(%username, "checking username/password via login");
            client.login().await
        }
    }
}
