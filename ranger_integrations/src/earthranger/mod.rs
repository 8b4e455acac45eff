//! EarthRanger site API client.
//!
//! Authenticates with a static bearer token or, for username/password
//! integrations, a password-grant token fetched lazily from the token
//! endpoint and cached for the life of the session. Listings follow the
//! `next` link and yield one batch per page.

mod types;

use crate::earthranger::types::{Envelope, Listing, TokenResponse};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use ranger_core::site::{
    Batch, BatchStream, ConnectionParams, EventFilter, EventType, ObservationQuery, SiteClient,
    SiteConnector, SiteError, SubjectGroup, UserProfile,
};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens one `EarthRangerClient` per action invocation.
#[derive(Debug, Clone)]
pub struct EarthRangerConnector {
    request_timeout: Duration,
}

impl Default for EarthRangerConnector {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl EarthRangerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl SiteConnector for EarthRangerConnector {
    #[tracing::instrument(level = "debug", skip_all, fields(service_root = %params.service_root))]
    async fn connect(&self, params: ConnectionParams) -> Result<Box<dyn SiteClient>, SiteError> {
        Ok(Box::new(EarthRangerClient::new(
            params,
            self.request_timeout,
        )?))
    }
}

pub struct EarthRangerClient {
    http: reqwest::Client,
    service_root: String,
    token_url: String,
    client_id: String,
    username: Option<String>,
    password: Option<SecretString>,
    token: Option<SecretString>,
    access_token: Mutex<Option<SecretString>>,
}

impl EarthRangerClient {
    pub fn new(params: ConnectionParams, request_timeout: Duration) -> Result<Self, SiteError> {
        let http = reqwest::Client::builder()
            .connect_timeout(params.connect_timeout)
            .timeout(request_timeout)
            .user_agent(concat!("ranger/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SiteError::Other(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            service_root: params.service_root.trim_end_matches('/').to_string(),
            token_url: params.token_url,
            client_id: params.client_id,
            username: params.username,
            password: params.password,
            token: params.token,
            access_token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.service_root, path.trim_start_matches('/'))
    }

    async fn bearer(&self) -> Result<SecretString, SiteError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let fresh = self.request_token().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn request_token(&self) -> Result<SecretString, SiteError> {
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Err(SiteError::BadCredentials(
                "no token or username/password configured".to_string(),
            ));
        };
        let form = [
            ("grant_type", "password"),
            ("username", username.as_str()),
            ("password", password.expose_secret().as_str()),
            ("client_id", self.client_id.as_str()),
        ];
        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        if resp.status() == StatusCode::BAD_REQUEST {
            let body = resp.text().await.unwrap_or_default();
            return Err(SiteError::BadCredentials(body));
        }
        let resp = check_status(resp).await?;
        let token: TokenResponse = resp.json().await.map_err(transport_error)?;
        tracing::debug!(
            token_type = token.token_type.as_deref().unwrap_or("bearer"),
            expires_in = token.expires_in,
            "obtained access token"
        );
        Ok(SecretString::new(token.access_token))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SiteError> {
        let token = self.bearer().await?;
        let resp = self
            .http
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;
        let resp = check_status(resp).await?;
        let envelope: Envelope<T> = resp.json().await.map_err(transport_error)?;
        Ok(envelope.data)
    }

    /// Walk a listing page by page. Empty pages are not yielded.
    fn paginate<'a>(
        &'a self,
        path: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> impl Stream<Item = Result<Batch, SiteError>> + Send + 'a {
        try_stream! {
            let mut url = self.url(path);
            let mut query = query;
            loop {
                let listing: Listing = self.get_json(&url, &query).await?;
                let (items, next) = listing.into_parts();
                tracing::debug!(path, count = items.len(), "page fetched");
                if !items.is_empty() {
                    yield items;
                }
                match next {
                    Some(next) if !next.trim().is_empty() => {
                        // The next link already carries the query.
                        url = next;
                        query.clear();
                    }
                    _ => break,
                }
            }
        }
    }
}

#[async_trait]
impl SiteClient for EarthRangerClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_me(&self) -> Result<UserProfile, SiteError> {
        self.get_json(&self.url("user/me"), &[]).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn login(&self) -> Result<bool, SiteError> {
        match self.request_token().await {
            Ok(token) => {
                *self.access_token.lock().await = Some(token);
                Ok(true)
            }
            Err(SiteError::BadCredentials(reason)) => {
                tracing::info!(%reason, "login rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn get_events(&self, filter: EventFilter, batch_size: usize) -> BatchStream<'_> {
        let filter = match serde_json::to_string(&filter) {
            Ok(filter) => filter,
            Err(e) => {
                let e = SiteError::Decode(format!("encode event filter: {e}"));
                return futures_util::stream::once(async move { Err(e) }).boxed();
            }
        };
        self.paginate(
            "activity/events",
            vec![("filter", filter), ("page_size", batch_size.to_string())],
        )
        .boxed()
    }

    fn get_observations(&self, query: ObservationQuery, batch_size: usize) -> BatchStream<'_> {
        let mut params = vec![
            ("since", query.start.to_rfc3339()),
            ("page_size", batch_size.to_string()),
        ];
        if let Some(end) = query.end {
            params.push(("until", end.to_rfc3339()));
        }
        self.paginate("observations", params).boxed()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_event_types(&self) -> Result<Vec<EventType>, SiteError> {
        self.get_json(&self.url("activity/events/eventtypes"), &[])
            .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_subjectgroups(&self, flat: bool) -> Result<Vec<SubjectGroup>, SiteError> {
        self.get_json(&self.url("subjectgroups"), &[("flat", flat.to_string())])
            .await
    }

    async fn close(&self) {
        self.access_token.lock().await.take();
        tracing::debug!(service_root = %self.service_root, "site session closed");
    }
}

async fn check_status(resp: Response) -> Result<Response, SiteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = if text.is_empty() {
        status.to_string()
    } else {
        text
    };
    Err(match status {
        StatusCode::UNAUTHORIZED => SiteError::BadCredentials(message),
        StatusCode::FORBIDDEN => SiteError::PermissionDenied(message),
        _ => SiteError::Http {
            status: status.as_u16(),
            message,
        },
    })
}

fn transport_error(e: reqwest::Error) -> SiteError {
    if e.is_timeout() {
        SiteError::Timeout(e.to_string())
    } else if e.is_connect() {
        SiteError::Connect(e.to_string())
    } else if e.is_decode() {
        SiteError::Decode(e.to_string())
    } else {
        SiteError::Other(e.to_string())
    }
}
