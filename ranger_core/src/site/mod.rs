//! Contract with the site API client.
//!
//! The HTTP implementation lives in `ranger_integrations`; the pipeline only
//! sees these traits, so tests substitute in-crate fakes.

pub mod models;

pub use models::{
    DateRange, EventCategory, EventFilter, EventType, ObservationQuery, Subject, SubjectGroup,
    UserProfile,
};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use secrecy::SecretString;
use std::time::Duration;

/// Error surface of the site API.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    #[error("bad credentials: {0}")]
    BadCredentials(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("site returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("failed to connect to site: {0}")]
    Connect(String),

    #[error("site request timed out: {0}")]
    Timeout(String),

    #[error("failed to decode site response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl SiteError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SiteError::PermissionDenied(_))
    }
}

/// One chunk of raw site records, as delivered.
pub type Batch = Vec<serde_json::Value>;

/// Single-pass, lazily produced sequence of batches.
pub type BatchStream<'a> = BoxStream<'a, Result<Batch, SiteError>>;

/// Everything a connector needs to open a session against one site.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub service_root: String,
    pub token_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub token: Option<SecretString>,
    pub connect_timeout: Duration,
}

/// An open session with the site API.
///
/// Sessions are scoped to one action invocation. Callers must `close` on
/// every exit path.
#[async_trait]
pub trait SiteClient: Send + Sync {
    /// Profile of the authenticated caller ("who am I").
    async fn get_me(&self) -> Result<UserProfile, SiteError>;

    /// Password-grant login. `Ok(false)` means the site rejected the pair.
    async fn login(&self) -> Result<bool, SiteError>;

    fn get_events(&self, filter: EventFilter, batch_size: usize) -> BatchStream<'_>;

    fn get_observations(&self, query: ObservationQuery, batch_size: usize) -> BatchStream<'_>;

    async fn get_event_types(&self) -> Result<Vec<EventType>, SiteError>;

    /// Subject groups; `flat = false` returns the nested tree.
    async fn get_subjectgroups(&self, flat: bool) -> Result<Vec<SubjectGroup>, SiteError>;

    async fn close(&self);
}

/// Opens site sessions.
#[async_trait]
pub trait SiteConnector: Send + Sync {
    async fn connect(&self, params: ConnectionParams) -> Result<Box<dyn SiteClient>, SiteError>;
}
