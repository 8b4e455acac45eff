use crate::site::SiteError;
use std::error::Error as StdError;

/// Common error type for `ranger_core`.
///
/// Pull actions surface every variant to the caller. The auth action never
/// returns `Site` for credential problems; it folds them into its result.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Pre-flight failure: malformed base address, missing or invalid action
    /// configuration. Never reaches the network.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Raised by the site API while authenticating, streaming or fetching.
    #[error("site error: {0}")]
    Site(#[from] SiteError),

    #[error("hub error: {0}")]
    Hub(String),

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    pub fn backend(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
