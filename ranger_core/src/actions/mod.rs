pub mod config;
pub mod credentials;
pub mod permissions;
pub mod pull;
pub mod runner;
pub mod transform;

pub use config::{
    AuthMode, AuthenticateConfig, AuthenticationType, PullEventsConfig, PullObservationsConfig,
    PullWindowConfig, ShowPermissionsConfig,
};
pub use credentials::{CredentialsCheck, validate_credentials};
pub use permissions::{PermissionsReport, show_permissions};
pub use pull::{EventsExtracted, ObservationsExtracted, PullPipeline};
pub use runner::{ActionOutput, ActionRunner};
