use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "ranger", version, about = "Site connector: pull events and observations into the hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP dispatcher (default if no subcommand given).
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "RANGER_PORT", default_value = "8080")]
        port: u16,
    },

    /// Run one action for one integration and print the JSON result.
    Execute {
        /// Integration id (UUID).
        #[arg(long)]
        integration: Uuid,

        /// One of: auth, pull_events, pull_observations, show_permissions.
        #[arg(long)]
        action: String,

        /// JSON object merged over the stored action configuration.
        #[arg(long)]
        overrides: Option<String>,
    },

    /// List the integrations loaded from RANGER_INTEGRATIONS_FILE.
    Integrations,

    /// Print current configuration (redacted secrets).
    Config,
}
