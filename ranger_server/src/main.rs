use clap::Parser;
use ranger_core::config::RangerConfig;
use ranger_core::models::{ActionId, IntegrationId};
use ranger_server::cli::{Cli, Commands};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // JSON logs by default; RANGER_LOG_FORMAT=pretty for local runs.
    ranger_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();

    let cmd = cli.command.unwrap_or(Commands::Serve {
        host: "0.0.0.0".to_string(),
        port: 8080,
    });

    match cmd {
        Commands::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let cfg = RangerConfig::from_env()?;
            let runner = ranger_server::wiring::build_runner(&cfg).await?;
            ranger_server::server::serve(addr, ranger_server::server::AppState::new(runner))
                .await?;
        }
        Commands::Execute {
            integration,
            action,
            overrides,
        } => {
            let action: ActionId = action.parse()?;
            let overrides = overrides
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;
            let cfg = RangerConfig::from_env()?;
            let runner = ranger_server::wiring::build_runner(&cfg).await?;
            let output = runner
                .execute(IntegrationId(integration), action, overrides)
                .await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Integrations => {
            let cfg = RangerConfig::from_env()?;
            let directory = ranger_server::wiring::load_directory(&cfg).await?;
            let listing = ranger_server::wiring::integration_summaries(directory.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Config => {
            use ranger_server::wiring::redact;

            let cfg = RangerConfig::from_env()?;
            let out = serde_json::json!({
                "state_backend": cfg.state_backend.as_str(),
                "sqlite_path": cfg.sqlite_path.display().to_string(),
                "redis_url": cfg.redis_url.as_deref().map(redact),
                "redis_key_prefix": cfg.redis_key_prefix,
                "hub_url": cfg.hub.url,
                "hub_api_key": cfg.hub.api_key.as_ref().map(|_| "<set>"),
                "site_connect_timeout_ms": cfg.site_connect_timeout.as_millis() as u64,
                "batch_size": cfg.batch_size,
                "integrations_file": cfg.integrations_file.map(|p| p.display().to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
