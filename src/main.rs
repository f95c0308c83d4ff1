use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use greenlight::config::Config;
use greenlight::executor::{CommandEngine, UnconfiguredEngine, WorkflowEngine};
use greenlight::server::{ServerConfig, build_state, start_server};

#[derive(Parser)]
#[command(name = "greenlight")]
#[command(version, about = "Human-in-the-loop checkpoint orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestrator HTTP server
    Serve {
        /// Bind host (overrides GREENLIGHT_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides GREENLIGHT_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (CORS permissive for local frontends)
        #[arg(long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("greenlight=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port, dev } => {
            let mut config = Config::from_env()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            let engine: Arc<dyn WorkflowEngine> = match &config.engine_cmd {
                Some(line) => match CommandEngine::from_command_line(line) {
                    Some(engine) => {
                        info!(command = %line, "Using subprocess workflow engine");
                        Arc::new(engine)
                    }
                    None => bail!("GREENLIGHT_ENGINE_CMD is set but blank"),
                },
                None => {
                    info!(
                        "No engine command configured; executions will fail until \
                         GREENLIGHT_ENGINE_CMD is set"
                    );
                    Arc::new(UnconfiguredEngine)
                }
            };

            let server_config = ServerConfig::from_config(&config).with_dev_mode(dev);
            let state = build_state(&config, engine);
            start_server(server_config, state).await?;
        }
    }

    Ok(())
}
