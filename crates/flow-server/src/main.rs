use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use flow_server::config::{ServerMode, ServiceConfig};
use flow_server::logging::init_logging;
use flow_server::server::run_server;
use flow_server::state::AppState;

#[derive(Parser, Debug, Clone)]
#[command(name = "flowdeck-server")]
#[command(about = "HTTP server for named LLM flows")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "FLOWDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Server port (overrides PORT and the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// URL layout for flows
    #[arg(long, value_enum)]
    mode: Option<ServerMode>,
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    config.validate().context("validating configuration")?;
    Ok(config)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{:#}", err);
            std::process::exit(1);
        }
    };

    log::info!("Starting flowdeck-server");
    log::info!("  Default model: {}", config.default_model);
    log::info!("  Secondary model: {}", config.secondary_model);
    log::debug!("Configuration: {:?}", config);

    let state = match AppState::bootstrap(&config).await {
        Ok(state) => state,
        Err(err) => {
            log::error!("Startup failed: {}", err);
            std::process::exit(1);
        }
    };

    run_server(state, &config).await
}
