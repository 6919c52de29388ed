//! # Hookline Service
//!
//! Binary entry point for the Hookline webhook delivery service.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes logging
//! - Wires the delivery core around the HTTP transport and in-memory stores
//! - Starts the delivery worker pool, the retry scheduler and the HTTP server
//! - Drains in-flight deliveries on shutdown

mod scheduler;
mod settings;

use clap::Parser;
use hookline_api::config::LoggingConfig;
use hookline_api::{start_server, ServiceError};
use hookline_core::{Persistence, ReqwestTransport, WebhookService};
use scheduler::RetryScheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_BIND_FAILED: i32 = 1;
const EXIT_SERVER_FAILED: i32 = 2;
const EXIT_INVALID_CONFIG: i32 = 3;

/// Webhook event delivery service
#[derive(Debug, Parser)]
#[command(name = "hookline-service", version, about)]
struct Cli {
    /// Configuration file (YAML), applied over the default locations
    #[arg(long, env = "HOOKLINE_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut service_config = match settings::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default());
            error!(error = %e, "Failed to load configuration; aborting");
            std::process::exit(EXIT_INVALID_CONFIG);
        }
    };

    if let Some(port) = cli.port {
        service_config.server.port = port;
    }

    init_logging(&service_config.logging);
    info!("Starting Hookline Service");

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(EXIT_INVALID_CONFIG);
    }

    let transport = match ReqwestTransport::new(&service_config.transport_config()) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client; aborting");
            std::process::exit(EXIT_INVALID_CONFIG);
        }
    };

    let service = Arc::new(WebhookService::start(
        Persistence::in_memory(),
        transport,
        service_config.delivery_config(),
    ));

    let scheduler = if service_config.scheduler.enabled {
        Some(RetryScheduler::new(service.clone(), &service_config.scheduler).spawn())
    } else {
        info!("Retry scheduler disabled");
        None
    };

    let result = start_server(service_config, service.clone()).await;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }

    if service.shutdown().await {
        info!("Delivery worker pool drained");
    } else {
        warn!("Shutdown timeout reached with deliveries still running");
    }

    if let Err(e) = result {
        error!(error = %e, "HTTP server failed");

        let exit_code = match e {
            ServiceError::BindFailed { .. } => EXIT_BIND_FAILED,
            ServiceError::ServerFailed { .. } => EXIT_SERVER_FAILED,
            ServiceError::Configuration(_) => EXIT_INVALID_CONFIG,
        };
        std::process::exit(exit_code);
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) {
    let level = &config.level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "hookline_service={level},hookline_api={level},hookline_core={level},tower_http={level}"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
