//! edgecore: HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                    EDGECORE                      │
//!                         │                                                  │
//!     Client Request      │  ┌────────────┐   ┌────────────┐   ┌──────────┐  │
//!     ────────────────────┼─▶│ request_log│──▶│ rate_limit │──▶│ dispatch │  │
//!                         │  │ (ID, time) │   │  (429)     │   │ (503)    │  │
//!                         │  └────────────┘   └────────────┘   └────┬─────┘  │
//!                         │                                         │        │
//!                         │                                         ▼        │
//!                         │                                  ┌────────────┐  │
//!                         │                                  │   pool     │  │
//!                         │                                  │ least_conn │  │
//!                         │                                  │ round_robin│  │
//!                         │                                  └─────┬──────┘  │
//!                         │                                        │         │
//!     Client Response     │                                  ┌─────▼──────┐  │
//!     ◀───────────────────┼──────────────────────────────────│  upstream  │◀─┼── Backend
//!                         │                                  │  (502)     │  │
//!                         │                                  └────────────┘  │
//!                         │  ┌────────────────────────────────────────────┐  │
//!                         │  │ health monitor, reload, shutdown, metrics  │  │
//!                         │  └────────────────────────────────────────────┘  │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use edgecore::config::{load_config, LogFormat};
use edgecore::lifecycle::startup;
use edgecore::observability::logging;

#[derive(Parser)]
#[command(name = "edgecore")]
#[command(about = "HTTP load balancer with health checks and rate limiting", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured log format.
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Pretty,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!("{}: configuration OK", cli.config.display());
        return ExitCode::SUCCESS;
    }

    let format = cli
        .log_format
        .map(LogFormat::from)
        .unwrap_or(config.observability.log_format);
    if let Err(e) = logging::init(&config.observability.log_level, format) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.bind_address(),
        backends = config.backends.len(),
        rate = config.rate_limit,
        burst = config.burst,
        "edgecore starting"
    );

    match startup::run(&cli.config, config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
