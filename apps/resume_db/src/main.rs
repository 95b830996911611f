use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use resume_db::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env must be loaded before the filter reads RUST_LOG
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so rendered SQL and reports on stdout stay pipeable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directive())))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("resume_db v{}", env!("CARGO_PKG_VERSION"));

    run(cli).await
}

/// Fallback filter: this crate at the `RUST_LOG` level, `info` if unset.
fn log_directive() -> String {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    format!("{}={}", env!("CARGO_CRATE_NAME"), rust_log)
}
