//! weft manager daemon.
//!
//! Loads a YAML configuration, validates it exhaustively, and serves the
//! hub (at the configured base URL) and the manager's node (under `/p`)
//! until interrupted.
//!
//! On validation failure every error is printed to stderr and the
//! process exits nonzero without starting.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use weft_manager::Manager;

/// Event-routing manager: hub, node, and rule engine in one process.
#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the manager configuration file
    #[arg(default_value = "weft.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging: --debug > --verbose > RUST_LOG env > default "warn"
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let manager = match Manager::from_file(&args.config) {
        Ok(manager) => manager,
        Err(errors) => {
            eprintln!(
                "{} configuration error(s) in {}:",
                errors.len(),
                args.config.display()
            );
            for (index, error) in errors.iter().enumerate() {
                eprintln!("  {}: {error}", index + 1);
            }
            std::process::exit(1);
        }
    };

    let port = manager.config().port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, base_url = %manager.config().base_url, "manager listening");

    let router = manager.router();
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    // The manager's node holds no actors of its own, but subscribing
    // keeps later registrations live immediately.
    manager.node().subscribe_all().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path() {
        let args = Args::try_parse_from(["weft"]).expect("no-arg invocation parses");
        assert_eq!(args.config, PathBuf::from("weft.yaml"));
        assert!(!args.debug);
        assert!(!args.verbose);
    }

    #[test]
    fn explicit_config_and_flags() {
        let args = Args::try_parse_from(["weft", "demos/manager.yaml", "-d", "-v"])
            .expect("flagged invocation parses");
        assert_eq!(args.config, PathBuf::from("demos/manager.yaml"));
        assert!(args.debug);
        assert!(args.verbose);
    }
}
