//! Channel server binary.
//!
//! ```text
//! stagehand-server --config stagehand.toml --bind 0.0.0.0:54001
//! ```

use std::path::PathBuf;

use clap::Parser;
use stagehand::prelude::*;
use stagehand::telemetry::init_tracing;

/// Stage and session sync core of a game channel server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

/// Loads the config file, if any, and applies the command-line overrides.
///
/// Runs before tracing is installed, so it does not log.
fn resolve_config(args: &Args) -> Result<ChannelConfig, ChannelError> {
    let mut config = match &args.config {
        Some(path) => ChannelConfig::load(path)?,
        None => ChannelConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), ChannelError> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    init_tracing(&config.logging);

    match &args.config {
        Some(path) => tracing::info!(path = %path.display(), "loaded channel config"),
        None => tracing::info!("no config file given, using defaults"),
    }

    let server = ChannelServer::builder().config(config).start().await?;
    tracing::info!(addr = %server.local_addr(), "press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }
    server.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_config_without_file_uses_defaults() {
        let args = Args::parse_from(["stagehand-server"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.bind_addr, ChannelConfig::default().bind_addr);
    }

    #[test]
    fn test_resolve_config_bind_overrides_default() {
        let args = Args::parse_from(["stagehand-server", "--bind", "127.0.0.1:6000"]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:6000");
    }

    #[test]
    fn test_resolve_config_missing_file_fails() {
        let args =
            Args::parse_from(["stagehand-server", "--config", "/nonexistent/stagehand.toml"]);
        assert!(resolve_config(&args).is_err());
    }
}
