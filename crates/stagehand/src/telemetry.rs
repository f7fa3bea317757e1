//! Tracing setup for the channel binary.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// the configured level.
///
/// Returns `false` if a global subscriber was already installed (for
/// example by a test harness), in which case nothing changes.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_second_call_is_noop() {
        let config = LoggingConfig::default();
        init_tracing(&config);

        assert!(!init_tracing(&config));
    }
}
