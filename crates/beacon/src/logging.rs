//! Log subscriber setup

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, falling back to `default_directive`
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a formatted subscriber for the process
///
/// Fails if a global subscriber is already set.
pub fn init_logging(default_directive: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // The first call may lose to a subscriber installed elsewhere in the
        // process; either way one is installed afterwards.
        let first = init_logging("info");
        let second = init_logging("debug");

        assert!(second.is_err());
        if let Err(err) = first {
            assert!(err.to_string().contains("Failed to initialize logging"));
        }
    }
}
