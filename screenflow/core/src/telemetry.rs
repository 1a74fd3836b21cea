//! Logging bootstrap
//!
//! The library only emits `tracing` events. Hosts that have no subscriber of
//! their own call [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` if set and valid, else `screenflow_core=<level>`
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("screenflow_core={level}")))
}

/// Install a formatted subscriber on stderr
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_instead_of_panicking() {
        let _ = init_tracing("debug");
        assert!(init_tracing("debug").is_err());
    }
}
