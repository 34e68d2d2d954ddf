//! `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::FrameConfig;

/// Build the filter: `RUST_LOG` when set and valid, otherwise
/// `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a global fmt subscriber.
///
/// Fails if a global subscriber is already installed (for instance when
/// several tests race to initialize logging); callers that don't care can
/// ignore the error.
pub fn init_tracing(default_directive: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .try_init()
}

/// [`init_tracing`] with the directive from a [`FrameConfig`].
pub fn init_from_config(config: &FrameConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(&config.log_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_without_panicking() {
        let _ = init_tracing("warn");
        assert!(init_tracing("debug").is_err());
    }
}
