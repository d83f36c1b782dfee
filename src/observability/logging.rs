//! # Logging
//!
//! `tracing` subscriber setup. The filter comes from `RUST_LOG` and falls
//! back to the given default directive.

use tracing::warn;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "unicorn_stack=info";

/// Install the global fmt subscriber
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging(default_filter: &str) {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .try_init()
    {
        warn!("Tracing subscriber already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(DEFAULT_LOG_FILTER);
        init_logging("debug");
        tracing::info!("logging initialized twice without panicking");
    }
}
