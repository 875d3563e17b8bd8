//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug,tickbar=debug"
    } else {
        "info,tickbar=info"
    }
}

/// Initialize structured logging on stderr.
///
/// `RUST_LOG` wins over `verbose`. JSON output when `RUST_ENV=production`,
/// pretty output otherwise. Stdout is left to the bar writer.
pub fn init_logging(verbose: bool) -> TelemetryResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let result = if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "info,tickbar=info");
        assert_eq!(default_directive(true), "debug,tickbar=debug");
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever call comes first in this process wins the global slot
        let _ = init_logging(false);
        let err = init_logging(false).unwrap_err();
        assert!(matches!(err, TelemetryError::LoggingInit(_)));
    }
}
