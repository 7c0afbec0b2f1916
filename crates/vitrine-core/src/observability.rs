//! Observability infrastructure: structured logging with consistent spans.
//!
//! Replication errors are never surfaced to end users, so logs and spans are
//! the primary way operators see builder and synchronizer behavior.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times; subsequent
/// calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: controls log levels (e.g., `info`, `vitrine_sync=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for snapshot builder operations.
#[must_use]
pub fn builder_span(operation: &str, force_full: bool) -> Span {
    tracing::info_span!("builder", op = operation, force_full = force_full)
}

/// Creates a span for synchronizer cycles.
#[must_use]
pub fn sync_span(operation: &str, local_version: Option<u64>) -> Span {
    tracing::info_span!("sync", op = operation, local_version = local_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = builder_span("build", false);
        let _guard = span.enter();
        tracing::info!("test message in span");

        let span = sync_span("cycle", Some(42));
        let _guard = span.enter();
        tracing::info!("test message in span");
    }
}
