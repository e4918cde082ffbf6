//! Tracer setup and management

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use std::sync::{Arc, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Global tracer provider holder
static TRACER_PROVIDER: OnceLock<Arc<TracerProvider>> = OnceLock::new();

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Initialize telemetry with human-readable logs, filtered by `RUST_LOG`
/// (default `info`).
pub fn init_telemetry() {
    init_telemetry_with(LogFormat::Pretty, "info");
}

/// Initialize telemetry with an explicit log format and fallback filter.
///
/// Installs a tracer provider, bridges `tracing` spans into OpenTelemetry and
/// adds a structured log layer. Calling it twice is a no-op for the second
/// call.
pub fn init_telemetry_with(format: LogFormat, default_filter: &str) {
    let tracer_provider = TracerProvider::builder().build();
    let tracer = tracer_provider.tracer(crate::attributes::SYSTEM_NAME);

    if TRACER_PROVIDER.set(Arc::new(tracer_provider)).is_err() {
        return;
    }

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("telemetry already initialized: {e}");
    }
}

/// Get the global tracer provider if initialized
pub fn tracer_provider() -> Option<Arc<TracerProvider>> {
    TRACER_PROVIDER.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_telemetry_with(LogFormat::Pretty, "warn");
        init_telemetry_with(LogFormat::Json, "warn");
        assert!(tracer_provider().is_some());
    }
}
