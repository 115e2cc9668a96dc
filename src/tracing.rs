//! Logging and OpenTelemetry tracing
//!
//! Console logs are always on. When an OTLP endpoint is configured, spans
//! (`diagnosis_session` → `llm_call` / `remote_command`) are also exported so a
//! whole session can be followed by its trace_id.
//!
//! # Architecture
//!
//! ```text
//! sshdiag ─┬→ stdout (fmt layer, filtered by RUST_LOG)
//!          └→ OTLP (gRPC) → OTel Collector → trace backend   [optional]
//! ```

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "info,sshdiag=debug";

/// Initialize the tracing subsystem
///
/// # Arguments
/// * `service_name` - Name for the service in traces
/// * `otlp_endpoint` - OTLP collector URL; `None` keeps logging console-only
pub fn init_tracing(
    service_name: &str,
    otlp_endpoint: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let otel_layer = match otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint);

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name.to_string()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(runtime::Tokio)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    match otlp_endpoint {
        Some(endpoint) => tracing::info!(service = service_name, endpoint, "OpenTelemetry tracing initialized"),
        None => tracing::info!(service = service_name, "Console logging initialized"),
    }

    Ok(())
}

/// Flush pending spans to the collector
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("Tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
