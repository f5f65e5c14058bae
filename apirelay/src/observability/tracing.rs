//! Structured logging with optional OpenTelemetry export

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn json_layer<S>(log_level: Option<&str>) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));

    fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(filter)
}

/// JSON logs to stdout, no exporter. Safe to call more than once.
pub fn init_logging(log_level: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(json_layer(log_level))
        .try_init();
}

/// JSON logs plus an OTLP span exporter. Must run inside a Tokio runtime.
pub async fn init_tracing_with_otel(
    service_name: &str,
    otlp_endpoint: &str,
    log_level: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_service_name(service_name.to_string())
                .with_attributes([KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))])
                .build(),
        )
        .build();

    let tracer = provider.tracer(service_name.to_string());
    opentelemetry::global::set_tracer_provider(provider);

    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(json_layer(log_level))
            .with(otel_layer),
    )?;

    tracing::info!(
        service = service_name,
        otlp_endpoint = otlp_endpoint,
        "OpenTelemetry tracing initialized"
    );

    Ok(())
}

/// Shutdown tracing and flush remaining spans
pub fn shutdown_tracing() {
    // Batch exporter flushes on drop; give it a moment
    std::thread::sleep(Duration::from_millis(100));
}

/// Span covering one inbound request; `http.status_code` is recorded on completion
pub fn http_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "http_request",
        http.method = method,
        http.route = path,
        http.status_code = tracing::field::Empty,
        otel.kind = "server"
    )
}

/// Span covering one outbound relay call
pub fn relay_span(config_id: i64, method: &str, url: &str) -> tracing::Span {
    tracing::info_span!(
        "relay_call",
        config.id = config_id,
        http.method = method,
        http.url = url,
        otel.kind = "client"
    )
}
