use crate::config::Config;
use crate::observability::tracing::init_logging;
use crate::store::{ConfigStore, StoreConfig};

const DEFAULT_POOL_SIZE: u32 = 5;

/// Tracing settings resolved from config; OTLP export needs a runtime, so
/// its initialization is deferred to [`init_deferred_tracing`].
#[derive(Debug, Clone)]
pub struct LoggingSetup {
    pub otlp_endpoint: Option<String>,
    pub log_level: Option<String>,
}

pub fn setup_logging(config: &Config) -> LoggingSetup {
    let tracing_config = config.modules.as_ref().and_then(|m| m.tracing.as_ref());
    let tracing_enabled = tracing_config.and_then(|t| t.enabled).unwrap_or(true);
    let otlp_endpoint = tracing_config
        .and_then(|t| t.otlp_endpoint.clone())
        .filter(|_| tracing_enabled);
    let log_level = config.log_level.clone();

    if otlp_endpoint.is_some() {
        eprintln!("Deferring tracing initialization to Tokio runtime (OpenTelemetry enabled)");
    } else {
        init_logging(log_level.as_deref());
    }

    LoggingSetup {
        otlp_endpoint,
        log_level,
    }
}

/// Install the OTLP pipeline if one was configured; falls back to plain logs
pub async fn init_deferred_tracing(setup: &LoggingSetup) {
    let Some(endpoint) = setup.otlp_endpoint.as_deref() else {
        return;
    };
    if let Err(e) = crate::observability::tracing::init_tracing_with_otel(
        env!("CARGO_PKG_NAME"),
        endpoint,
        setup.log_level.as_deref(),
    )
    .await
    {
        init_logging(setup.log_level.as_deref());
        tracing::warn!(error = %e, "OpenTelemetry unavailable, logging locally only");
    }
}

pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime, std::io::Error> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(n) = worker_threads.filter(|n| *n > 0) {
        builder.worker_threads(n);
    }
    builder.enable_all().build()
}

pub async fn init_store(config: &Config) -> Result<ConfigStore, Box<dyn std::error::Error + Send + Sync>> {
    let store = ConfigStore::connect(StoreConfig {
        url: config.database.resolve_url(),
        max_size: config.database.max_pool_size.unwrap_or(DEFAULT_POOL_SIZE),
    })
    .await?;
    store.initialize_schema().await?;
    Ok(store)
}
