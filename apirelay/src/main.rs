//! Application entry point, responsible for parsing CLI args, loading config, and starting services

use apirelay::{
    Arc,
    app_state::AppState,
    config::Config,
    observability::{metrics::init_metrics, tracing::shutdown_tracing},
    server::{create_listener, serve},
    startup::{build_runtime, init_deferred_tracing, init_store, setup_logging},
};
use clap::Parser;

/// Stores remote API configs and relays uploaded files to them
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (YAML format)
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)?;
    let logging = setup_logging(&config);

    let rt = build_runtime(config.worker_threads)?;
    let workers = rt.metrics().num_workers();

    rt.block_on(async move {
        init_deferred_tracing(&logging).await;
        if config.metrics_enabled() {
            init_metrics(workers);
        }

        let store = init_store(&config).await?;
        let state = Arc::new(AppState::new(store.clone(), &config)?);

        let addr = config.listen.to_socket_addr()?;
        let listener = create_listener(addr)?;
        tracing::info!(
            addr = %addr,
            worker_threads = workers,
            "Listening on http://{}",
            addr
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        };
        serve(listener, state, shutdown).await?;

        store.close().await;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    })?;

    shutdown_tracing();
    Ok(())
}
