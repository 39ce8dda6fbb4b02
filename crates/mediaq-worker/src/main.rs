//! Media job worker binary.

use tracing::{error, info, warn};

use mediaq_worker::metrics::init_metrics;
use mediaq_worker::{init_tracing, shutdown_signal, Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    // TLS for S3 and rediss:// connections
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    dotenvy::dotenv().ok();
    init_tracing();

    if !provider_installed {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting mediaq-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = &config.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            error!("Failed to start metrics exporter: {}", e);
            std::process::exit(1);
        }
    }

    let worker = match Worker::from_env(config).await {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to start worker: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = worker.run_until(shutdown_signal()).await {
        error!("Worker stopped with error: {}", e);
        std::process::exit(1);
    }
}
