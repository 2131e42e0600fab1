use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use listing_processor::config::Config;
use listing_processor::health::HealthRegistry;
use listing_processor::server::{router, serve, setup_metrics_recorder};
use listing_processor::service::ListingService;

fn start_server(config: &Config, liveness: HealthRegistry) -> Result<JoinHandle<()>> {
    let metrics = if config.export_prometheus {
        Some(setup_metrics_recorder().context("Failed to install metrics recorder")?)
    } else {
        None
    };
    let router = router(liveness, metrics);
    let bind = config.bind_address();

    Ok(tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("failed to start serving metrics: {e}");
        }
    }))
}

async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl+c: {e}");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = term.recv() => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_with_defaults()
        .context("Failed to load configuration from environment variables")?;

    let log_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_filter(EnvFilter::from_default_env())
        .boxed();
    tracing_subscriber::registry().with(log_layer).init();

    info!("Starting listing processor");
    info!("Configuration loaded: {:?}", config);

    let liveness = HealthRegistry::new("liveness");

    let server_handle = start_server(&config, liveness.clone())?;
    info!("Started metrics server on {}", config.bind_address());

    let service = ListingService::new(config, liveness)
        .await
        .context("Failed to create listing service")?;

    // blocks until a stage stops or a signal arrives
    let result = service.run_with_shutdown(shutdown_signal()).await;

    server_handle.abort();
    result
}
