use axum::{routing::get, Router};
use futures::future::ready;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::error;

use crate::health::HealthRegistry;

const EXPONENTIAL_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

pub fn setup_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()?;
    Ok(handle)
}

/// Health routes and, when a recorder handle is given, the Prometheus endpoint.
pub fn router(liveness: HealthRegistry, metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(|| async { "listing processor" }))
        .route("/_readiness", get(|| async { "ok" }))
        .route(
            "/_liveness",
            get(move || {
                let liveness = liveness.clone();
                async move {
                    let status = liveness.get_status();
                    if !status.healthy {
                        let unhealthy: Vec<String> = status
                            .components
                            .iter()
                            .filter(|(_, component)| !component.is_healthy())
                            .map(|(name, component)| format!("{name}: {component:?}"))
                            .collect();
                        error!(
                            "Health check FAILED - unhealthy components: [{}]",
                            unhealthy.join(", ")
                        );
                    }
                    status
                }
            }),
        );

    match metrics {
        Some(handle) => router.route("/metrics", get(move || ready(handle.render()))),
        None => router,
    }
}

/// Bind a `TcpListener` on the provided bind address to serve a `Router` on it.
pub async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, router).await?;

    Ok(())
}
