//! Berth API server

use berth_cloud::aws::AwsProvider;
use berth_orchestrator::{EnvironmentOrchestrator, Reaper, ReaperConfig};
use berth_server::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    berth_utils::logging::init()?;

    let config = berth_utils::Config::from_env()?;
    info!(region = %config.cloud.region, "initializing provider");

    let provider = Arc::new(AwsProvider::new(config.cloud.clone()).await?);
    let environments = EnvironmentOrchestrator::new(
        provider,
        config.orchestrator.clone(),
        config.cloud.domain.clone(),
    );

    let mut reaper = None;
    if config.reaper.enabled {
        info!(interval_secs = config.reaper.interval_secs, "starting reaper");
        reaper = Some(Reaper::start(
            ReaperConfig {
                interval: Duration::from_secs(config.reaper.interval_secs),
            },
            environments.clone(),
        ));
    }

    let state = Arc::new(AppState { environments });
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Berth server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    if let Some(handle) = reaper.as_mut() {
        handle.stop();
    }

    Ok(())
}
