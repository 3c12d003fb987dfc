use anyhow::Result;
use seventysix_query::{observability, AppState};
use shared::Config;
use std::time::Duration;
use tracing::{error, info, warn};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    observability::init_tracing(&config.app.log_level);

    let state = AppState::new(config)?;
    let gc = state.start_background_tasks();
    info!("🚀 Query layer started against {}", state.config.api.base_url);

    match state.health_service().get_status().await {
        Ok(health) => info!("💚 API health: {}", health.status),
        Err(e) => warn!("⚠️ API health probe failed: {}", e),
    }

    let report_every = Duration::from_secs(state.config.cache.gc_interval_seconds.max(1));
    let client = state.query_client.clone();
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(report_every);
        loop {
            ticker.tick().await;
            let stats = client.stats();
            info!(
                "📊 Cache: {} entries, hit rate {:.1}%, {} evictions",
                stats.entries,
                stats.hit_rate * 100.0,
                stats.evictions
            );
        }
    });

    shutdown_signal().await;
    reporter.abort();
    gc.abort();
    Ok(())
}
