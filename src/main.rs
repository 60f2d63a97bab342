// UBI Request Market - Main Entry Point
// Local HTTP shell over the marketplace plus the simulated network feed

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ubi_request_market::{router, AppState, MarketConfig, Marketplace, NetworkFeed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ubi_request_market=info")),
        )
        .init();

    let config = MarketConfig::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;

    // Initialize marketplace and the local user's wallet
    let market = Marketplace::with_retry_limit(config.retry_limit);
    let balance = market.open_account(&config.local_account, config.initial_balance);
    info!(account = %config.local_account, balance = %balance, "local wallet ready");

    // The feed idles until someone turns providing on
    let feed = NetworkFeed::new(market.clone(), config.feed.clone()).spawn();

    let app = router(AppState::from_config(market.clone(), &config));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server running");
    info!("endpoints: /requests, /requests/available, /requests/:id/{{cancel,accept,complete,fail,retry,fulfill}}, /providing, /accounts/:id/{{outgoing,incoming,fulfilled,summary}}, /stats");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.abort();
    let stats = market.stats();
    info!(
        requests = stats.total,
        escrowed = %stats.escrowed,
        forfeited = %stats.forfeited,
        "shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
