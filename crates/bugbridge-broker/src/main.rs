use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::Router;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use bugbridge_broker::{
    config::BrokerConfig,
    entitlement::{AllowAllGate, AllowlistGate, EntitlementGate},
    http,
    rate_limit::RateLimiter,
};
use bugbridge_core::{
    ConnectionLifecycle, FsCredentialStore, HealthProbe, RequestExecutor, StateKey,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run().await {
        tracing::error!("broker shut down with error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing::info!(component = "broker", "bugbridge broker starting up");

    let config = BrokerConfig::from_env()?;

    let store = Arc::new(FsCredentialStore::new(config.credentials_dir.clone())?);
    let http_client = config.tracker.http_client()?;
    let state_key = StateKey::new(&config.state_key)?;

    let executor = Arc::new(RequestExecutor::new(
        config.tracker.clone(),
        http_client.clone(),
        store.clone(),
    ));
    let probe = Arc::new(HealthProbe::new(
        config.tracker.clone(),
        http_client.clone(),
        executor.clone(),
        store.clone(),
    ));
    let lifecycle = Arc::new(ConnectionLifecycle::new(
        config.tracker.clone(),
        http_client.clone(),
        store.clone(),
        state_key,
    ));

    let entitlements: Arc<dyn EntitlementGate> = match &config.entitled_owners {
        Some(owners) => Arc::new(AllowlistGate::new(owners.iter().cloned())),
        None => {
            tracing::info!("TRACKER_ENTITLED_OWNERS not set; admitting all owners");
            Arc::new(AllowAllGate)
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window,
    ));

    let context = http::AppContext {
        tracker: config.tracker.clone(),
        http: http_client,
        store,
        executor,
        probe,
        lifecycle,
        entitlements,
        rate_limiter,
        app_base_url: config.app_base_url.clone(),
    };
    let shared_context = Arc::new(context);

    let router: Router = http::router(shared_context);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
