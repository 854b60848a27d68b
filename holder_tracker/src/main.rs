use std::sync::Arc;

use abi::TokenConfig;
use anyhow::Result;
use holder_tracker::broadcast::SubscriberHub;
use holder_tracker::config::Config;
use holder_tracker::metadata::{resolve_decimals, resolve_pump_data};
use holder_tracker::server::{routes, AppState};
use holder_tracker::snapshot::committed_channel;
use holder_tracker::upstream::{HeliusClient, PumpFunClient};
use holder_tracker::worker::{Tracker, TrackerSettings, TrackerStatus};
use log::{error, info};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    info!("Using token mint address: {}", config.mint);

    let helius = Arc::new(HeliusClient::new(config.helius_url.clone())?);

    let pump_data = if config.pump_fun {
        let pump = PumpFunClient::new(config.pump_api_url.clone())?;
        Some(resolve_pump_data(&pump, &config.mint).await?)
    } else {
        None
    };

    let decimals = if config.resolve_decimals {
        resolve_decimals(helius.as_ref(), &config.mint, config.default_decimals).await
    } else {
        config.default_decimals
    };

    let bonding_curve_address = config
        .bonding_curve_address
        .clone()
        .or_else(|| pump_data.as_ref().map(|p| p.bonding_curve_address.clone()));
    if bonding_curve_address.is_none() {
        info!("No bonding curve address configured, bonding curve tagging disabled");
    }

    let token_config = TokenConfig {
        mint: config.mint.clone(),
        decimals,
        bonding_curve_address: bonding_curve_address.clone(),
        liquidity_pool_address: config.liquidity_pool_address.clone(),
    };

    let (writer, reader) = committed_channel();
    let hub = Arc::new(SubscriberHub::new());
    let status = Arc::new(TrackerStatus::default());

    let tracker = Tracker::new(
        TrackerSettings {
            mint: config.mint.clone(),
            decimals,
            page_limit: config.page_limit,
            max_pages: config.max_pages,
            poll_interval: config.poll_interval,
            guard: config.guard,
            bonding_curve_address,
            liquidity_pool_address: config.liquidity_pool_address.clone(),
        },
        helius,
        hub.clone(),
        writer,
        status.clone(),
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn(tracker.run(async move {
        let _ = stop_rx.await;
    }));

    let state = Arc::new(AppState {
        sink: hub.clone(),
        hub,
        reader,
        token_config,
        pump_data,
        status,
    });

    let (addr, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(
        config.listen,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        },
    )?;
    info!("Server running on {}", addr);
    server.await;

    info!("Shutting down");
    let _ = stop_tx.send(());
    worker.await?;

    Ok(())
}
