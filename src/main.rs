mod activity;
mod api;
mod chain;
mod config;
mod error;
mod pow;
mod session;
mod submission;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use primitive_types::U256;

use api::AppState;
use chain::{MemoryChain, format_address, format_ether};
use config::Config;
use session::{MinerClient, StaticWallet};

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let chain = Arc::new(MemoryChain::new(
        config.owner,
        config.difficulty.value(),
        config.reward,
        U256::zero(),
    ));
    chain.fund(config.funding);
    info!(
        "CHAIN - dev contract owned by {} (difficulty={}, reward={} ETH, balance={} ETH)",
        format_address(&config.owner),
        config.difficulty,
        format_ether(config.reward),
        format_ether(config.funding)
    );

    let wallet = Arc::new(StaticWallet::new(config.account));
    let client = Arc::new(MinerClient::new(chain, wallet, config.history_from_block));

    // Drives the submit cooldown and message expiry.
    let ticker = client.clone();
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await;
        loop {
            interval.tick().await;
            ticker.tick();
        }
    });

    let host = config.host.clone();
    let port = config.port;
    println!("⛏️ Starting miner API at http://{host}:{port}");

    let state = web::Data::new(AppState { client });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
