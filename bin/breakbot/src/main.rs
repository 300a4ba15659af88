use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, MarketData, Notifier, OrderGateway, TradeSide, TradingMode};
use engine::{BinanceClient, BinanceMarket, Engine, OrderExecutor, Orchestrator, SqliteStore, Track};
use paper::PaperClient;
use strategy::StrategyFileConfig;
use telegram_alerts::{LogNotifier, TelegramNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid environment configuration")?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("failed to load {}", cfg.strategy_config_path))?;
    info!(mode = %cfg.trading_mode, config = %cfg.strategy_config_path, "BreakBot starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let options = SqliteConnectOptions::from_str(&cfg.database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let db = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .context("failed to connect to database")?;
    let store = SqliteStore::new(db);
    store.migrate().await.context("database migration failed")?;
    info!("Database ready");

    // ── Notifications ─────────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match &cfg.telegram_token {
        Some(token) if !cfg.telegram_chat_ids.is_empty() => {
            info!(chats = cfg.telegram_chat_ids.len(), "Telegram alerts enabled");
            Arc::new(TelegramNotifier::new(token.clone(), &cfg.telegram_chat_ids))
        }
        _ => {
            warn!("No Telegram token or chat IDs, alerts go to the log only");
            Arc::new(LogNotifier)
        }
    };

    // ── Tracks (long on spot, short on futures) ───────────────────────────────
    let mut tracks = Vec::new();
    for side in TradeSide::ALL {
        let market = match side {
            TradeSide::Long => BinanceMarket::Spot,
            TradeSide::Short => BinanceMarket::Futures,
        };
        let (data, gateway) = exchange_for(&cfg, market)?;
        tracks.push(Track {
            side,
            config: strategy_file.track(side).clone(),
            market: data,
            executor: OrderExecutor::new(gateway),
        });
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let orchestrator = Orchestrator::new(
        strategy_file.params.clone(),
        tracks,
        Arc::new(store),
        notifier.clone(),
    );
    let (engine, handle) = Engine::new(orchestrator, cfg.poll_interval, notifier);

    let shutdown = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping after the current cycle");
            shutdown.stop();
        }
    });

    if let Err(e) = engine.run().await {
        error!(error = %e, "Engine halted");
        return Err(e).context("trading loop terminated");
    }
    info!("Exiting");
    Ok(())
}

/// Market data source and order gateway for one Binance market.
fn exchange_for(
    cfg: &Config,
    market: BinanceMarket,
) -> anyhow::Result<(Arc<dyn MarketData>, Arc<dyn OrderGateway>)> {
    match cfg.trading_mode {
        TradingMode::Live => {
            let (Some(key), Some(secret)) = (&cfg.binance_api_key, &cfg.binance_secret) else {
                anyhow::bail!("live mode requires BINANCE_API_KEY and BINANCE_SECRET");
            };
            let client = Arc::new(BinanceClient::new(market, key.clone(), secret.clone())?);
            let data: Arc<dyn MarketData> = client.clone();
            let gateway: Arc<dyn OrderGateway> = client;
            Ok((data, gateway))
        }
        TradingMode::Paper => {
            info!(?market, slippage_bps = cfg.paper_slippage_bps, "Paper orders on live klines");
            let data: Arc<dyn MarketData> = Arc::new(BinanceClient::public(market)?);
            let gateway: Arc<dyn OrderGateway> = Arc::new(PaperClient::new(cfg.paper_slippage_bps));
            Ok((data, gateway))
        }
    }
}
