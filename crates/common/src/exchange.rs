use async_trait::async_trait;

use crate::{Bar, ClosedTrade, Fill, Order, Position, Result, TelemetryRow, TradeSide};

/// Source of OHLCV candles.
///
/// A failed fetch is reported as `Error::DataFetch`; the orchestrator skips
/// the symbol for the current cycle instead of aborting.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch the most recent `limit` bars, oldest first.
    async fn fetch_bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>>;
}

/// Abstraction over order placement.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Only `OrderExecutor` in `crates/engine` should hold a reference to a
/// `dyn OrderGateway`. A returned `Fill` is the only proof that an order
/// went through; callers never assume success without one.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit_order(&self, order: &Order) -> Result<Fill>;
}

/// Durable record of open positions, closed trades and telemetry.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn load_open_position(&self, symbol: &str, side: TradeSide) -> Result<Option<Position>>;

    /// Every open position on `side`, whatever symbol universe is configured.
    async fn load_open_positions(&self, side: TradeSide) -> Result<Vec<Position>>;

    async fn record_trade_open(&self, position: &Position) -> Result<()>;

    /// Persist a changed stop on an open position.
    async fn update_position(&self, position: &Position) -> Result<()>;

    async fn record_trade_close(&self, trade: &ClosedTrade) -> Result<()>;

    async fn append_telemetry_row(&self, row: &TelemetryRow) -> Result<()>;
}

/// Outbound operator notifications. Best effort: failures are logged by the
/// implementation and never surface to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}
