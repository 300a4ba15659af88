use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV candle. Sequences of bars are always ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Candle open time.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading side. Long trades run on spot, short trades on futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub const ALL: [TradeSide; 2] = [TradeSide::Long, TradeSide::Short];

    /// +1 for long, -1 for short. Multiplies a price move into a profit move.
    pub fn direction(self) -> f64 {
        match self {
            TradeSide::Long => 1.0,
            TradeSide::Short => -1.0,
        }
    }

    /// Exchange order side that opens a position on this side.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            TradeSide::Long => OrderSide::Buy,
            TradeSide::Short => OrderSide::Sell,
        }
    }

    /// Exchange order side that closes a position on this side.
    pub fn exit_order_side(self) -> OrderSide {
        match self {
            TradeSide::Long => OrderSide::Sell,
            TradeSide::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Long => write!(f, "long"),
            TradeSide::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "long" => Ok(TradeSide::Long),
            "short" => Ok(TradeSide::Short),
            other => Err(Error::Other(format!("unknown trade side '{other}'"))),
        }
    }
}

/// Side of an exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Entry signal produced from the last bar of an evaluated sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub side: TradeSide,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Volume of the breakout bar.
    pub volume: f64,
    /// Ranking key across symbols. Never used for gating.
    pub score: f64,
    pub reason: String,
}

impl Signal {
    /// Rejects signals with non-finite or non-positive prices or volume.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("entry_price", self.entry_price),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
            ("volume", self.volume),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidSignal(format!("{name} is {value}")));
            }
        }
        if !self.score.is_finite() {
            return Err(Error::InvalidSignal(format!("score is {}", self.score)));
        }
        Ok(())
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MomentumExit,
    TrailingStop,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::MomentumExit => "momentum_exit",
            ExitReason::TrailingStop => "trailing_stop",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExitReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stop_loss" => Ok(ExitReason::StopLoss),
            "take_profit" => Ok(ExitReason::TakeProfit),
            "momentum_exit" => Ok(ExitReason::MomentumExit),
            "trailing_stop" => Ok(ExitReason::TrailingStop),
            other => Err(Error::Other(format!("unknown exit reason '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A position on one (symbol, side). At most one is open per side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_price: f64,
    /// Current stop. Only ever moves toward profit once the trailing stop arms.
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Base-asset quantity held.
    pub quantity: f64,
    /// Set once the stop has been ratcheted to entry.
    pub trailing_active: bool,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    /// Build an open position from an accepted signal and the confirmed fill.
    /// Entry, stop and target come from the signal; quantity from the fill.
    pub fn open(symbol: impl Into<String>, signal: &Signal, fill: &Fill) -> Self {
        Self {
            id: fill.order_id.clone(),
            symbol: symbol.into(),
            side: signal.side,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            quantity: fill.quantity,
            trailing_active: false,
            opened_at: fill.timestamp,
            status: PositionStatus::Open,
            exit_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Signed profit ratio at `price`, positive when the trade is in profit.
    pub fn profit_ratio(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.side.direction() * (price - self.entry_price) / self.entry_price
    }

    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

/// An order to be submitted to the exchange. Always a market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Closing orders must not flip a futures position.
    pub reduce_only: bool,
    /// Last observed price. Used by the paper gateway to simulate fills.
    pub reference_price: f64,
}

impl Order {
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        reference_price: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            reduce_only: false,
            reference_price,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Confirmation of a filled order returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// A position that has been closed on the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub closed_at: DateTime<Utc>,
    pub pnl_usd: f64,
    pub pnl_ratio: f64,
}

impl ClosedTrade {
    pub fn new(mut position: Position, reason: ExitReason, fill: &Fill) -> Self {
        let pnl_ratio = position.profit_ratio(fill.fill_price);
        let pnl_usd = pnl_ratio * position.notional();
        position.status = PositionStatus::Closed;
        position.exit_reason = Some(reason);
        Self {
            position,
            exit_price: fill.fill_price,
            exit_reason: reason,
            closed_at: fill.timestamp,
            pnl_usd,
            pnl_ratio,
        }
    }
}

/// One indicator snapshot, appended to the telemetry table for offline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub recorded_at: DateTime<Utc>,
    pub symbol: String,
    pub side: TradeSide,
    pub close: f64,
    pub rsi: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub price_change: Option<f64>,
    pub atr_pct: Option<f64>,
    pub adx: Option<f64>,
    pub signal: bool,
    pub score: f64,
    pub reason: String,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Current state of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Halted => write!(f, "halted"),
        }
    }
}
