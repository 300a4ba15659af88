use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::{Bar, ExitReason, Position, TradeSide};
use strategy::indicators::RsiIndicator;
use strategy::StrategyParams;

/// Exit parameters for an open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Unrealized profit ratio that ratchets the stop to entry (e.g. 0.05 = 5%).
    pub trailing_trigger_pct: f64,
    /// Long exits below this RSI, short exits above it.
    pub momentum_exit_rsi: f64,
    /// Momentum and trailing exits are ignored for this long after opening.
    pub cooldown_seconds: i64,
    pub rsi_period: usize,
}

impl MonitorConfig {
    pub fn from_params(params: &StrategyParams) -> Self {
        Self {
            trailing_trigger_pct: params.trailing_trigger_pct,
            momentum_exit_rsi: params.momentum_exit_rsi,
            cooldown_seconds: params.cooldown_seconds,
            rsi_period: params.rsi_period,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_params(&StrategyParams::default())
    }
}

/// Latest market view for one open position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketTick {
    pub price: f64,
    /// RSI from the short monitor timeframe, independent of the entry timeframe.
    pub momentum_rsi: Option<f64>,
    pub at: DateTime<Utc>,
}

impl MarketTick {
    /// Last close and its RSI. `None` when `bars` is empty.
    pub fn from_bars(bars: &[Bar], rsi_period: usize, at: DateTime<Utc>) -> Option<Self> {
        let price = bars.last()?.close;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Some(Self {
            price,
            momentum_rsi: RsiIndicator::new(rsi_period.max(1)).latest(&closes),
            at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorDecision {
    /// Keep the position. `stop_moved` asks the caller to persist the new stop.
    Hold { stop_moved: bool },
    Exit(ExitReason),
}

/// Exit state machine for an open position.
///
/// Hard stop-loss and take-profit apply at all times. Momentum and trailing
/// exits, including arming the trailing stop, wait until cooldown has passed.
#[derive(Debug, Clone, Default)]
pub struct PositionMonitor {
    config: MonitorConfig,
}

impl PositionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn in_cooldown(&self, position: &Position, at: DateTime<Utc>) -> bool {
        at - position.opened_at < Duration::seconds(self.config.cooldown_seconds)
    }

    /// Evaluate `position` against `tick`, ratcheting its stop in place when
    /// the trailing trigger is reached.
    pub fn evaluate(&self, position: &mut Position, tick: &MarketTick) -> MonitorDecision {
        let price = tick.price;
        if !position.is_open() || !price.is_finite() || price <= 0.0 {
            warn!(symbol = %position.symbol, price, "Skipping exit check on unusable price");
            return MonitorDecision::Hold { stop_moved: false };
        }

        let cooling = self.in_cooldown(position, tick.at);
        let mut stop_moved = false;

        if !cooling
            && !position.trailing_active
            && position.profit_ratio(price) >= self.config.trailing_trigger_pct
        {
            let old_stop = position.stop_loss;
            position.stop_loss = ratchet(position.side, old_stop, position.entry_price);
            position.trailing_active = true;
            stop_moved = true;
            info!(
                symbol = %position.symbol,
                side = %position.side,
                old_stop,
                new_stop = position.stop_loss,
                "Trailing stop armed"
            );
        }

        if stop_hit(position.side, price, position.stop_loss) {
            let reason = if position.trailing_active {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            return MonitorDecision::Exit(reason);
        }

        if target_hit(position.side, price, position.take_profit) {
            return MonitorDecision::Exit(ExitReason::TakeProfit);
        }

        if let Some(rsi) = tick.momentum_rsi {
            if momentum_lost(position.side, rsi, self.config.momentum_exit_rsi) {
                if cooling {
                    debug!(symbol = %position.symbol, rsi, "Momentum exit suppressed by cooldown");
                } else {
                    return MonitorDecision::Exit(ExitReason::MomentumExit);
                }
            }
        }

        MonitorDecision::Hold { stop_moved }
    }
}

/// Move `stop` to `entry` if that protects more profit; never loosens it.
pub fn ratchet(side: TradeSide, stop: f64, entry: f64) -> f64 {
    match side {
        TradeSide::Long => stop.max(entry),
        TradeSide::Short => stop.min(entry),
    }
}

fn stop_hit(side: TradeSide, price: f64, stop: f64) -> bool {
    match side {
        TradeSide::Long => price <= stop,
        TradeSide::Short => price >= stop,
    }
}

fn target_hit(side: TradeSide, price: f64, target: f64) -> bool {
    match side {
        TradeSide::Long => price >= target,
        TradeSide::Short => price <= target,
    }
}

fn momentum_lost(side: TradeSide, rsi: f64, threshold: f64) -> bool {
    match side {
        TradeSide::Long => rsi < threshold,
        TradeSide::Short => rsi > threshold,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
