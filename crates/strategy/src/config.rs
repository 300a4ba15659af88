use serde::{Deserialize, Serialize};

use common::{Error, Result, TradeSide};

/// Longest accepted post-entry cooldown: one week.
pub const MAX_COOLDOWN_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Top-level strategy config file (TOML).
///
/// Example `config/strategy.toml`:
/// ```toml
/// [params]
/// stop_loss_pct = 0.03
/// take_profit_pct = 0.08
/// price_change_pct = 0.03
/// volume_mult = 2.0
///
/// [long]
/// symbols = ["BTCUSDT", "ETHUSDT"]
/// order_notional_usd = 50.0
///
/// [short]
/// symbols = ["BTCUSDT", "SOLUSDT"]
/// order_notional_usd = 50.0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub params: StrategyParams,
    #[serde(default)]
    pub long: TrackConfig,
    #[serde(default)]
    pub short: TrackConfig,
}

/// Named thresholds shared by the evaluator, the monitor and the orchestrator.
/// Percentages are ratios: 0.03 means 3%.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Unrealized profit ratio that ratchets the stop to entry.
    pub trailing_trigger_pct: f64,
    /// Breakout threshold on the trailing price change.
    pub price_change_pct: f64,
    /// Bar volume must exceed this multiple of the trailing mean.
    pub volume_mult: f64,
    pub rsi_long: f64,
    pub rsi_short: f64,
    pub rsi_period: usize,
    /// Adverse RSI level that closes a position once cooldown has passed.
    pub momentum_exit_rsi: f64,
    /// Bars between the two closes of the price-change ratio.
    pub lookback_window: usize,
    /// Bars averaged for the volume baseline.
    pub volume_window: usize,
    pub cooldown_seconds: i64,
    pub entry_timeframe: String,
    /// Short interval used for the momentum exit.
    pub monitor_timeframe: String,
    pub bar_limit: usize,
    /// Consecutive cycles with a persistence error before the loop halts.
    pub max_persistence_failures: u32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.03,
            take_profit_pct: 0.08,
            trailing_trigger_pct: 0.05,
            price_change_pct: 0.03,
            volume_mult: 2.0,
            rsi_long: 60.0,
            rsi_short: 40.0,
            rsi_period: 14,
            momentum_exit_rsi: 50.0,
            lookback_window: 5,
            volume_window: 20,
            cooldown_seconds: 300,
            entry_timeframe: "15m".to_string(),
            monitor_timeframe: "1m".to_string(),
            bar_limit: 100,
            max_persistence_failures: 3,
        }
    }
}

impl StrategyParams {
    /// Minimum number of bars before any signal may fire.
    pub fn warmup_bars(&self) -> usize {
        self.rsi_period.max(self.lookback_window).max(self.volume_window) + 1
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("trailing_trigger_pct", self.trailing_trigger_pct),
            ("volume_mult", self.volume_mult),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{name} must be > 0, got {value}")));
            }
        }
        if !(self.price_change_pct.is_finite() && self.price_change_pct >= 0.0) {
            return Err(Error::Config(format!(
                "price_change_pct must be >= 0, got {}",
                self.price_change_pct
            )));
        }
        if self.stop_loss_pct >= 1.0 {
            return Err(Error::Config("stop_loss_pct must be < 1".into()));
        }
        for (name, value) in [
            ("rsi_long", self.rsi_long),
            ("rsi_short", self.rsi_short),
            ("momentum_exit_rsi", self.momentum_exit_rsi),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 100], got {value}")));
            }
        }
        for (name, value) in [
            ("rsi_period", self.rsi_period),
            ("lookback_window", self.lookback_window),
            ("volume_window", self.volume_window),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be >= 1")));
            }
        }
        if self.max_persistence_failures == 0 {
            return Err(Error::Config("max_persistence_failures must be >= 1".into()));
        }
        if !(0..=MAX_COOLDOWN_SECONDS).contains(&self.cooldown_seconds) {
            return Err(Error::Config(format!(
                "cooldown_seconds must be within [0, {MAX_COOLDOWN_SECONDS}], got {}",
                self.cooldown_seconds
            )));
        }
        if self.bar_limit < self.warmup_bars() {
            return Err(Error::Config(format!(
                "bar_limit {} is shorter than the {} bars needed for warm-up",
                self.bar_limit,
                self.warmup_bars()
            )));
        }
        Ok(())
    }
}

/// One trading track (long on spot or short on futures).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackConfig {
    pub enabled: bool,
    /// Symbol universe, in tie-break order.
    pub symbols: Vec<String>,
    /// USD value of each new position.
    pub order_notional_usd: f64,
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Strategy config at '{path}': {e}")))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn track(&self, side: TradeSide) -> &TrackConfig {
        match side {
            TradeSide::Long => &self.long,
            TradeSide::Short => &self.short,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for side in TradeSide::ALL {
            let track = self.track(side);
            if !track.enabled {
                continue;
            }
            if track.symbols.is_empty() {
                return Err(Error::Config(format!("{side} track has no symbols")));
            }
            if !(track.order_notional_usd.is_finite() && track.order_notional_usd > 0.0) {
                return Err(Error::Config(format!(
                    "{side} track order_notional_usd must be > 0"
                )));
            }
        }
        Ok(())
    }
}
