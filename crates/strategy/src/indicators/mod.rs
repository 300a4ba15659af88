pub mod change;
pub mod regime;
pub mod rsi;
pub mod volume;

pub use change::price_change;
pub use rsi::RsiIndicator;
pub use volume::shifted_rolling_mean;

use common::Bar;

use crate::StrategyParams;

/// Per-bar derived values, aligned index-for-index with the input bars.
/// `None` means "not enough history yet", never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub rsi: Vec<Option<f64>>,
    pub volume_mean: Vec<Option<f64>>,
    pub price_change: Vec<Option<f64>>,
}

impl IndicatorSet {
    /// Pure function of the bars and the configured windows.
    pub fn compute(bars: &[Bar], params: &StrategyParams) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        Self {
            rsi: RsiIndicator::new(params.rsi_period.max(1)).series(&closes),
            volume_mean: shifted_rolling_mean(&volumes, params.volume_window),
            price_change: price_change(&closes, params.lookback_window),
        }
    }

    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }

    /// Values at the last bar.
    pub fn last(&self) -> Option<IndicatorSnapshot> {
        let i = self.len().checked_sub(1)?;
        Some(IndicatorSnapshot {
            rsi: self.rsi[i],
            volume_mean: self.volume_mean[i],
            price_change: self.price_change[i],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub volume_mean: Option<f64>,
    pub price_change: Option<f64>,
}
