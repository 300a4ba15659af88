use tracing::warn;

use common::{Bar, Signal, TradeSide};

use crate::indicators::{IndicatorSet, IndicatorSnapshot};
use crate::StrategyParams;

/// Direction-specific thresholds. One evaluator serves both sides through
/// this table instead of a type per side.
#[derive(Debug, Clone, Copy)]
pub struct SideRule {
    pub side: TradeSide,
    /// Price change must be beyond `direction * change_threshold`.
    pub change_threshold: f64,
    pub rsi_threshold: f64,
}

impl SideRule {
    fn change_passes(&self, change: f64) -> bool {
        match self.side {
            TradeSide::Long => change > self.change_threshold,
            TradeSide::Short => change < -self.change_threshold,
        }
    }

    fn rsi_passes(&self, rsi: f64) -> bool {
        match self.side {
            TradeSide::Long => rsi > self.rsi_threshold,
            TradeSide::Short => rsi < self.rsi_threshold,
        }
    }

    fn comparison(&self) -> &'static str {
        match self.side {
            TradeSide::Long => "above",
            TradeSide::Short => "below",
        }
    }

    /// RSI term of the ranking score: strength in the trade's direction.
    fn rsi_strength(&self, rsi: f64) -> f64 {
        match self.side {
            TradeSide::Long => rsi,
            TradeSide::Short => 100.0 - rsi,
        }
    }
}

/// Outcome of evaluating the last bar of a sequence for one side.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub side: TradeSide,
    /// Present only when all three conditions hold and the signal is valid.
    pub signal: Option<Signal>,
    /// Diagnostic text. Never affects `signal`.
    pub reason: String,
    pub score: f64,
    pub close: f64,
    pub snapshot: Option<IndicatorSnapshot>,
}

impl Evaluation {
    pub fn fired(&self) -> bool {
        self.signal.is_some()
    }

    /// Bar volume over its shifted mean, for telemetry.
    pub fn volume_ratio(&self, volume: f64) -> Option<f64> {
        let mean = self.snapshot?.volume_mean?;
        (mean > 0.0).then(|| volume / mean)
    }
}

/// Breakout-momentum rule: a large enough price move, confirmed by a volume
/// spike and RSI on the same side.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    params: StrategyParams,
}

impl SignalEvaluator {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn rule(&self, side: TradeSide) -> SideRule {
        SideRule {
            side,
            change_threshold: self.params.price_change_pct,
            rsi_threshold: match side {
                TradeSide::Long => self.params.rsi_long,
                TradeSide::Short => self.params.rsi_short,
            },
        }
    }

    pub fn evaluate(&self, bars: &[Bar], side: TradeSide) -> Evaluation {
        let indicators = IndicatorSet::compute(bars, &self.params);
        self.evaluate_with(bars, &indicators, side)
    }

    /// Evaluate with indicators already computed for `bars`.
    pub fn evaluate_with(
        &self,
        bars: &[Bar],
        indicators: &IndicatorSet,
        side: TradeSide,
    ) -> Evaluation {
        let rule = self.rule(side);
        let snapshot = indicators.last();
        let mut eval = Evaluation {
            side,
            signal: None,
            reason: String::new(),
            score: 0.0,
            close: bars.last().map(|b| b.close).unwrap_or_default(),
            snapshot,
        };

        let Some(bar) = bars.last() else {
            eval.reason = "no bars".to_string();
            return eval;
        };
        let needed = self.params.warmup_bars();
        if bars.len() < needed || indicators.len() != bars.len() {
            eval.reason = format!("insufficient history: {} bars, need {needed}", bars.len());
            return eval;
        }
        let (Some(rsi), Some(volume_mean), Some(change)) = snapshot
            .map(|s| (s.rsi, s.volume_mean, s.price_change))
            .unwrap_or((None, None, None))
        else {
            eval.reason = "indicators undefined on last bar".to_string();
            return eval;
        };

        eval.score = change.abs() * bar.volume * rule.rsi_strength(rsi);

        let volume_needed = self.params.volume_mult * volume_mean;
        let change_ok = rule.change_passes(change);
        let volume_ok = bar.volume > volume_needed;
        let rsi_ok = rule.rsi_passes(rsi);

        if !(change_ok && volume_ok && rsi_ok) {
            let signed_threshold = side.direction() * rule.change_threshold;
            let mut failures = Vec::with_capacity(3);
            if !change_ok {
                failures.push(format!(
                    "price change {:+.2}% not {} {:+.2}% (short by {:.2}%)",
                    change * 100.0,
                    rule.comparison(),
                    signed_threshold * 100.0,
                    (signed_threshold - change).abs() * 100.0,
                ));
            }
            if !volume_ok {
                failures.push(format!(
                    "volume {:.2} not above {:.1}x mean {:.2} (needs {:.2})",
                    bar.volume, self.params.volume_mult, volume_mean, volume_needed,
                ));
            }
            if !rsi_ok {
                failures.push(format!(
                    "RSI {:.2} not {} {:.2} (off by {:.2})",
                    rsi,
                    rule.comparison(),
                    rule.rsi_threshold,
                    (rule.rsi_threshold - rsi).abs(),
                ));
            }
            eval.reason = failures.join("; ");
            return eval;
        }

        let entry = bar.close;
        let dir = side.direction();
        let signal = Signal {
            side,
            entry_price: entry,
            stop_loss: entry * (1.0 - dir * self.params.stop_loss_pct),
            take_profit: entry * (1.0 + dir * self.params.take_profit_pct),
            volume: bar.volume,
            score: eval.score,
            reason: format!(
                "{side} breakout: price change {:+.2}%, volume {:.2}x mean, RSI {:.2}",
                change * 100.0,
                bar.volume / volume_mean,
                rsi,
            ),
        };

        match signal.validate() {
            Ok(()) => {
                eval.reason = signal.reason.clone();
                eval.signal = Some(signal);
            }
            Err(e) => {
                warn!(side = %side, error = %e, "Discarding invalid signal");
                eval.reason = e.to_string();
            }
        }
        eval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| Bar {
                timestamp: Utc.timestamp_opt(0, 0).unwrap() + Duration::minutes(15 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }

    /// Twenty bars of small chop followed by six steady rises.
    fn breakout(side: TradeSide) -> Vec<Bar> {
        let dir = side.direction();
        let closes: Vec<f64> = (0..26)
            .map(|i| {
                if i < 20 {
                    100.0 + dir * (i % 2) as f64 * 0.5
                } else {
                    100.0 + dir * (0.5 + (i - 19) as f64)
                }
            })
            .collect();
        let mut volumes = vec![100.0; 26];
        volumes[25] = 300.0;
        bars_from(&closes, &volumes)
    }

    fn evaluator() -> SignalEvaluator {
        SignalEvaluator::new(StrategyParams::default())
    }

    #[test]
    fn flat_market_never_signals_and_cites_all_shortfalls() {
        let bars = bars_from(&[100.0; 30], &[50.0; 30]);
        for n in 1..=bars.len() {
            let eval = evaluator().evaluate(&bars[..n], TradeSide::Long);
            assert!(!eval.fired());
        }
        let eval = evaluator().evaluate(&bars, TradeSide::Long);
        assert!(eval.reason.contains("price change"), "{}", eval.reason);
        assert!(eval.reason.contains("volume"), "{}", eval.reason);
        assert!(eval.reason.contains("RSI"), "{}", eval.reason);
        assert!(!evaluator().evaluate(&bars, TradeSide::Short).fired());
    }

    #[test]
    fn long_breakout_fires_with_offsets() {
        let bars = breakout(TradeSide::Long);
        let eval = evaluator().evaluate(&bars, TradeSide::Long);
        let signal = eval.signal.expect("long signal");
        assert_eq!(signal.side, TradeSide::Long);
        assert_eq!(signal.entry_price, 106.5);
        assert!((signal.stop_loss - 106.5 * 0.97).abs() < 1e-9);
        assert!((signal.take_profit - 106.5 * 1.08).abs() < 1e-9);
        assert_eq!(signal.volume, 300.0);
        // RSI 80 on the last bar
        let rsi = eval.snapshot.unwrap().rsi.unwrap();
        assert!((rsi - 80.0).abs() < 1e-6, "got {rsi}");
        let change = (106.5 - 101.5) / 101.5;
        assert!((signal.score - change * 300.0 * rsi).abs() < 1e-6);
    }

    #[test]
    fn short_breakout_mirrors_long() {
        let bars = breakout(TradeSide::Short);
        let eval = evaluator().evaluate(&bars, TradeSide::Short);
        let signal = eval.signal.expect("short signal");
        assert_eq!(signal.entry_price, 93.5);
        assert!((signal.stop_loss - 93.5 * 1.03).abs() < 1e-9);
        assert!((signal.take_profit - 93.5 * 0.92).abs() < 1e-9);
        assert!(!evaluator().evaluate(&bars, TradeSide::Long).fired());
    }

    #[test]
    fn volume_spike_does_not_inflate_its_own_baseline() {
        // With an unshifted mean the 300 bar would raise the baseline to 110
        // and need 220; the shifted mean keeps it at 100.
        let mut bars = breakout(TradeSide::Long);
        bars[25].volume = 201.0;
        assert!(evaluator().evaluate(&bars, TradeSide::Long).fired());
        bars[25].volume = 200.0;
        let eval = evaluator().evaluate(&bars, TradeSide::Long);
        assert!(!eval.fired());
        assert!(eval.reason.contains("volume"));
        assert!(!eval.reason.contains("RSI"));
    }

    #[test]
    fn insufficient_history_never_fires() {
        let bars = breakout(TradeSide::Long);
        let params = StrategyParams { volume_window: 40, ..StrategyParams::default() };
        let eval = SignalEvaluator::new(params).evaluate(&bars, TradeSide::Long);
        assert!(!eval.fired());
        assert!(eval.reason.starts_with("insufficient history"));
    }

    #[test]
    fn non_finite_close_is_never_actionable() {
        let mut bars = breakout(TradeSide::Long);
        bars[25].close = f64::INFINITY;
        let eval = evaluator().evaluate(&bars, TradeSide::Long);
        assert!(!eval.fired());
    }

    #[test]
    fn empty_input_reports_no_bars() {
        let eval = evaluator().evaluate(&[], TradeSide::Long);
        assert!(!eval.fired());
        assert_eq!(eval.reason, "no bars");
    }

    #[test]
    fn evaluation_is_idempotent() {
        let bars = breakout(TradeSide::Long);
        let ev = evaluator();
        assert_eq!(ev.evaluate(&bars, TradeSide::Long), ev.evaluate(&bars, TradeSide::Long));
    }
}
