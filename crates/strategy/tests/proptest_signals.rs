use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Bar, TradeSide};
use strategy::indicators::{shifted_rolling_mean, RsiIndicator};
use strategy::{SignalEvaluator, StrategyParams};

fn bars(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| Bar {
            timestamp: Utc.timestamp_opt(0, 0).unwrap() + Duration::minutes(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        })
        .collect()
}

proptest! {
    /// RSI is always inside [0, 100] or explicitly undefined.
    #[test]
    fn rsi_is_bounded(
        closes in prop::collection::vec(0.01f64..100_000.0, 0..80),
        period in 1usize..30,
    ) {
        for value in RsiIndicator::new(period).series(&closes).into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&value), "RSI out of range: {}", value);
        }
    }

    /// A strictly rising series reads near 100, a strictly falling one near 0.
    #[test]
    fn rsi_follows_monotonic_trends(
        start in 1.0f64..1_000.0,
        step in 0.01f64..10.0,
        len in 3usize..60,
    ) {
        let rising: Vec<f64> = (0..len).map(|i| start + step * i as f64).collect();
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        let rsi = RsiIndicator::new(14);
        prop_assert!(rsi.latest(&rising).unwrap() > 99.0);
        prop_assert!(rsi.latest(&falling).unwrap() < 1.0);
    }

    /// Changing volume[i] never changes the mean aligned to bar i.
    #[test]
    fn volume_mean_excludes_own_bar(
        volumes in prop::collection::vec(0.0f64..1e6, 1..60),
        window in 1usize..25,
        spike in 0.0f64..1e9,
    ) {
        let base = shifted_rolling_mean(&volumes, window);
        for i in 0..volumes.len() {
            let mut bumped = volumes.clone();
            bumped[i] = spike;
            let after = shifted_rolling_mean(&bumped, window);
            prop_assert_eq!(base[i], after[i]);
            prop_assert_eq!(base[i].is_some(), i >= window);
        }
    }

    /// Long and short never fire on the same bar.
    #[test]
    fn long_and_short_are_mutually_exclusive(
        closes in prop::collection::vec(50.0f64..150.0, 21..60),
        volumes in prop::collection::vec(1.0f64..1_000.0, 60),
        change_pct in 0.0f64..0.1,
        rsi_long in 0.0f64..100.0,
        rsi_short in 0.0f64..100.0,
    ) {
        let params = StrategyParams {
            price_change_pct: change_pct,
            rsi_long,
            rsi_short,
            volume_mult: 1.0,
            ..StrategyParams::default()
        };
        let evaluator = SignalEvaluator::new(params);
        let series = bars(&closes, &volumes[..closes.len()]);
        let long = evaluator.evaluate(&series, TradeSide::Long);
        let short = evaluator.evaluate(&series, TradeSide::Short);
        prop_assert!(!(long.fired() && short.fired()));
    }

    /// Same bars, same answer.
    #[test]
    fn evaluation_is_deterministic(
        closes in prop::collection::vec(50.0f64..150.0, 0..50),
    ) {
        let volumes = vec![10.0; closes.len()];
        let series = bars(&closes, &volumes);
        let evaluator = SignalEvaluator::new(StrategyParams::default());
        for side in TradeSide::ALL {
            prop_assert_eq!(evaluator.evaluate(&series, side), evaluator.evaluate(&series, side));
        }
    }
}
