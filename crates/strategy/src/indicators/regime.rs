//! Market-regime measures recorded alongside each evaluation for offline
//! threshold tuning. None of these gate a trade.

use common::Bar;

fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => range
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
                None => range,
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Average true range over the last `period` bars as a fraction of the last close.
pub fn atr_pct(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let tr = true_ranges(bars);
    let atr = mean(&tr[tr.len() - period..]);
    let close = bars.last()?.close;
    let pct = atr / close;
    pct.is_finite().then_some(pct)
}

/// Average directional index of the last bar, 0..=100.
///
/// Uses simple means of +DM, -DM and true range over `period`, then averages
/// DX over the last `period` values. Needs `2 * period + 1` bars.
pub fn adx(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < 2 * period + 1 {
        return None;
    }
    let tr = true_ranges(bars);
    let mut plus_dm = vec![0.0; bars.len()];
    let mut minus_dm = vec![0.0; bars.len()];
    for i in 1..bars.len() {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let dx: Vec<f64> = (period..bars.len())
        .map(|end| {
            let range = end + 1 - period..end + 1;
            let atr = mean(&tr[range.clone()]);
            if atr <= 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * mean(&plus_dm[range.clone()]) / atr;
            let minus_di = 100.0 * mean(&minus_dm[range]) / atr;
            let sum = plus_di + minus_di;
            if sum <= 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    let value = mean(&dx[dx.len() - period..]);
    value.is_finite().then_some(value)
}
