/// Guards the RSI ratio against a zero average loss.
pub const RSI_EPSILON: f64 = 1e-10;

/// RSI (Relative Strength Index) indicator.
///
/// Average gain and average loss are simple rolling means over the last
/// `period` price deltas, accepting as few as one delta. Index 0 has no delta
/// and is always `None`.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period }
    }

    /// Compute an RSI value for every close (oldest first).
    pub fn series(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(closes.len());
        if closes.is_empty() {
            return out;
        }
        out.push(None);

        let mut gains: Vec<f64> = Vec::with_capacity(closes.len());
        let mut losses: Vec<f64> = Vec::with_capacity(closes.len());
        for w in closes.windows(2) {
            let change = w[1] - w[0];
            if change.is_nan() {
                gains.push(f64::NAN);
                losses.push(f64::NAN);
            } else {
                gains.push(change.max(0.0));
                losses.push((-change).max(0.0));
            }

            let start = gains.len().saturating_sub(self.period);
            let n = (gains.len() - start) as f64;
            let avg_gain = gains[start..].iter().sum::<f64>() / n;
            let avg_loss = losses[start..].iter().sum::<f64>() / n;
            let rsi = 100.0 - 100.0 / (1.0 + avg_gain / (avg_loss + RSI_EPSILON));
            out.push(rsi.is_finite().then_some(rsi));
        }
        out
    }

    /// RSI of the most recent close, if defined.
    pub fn latest(&self, closes: &[f64]) -> Option<f64> {
        self.series(closes).last().copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_is_undefined() {
        let rsi = RsiIndicator::new(14);
        let values = rsi.series(&[100.0, 101.0]);
        assert_eq!(values.len(), 2);
        assert!(values[0].is_none());
        assert!(values[1].is_some());
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(RsiIndicator::new(3).series(&[]).is_empty());
        assert!(RsiIndicator::new(3).latest(&[]).is_none());
    }

    #[test]
    fn rsi_all_gains_approaches_100() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let value = rsi.latest(&prices).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = rsi.latest(&prices).unwrap();
        assert!(value.abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn flat_prices_read_as_zero() {
        let value = RsiIndicator::new(14).latest(&[50.0; 30]).unwrap();
        assert!(value.abs() < 1e-6);
    }

    #[test]
    fn rolling_window_forgets_old_deltas() {
        // Three big losses then three gains: a 3-period window only sees gains.
        let rsi = RsiIndicator::new(3);
        let prices = vec![100.0, 90.0, 80.0, 70.0, 71.0, 72.0, 73.0];
        let value = rsi.latest(&prices).unwrap();
        assert!(value > 99.0, "got {value}");
    }

    #[test]
    fn known_mixed_value() {
        // deltas +2, -1 over period 2: avg gain 1.0, avg loss 0.5 -> RS 2 -> RSI 66.67
        let value = RsiIndicator::new(2).latest(&[10.0, 12.0, 11.0]).unwrap();
        assert!((value - 200.0 / 3.0).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn nan_close_yields_undefined_not_panic() {
        let rsi = RsiIndicator::new(2);
        let values = rsi.series(&[10.0, f64::NAN, 11.0, 12.0, 13.0]);
        assert!(values[1].is_none());
        assert!(values[4].is_some());
    }
}
