/// `(close[i] - close[i - window]) / close[i - window]`, undefined while fewer
/// than `window` earlier closes exist or when the base close is zero.
pub fn price_change(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| {
            if window == 0 || i < window {
                return None;
            }
            let base = closes[i - window];
            let change = (closes[i] - base) / base;
            change.is_finite().then_some(change)
        })
        .collect()
}
