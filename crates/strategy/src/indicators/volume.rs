/// Rolling mean of the previous `window` values.
///
/// The value at index `i` averages `values[i - window..i]` and never includes
/// `values[i]`, so a spike cannot raise its own baseline. Undefined for
/// `i < window`.
pub fn shifted_rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i < window {
                return None;
            }
            let mean = values[i - window..i].iter().sum::<f64>() / window as f64;
            mean.is_finite().then_some(mean)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_current_value() {
        let means = shifted_rolling_mean(&[1.0, 2.0, 3.0, 1000.0], 3);
        assert_eq!(means[..3], [None, None, None]);
        assert_eq!(means[3], Some(2.0));
    }

    #[test]
    fn zero_window_is_undefined() {
        assert!(shifted_rolling_mean(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }
}
