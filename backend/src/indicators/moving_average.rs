// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Mean of the last `window` values. The scorer clamps the window to the
// available length (`min(5, n)`, `min(20, n)`), so short series still yield a
// value.
// =============================================================================

/// SMA of the last `window` values.
///
/// Returns `None` when `window == 0`, the input is shorter than `window`, or
/// the mean is non-finite.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let mean = values[values.len() - window..].iter().sum::<f64>() / window as f64;
    mean.is_finite().then_some(mean)
}

/// SMA with the window clamped to `min(window, values.len())`.
pub fn sma_clamped(values: &[f64], window: usize) -> Option<f64> {
    sma(values, window.min(values.len()))
}
