//! Velocity signal conditioning.
//!
//! Raw samples drained during one cycle are reduced to a single
//! representative velocity:
//!
//! 1. IQR outlier rejection (strictly inside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`)
//! 2. Trailing moving average over fully-populated windows only
//! 3. Arithmetic mean of the smoothed sequence (0.0 when empty)
//!
//! The reported sample count is the pre-filter count, since it is the basis
//! for elapsed time at a fixed sample rate.

/// Window used by `measure_velocity`.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 3;

/// IQR multiplier for the outlier fences.
pub const IQR_FENCE_FACTOR: f64 = 1.5;

/// Representative velocity of one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConditionedVelocity {
    /// cm/min
    pub value: f64,
    /// Raw samples summarized, before filtering.
    pub sample_count: usize,
}

/// Outlier rejection + smoothing stage.
#[derive(Clone, Debug)]
pub struct SignalConditioner {
    window: usize,
}

impl SignalConditioner {
    /// `window` of 0 is treated as 1 (no smoothing).
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn condition(&self, raw: &[f64]) -> ConditionedVelocity {
        if raw.is_empty() {
            return ConditionedVelocity::default();
        }
        let retained = reject_outliers(raw);
        let smoothed = moving_average(&retained, self.window);
        ConditionedVelocity {
            value: mean(&smoothed),
            sample_count: raw.len(),
        }
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}

/// Representative velocity (cm/min) of `raw` with the default window.
pub fn measure_velocity(raw: &[f64]) -> f64 {
    SignalConditioner::default().condition(raw).value
}

/// First and third quartile, linearly interpolated between closest ranks.
///
/// Non-finite samples are ignored. Returns `None` when nothing is left.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some((percentile(&sorted, 0.25), percentile(&sorted, 0.75)))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (sorted.len() - 1) as f64 * p;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Outlier fences computed from `values`.
pub fn iqr_bounds(values: &[f64]) -> Option<(f64, f64)> {
    let (q1, q3) = quartiles(values)?;
    let iqr = q3 - q1;
    Some((q1 - IQR_FENCE_FACTOR * iqr, q3 + IQR_FENCE_FACTOR * iqr))
}

/// Keeps values strictly inside the IQR fences, in arrival order.
pub fn reject_outliers(values: &[f64]) -> Vec<f64> {
    let Some((low, high)) = iqr_bounds(values) else {
        return Vec::new();
    };
    values
        .iter()
        .copied()
        .filter(|v| *v > low && *v < high)
        .collect()
}

/// Trailing moving average; partial leading windows are dropped.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
