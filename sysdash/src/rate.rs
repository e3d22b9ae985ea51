//! Cumulative counter -> per-interval rate.

/// Turns a monotonically increasing counter into the delta since the previous sample.
///
/// The first sample only records a baseline and yields 0. A counter that goes backwards
/// (agent restart) yields 0 and becomes the new baseline. Rates are "per snapshot
/// interval"; use [`per_second`] to normalize.
#[derive(Debug, Clone, Default)]
pub struct RateDeriver {
    previous: Option<f64>,
}

impl RateDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(&mut self, current: f64) -> f64 {
        if !current.is_finite() {
            return 0.0;
        }
        let rate = match self.previous {
            Some(prev) => (current - prev).max(0.0),
            None => 0.0,
        };
        self.previous = Some(current);
        rate
    }

    pub fn baseline(&self) -> Option<f64> {
        self.previous
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Convert a per-interval rate into a per-second rate.
pub fn per_second(rate: f64, interval_ms: u64) -> f64 {
    if interval_ms == 0 {
        return rate;
    }
    rate * 1000.0 / interval_ms as f64
}
