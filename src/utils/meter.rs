//! Running weighted average used for per-phase loss and metric reporting.

/// Weighted running average.
///
/// Fed one `(value, weight)` pair per processed item and queried once the
/// phase ends. With no weight accumulated the average is undefined and
/// [`AvgMeter::avg`] returns `NaN`.
#[derive(Debug, Clone, Default)]
pub struct AvgMeter {
    val: f64,
    sum: f64,
    count: usize,
    history: Vec<f64>,
}

impl AvgMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero all accumulated state
    pub fn reset(&mut self) {
        self.val = 0.0;
        self.sum = 0.0;
        self.count = 0;
        self.history.clear();
    }

    /// Add `val` with weight `n`. A zero weight leaves the average untouched.
    pub fn update(&mut self, val: f64, n: usize) {
        if n == 0 {
            return;
        }
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        self.history.push(val);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Last value passed to `update`
    pub fn val(&self) -> f64 {
        self.val
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Every value recorded since the last reset
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}
