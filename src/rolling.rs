//! Windowed and order-statistic helpers
//!
//! Trailing windows over a date-sorted series plus the percentile and median
//! helpers used for outlier capping and population fallback.

use std::collections::VecDeque;

/// Fixed-size trailing window producing a running mean
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    values: VecDeque<f64>,
    window_size: usize,
}

impl TrailingWindow {
    /// Create a window holding at most `window_size` observations
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    /// Push a value and return the mean of the window including it
    pub fn push(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        while self.values.len() > self.window_size {
            self.values.pop_front();
        }
        let sum: f64 = self.values.iter().sum();
        sum / self.values.len() as f64
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Trailing mean over `values` with a minimum of one observation
pub fn trailing_mean(values: &[f64], window_size: usize) -> Vec<f64> {
    let mut window = TrailingWindow::new(window_size);
    values.iter().map(|v| window.push(*v)).collect()
}

/// Quantile with linear interpolation between order statistics
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Median of a slice, averaging the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) * 0.5)
    }
}
