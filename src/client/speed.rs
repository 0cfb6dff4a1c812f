//! Transfer rate estimation
//!
//! Sliding window over recent progress samples; workers feed it at each
//! checkpoint and read back the instantaneous rate and ETA.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default window over which the rate is computed
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Sliding-window estimator for transfer speed and remaining time
#[derive(Debug)]
pub struct SpeedEstimator {
    window: Duration,
    /// (sample time, cumulative downloaded bytes)
    samples: VecDeque<(Instant, u64)>,
}

impl SpeedEstimator {
    /// Create an estimator with the default window
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Create an estimator with a custom window
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record the cumulative downloaded byte count now
    pub fn record(&mut self, downloaded_bytes: u64) {
        self.record_at(Instant::now(), downloaded_bytes);
    }

    /// Record a sample at an explicit instant
    pub fn record_at(&mut self, at: Instant, downloaded_bytes: u64) {
        self.samples.push_back((at, downloaded_bytes));
        let horizon = at.checked_sub(self.window);
        if let Some(horizon) = horizon {
            // Keep one sample past the horizon so the window stays full
            while self.samples.len() > 2 && self.samples[1].0 <= horizon {
                self.samples.pop_front();
            }
        }
    }

    /// Instantaneous transfer rate over the window, in bytes per second
    pub fn bytes_per_second(&self) -> u64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if last.0 > first.0 => (first, last),
            _ => return 0,
        };

        let bytes = last.1.saturating_sub(first.1) as f64;
        let secs = last.0.duration_since(first.0).as_secs_f64();
        (bytes / secs) as u64
    }

    /// Estimated remaining transfer time in milliseconds.
    ///
    /// Returns -1 while the total is unknown or the transfer is stalled, and
    /// 0 once `downloaded` reaches `total`.
    pub fn eta_millis(&self, downloaded: u64, total: i64) -> i64 {
        if total < 0 {
            return -1;
        }
        let total = total as u64;
        if downloaded >= total {
            return 0;
        }
        let rate = self.bytes_per_second();
        if rate == 0 {
            return -1;
        }
        let remaining = (total - downloaded) as f64;
        ((remaining / rate as f64) * 1000.0) as i64
    }

    /// Drop every recorded sample
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

impl Default for SpeedEstimator {
    fn default() -> Self {
        Self::new()
    }
}
