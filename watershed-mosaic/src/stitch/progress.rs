//! Processed/expected job tracking with throughput and ETA.

use std::time::{Duration, Instant};

/// Progress of one stitcher against the number of jobs it expects.
#[derive(Debug, Clone)]
pub struct Progress {
    expected: usize,
    processed: usize,
    started: Instant,
}

impl Progress {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            processed: 0,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, count: usize) {
        self.processed += count;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Jobs per second since creation.
    pub fn throughput(&self) -> f64 {
        self.throughput_at(self.started.elapsed())
    }

    /// Estimated time until `expected` jobs have been processed, if known.
    pub fn eta(&self) -> Option<Duration> {
        self.eta_at(self.started.elapsed())
    }

    fn throughput_at(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.processed as f64 / secs
        }
    }

    fn eta_at(&self, elapsed: Duration) -> Option<Duration> {
        let rate = self.throughput_at(elapsed);
        if rate <= 0.0 {
            return None;
        }
        let remaining = self.expected.saturating_sub(self.processed);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Percentage complete, 100 when nothing is expected.
    pub fn percent(&self) -> f64 {
        if self.expected == 0 {
            100.0
        } else {
            (self.processed as f64 / self.expected as f64 * 100.0).min(100.0)
        }
    }
}
