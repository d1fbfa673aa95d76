//! Call latency metrics for the probe loop.
//!
//! Keeps a fixed-size ring buffer of how long each command iteration took
//! to return, along with running statistics and a count of iterations that
//! missed the fast-path threshold.

use serde::Serialize;
use std::time::Duration;

/// Latency statistics over timed command calls.
#[derive(Debug)]
pub struct CallMetrics {
    /// Ring buffer of call latencies in nanoseconds.
    samples: Box<[u64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples held (saturates at buffer size).
    sample_count: usize,
    /// Total calls recorded.
    total_calls: u64,
    min_ns: u64,
    max_ns: u64,
    sum_ns: u64,
    /// Calls at or above the fast threshold.
    delayed_count: u64,
    /// Fast-path threshold in nanoseconds.
    threshold_ns: u64,
}

impl CallMetrics {
    /// Create a collector.
    ///
    /// # Arguments
    ///
    /// * `histogram_size` - Number of samples to retain in the ring buffer.
    /// * `fast_threshold` - Calls taking at least this long count as delayed.
    #[must_use]
    pub fn new(histogram_size: usize, fast_threshold: Duration) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_calls: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            delayed_count: 0,
            threshold_ns: duration_ns(fast_threshold),
        }
    }

    /// Record one call latency.
    pub fn record(&mut self, latency: Duration) {
        let ns = duration_ns(latency);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = (self.sample_count + 1).min(self.samples.len());

        self.total_calls += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.saturating_add(ns);

        if ns >= self.threshold_ns {
            self.delayed_count += 1;
        }
    }

    /// Total calls recorded.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    /// Calls that missed the fast threshold.
    #[must_use]
    pub fn delayed_count(&self) -> u64 {
        self.delayed_count
    }

    /// Fastest call.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total_calls > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Slowest call.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total_calls > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean call latency.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.total_calls > 0).then(|| Duration::from_nanos(self.sum_ns / self.total_calls))
    }

    /// Compute a percentile (0.0 to 100.0) over the retained samples.
    ///
    /// Returns `None` without samples or for an out-of-range percentile.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        self.percentiles(&[percentile]).first().map(|&(_, d)| d)
    }

    /// Compute several percentiles with one sort; invalid entries are skipped.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn percentiles(&self, percentiles: &[f64]) -> Vec<(f64, Duration)> {
        if self.sample_count == 0 {
            return vec![];
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();
        let last = sorted.len() - 1;

        percentiles
            .iter()
            .filter(|p| (0.0..=100.0).contains(*p))
            .map(|&p| {
                let idx = ((p / 100.0) * last as f64).round() as usize;
                (p, Duration::from_nanos(sorted[idx.min(last)]))
            })
            .collect()
    }

    /// Snapshot for reporting.
    #[must_use]
    pub fn snapshot(&self, percentiles: &[f64]) -> CallMetricsSnapshot {
        CallMetricsSnapshot {
            total_calls: self.total_calls,
            delayed_calls: self.delayed_count,
            min_ns: self.min().map(duration_ns),
            max_ns: self.max().map(duration_ns),
            mean_ns: self.mean().map(duration_ns),
            threshold_ns: self.threshold_ns,
            percentiles_ns: self
                .percentiles(percentiles)
                .into_iter()
                .map(|(p, d)| (p, duration_ns(d)))
                .collect(),
        }
    }

    /// Reset to the initial state, keeping the threshold.
    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.sample_count = 0;
        self.total_calls = 0;
        self.min_ns = u64::MAX;
        self.max_ns = 0;
        self.sum_ns = 0;
        self.delayed_count = 0;
    }
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Immutable metrics view for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallMetricsSnapshot {
    /// Total calls recorded.
    pub total_calls: u64,
    /// Calls at or above the threshold.
    pub delayed_calls: u64,
    /// Fastest call in nanoseconds.
    pub min_ns: Option<u64>,
    /// Slowest call in nanoseconds.
    pub max_ns: Option<u64>,
    /// Mean call in nanoseconds.
    pub mean_ns: Option<u64>,
    /// Fast-path threshold in nanoseconds.
    pub threshold_ns: u64,
    /// Requested percentiles as (percentile, nanoseconds).
    pub percentiles_ns: Vec<(f64, u64)>,
}

impl CallMetricsSnapshot {
    /// Spread between slowest and fastest call.
    #[must_use]
    pub fn jitter_ns(&self) -> Option<u64> {
        match (self.min_ns, self.max_ns) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        }
    }
}
