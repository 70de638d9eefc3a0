//! One-way latency estimates for lag compensation.
//!
//! Measuring latency is the transport's job. This module only smooths the round-trip
//! samples it reports, using a rolling window average, and halves the result to get
//! the one-way latency that [`LagCompensator::rewind_with`](crate::LagCompensator::rewind_with)
//! subtracts from an action's issue time.

use std::sync::Arc;

use web_time::Duration;

use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};

/// Default number of round-trip samples averaged by [`RttEstimator`].
pub const DEFAULT_RTT_WINDOW_SIZE: usize = 16;

/// A source of one-way latency estimates, in seconds.
pub trait LatencyEstimator {
    /// The current one-way latency estimate, or `None` if nothing has been measured yet.
    fn one_way_latency(&self) -> Option<f64>;
}

/// A constant latency, for tests and for transports that report one-way latency directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedLatency(pub f64);

impl LatencyEstimator for FixedLatency {
    fn one_way_latency(&self) -> Option<f64> {
        Some(self.0)
    }
}

/// Rolling average of round-trip time samples.
///
/// Only samples that have actually been recorded take part in the average, so the
/// estimate is meaningful from the first sample on.
///
/// # Example
///
/// ```
/// use fortress_sync::{LatencyEstimator, RttEstimator};
/// use web_time::Duration;
///
/// let mut rtt = RttEstimator::with_window(4);
/// assert_eq!(rtt.one_way_latency(), None);
///
/// rtt.add_sample(Duration::from_millis(250));
/// rtt.add_sample(Duration::from_millis(750));
/// assert_eq!(rtt.average_rtt(), Some(0.5));
/// assert_eq!(rtt.one_way_latency(), Some(0.25));
/// ```
#[derive(Clone)]
pub struct RttEstimator {
    samples: Vec<f64>,
    next: usize,
    window_size: usize,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::with_window(DEFAULT_RTT_WINDOW_SIZE)
    }
}

impl RttEstimator {
    /// Creates an estimator with the default window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an estimator averaging the last `window_size` samples.
    #[must_use]
    pub fn with_window(window_size: usize) -> Self {
        let window_size = window_size.max(1); // Ensure at least 1
        Self {
            samples: Vec::with_capacity(window_size),
            next: 0,
            window_size,
            violation_observer: None,
        }
    }

    /// Routes rejected samples to `observer` instead of the default tracing output.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Records one round-trip measurement.
    pub fn add_sample(&mut self, rtt: Duration) {
        self.add_sample_secs(rtt.as_secs_f64());
    }

    /// Records one round-trip measurement given in seconds.
    ///
    /// Negative or non-finite samples are reported and skipped.
    pub fn add_sample_secs(&mut self, rtt: f64) {
        if !(rtt.is_finite() && rtt >= 0.0) {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::LagCompensation,
                "RttEstimator::add_sample_secs called with invalid sample {}, skipping",
                rtt
            );
            return;
        }
        if self.samples.len() < self.window_size {
            self.samples.push(rtt);
        } else {
            self.samples[self.next] = rtt;
        }
        self.next = (self.next + 1) % self.window_size;
    }

    /// The mean of the retained samples, in seconds.
    #[must_use]
    pub fn average_rtt(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Number of samples currently averaged.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl std::fmt::Debug for RttEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RttEstimator")
            .field("samples", &self.samples)
            .field("window_size", &self.window_size)
            .field("has_violation_observer", &self.violation_observer.is_some())
            .finish_non_exhaustive()
    }
}

impl LatencyEstimator for RttEstimator {
    fn one_way_latency(&self) -> Option<f64> {
        // assume a symmetric path
        self.average_rtt().map(|rtt| rtt / 2.0)
    }
}
