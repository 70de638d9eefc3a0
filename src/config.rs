//! Configuration for the synchronization engine.
//!
//! [`SyncConfig`] groups every tunable the engine components need. Pass it to
//! [`SyncBuilder::with_config`](crate::SyncBuilder::with_config), which validates it
//! once and hands each component its share.

use web_time::Duration;

use crate::history::DEFAULT_RETENTION_WINDOW;
use crate::interpolation::{DEFAULT_INTERPOLATION_DELAY, DEFAULT_MAX_EXTRAPOLATION};
use crate::latency::DEFAULT_RTT_WINDOW_SIZE;
use crate::reconciliation::DEFAULT_SNAP_THRESHOLD;
use crate::timestep::{DEFAULT_MAX_FRAME_TIME, DEFAULT_TICK_RATE, MAX_FRAME_TIME, MAX_TICK_RATE};
use crate::FortressError;

/// Longest accepted retention window.
const MAX_RETENTION_WINDOW: Duration = Duration::from_secs(60);

/// Configuration of the synchronization engine.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. To ensure your
/// code continues to compile, always use the `..Default::default()` or
/// `..SyncConfig::default()` pattern when constructing instances.
///
/// # Example
///
/// ```
/// use fortress_sync::SyncConfig;
/// use web_time::Duration;
///
/// // Keep two seconds of history for slow lag-compensated weapons
/// let config = SyncConfig {
///     retention_window: Duration::from_secs(2),
///     ..SyncConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "SyncConfig has no effect unless passed to SyncBuilder::with_config()"]
pub struct SyncConfig {
    /// How much state history each entity keeps. Bounds how far back lag compensation
    /// can rewind and how much a lookup has to search.
    ///
    /// Default: 1 s
    pub retention_window: Duration,

    /// Simulation steps per second.
    ///
    /// Default: 60
    pub tick_rate: u32,

    /// Upper bound on the wall time one frame may feed into the fixed timestep.
    /// At most 1 s.
    ///
    /// Default: 250 ms
    pub max_frame_time: Duration,

    /// How far behind the render clock remote entities are sampled.
    ///
    /// Default: 100 ms
    pub interpolation_delay: Duration,

    /// How far past the newest snapshot a remote entity may be extrapolated.
    ///
    /// Default: 250 ms
    pub max_extrapolation: Duration,

    /// Reconciliation errors above this distance are flagged for snapping.
    ///
    /// Default: 1.0
    pub snap_threshold: f64,

    /// Number of round-trip samples averaged by the latency estimator.
    ///
    /// Default: 16
    pub rtt_window_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_window: DEFAULT_RETENTION_WINDOW,
            tick_rate: DEFAULT_TICK_RATE,
            max_frame_time: DEFAULT_MAX_FRAME_TIME,
            interpolation_delay: DEFAULT_INTERPOLATION_DELAY,
            max_extrapolation: DEFAULT_MAX_EXTRAPOLATION,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
            rtt_window_size: DEFAULT_RTT_WINDOW_SIZE,
        }
    }
}

impl SyncConfig {
    /// Creates a new `SyncConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration preset for local network / LAN play.
    ///
    /// Latency is low and stable, so less history is needed and remote entities can be
    /// rendered closer to real time.
    pub fn lan() -> Self {
        Self {
            retention_window: Duration::from_millis(500),
            interpolation_delay: Duration::from_millis(50),
            max_extrapolation: Duration::from_millis(100),
            snap_threshold: 0.5,
            rtt_window_size: 8,
            ..Self::default()
        }
    }

    /// Configuration preset for competitive play.
    ///
    /// Higher tick rate and a short interpolation delay trade bandwidth and robustness
    /// for responsiveness. Small corrections are snapped rather than smoothed.
    pub fn competitive() -> Self {
        Self {
            tick_rate: 128,
            interpolation_delay: Duration::from_millis(50),
            max_extrapolation: Duration::from_millis(100),
            snap_threshold: 0.5,
            ..Self::default()
        }
    }

    /// Configuration preset for high-latency networks (150 ms+ RTT).
    ///
    /// Keeps more history so lag compensation can reach further back, buffers remote
    /// entities longer, and tolerates larger corrections before snapping.
    pub fn high_latency() -> Self {
        Self {
            retention_window: Duration::from_secs(2),
            tick_rate: 30,
            interpolation_delay: Duration::from_millis(200),
            max_extrapolation: Duration::from_millis(500),
            snap_threshold: 2.0,
            rtt_window_size: 32,
            ..Self::default()
        }
    }

    /// Seconds per simulation step.
    #[must_use]
    pub fn step(&self) -> f64 {
        1.0 / f64::from(self.tick_rate.max(1))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), FortressError> {
        if self.tick_rate == 0 || self.tick_rate > MAX_TICK_RATE {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "tick_rate must be between 1 and {}, got {}",
                    MAX_TICK_RATE, self.tick_rate
                ),
            });
        }

        if self.retention_window.is_zero() || self.retention_window > MAX_RETENTION_WINDOW {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "retention_window must be positive and at most {:?}, got {:?}",
                    MAX_RETENTION_WINDOW, self.retention_window
                ),
            });
        }

        if self.max_frame_time > MAX_FRAME_TIME {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "max_frame_time must be at most {:?}, got {:?}",
                    MAX_FRAME_TIME, self.max_frame_time
                ),
            });
        }

        if self.max_frame_time.as_secs_f64() < self.step() {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "max_frame_time {:?} is shorter than one step at {} Hz",
                    self.max_frame_time, self.tick_rate
                ),
            });
        }

        if self.interpolation_delay >= self.retention_window {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "interpolation_delay {:?} must be shorter than retention_window {:?}",
                    self.interpolation_delay, self.retention_window
                ),
            });
        }

        if self.max_extrapolation > self.retention_window {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "max_extrapolation {:?} must not exceed retention_window {:?}",
                    self.max_extrapolation, self.retention_window
                ),
            });
        }

        if !(self.snap_threshold.is_finite() && self.snap_threshold >= 0.0) {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "snap_threshold must be finite and non-negative, got {}",
                    self.snap_threshold
                ),
            });
        }

        if self.rtt_window_size == 0 {
            return Err(FortressError::InvalidRequest {
                info: "rtt_window_size must be at least 1".to_owned(),
            });
        }

        Ok(())
    }
}
