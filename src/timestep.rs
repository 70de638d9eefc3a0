//! Fixed-timestep scheduling with an accumulator.
//!
//! Simulation must advance in identical steps on every peer, while frames arrive at
//! whatever rate the host manages. [`FixedTimestep`] accumulates elapsed wall time and
//! reports how many whole simulation steps to run; the leftover fraction is exposed as
//! [`alpha`](FixedTimestep::alpha) for render interpolation.
//!
//! A single frame never contributes more than `max_frame_time`. After a long stall
//! (debugger, window drag, GC pause) the simulation drops time instead of trying to
//! catch up with more steps than it can run in one frame.

use std::sync::Arc;

use web_time::{Duration, Instant};

use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::FortressError;

/// Default simulation rate in ticks per second.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Default cap on the wall time a single frame may feed into the accumulator.
pub const DEFAULT_MAX_FRAME_TIME: Duration = Duration::from_millis(250);

/// Highest accepted tick rate.
pub const MAX_TICK_RATE: u32 = 1000;

/// Longest accepted per-frame cap. Together with [`MAX_TICK_RATE`] this bounds the steps
/// one [`FixedTimestep::advance`] call can return.
pub const MAX_FRAME_TIME: Duration = Duration::from_secs(1);

/// Accumulator-based fixed timestep.
///
/// # Examples
///
/// ```
/// use fortress_sync::FixedTimestep;
/// use web_time::Duration;
///
/// let mut timestep = FixedTimestep::new(10, Duration::from_millis(250)).unwrap();
///
/// assert_eq!(timestep.advance(0.25), 2);
/// assert!((timestep.alpha() - 0.5).abs() < 1e-9);
/// assert_eq!(timestep.total_steps(), 2);
/// ```
#[derive(Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    step: f64,
    max_frame_time: f64,
    accumulator: f64,
    total_steps: u64,
    last_instant: Option<Instant>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl FixedTimestep {
    /// Creates a timestep running `tick_rate` steps per second.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if `tick_rate` is not in
    /// `1..=MAX_TICK_RATE` or `max_frame_time` is zero or longer than [`MAX_FRAME_TIME`].
    pub fn new(tick_rate: u32, max_frame_time: Duration) -> Result<Self, FortressError> {
        if tick_rate == 0 || tick_rate > MAX_TICK_RATE {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "tick rate must be between 1 and {}, got {}",
                    MAX_TICK_RATE, tick_rate
                ),
            });
        }
        if max_frame_time.is_zero() || max_frame_time > MAX_FRAME_TIME {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "max frame time must be positive and at most {:?}, got {:?}",
                    MAX_FRAME_TIME, max_frame_time
                ),
            });
        }
        Ok(Self {
            tick_rate,
            step: 1.0 / f64::from(tick_rate),
            max_frame_time: max_frame_time.as_secs_f64(),
            accumulator: 0.0,
            total_steps: 0,
            last_instant: None,
            violation_observer: None,
        })
    }

    /// Routes unusable elapsed times to `observer` instead of the default tracing output.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Feeds `elapsed` seconds of wall time and returns how many steps to simulate.
    ///
    /// Negative or non-finite values are reported and ignored.
    pub fn advance(&mut self, elapsed: f64) -> u32 {
        if !(elapsed.is_finite() && elapsed >= 0.0) {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::Timestep,
                "FixedTimestep::advance called with invalid elapsed time {}, skipping frame",
                elapsed
            );
            return 0;
        }

        self.accumulator += elapsed.min(self.max_frame_time);
        let mut steps = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            steps += 1;
        }
        self.total_steps += u64::from(steps);
        steps
    }

    /// Feeds an elapsed [`Duration`]. See [`advance`](Self::advance).
    pub fn advance_by(&mut self, elapsed: Duration) -> u32 {
        self.advance(elapsed.as_secs_f64())
    }

    /// Feeds the wall time elapsed since the previous call, measured at `now`.
    ///
    /// The first call only starts the clock and returns 0.
    pub fn tick(&mut self, now: Instant) -> u32 {
        let steps = match self.last_instant {
            Some(last) => self.advance_by(now.saturating_duration_since(last)),
            None => 0,
        };
        self.last_instant = Some(now);
        steps
    }

    /// Fraction of a step left in the accumulator, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.step
    }

    /// Seconds per simulation step.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Simulation steps per second.
    #[must_use]
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Steps produced since creation or the last [`reset`](Self::reset).
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Simulated time covered by [`total_steps`](Self::total_steps).
    #[must_use]
    pub fn simulation_time(&self) -> f64 {
        self.total_steps as f64 * self.step
    }

    /// Clears the accumulator, step count and clock.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.total_steps = 0;
        self.last_instant = None;
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            step: 1.0 / f64::from(DEFAULT_TICK_RATE),
            max_frame_time: DEFAULT_MAX_FRAME_TIME.as_secs_f64(),
            accumulator: 0.0,
            total_steps: 0,
            last_instant: None,
            violation_observer: None,
        }
    }
}

impl std::fmt::Debug for FixedTimestep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedTimestep")
            .field("tick_rate", &self.tick_rate)
            .field("accumulator", &self.accumulator)
            .field("total_steps", &self.total_steps)
            .field("has_violation_observer", &self.violation_observer.is_some())
            .finish_non_exhaustive()
    }
}
