//! Render-time smoothing of remote entities.
//!
//! Remote entities are only known at the discrete moments the server sent snapshots of
//! them. The renderer runs at its own rate and asks for positions in between (or, when
//! no newer snapshot has arrived yet, slightly beyond the newest one). Nothing in this
//! module fails: out-of-range inputs are clamped, because a render frame must always
//! produce a position.
//!
//! The locally predicted entity is never interpolated; render its predicted state directly.

use web_time::Duration;

use crate::history::StateHistory;
use crate::kinematics::position_after;
use crate::state::EntityState;
use crate::vector::Vector;
use crate::{EntityId, FortressError};

/// Default delay between the render clock and the sampled snapshot time.
pub const DEFAULT_INTERPOLATION_DELAY: Duration = Duration::from_millis(100);

/// Default cap on how far past the newest snapshot a view extrapolates.
pub const DEFAULT_MAX_EXTRAPOLATION: Duration = Duration::from_millis(250);

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Linearly interpolates between the positions of `a` and `b`.
///
/// `alpha` is clamped to `[0, 1]` (NaN counts as 0). The endpoints are exact:
/// `alpha <= 0` yields `a.position` and `alpha >= 1` yields `b.position`.
///
/// # Examples
///
/// ```
/// use fortress_sync::interpolation::interpolate;
/// use fortress_sync::{EntityState, Vec2};
///
/// let a = EntityState::seed(Vec2::new(0.0, 0.0), Vec2::zero(), 0.0);
/// let b = EntityState::seed(Vec2::new(10.0, 4.0), Vec2::zero(), 0.1);
///
/// assert_eq!(interpolate(&a, &b, 0.5), Vec2::new(5.0, 2.0));
/// assert_eq!(interpolate(&a, &b, 7.0), b.position);
/// ```
#[must_use]
pub fn interpolate<V: Vector>(a: &EntityState<V>, b: &EntityState<V>, alpha: f64) -> V {
    let alpha = clamp_unit(alpha);
    if alpha <= 0.0 {
        a.position
    } else if alpha >= 1.0 {
        b.position
    } else {
        a.position.lerp(b.position, alpha)
    }
}

/// Projects `state` forward by `dt` seconds using its velocity.
///
/// A negative or non-finite `dt` is clamped to zero, returning `state.position`.
#[must_use]
pub fn extrapolate<V: Vector>(state: &EntityState<V>, dt: f64) -> V {
    if !(dt.is_finite() && dt > 0.0) {
        return state.position;
    }
    position_after(state.position, state.velocity, dt)
}

/// The interpolation factor of `time` between `a` and `b`, clamped to `[0, 1]`.
///
/// Returns 0 if the states do not span a positive interval.
#[must_use]
pub fn alpha_between<V: Vector>(a: &EntityState<V>, b: &EntityState<V>, time: f64) -> f64 {
    let span = b.timestamp - a.timestamp;
    if !(span.is_finite() && span > 0.0) {
        return 0.0;
    }
    clamp_unit((time - a.timestamp) / span)
}

/// Buffer of received snapshots of one remote entity, sampled for rendering.
///
/// The view renders `interpolation_delay` in the past so that, under normal jitter, two
/// snapshots bracketing the sample time have already arrived. When they have not, it
/// extrapolates from the newest snapshot for at most `max_extrapolation`, then holds.
///
/// # Examples
///
/// ```
/// use fortress_sync::{EntityId, EntityState, RemoteEntityView, SequenceNumber, Vec2};
/// use web_time::Duration;
///
/// let mut view = RemoteEntityView::new(
///     EntityId::new(5),
///     Duration::from_secs(1),
///     Duration::from_millis(100),
///     Duration::from_millis(250),
/// );
/// view.push(EntityState::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 1.0, SequenceNumber::new(1))).unwrap();
/// view.push(EntityState::new(Vec2::new(1.0, 0.0), Vec2::new(10.0, 0.0), 1.1, SequenceNumber::new(2))).unwrap();
///
/// // render clock 1.15 samples t = 1.05, halfway between the snapshots
/// let position = view.sample(1.15).unwrap();
/// assert!((position.x - 0.5).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct RemoteEntityView<V: Vector> {
    snapshots: StateHistory<V>,
    interpolation_delay: f64,
    max_extrapolation: f64,
}

impl<V: Vector> RemoteEntityView<V> {
    /// Creates an empty view.
    #[must_use]
    pub fn new(
        entity: EntityId,
        retention_window: Duration,
        interpolation_delay: Duration,
        max_extrapolation: Duration,
    ) -> Self {
        Self {
            snapshots: StateHistory::new(entity, retention_window),
            interpolation_delay: interpolation_delay.as_secs_f64(),
            max_extrapolation: max_extrapolation.as_secs_f64(),
        }
    }

    /// Adds a received snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::StaleState`] for a snapshot that is not newer than the newest
    /// one held. Reordered snapshots are expected; callers usually ignore this error.
    pub fn push(&mut self, state: EntityState<V>) -> Result<(), FortressError> {
        self.snapshots.record(state)
    }

    /// The render position at `render_time`, or `None` before the first snapshot arrives.
    #[must_use]
    pub fn sample(&self, render_time: f64) -> Option<V> {
        let newest = self.snapshots.latest()?;
        let target = render_time - self.interpolation_delay;

        if let Some((a, b)) = self.snapshots.bracketing(target) {
            return Some(interpolate(a, b, alpha_between(a, b, target)));
        }
        if target > newest.timestamp {
            let ahead = (target - newest.timestamp).min(self.max_extrapolation);
            return Some(extrapolate(newest, ahead));
        }
        self.snapshots.oldest().map(|oldest| oldest.position)
    }

    /// Returns `true` once two snapshots are buffered and interpolation is possible.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.snapshots.len() >= 2
    }

    /// The buffered snapshots.
    #[must_use]
    pub fn snapshots(&self) -> &StateHistory<V> {
        &self.snapshots
    }

    /// The interpolation delay in seconds.
    #[must_use]
    pub fn interpolation_delay(&self) -> f64 {
        self.interpolation_delay
    }
}
