//! Server-side lag compensation.
//!
//! When a client acts on another entity (fires at it, touches it), it acted on where
//! it *saw* that entity, which is in the past from the server's point of view. The
//! compensator rewinds the target's recorded history by the actor's one-way latency
//! and returns the state the actor was looking at.

use std::sync::Arc;

use tracing::trace;

use crate::history::SharedHistory;
use crate::latency::LatencyEstimator;
use crate::report_violation_to;
use crate::state::EntityState;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::vector::Vector;
use crate::{EntityId, FortressError};

/// Rewinds entity histories to the moment an action was observed.
///
/// Reads go through [`SharedHistory`], so a rewind never sees a history while the
/// simulation thread is in the middle of appending to it.
///
/// # Examples
///
/// ```
/// use fortress_sync::{EntityId, EntityState, LagCompensator, SequenceNumber, SharedHistory, Vec2};
/// use web_time::Duration;
///
/// let history = SharedHistory::new(Duration::from_secs(1));
/// let target = EntityId::new(2);
/// for i in 0..10u32 {
///     let state = EntityState::new(
///         Vec2::new(f64::from(i), 0.0),
///         Vec2::new(10.0, 0.0),
///         f64::from(i) * 0.1,
///         SequenceNumber::new(u64::from(i)),
///     );
///     history.record(target, state).unwrap();
/// }
///
/// let compensator = LagCompensator::new(history);
/// let seen = compensator.rewind(target, 0.55, 0.1).unwrap();
/// assert_eq!(seen.position, Vec2::new(5.0, 0.0));
/// ```
pub struct LagCompensator<V: Vector> {
    history: SharedHistory<V>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<V: Vector> LagCompensator<V> {
    /// Creates a compensator reading from `history`.
    #[must_use]
    pub fn new(history: SharedHistory<V>) -> Self {
        Self {
            history,
            violation_observer: None,
        }
    }

    /// Routes contract anomalies to `observer` instead of the default tracing output.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// The history this compensator reads from.
    #[must_use]
    pub fn history(&self) -> &SharedHistory<V> {
        &self.history
    }

    /// Returns the state of `target` at `action_issue_time - one_way_latency`.
    ///
    /// If that time is older than anything retained, the oldest retained state is returned
    /// and a warning is reported: the answer is best-effort, not an error.
    ///
    /// # Errors
    ///
    /// - [`FortressError::InvalidRequest`] if `one_way_latency` is negative or not finite,
    ///   or `action_issue_time` is NaN.
    /// - [`FortressError::NoHistory`] if `target` has no recorded states.
    pub fn rewind(
        &self,
        target: EntityId,
        action_issue_time: f64,
        one_way_latency: f64,
    ) -> Result<EntityState<V>, FortressError> {
        let target_time = Self::target_time(action_issue_time, one_way_latency)?;

        let (state, oldest) = self.history.with_read(|store| {
            let state = store.query_at(target, target_time)?;
            let oldest = store
                .history(target)
                .and_then(|history| history.oldest().map(|s| s.timestamp));
            Ok::<_, FortressError>((state, oldest))
        })?;

        if let Some(oldest) = oldest {
            if target_time < oldest {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::LagCompensation,
                    "rewind of entity {} to t={} predates retained history (oldest t={}), using oldest",
                    target,
                    target_time,
                    oldest
                );
            }
        }

        trace!(
            "Rewound entity {} to t={} (issued {}, latency {}): state {} at t={}",
            target,
            target_time,
            action_issue_time,
            one_way_latency,
            state.sequence,
            state.timestamp
        );
        Ok(state)
    }

    /// Like [`rewind`](Self::rewind), taking the latency from `estimator`.
    ///
    /// With no estimate available yet the latency is taken as zero.
    ///
    /// # Errors
    ///
    /// Same as [`rewind`](Self::rewind).
    pub fn rewind_with<L: LatencyEstimator + ?Sized>(
        &self,
        target: EntityId,
        action_issue_time: f64,
        estimator: &L,
    ) -> Result<EntityState<V>, FortressError> {
        let latency = estimator.one_way_latency().unwrap_or(0.0);
        self.rewind(target, action_issue_time, latency)
    }

    /// Rewinds every tracked entity to the same moment, under one consistent read.
    ///
    /// Entities are returned in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] for an invalid latency or issue time.
    pub fn rewind_all(
        &self,
        action_issue_time: f64,
        one_way_latency: f64,
    ) -> Result<Vec<(EntityId, EntityState<V>)>, FortressError> {
        let target_time = Self::target_time(action_issue_time, one_way_latency)?;
        Ok(self.history.with_read(|store| {
            store
                .entity_ids()
                .filter_map(|id| store.query_at(id, target_time).ok().map(|s| (id, s)))
                .collect()
        }))
    }

    fn target_time(action_issue_time: f64, one_way_latency: f64) -> Result<f64, FortressError> {
        if !(one_way_latency.is_finite() && one_way_latency >= 0.0) {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "one-way latency must be finite and non-negative, got {}",
                    one_way_latency
                ),
            });
        }
        if action_issue_time.is_nan() {
            return Err(FortressError::InvalidRequest {
                info: "action issue time is NaN".to_owned(),
            });
        }
        Ok(action_issue_time - one_way_latency)
    }
}

impl<V: Vector> std::fmt::Debug for LagCompensator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LagCompensator")
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}
