//! Server reconciliation: reset to the authoritative state and replay unacknowledged inputs.
//!
//! When an [`AuthoritativeUpdate`] arrives the reconciler:
//!
//! 1. discards every pending input the server has processed,
//! 2. takes the server's state as the new starting point (no blending),
//! 3. replays the remaining pending inputs in order, each with its own `dt`,
//! 4. measures how far the corrected position is from what was predicted.
//!
//! The measured error is diagnostic. A renderer may use it through a
//! [`CorrectionPolicy`] to decide between snapping and smoothing.

use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::kinematics::apply_command;
use crate::prediction::{ClientPredictor, PENDING_INPUTS_INLINE};
use crate::report_violation_to;
use crate::state::{AuthoritativeUpdate, EntityState};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::vector::Vector;
use crate::{FortressError, SequenceNumber};

/// Default distance above which a correction should be snapped rather than smoothed.
pub const DEFAULT_SNAP_THRESHOLD: f64 = 1.0;

/// The outcome of one reconciliation pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ReconciliationResult<V: Vector> {
    /// The predictor's new current state.
    pub corrected_state: EntityState<V>,
    /// Distance between the position predicted before reconciliation and the corrected one.
    pub error: f64,
    /// Number of pending inputs replayed on top of the authoritative state.
    pub replayed_inputs: usize,
    /// Number of pending inputs discarded as acknowledged.
    pub acknowledged_inputs: usize,
}

impl<V: Vector> ReconciliationResult<V> {
    /// Returns `true` if the prediction was off by more than `threshold`.
    #[must_use]
    pub fn needs_snap(&self, threshold: f64) -> bool {
        self.error > threshold
    }
}

/// How a renderer should apply a correction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Correction {
    /// The prediction was exact.
    None,
    /// Blend toward the corrected position over a few frames.
    Smooth,
    /// Jump to the corrected position.
    Snap,
}

/// Chooses a [`Correction`] from the reconciliation error.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CorrectionPolicy {
    /// Errors strictly above this distance are snapped.
    pub snap_threshold: f64,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
        }
    }
}

impl CorrectionPolicy {
    /// Creates a policy with the given snap threshold.
    #[must_use]
    pub const fn new(snap_threshold: f64) -> Self {
        Self { snap_threshold }
    }

    /// Classifies a reconciliation result.
    #[must_use]
    pub fn decide<V: Vector>(&self, result: &ReconciliationResult<V>) -> Correction {
        if result.error == 0.0 {
            Correction::None
        } else if result.needs_snap(self.snap_threshold) {
            Correction::Snap
        } else {
            Correction::Smooth
        }
    }
}

/// Applies authoritative updates to a [`ClientPredictor`].
///
/// The reconciler remembers the newest update it applied so that updates delivered
/// out of order are dropped instead of rolling the client back in time.
///
/// # Examples
///
/// ```
/// use fortress_sync::{
///     AuthoritativeUpdate, ClientPredictor, EntityId, EntityState, InputCommand, Reconciler,
///     SequenceNumber, Vec2,
/// };
/// use web_time::Duration;
///
/// let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
/// let mut predictor = ClientPredictor::new(EntityId::new(1), seed, Duration::from_secs(1)).unwrap();
/// for i in 1..=3 {
///     predictor
///         .apply_input(InputCommand::velocity(SequenceNumber::new(i), Vec2::new(10.0, 0.0), 0.1))
///         .unwrap();
/// }
///
/// let server_state = EntityState::new(Vec2::new(1.0, 0.0), Vec2::new(10.0, 0.0), 0.1, SequenceNumber::new(1));
/// let mut reconciler = Reconciler::new();
/// let result = reconciler
///     .reconcile(&mut predictor, AuthoritativeUpdate::new(server_state, SequenceNumber::new(1)))
///     .unwrap();
///
/// assert_eq!(result.corrected_state.position, Vec2::new(3.0, 0.0));
/// assert_eq!(result.error, 0.0);
/// assert_eq!(result.replayed_inputs, 2);
/// ```
#[derive(Default)]
pub struct Reconciler {
    last_acknowledged: SequenceNumber,
    last_authoritative: Option<SequenceNumber>,
    policy: CorrectionPolicy,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl Reconciler {
    /// Creates a reconciler that has not applied any update yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the policy used to flag large corrections.
    #[must_use]
    pub fn with_policy(mut self, policy: CorrectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Routes contract anomalies to `observer` instead of the default tracing output.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// The correction policy in use.
    #[must_use]
    pub fn policy(&self) -> &CorrectionPolicy {
        &self.policy
    }

    /// The highest input sequence acknowledged so far.
    #[must_use]
    pub fn last_acknowledged(&self) -> SequenceNumber {
        self.last_acknowledged
    }

    /// Discards pending inputs with sequence `<= up_to` and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::SequenceOutOfRange`] if `up_to` is greater than any
    /// sequence the predictor has issued.
    pub fn acknowledge<V: Vector>(
        &mut self,
        predictor: &mut ClientPredictor<V>,
        up_to: SequenceNumber,
    ) -> Result<usize, FortressError> {
        self.check_in_range(predictor, up_to)?;
        let discarded = predictor.discard_acknowledged(up_to);
        self.last_acknowledged = self.last_acknowledged.max(up_to);
        trace!(
            "Acknowledged inputs up to {} for entity {} ({} discarded)",
            up_to,
            predictor.entity,
            discarded
        );
        Ok(discarded)
    }

    fn check_in_range<V: Vector>(
        &self,
        predictor: &ClientPredictor<V>,
        acknowledged: SequenceNumber,
    ) -> Result<(), FortressError> {
        if acknowledged > predictor.last_issued {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::Reconciliation,
                "entity {}: server acknowledged input {} but only {} were issued",
                predictor.entity,
                acknowledged,
                predictor.last_issued
            );
            return Err(FortressError::SequenceOutOfRange {
                acknowledged,
                highest_issued: predictor.last_issued,
            });
        }
        Ok(())
    }

    /// Resets `predictor` to the authoritative state and replays its unacknowledged inputs.
    ///
    /// On success the predictor's current state is the corrected state, and its local
    /// history entries newer than the acknowledged sequence are replaced by the replayed
    /// states.
    ///
    /// # Errors
    ///
    /// - [`FortressError::SequenceOutOfRange`] if the update acknowledges an input that was
    ///   never issued. The connection layer must resync.
    /// - [`FortressError::StaleState`] if the update is older than one already applied
    ///   (lower acknowledged sequence, or a state sequence that is not newer). The update is
    ///   dropped and the predictor is untouched.
    /// - [`FortressError::InvalidRequest`] if the authoritative state is not finite.
    pub fn reconcile<V: Vector>(
        &mut self,
        predictor: &mut ClientPredictor<V>,
        update: AuthoritativeUpdate<V>,
    ) -> Result<ReconciliationResult<V>, FortressError> {
        let acknowledged = update.last_processed_input;
        self.check_in_range(predictor, acknowledged)?;

        if acknowledged < self.last_acknowledged {
            return Err(FortressError::StaleState {
                sequence: acknowledged,
                last: self.last_acknowledged,
            });
        }
        if let Some(last) = self.last_authoritative {
            if update.state.sequence <= last {
                return Err(FortressError::StaleState {
                    sequence: update.state.sequence,
                    last,
                });
            }
        }
        let authoritative = update.state;
        if !(authoritative.position.is_finite()
            && authoritative.velocity.is_finite()
            && authoritative.timestamp.is_finite())
        {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "authoritative state {} for entity {} is not finite",
                    authoritative.sequence, predictor.entity
                ),
            });
        }

        let predicted = predictor.current;

        // replay in the client's input-sequence space, starting at the acknowledged input
        let mut working = authoritative.with_sequence(acknowledged);
        let mut replayed: SmallVec<[EntityState<V>; PENDING_INPUTS_INLINE]> = SmallVec::new();
        for input in predictor
            .pending
            .iter()
            .filter(|input| input.sequence > acknowledged)
        {
            working = apply_command(&working, input)?;
            replayed.push(working);
        }

        let acknowledged_inputs = self.acknowledge(predictor, acknowledged)?;
        self.last_authoritative = Some(authoritative.sequence);

        predictor.history.discard_after(acknowledged);
        for state in &replayed {
            if let Err(err) = predictor.history.record(*state) {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::Reconciliation,
                    "replayed state {} for entity {} not recorded: {}",
                    state.sequence,
                    predictor.entity,
                    err
                );
            }
        }
        predictor.current = working;

        let result = ReconciliationResult {
            corrected_state: working,
            error: predicted.position_error(&working),
            replayed_inputs: replayed.len(),
            acknowledged_inputs,
        };

        debug!(
            "Reconciled entity {} at ack {}: error {:.6}, {} replayed, {} acknowledged",
            predictor.entity,
            acknowledged,
            result.error,
            result.replayed_inputs,
            result.acknowledged_inputs
        );
        if result.needs_snap(self.policy.snap_threshold) {
            debug!(
                "Correction of {:.3} for entity {} exceeds snap threshold {}",
                result.error, predictor.entity, self.policy.snap_threshold
            );
        }

        Ok(result)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("last_acknowledged", &self.last_acknowledged)
            .field("last_authoritative", &self.last_authoritative)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
