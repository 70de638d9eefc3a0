//! Client-side prediction of the locally controlled entity.
//!
//! The client does not wait for the server to echo its input back. Each input is
//! applied to the local state immediately, remembered until the server acknowledges
//! it, and recorded in a local [`StateHistory`]. When an authoritative update arrives,
//! the [`Reconciler`](crate::Reconciler) resets to it and replays the inputs the
//! server has not seen yet.

use smallvec::SmallVec;
use tracing::trace;
use web_time::Duration;

use crate::history::StateHistory;
use crate::kinematics::apply_command;
use crate::report_violation_to;
use crate::state::{Control, EntityState, InputCommand};
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::vector::Vector;
use crate::{EntityId, FortressError, SequenceNumber};
use std::sync::Arc;

/// Inline capacity of the pending input queue. At 60 Hz this covers about half a second
/// of unacknowledged input before the queue spills to the heap.
pub const PENDING_INPUTS_INLINE: usize = 32;

pub(crate) type PendingInputs<V> = SmallVec<[InputCommand<V>; PENDING_INPUTS_INLINE]>;

/// Owns the predicted state of the local entity and the inputs the server has not
/// acknowledged yet.
///
/// # Examples
///
/// ```
/// use fortress_sync::{ClientPredictor, EntityId, EntityState, InputCommand, SequenceNumber, Vec2};
/// use web_time::Duration;
///
/// let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
/// let mut predictor = ClientPredictor::new(EntityId::new(1), seed, Duration::from_secs(1)).unwrap();
///
/// for i in 1..=3 {
///     let input = InputCommand::velocity(SequenceNumber::new(i), Vec2::new(10.0, 0.0), 0.1);
///     predictor.apply_input(input).unwrap();
/// }
///
/// assert_eq!(predictor.current_state().position, Vec2::new(3.0, 0.0));
/// assert_eq!(predictor.pending_inputs().len(), 3);
/// ```
pub struct ClientPredictor<V: Vector> {
    pub(crate) entity: EntityId,
    pub(crate) current: EntityState<V>,
    pub(crate) pending: PendingInputs<V>,
    pub(crate) history: StateHistory<V>,
    pub(crate) last_issued: SequenceNumber,
    pub(crate) violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<V: Vector> ClientPredictor<V> {
    /// Creates a predictor starting from `seed`, which is recorded as the first history entry.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the seed timestamp is not finite.
    pub fn new(
        entity: EntityId,
        seed: EntityState<V>,
        retention_window: Duration,
    ) -> Result<Self, FortressError> {
        let mut history = StateHistory::new(entity, retention_window);
        history.record(seed)?;
        Ok(Self {
            entity,
            current: seed,
            pending: SmallVec::new(),
            history,
            last_issued: seed.sequence,
            violation_observer: None,
        })
    }

    /// Routes contract anomalies to `observer` instead of the default tracing output.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Applies `input` to the current state, queues it for replay, and returns the new state.
    ///
    /// # Errors
    ///
    /// - [`FortressError::StaleState`] if `input.sequence` is not greater than the last
    ///   issued sequence. The pending queue must stay in strictly increasing order.
    /// - [`FortressError::InvalidTimestep`] if `input.dt` is not finite and positive.
    /// - [`FortressError::InvalidRequest`] if the control vector is not finite.
    ///
    /// Nothing is modified when an error is returned.
    pub fn apply_input(&mut self, input: InputCommand<V>) -> Result<EntityState<V>, FortressError> {
        if input.sequence <= self.last_issued {
            return Err(FortressError::StaleState {
                sequence: input.sequence,
                last: self.last_issued,
            });
        }
        if !(input.dt.is_finite() && input.dt > 0.0) {
            return Err(FortressError::InvalidTimestep { dt: input.dt });
        }
        let control_finite = match input.control {
            Control::Velocity(v) | Control::Acceleration(v) => v.is_finite(),
        };
        if !control_finite {
            return Err(FortressError::InvalidRequest {
                info: format!("input {} has a non-finite control vector", input.sequence),
            });
        }

        let next = apply_command(&self.current, &input)?;

        if let Err(err) = self.history.record(next) {
            // the input itself is valid; a rejected history entry only loses a lookup point
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::Prediction,
                "predicted state {} for entity {} not recorded: {}",
                next.sequence,
                self.entity,
                err
            );
        }

        self.pending.push(input);
        self.current = next;
        self.last_issued = input.sequence;

        trace!(
            "Predicted input {} for entity {}: position {:?} ({} pending)",
            input.sequence,
            self.entity,
            next.position,
            self.pending.len()
        );
        Ok(next)
    }

    /// Builds an input with the next sequence number, applies it, and returns both.
    ///
    /// # Errors
    ///
    /// Same as [`apply_input`](Self::apply_input).
    pub fn issue(
        &mut self,
        control: Control<V>,
        dt: f64,
    ) -> Result<(InputCommand<V>, EntityState<V>), FortressError> {
        let input = InputCommand::new(self.last_issued.next(), control, dt);
        let state = self.apply_input(input)?;
        Ok((input, state))
    }

    /// Removes every pending input with a sequence number `<= up_to`.
    pub(crate) fn discard_acknowledged(&mut self, up_to: SequenceNumber) -> usize {
        let count = self.pending.iter().take_while(|i| i.sequence <= up_to).count();
        self.pending.drain(..count);
        count
    }

    /// The entity this predictor controls.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The current predicted state.
    #[must_use]
    pub fn current_state(&self) -> &EntityState<V> {
        &self.current
    }

    /// Inputs not yet acknowledged by the server, oldest first.
    #[must_use]
    pub fn pending_inputs(&self) -> &[InputCommand<V>] {
        &self.pending
    }

    /// The highest input sequence number ever issued.
    #[must_use]
    pub fn last_issued(&self) -> SequenceNumber {
        self.last_issued
    }

    /// The local history of predicted (and reconciled) states.
    #[must_use]
    pub fn history(&self) -> &StateHistory<V> {
        &self.history
    }
}

impl<V: Vector> std::fmt::Debug for ClientPredictor<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPredictor")
            .field("entity", &self.entity)
            .field("current", &self.current)
            .field("pending", &self.pending.len())
            .field("last_issued", &self.last_issued)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}
