//! The kinematic model: a pure, deterministic `(state, control, dt) -> state'` step.
//!
//! Integration is explicit (forward) Euler. The velocity is updated first, then the
//! position is advanced with the *new* velocity:
//!
//! ```text
//! v' = control is Velocity(v_in)      ? v_in
//!                 Acceleration(a)     : v + a * dt
//! p' = p + v' * dt
//! t' = t + dt
//! ```
//!
//! # Determinism Requirement
//!
//! Client and server must produce bit-identical states from identical inputs, or
//! reconciliation will never converge. Every function here is free of side effects
//! and evaluates its arithmetic in a fixed order.
//!
//! # Examples
//!
//! ```
//! use fortress_sync::kinematics::advance;
//! use fortress_sync::{Control, EntityState, Vec2};
//!
//! let state = EntityState::seed(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.0);
//! let next = advance(&state, Control::Acceleration(Vec2::new(0.0, 0.0)), 0.1).unwrap();
//! assert_eq!(next.position, Vec2::new(1.0, 0.0));
//! assert_eq!(next.timestamp, 0.1);
//! ```

use crate::state::{Control, EntityState, InputCommand};
use crate::vector::Vector;
use crate::FortressError;

/// Validates a simulation timestep. `0` is valid (a no-op step).
pub(crate) fn check_timestep(dt: f64) -> Result<(), FortressError> {
    if dt.is_finite() && dt >= 0.0 {
        Ok(())
    } else {
        Err(FortressError::InvalidTimestep { dt })
    }
}

/// The position-update rule on its own: `position + velocity * dt`.
///
/// Used by extrapolation, which has a velocity but no control input.
#[inline]
#[must_use]
pub fn position_after<V: Vector>(position: V, velocity: V, dt: f64) -> V {
    position + velocity * dt
}

/// Advances `state` by `dt` seconds under `control`.
///
/// The returned state keeps the sequence number of `state`; use [`apply_command`] to
/// stamp the result with the sequence of the input that produced it.
///
/// # Errors
///
/// Returns [`FortressError::InvalidTimestep`] if `dt` is negative or not finite.
/// A `dt` of exactly zero returns `state` unchanged.
pub fn advance<V: Vector>(
    state: &EntityState<V>,
    control: Control<V>,
    dt: f64,
) -> Result<EntityState<V>, FortressError> {
    check_timestep(dt)?;
    if dt == 0.0 {
        return Ok(*state);
    }

    let velocity = match control {
        Control::Velocity(velocity) => velocity,
        Control::Acceleration(acceleration) => state.velocity + acceleration * dt,
    };
    let position = position_after(state.position, velocity, dt);

    Ok(EntityState::new(
        position,
        velocity,
        state.timestamp + dt,
        state.sequence,
    ))
}

/// Applies one input command using the command's own `dt`, tagging the result with the
/// command's sequence number.
///
/// # Errors
///
/// Returns [`FortressError::InvalidTimestep`] if the command's `dt` is negative or not finite.
pub fn apply_command<V: Vector>(
    state: &EntityState<V>,
    input: &InputCommand<V>,
) -> Result<EntityState<V>, FortressError> {
    advance(state, input.control, input.dt).map(|next| next.with_sequence(input.sequence))
}

/// Applies `inputs` in order, starting from `start`.
///
/// This is the replay primitive used by reconciliation and by ground-truth simulators
/// in tests; both sides run the exact same sequence of [`apply_command`] calls.
///
/// # Errors
///
/// Stops at the first input with an invalid `dt` and returns
/// [`FortressError::InvalidTimestep`].
pub fn replay<'a, V, I>(start: &EntityState<V>, inputs: I) -> Result<EntityState<V>, FortressError>
where
    V: Vector,
    I: IntoIterator<Item = &'a InputCommand<V>>,
{
    inputs
        .into_iter()
        .try_fold(*start, |state, input| apply_command(&state, input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SequenceNumber, Vec2, Vec3};

    fn moving_right() -> EntityState<Vec2> {
        EntityState::seed(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.0)
    }

    #[test]
    fn velocity_control_replaces_velocity_before_position_update() {
        let next = advance(&moving_right(), Control::Velocity(Vec2::new(0.0, 5.0)), 0.5).unwrap();
        assert_eq!(next.velocity, Vec2::new(0.0, 5.0));
        assert_eq!(next.position, Vec2::new(0.0, 2.5));
    }

    #[test]
    fn acceleration_updates_velocity_before_position() {
        // velocity first, then position from the new velocity
        let start = EntityState::seed(Vec3::new(0.0, 100.0, 0.0), Vec3::zero(), 0.0);
        let next = advance(&start, Control::Acceleration(Vec3::new(0.0, -10.0, 0.0)), 0.5).unwrap();
        assert_eq!(next.velocity, Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(next.position, Vec3::new(0.0, 97.5, 0.0));
        assert_eq!(next.timestamp, 0.5);
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let start = moving_right().with_sequence(SequenceNumber::new(4));
        let next = advance(&start, Control::Velocity(Vec2::new(99.0, 99.0)), 0.0).unwrap();
        assert_eq!(next, start);
    }

    #[test]
    fn negative_dt_fails() {
        let result = advance(&moving_right(), Control::default(), -0.016);
        assert_eq!(result, Err(FortressError::InvalidTimestep { dt: -0.016 }));
    }

    #[test]
    fn non_finite_dt_fails() {
        assert!(advance(&moving_right(), Control::default(), f64::NAN).is_err());
        assert!(advance(&moving_right(), Control::default(), f64::INFINITY).is_err());
    }

    #[test]
    fn apply_command_stamps_input_sequence() {
        let input = InputCommand::velocity(SequenceNumber::new(7), Vec2::new(10.0, 0.0), 0.1);
        let next = apply_command(&moving_right(), &input).unwrap();
        assert_eq!(next.sequence, SequenceNumber::new(7));
        assert_eq!(next.position, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn replay_three_ticks_reaches_three_units() {
        let inputs: Vec<_> = (1..=3)
            .map(|i| InputCommand::velocity(SequenceNumber::new(i), Vec2::new(10.0, 0.0), 0.1))
            .collect();
        let end = replay(&moving_right(), &inputs).unwrap();
        assert_eq!(end.position, Vec2::new(3.0, 0.0));
        assert_eq!(end.sequence, SequenceNumber::new(3));
    }

    #[test]
    fn replay_of_nothing_returns_start() {
        let start = moving_right();
        assert_eq!(replay(&start, &Vec::<InputCommand<Vec2>>::new()).unwrap(), start);
    }

    #[test]
    fn advance_is_bit_identical_across_calls() {
        let start = EntityState::seed(Vec2::new(0.1, 0.7), Vec2::new(-3.3, 1.9), 12.25);
        let control = Control::Acceleration(Vec2::new(0.3, -9.81));
        let first = advance(&start, control, 1.0 / 60.0).unwrap();
        for _ in 0..100 {
            let again = advance(&start, control, 1.0 / 60.0).unwrap();
            assert_eq!(again.position.x.to_bits(), first.position.x.to_bits());
            assert_eq!(again.position.y.to_bits(), first.position.y.to_bits());
            assert_eq!(again.velocity.y.to_bits(), first.velocity.y.to_bits());
        }
    }

    #[test]
    fn position_after_uses_velocity_only() {
        assert_eq!(
            position_after(Vec2::new(1.0, 1.0), Vec2::new(2.0, -4.0), 0.25),
            Vec2::new(1.5, 0.0)
        );
    }
}
