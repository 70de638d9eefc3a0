//! Determinism tests.
//!
//! The kinematic step, replay and reconciliation must produce bit-identical results for
//! identical inputs. Peers compare states with `==`, so even a last-bit difference
//! would show up as a permanent correction.

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

use fortress_sync::__internal::replay;
use fortress_sync::kinematics::{advance, apply_command};
use fortress_sync::{
    AuthoritativeUpdate, ClientPredictor, Control, EntityId, EntityState, InputCommand,
    Reconciler, SequenceNumber, Vec2, Vec3,
};
use web_time::Duration;

const ENTITY: EntityId = EntityId::new(1);

/// A fixed, varied input script: turns, stops and accelerations at uneven timesteps.
fn script() -> Vec<InputCommand<Vec2>> {
    (1..=120u64)
        .map(|i| {
            let phase = i as f64 * 0.173;
            let control = if i % 3 == 0 {
                Control::Acceleration(Vec2::new(phase.sin() * 4.0, phase.cos() * 4.0))
            } else {
                Control::Velocity(Vec2::new(phase.cos() * 7.5, -phase.sin() * 2.5))
            };
            let dt = 1.0 / 60.0 + (i % 7) as f64 * 0.001;
            InputCommand::new(SequenceNumber::new(i), control, dt)
        })
        .collect()
}

#[test]
fn test_replay_is_bit_identical() {
    let seed = EntityState::seed(Vec2::new(3.0, -1.0), Vec2::new(0.5, 0.5), 12.0);
    let inputs = script();

    let first = replay(&seed, &inputs).unwrap();
    let second = replay(&seed, &inputs).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.position.x.to_bits(), second.position.x.to_bits());
    assert_eq!(first.sequence, SequenceNumber::new(120));
}

#[test]
fn test_step_by_step_matches_replay() {
    let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
    let inputs = script();

    let mut state = seed;
    for input in &inputs {
        state = apply_command(&state, input).unwrap();
    }
    assert_eq!(state, replay(&seed, &inputs).unwrap());
}

#[test]
fn test_prediction_matches_replay() {
    let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
    let inputs = script();
    let mut predictor = ClientPredictor::new(ENTITY, seed, Duration::from_secs(1)).unwrap();
    for input in &inputs {
        predictor.apply_input(*input).unwrap();
    }
    assert_eq!(*predictor.current_state(), replay(&seed, &inputs).unwrap());
}

#[test]
fn test_two_clients_reconcile_identically() {
    let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
    let inputs = script();

    let run = || {
        let mut predictor = ClientPredictor::new(ENTITY, seed, Duration::from_secs(1)).unwrap();
        let mut reconciler = Reconciler::new();
        let mut server = seed;
        let mut corrections = Vec::new();
        for (i, input) in inputs.iter().enumerate() {
            predictor.apply_input(*input).unwrap();
            if i % 4 == 3 {
                // server applies up to this input but nudges the entity sideways
                for acked in &inputs[i - 3..=i] {
                    server = apply_command(&server, acked).unwrap();
                }
                server.position = server.position + Vec2::new(0.0, 0.01);
                let result = reconciler
                    .reconcile(&mut predictor, AuthoritativeUpdate::new(server, input.sequence))
                    .unwrap();
                corrections.push(result.error.to_bits());
            }
        }
        (*predictor.current_state(), corrections)
    };

    assert_eq!(run(), run());
}

#[test]
fn test_three_dimensional_step_is_deterministic() {
    let seed = EntityState::seed(Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.0);
    let gravity = Control::Acceleration(Vec3::new(0.0, -9.81, 0.0));

    let mut a = seed;
    let mut b = seed;
    for _ in 0..600 {
        a = advance(&a, gravity, 1.0 / 120.0).unwrap();
        b = advance(&b, gravity, 1.0 / 120.0).unwrap();
    }
    assert_eq!(a, b);
    assert!(a.position.y < 10.0);
    assert!((a.timestamp - 5.0).abs() < 1e-9);
}
