//! Fuzz target for prediction and reconciliation.
//!
//! Drives a ClientPredictor and Reconciler with arbitrary inputs and authoritative
//! updates, including acknowledgements beyond what was issued, stale updates and
//! non-finite states.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary operation sequences
//! - Errors never modify the predictor
//! - The pending queue stays strictly ordered and above the last acknowledgement

#![no_main]

use arbitrary::Arbitrary;
use fortress_sync::{
    AuthoritativeUpdate, ClientPredictor, Control, EntityId, EntityState, InputCommand,
    Reconciler, SequenceNumber, Vec2,
};
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

/// Operations that can be performed on the client
#[derive(Debug, Arbitrary)]
enum ClientOp {
    /// Issue the next input
    Issue { x: f64, y: f64, accelerate: bool, dt: f64 },
    /// Apply an input with an arbitrary sequence
    Apply { sequence: u16, x: f64, dt: f64 },
    /// Apply an authoritative update
    Reconcile {
        ack: u16,
        state_sequence: u16,
        x: f64,
        timestamp: f64,
    },
}

fuzz_target!(|operations: Vec<ClientOp>| {
    let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
    let Ok(mut predictor) = ClientPredictor::new(EntityId::new(1), seed, Duration::from_secs(1))
    else {
        return;
    };
    let mut reconciler = Reconciler::new();

    for op in operations.iter().take(500) {
        let before = *predictor.current_state();
        let pending_before = predictor.pending_inputs().len();

        let failed = match *op {
            ClientOp::Issue {
                x,
                y,
                accelerate,
                dt,
            } => {
                let control = if accelerate {
                    Control::Acceleration(Vec2::new(x, y))
                } else {
                    Control::Velocity(Vec2::new(x, y))
                };
                predictor.issue(control, dt).is_err()
            }
            ClientOp::Apply { sequence, x, dt } => {
                let input = InputCommand::velocity(
                    SequenceNumber::new(u64::from(sequence)),
                    Vec2::new(x, 0.0),
                    dt,
                );
                predictor.apply_input(input).is_err()
            }
            ClientOp::Reconcile {
                ack,
                state_sequence,
                x,
                timestamp,
            } => {
                let state = EntityState::new(
                    Vec2::new(x, 0.0),
                    Vec2::zero(),
                    timestamp,
                    SequenceNumber::new(u64::from(state_sequence)),
                );
                let update = AuthoritativeUpdate::new(state, SequenceNumber::new(u64::from(ack)));
                reconciler.reconcile(&mut predictor, update).is_err()
            }
        };

        if failed {
            let after = *predictor.current_state();
            // NaN positions from an accepted huge input are not comparable, use bits
            assert_eq!(before.timestamp.to_bits(), after.timestamp.to_bits());
            assert_eq!(before.sequence, after.sequence);
            assert_eq!(pending_before, predictor.pending_inputs().len());
        }

        let pending = predictor.pending_inputs();
        assert!(pending.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert!(pending
            .iter()
            .all(|input| input.sequence > reconciler.last_acknowledged()));
    }
});
