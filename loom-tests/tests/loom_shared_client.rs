//! Loom tests for SharedClient.
//!
//! Authoritative updates are applied on a network thread while the simulation
//! thread keeps predicting. A reconciliation pass must never interleave with a
//! predicted tick.
//!
//! Run with:
//! ```bash
//! cd loom-tests
//! RUSTFLAGS="--cfg loom" cargo test --release
//! ```

#![cfg(loom)]

use fortress_sync::{
    AuthoritativeUpdate, Control, EntityId, EntityState, SequenceNumber, SyncBuilder, Vec2,
};
use loom::thread;

/// Test a tick racing a reconciliation of the first input.
///
/// Whichever runs first, the client ends at the same position because the server
/// agrees with the prediction.
#[test]
fn test_tick_and_reconcile_do_not_interleave() {
    loom::model(|| {
        let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
        let client = SyncBuilder::new()
            .build_client(EntityId::new(1), seed)
            .unwrap();
        client
            .issue(Control::Velocity(Vec2::new(10.0, 0.0)), 0.5)
            .unwrap();

        let ticker = client.clone();
        let tick_handle = thread::spawn(move || {
            ticker
                .issue(Control::Velocity(Vec2::new(10.0, 0.0)), 0.5)
                .unwrap();
        });

        let server_state = EntityState::new(
            Vec2::new(5.0, 0.0),
            Vec2::new(10.0, 0.0),
            0.5,
            SequenceNumber::new(1),
        );
        let result = client
            .reconcile(AuthoritativeUpdate::new(server_state, SequenceNumber::new(1)))
            .unwrap();
        assert_eq!(result.error, 0.0);

        tick_handle.join().unwrap();

        assert_eq!(client.current_state().position, Vec2::new(10.0, 0.0));
        assert_eq!(client.pending_len(), 1);
    });
}
