//! Common test infrastructure shared across integration tests.
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! mod common;
//! use common::{moving_right, ServerSim};
//! ```

// Not every test binary uses every helper.
#![allow(dead_code)]

use fortress_sync::kinematics::apply_command;
use fortress_sync::{
    AuthoritativeUpdate, EntityId, EntityState, HistoryStore, InputCommand, SequenceNumber, Vec2,
};
use web_time::Duration;

/// The entity every single-entity test drives.
pub const PLAYER: EntityId = EntityId::new(1);

/// A second entity for lag compensation and multi-entity tests.
pub const TARGET: EntityId = EntityId::new(2);

/// Simulation step used throughout the scenarios.
pub const DT: f64 = 0.1;

/// Entity at the origin moving right at 10 units per second.
pub fn moving_right() -> EntityState<Vec2> {
    EntityState::seed(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 0.0)
}

/// Velocity commands `1..=count`, all moving right at 10 units per second.
pub fn constant_inputs(count: u64) -> Vec<InputCommand<Vec2>> {
    (1..=count)
        .map(|i| InputCommand::velocity(SequenceNumber::new(i), Vec2::new(10.0, 0.0), DT))
        .collect()
}

/// Snapshots of `entity` at `t = 0.0, 0.1, ...` with position `(i, 0)` at step `i`.
pub fn linear_history(store: &mut HistoryStore<Vec2>, entity: EntityId, count: u32) {
    for i in 0..count {
        let state = EntityState::new(
            Vec2::new(f64::from(i), 0.0),
            Vec2::new(10.0, 0.0),
            f64::from(i) * DT,
            SequenceNumber::new(u64::from(i)),
        );
        store.record(entity, state).unwrap();
    }
}

/// A minimal authoritative server for one entity.
///
/// It applies inputs with the same kinematic step as the client, so a client that
/// reconciles against it must converge exactly.
#[derive(Debug)]
pub struct ServerSim {
    pub state: EntityState<Vec2>,
    pub last_processed: SequenceNumber,
}

impl ServerSim {
    pub fn new(seed: EntityState<Vec2>) -> Self {
        Self {
            state: seed,
            last_processed: SequenceNumber::ZERO,
        }
    }

    /// Processes one client input and returns the update it would broadcast.
    pub fn process(&mut self, input: &InputCommand<Vec2>) -> AuthoritativeUpdate<Vec2> {
        self.state = apply_command(&self.state, input).unwrap();
        self.last_processed = input.sequence;
        AuthoritativeUpdate::new(self.state, self.last_processed)
    }
}

/// Retention window used by helpers that build their own components.
pub const RETENTION: Duration = Duration::from_secs(1);
