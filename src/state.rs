//! Snapshot and input types exchanged between the simulation, the network layer and the renderer.

use serde::{Deserialize, Serialize};

use crate::vector::Vector;
use crate::SequenceNumber;

/// An immutable snapshot of one entity at one point in simulation time.
///
/// States are produced by the [kinematic model](crate::kinematics), appended to a
/// [`StateHistory`](crate::StateHistory) and never mutated afterwards. Within one entity's
/// history, timestamps are strictly increasing and sequence numbers are unique.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState<V: Vector> {
    /// Position of the entity.
    pub position: V,
    /// Velocity of the entity, in units per second.
    pub velocity: V,
    /// Monotonic simulation time in seconds.
    pub timestamp: f64,
    /// Strictly increasing per entity.
    pub sequence: SequenceNumber,
}

impl<V: Vector> EntityState<V> {
    /// Creates a new state snapshot.
    #[must_use]
    pub const fn new(position: V, velocity: V, timestamp: f64, sequence: SequenceNumber) -> Self {
        Self {
            position,
            velocity,
            timestamp,
            sequence,
        }
    }

    /// Creates a seed state at sequence [`SequenceNumber::ZERO`].
    ///
    /// Every history must be seeded before it can answer queries.
    #[must_use]
    pub const fn seed(position: V, velocity: V, timestamp: f64) -> Self {
        Self::new(position, velocity, timestamp, SequenceNumber::ZERO)
    }

    /// Returns a copy of this state tagged with a different sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence: SequenceNumber) -> Self {
        self.sequence = sequence;
        self
    }

    /// Euclidean distance between the positions of two states.
    #[must_use]
    pub fn position_error(&self, other: &Self) -> f64 {
        self.position.distance(other.position)
    }
}

/// What a single input asks the kinematic model to do.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Control<V: Vector> {
    /// Replace the entity's velocity with this value.
    Velocity(V),
    /// Accelerate the entity by this value (units per second squared).
    Acceleration(V),
}

impl<V: Vector> Default for Control<V> {
    /// No acceleration: the entity keeps its current velocity.
    fn default() -> Self {
        Self::Acceleration(V::zero())
    }
}

/// A locally issued input, retained by the client until the server acknowledges it.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputCommand<V: Vector> {
    /// Strictly increasing per client. The first input carries sequence 1.
    pub sequence: SequenceNumber,
    /// Desired velocity or acceleration.
    pub control: Control<V>,
    /// Duration this input covers, in seconds. Must be positive.
    pub dt: f64,
}

impl<V: Vector> InputCommand<V> {
    /// Creates a new input command.
    #[must_use]
    pub const fn new(sequence: SequenceNumber, control: Control<V>, dt: f64) -> Self {
        Self {
            sequence,
            control,
            dt,
        }
    }

    /// Creates an input that sets the velocity for `dt` seconds.
    #[must_use]
    pub const fn velocity(sequence: SequenceNumber, velocity: V, dt: f64) -> Self {
        Self::new(sequence, Control::Velocity(velocity), dt)
    }

    /// Creates an input that accelerates for `dt` seconds.
    #[must_use]
    pub const fn acceleration(sequence: SequenceNumber, acceleration: V, dt: f64) -> Self {
        Self::new(sequence, Control::Acceleration(acceleration), dt)
    }
}

/// An authoritative snapshot sent by the server for the client's own entity.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeUpdate<V: Vector> {
    /// The server's state for the entity.
    pub state: EntityState<V>,
    /// Highest input sequence number the server had applied when producing `state`.
    /// [`SequenceNumber::ZERO`] means no input has been applied yet.
    pub last_processed_input: SequenceNumber,
}

impl<V: Vector> AuthoritativeUpdate<V> {
    /// Creates a new authoritative update.
    #[must_use]
    pub const fn new(state: EntityState<V>, last_processed_input: SequenceNumber) -> Self {
        Self {
            state,
            last_processed_input,
        }
    }
}
