//! # Fortress Sync
//!
//! Fortress Sync keeps a fast-moving entity consistent between an authoritative server and
//! latency-affected clients, in 100% safe Rust. It is the state-synchronization half of a
//! netcode stack: it receives already-decoded inputs and already-measured time deltas, and
//! produces positions and velocities for the renderer and for the network layer.
//!
//! The engine is made of small components, each usable on its own:
//!
//! - [`kinematics`]: a pure, deterministic `(state, control, dt) -> state'` step.
//! - [`StateHistory`] / [`SharedHistory`]: retention-bounded snapshot buffers with
//!   nearest-time lookup.
//! - [`ClientPredictor`]: applies local input immediately and remembers it until acknowledged.
//! - [`Reconciler`]: resets to the server's state and replays unacknowledged input.
//! - [`LagCompensator`]: rewinds another entity to what an acting client saw.
//! - [`interpolation`]: render-time smoothing between and beyond snapshots.
//! - [`FixedTimestep`]: accumulator-based fixed-rate stepping.
//!
//! [`SyncBuilder`] builds all of them from one validated [`SyncConfig`].
//!
//! # Example
//!
//! ```
//! use fortress_sync::prelude::*;
//!
//! # fn main() -> Result<(), FortressError> {
//! let builder = SyncBuilder::new();
//! let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
//! let mut predictor = builder.build_predictor(EntityId::new(1), seed)?;
//! let mut reconciler = builder.build_reconciler()?;
//!
//! // three ticks of local input, applied without waiting for the server
//! for i in 1..=3 {
//!     predictor.apply_input(InputCommand::velocity(SequenceNumber::new(i), Vec2::new(10.0, 0.0), 0.1))?;
//! }
//! assert_eq!(predictor.current_state().position, Vec2::new(3.0, 0.0));
//!
//! // the server has processed input 1 and agrees with the prediction
//! let server = EntityState::new(Vec2::new(1.0, 0.0), Vec2::new(10.0, 0.0), 0.1, SequenceNumber::new(1));
//! let result = reconciler.reconcile(&mut predictor, AuthoritativeUpdate::new(server, SequenceNumber::new(1)))?;
//! assert_eq!(result.error, 0.0);
//! assert_eq!(result.corrected_state.position, Vec2::new(3.0, 0.0));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use builder::SyncBuilder;
pub use client::SharedClient;
pub use config::SyncConfig;
pub use error::FortressError;
pub use history::{HistoryStore, SharedHistory, StateHistory};
pub use interpolation::RemoteEntityView;
pub use lag_compensation::LagCompensator;
pub use latency::{FixedLatency, LatencyEstimator, RttEstimator};
pub use prediction::ClientPredictor;
pub use reconciliation::{Correction, CorrectionPolicy, ReconciliationResult, Reconciler};
pub use state::{AuthoritativeUpdate, Control, EntityState, InputCommand};
pub use timestep::FixedTimestep;
pub use vector::{Vec2, Vec3, Vector};

// Internal modules - made pub for re-export in __internal, but doc(hidden) for API cleanliness
mod builder;
mod client;
mod config;
#[doc(hidden)]
pub mod error;
pub mod history;
pub mod interpolation;
pub mod kinematics;
pub mod lag_compensation;
pub mod latency;
pub mod prediction;
pub mod prelude;
pub mod reconciliation;
mod state;
#[doc(hidden)]
pub mod sync;
pub mod telemetry;
pub mod timestep;
mod vector;

/// Internal module exposing implementation details for testing, fuzzing, and loom.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here is:
/// - Subject to change without notice
/// - Not covered by semver compatibility guarantees
/// - Intended ONLY for:
///   - Fuzzing (cargo-fuzz, libFuzzer)
///   - Property-based testing (proptest)
///   - Loom model checking
///   - Integration testing in the same workspace
///
/// **DO NOT** depend on anything in this module for production code.
#[doc(hidden)]
pub mod __internal {
    pub use crate::kinematics::replay;
    pub use crate::prediction::PENDING_INPUTS_INLINE;
    pub use crate::telemetry::InvariantChecker;
}

/// Convenience alias for results returned by this crate.
pub type FortressResult<T> = Result<T, FortressError>;

// #################
// # IDENTIFIERS   #
// #################

/// A per-entity, strictly increasing sequence number.
///
/// Inputs issued by a client carry consecutive sequence numbers starting at 1, and the
/// server acknowledges inputs by sequence number. [`SequenceNumber::ZERO`] means "nothing
/// issued" or "nothing acknowledged", and is the sequence of seed states.
///
/// # Examples
///
/// ```
/// use fortress_sync::SequenceNumber;
///
/// let first = SequenceNumber::ZERO.next();
/// assert_eq!(first.as_u64(), 1);
/// assert!(first > SequenceNumber::ZERO);
/// assert_eq!(first.to_string(), "1");
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// No input issued or acknowledged yet.
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    /// Creates a new `SequenceNumber` from a `u64` value.
    #[inline]
    #[must_use]
    pub const fn new(sequence: u64) -> Self {
        SequenceNumber(sequence)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number, saturating at `u64::MAX`.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        SequenceNumber(self.0.saturating_add(1))
    }

    /// Returns `true` for [`SequenceNumber::ZERO`].
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    #[inline]
    fn from(value: u64) -> Self {
        SequenceNumber(value)
    }
}

impl From<SequenceNumber> for u64 {
    #[inline]
    fn from(sequence: SequenceNumber) -> Self {
        sequence.0
    }
}

/// Identifies one simulated entity.
///
/// How ids are allocated is up to the application; the engine only uses them as keys.
///
/// # Examples
///
/// ```
/// use fortress_sync::EntityId;
///
/// let player = EntityId::new(7);
/// assert_eq!(player.as_u64(), 7);
/// assert_eq!(format!("{}", player), "7");
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new `EntityId` from a `u64` value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        EntityId(id)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    #[inline]
    fn from(value: u64) -> Self {
        EntityId(value)
    }
}

impl From<EntityId> for u64 {
    #[inline]
    fn from(id: EntityId) -> Self {
        id.0
    }
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_zero_is_default() {
        assert_eq!(SequenceNumber::default(), SequenceNumber::ZERO);
        assert!(SequenceNumber::ZERO.is_zero());
        assert!(!SequenceNumber::new(1).is_zero());
    }

    #[test]
    fn sequence_next_saturates() {
        assert_eq!(SequenceNumber::new(41).next(), SequenceNumber::new(42));
        assert_eq!(
            SequenceNumber::new(u64::MAX).next(),
            SequenceNumber::new(u64::MAX)
        );
    }

    #[test]
    fn sequence_ordering() {
        let mut sequences = vec![
            SequenceNumber::new(3),
            SequenceNumber::ZERO,
            SequenceNumber::new(2),
        ];
        sequences.sort();
        assert_eq!(
            sequences,
            vec![
                SequenceNumber::ZERO,
                SequenceNumber::new(2),
                SequenceNumber::new(3)
            ]
        );
    }

    #[test]
    fn conversions_round_trip_through_u64() {
        assert_eq!(u64::from(SequenceNumber::from(9)), 9);
        assert_eq!(u64::from(EntityId::from(12)), 12);
    }

    #[test]
    fn identifiers_serialize_transparently_as_numbers() {
        assert_eq!(serde_json::to_string(&SequenceNumber::new(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&EntityId::new(8)).unwrap(), "8");
    }
}
