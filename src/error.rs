use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::{EntityId, SequenceNumber};

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<T, FortressError>`].
///
/// The variants fall into three groups:
///
/// - **Programmer errors** ([`InvalidTimestep`], [`InvalidRequest`]): the caller passed
///   something that can never be valid. Propagate them, never clamp them away.
/// - **Expected network conditions** ([`StaleState`], [`NoHistory`]): reordered packets and
///   cold starts. Log and continue.
/// - **Desynchronization** ([`SequenceOutOfRange`]): the peer claims something that never
///   happened locally. The connection layer must request a full state resync.
///
/// Render-path operations (interpolation, extrapolation) never return errors; they clamp.
///
/// [`Result<T, FortressError>`]: std::result::Result
/// [`InvalidTimestep`]: FortressError::InvalidTimestep
/// [`InvalidRequest`]: FortressError::InvalidRequest
/// [`StaleState`]: FortressError::StaleState
/// [`NoHistory`]: FortressError::NoHistory
/// [`SequenceOutOfRange`]: FortressError::SequenceOutOfRange
#[derive(Debug, Clone, PartialEq)]
pub enum FortressError {
    /// A simulation step was requested with a negative or non-finite duration.
    InvalidTimestep {
        /// The offending duration in seconds.
        dt: f64,
    },
    /// A state or input arrived whose sequence number (or timestamp) is not newer than what
    /// was already applied. Expected under packet reordering; the value is dropped.
    StaleState {
        /// The sequence number of the rejected value.
        sequence: SequenceNumber,
        /// The newest sequence number already applied.
        last: SequenceNumber,
    },
    /// A lookup was made for an entity that has no recorded states. A seed state must be
    /// recorded before the entity can be queried.
    NoHistory {
        /// The entity that was queried.
        entity: EntityId,
    },
    /// An authoritative update acknowledged an input sequence number that was never issued.
    /// The client and server have desynchronized; a full state resync is required.
    SequenceOutOfRange {
        /// The sequence number the server claims to have processed.
        acknowledged: SequenceNumber,
        /// The highest sequence number this client has ever issued.
        highest_issued: SequenceNumber,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
}

impl FortressError {
    /// Returns `true` if the error describes an expected network condition that the caller
    /// can drop and continue from.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }

    /// Returns `true` if the error means client and server no longer agree on history and the
    /// connection layer must trigger a full state resync.
    #[must_use]
    pub const fn requires_resync(&self) -> bool {
        matches!(self, Self::SequenceOutOfRange { .. })
    }
}

impl Display for FortressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FortressError::InvalidTimestep { dt } => {
                write!(f, "Invalid timestep {}: must be finite and non-negative", dt)
            },
            FortressError::StaleState { sequence, last } => {
                write!(
                    f,
                    "Stale state with sequence {} dropped, already applied {}",
                    sequence, last
                )
            },
            FortressError::NoHistory { entity } => {
                write!(f, "No recorded history for entity {}", entity)
            },
            FortressError::SequenceOutOfRange {
                acknowledged,
                highest_issued,
            } => {
                write!(
                    f,
                    "Acknowledged sequence {} was never issued (highest issued: {}); a full resync is required",
                    acknowledged, highest_issued
                )
            },
            FortressError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
        }
    }
}

impl Error for FortressError {}
