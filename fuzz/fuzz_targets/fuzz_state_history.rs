//! Direct fuzz target for StateHistory.
//!
//! Feeds arbitrary, often invalid, operation sequences to a single-entity history:
//! non-finite and backwards timestamps, repeated sequences, NaN queries.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary operation sequences
//! - Invariant preservation: strict ordering, retention bound
//! - Rejected records leave the history unchanged
//! - Queries on a non-empty history always succeed for non-NaN times

#![no_main]

use arbitrary::Arbitrary;
use fortress_sync::__internal::InvariantChecker;
use fortress_sync::{EntityId, EntityState, SequenceNumber, StateHistory, Vec2};
use libfuzzer_sys::fuzz_target;
use std::time::Duration;

/// Operations that can be performed on StateHistory
#[derive(Debug, Arbitrary)]
enum HistoryOp {
    /// Record a state with an arbitrary timestamp and sequence
    Record { timestamp: f64, sequence: u16, x: f32 },
    /// Record a state just after the newest one
    RecordNext { gap_ms: u16 },
    /// Nearest-time lookup
    Query { time: f64 },
    /// Look for the pair of states around a time
    Bracket { time: f64 },
    /// Drop everything after a sequence
    DiscardAfter { sequence: u16 },
}

/// Fuzz input structure
#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Retention window in milliseconds
    retention_ms: u16,
    /// Sequence of operations
    operations: Vec<HistoryOp>,
}

fuzz_target!(|fuzz_input: FuzzInput| {
    let retention = Duration::from_millis(u64::from(fuzz_input.retention_ms.max(1)));
    let mut history = StateHistory::<Vec2>::new(EntityId::new(1), retention);

    // Limit operations to prevent timeouts
    let operations = fuzz_input.operations.iter().take(500);

    for op in operations {
        match *op {
            HistoryOp::Record {
                timestamp,
                sequence,
                x,
            } => {
                let before = history.len();
                let state = EntityState::new(
                    Vec2::new(f64::from(x), 0.0),
                    Vec2::zero(),
                    timestamp,
                    SequenceNumber::new(u64::from(sequence)),
                );
                if history.record(state).is_err() {
                    assert_eq!(history.len(), before, "rejected record changed history");
                }
            }
            HistoryOp::RecordNext { gap_ms } => {
                let (newest, timestamp, sequence) = match history.latest() {
                    Some(latest) => (
                        latest.timestamp,
                        latest.timestamp + f64::from(gap_ms.max(1)) / 1000.0,
                        latest.sequence.next(),
                    ),
                    None => (f64::NEG_INFINITY, 0.0, SequenceNumber::ZERO),
                };
                // a gap can vanish into a huge timestamp
                if timestamp.is_finite() && timestamp > newest {
                    let state = EntityState::new(Vec2::zero(), Vec2::zero(), timestamp, sequence);
                    assert!(history.record(state).is_ok(), "strictly newer state rejected");
                }
            }
            HistoryOp::Query { time } => match history.query_at(time) {
                Ok(state) => assert!(history.get(state.sequence).is_some()),
                Err(_) => assert!(history.is_empty() || time.is_nan()),
            },
            HistoryOp::Bracket { time } => {
                if let Some((a, b)) = history.bracketing(time) {
                    assert!(a.timestamp < b.timestamp);
                    assert!(a.timestamp <= time && time <= b.timestamp);
                }
            }
            HistoryOp::DiscardAfter { sequence } => {
                let sequence = SequenceNumber::new(u64::from(sequence));
                history.discard_after(sequence);
                assert!(history.latest().map_or(true, |s| s.sequence <= sequence));
            }
        }

        assert!(
            history.check_invariants().is_ok(),
            "invariants violated: {:?}",
            history.check_invariants()
        );
    }
});
