//! Retention-bounded, timestamped state history with point-in-time lookup.
//!
//! [`StateHistory`] holds the snapshots of one entity, oldest first. Every
//! [`record`](StateHistory::record) lazily evicts snapshots that fell out of the
//! retention window, so the buffer never spans more than `retention_window` seconds
//! (plus the newest entry, which is never evicted).
//!
//! [`HistoryStore`] keys one history per [`EntityId`] and is what a server keeps for
//! all of its entities. Wrap it in a [`SharedHistory`] when the simulation thread
//! writes while other threads run lag-compensated reads.
//!
//! # Invariants
//!
//! 1. Timestamps are strictly increasing from oldest to newest.
//! 2. Sequence numbers are strictly increasing from oldest to newest.
//! 3. `oldest.timestamp >= newest.timestamp - retention_window`.

mod shared;

pub use shared::SharedHistory;

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;
use web_time::Duration;

use crate::state::EntityState;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::vector::Vector;
use crate::{EntityId, FortressError, SequenceNumber};

/// Default retention window: one second of history.
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(1);

/// The ordered snapshots of a single entity.
///
/// # Note
///
/// States are immutable once recorded. The only ways entries leave the buffer are
/// eviction on [`record`](Self::record) and [`discard_after`](Self::discard_after),
/// which the reconciler uses to rewrite the unconfirmed tail of a client's own history.
#[derive(Debug, Clone)]
pub struct StateHistory<V: Vector> {
    entity: EntityId,
    entries: VecDeque<EntityState<V>>,
    retention_window: f64,
}

impl<V: Vector> StateHistory<V> {
    /// Creates an empty history for `entity` that retains `retention_window` of states.
    #[must_use]
    pub fn new(entity: EntityId, retention_window: Duration) -> Self {
        Self {
            entity,
            entries: VecDeque::new(),
            retention_window: retention_window.as_secs_f64(),
        }
    }

    /// The entity this history belongs to.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The retention window in seconds.
    #[must_use]
    pub fn retention_window(&self) -> f64 {
        self.retention_window
    }

    /// Appends `state` and evicts every entry older than `state.timestamp - retention_window`.
    ///
    /// # Errors
    ///
    /// - [`FortressError::StaleState`] if `state.sequence` or `state.timestamp` is not
    ///   strictly greater than the newest recorded entry. The history is unchanged; callers
    ///   should log and drop the state.
    /// - [`FortressError::InvalidRequest`] if the state's timestamp is not finite.
    pub fn record(&mut self, state: EntityState<V>) -> Result<(), FortressError> {
        if !state.timestamp.is_finite() {
            return Err(FortressError::InvalidRequest {
                info: format!(
                    "state for entity {} has non-finite timestamp {}",
                    self.entity, state.timestamp
                ),
            });
        }

        if let Some(newest) = self.entries.back() {
            if state.sequence <= newest.sequence || state.timestamp <= newest.timestamp {
                return Err(FortressError::StaleState {
                    sequence: state.sequence,
                    last: newest.sequence,
                });
            }
        }

        self.entries.push_back(state);
        let evicted = self.evict(state.timestamp);
        trace!(
            "Recorded state {} at t={} for entity {} ({} evicted, {} retained)",
            state.sequence,
            state.timestamp,
            self.entity,
            evicted,
            self.entries.len()
        );

        crate::debug_check_invariants!(self, "StateHistory::record");
        Ok(())
    }

    fn evict(&mut self, newest_timestamp: f64) -> usize {
        let cutoff = newest_timestamp - self.retention_window;
        let mut evicted = 0;
        // the newest entry is never evicted, so stop at one
        while self.entries.len() > 1 {
            match self.entries.front() {
                Some(oldest) if oldest.timestamp < cutoff => {
                    self.entries.pop_front();
                    evicted += 1;
                }
                _ => break,
            }
        }
        evicted
    }

    /// Returns the state whose timestamp is closest to `target_time`.
    ///
    /// Ties resolve toward the earlier entry. A target newer than every entry returns the
    /// newest; a target older than every entry returns the oldest.
    ///
    /// # Errors
    ///
    /// - [`FortressError::NoHistory`] if nothing has been recorded.
    /// - [`FortressError::InvalidRequest`] if `target_time` is NaN.
    pub fn query_at(&self, target_time: f64) -> Result<&EntityState<V>, FortressError> {
        if target_time.is_nan() {
            return Err(FortressError::InvalidRequest {
                info: format!("query time for entity {} is NaN", self.entity),
            });
        }

        let idx = self.entries.partition_point(|s| s.timestamp < target_time);
        let found = if idx == 0 {
            self.entries.front()
        } else if idx == self.entries.len() {
            self.entries.back()
        } else {
            let before = &self.entries[idx - 1];
            let after = &self.entries[idx];
            if after.timestamp - target_time < target_time - before.timestamp {
                Some(after)
            } else {
                Some(before)
            }
        };

        found.ok_or(FortressError::NoHistory {
            entity: self.entity,
        })
    }

    /// Returns the two recorded states surrounding `time` (`a.timestamp <= time <= b.timestamp`).
    ///
    /// Returns `None` if `time` lies outside the recorded range or fewer than two states
    /// are recorded. If `time` hits an entry exactly, that entry is returned as `a`.
    #[must_use]
    pub fn bracketing(&self, time: f64) -> Option<(&EntityState<V>, &EntityState<V>)> {
        if self.entries.len() < 2 || time.is_nan() {
            return None;
        }
        let idx = self.entries.partition_point(|s| s.timestamp <= time);
        if idx == 0 {
            return None;
        }
        if idx == self.entries.len() {
            let newest = self.entries.back()?;
            // exactly on the newest entry: pair it with its predecessor
            if newest.timestamp == time {
                return Some((&self.entries[idx - 2], newest));
            }
            return None;
        }
        Some((&self.entries[idx - 1], &self.entries[idx]))
    }

    /// Returns the state recorded with `sequence`, if it is still retained.
    #[must_use]
    pub fn get(&self, sequence: SequenceNumber) -> Option<&EntityState<V>> {
        self.entries
            .binary_search_by(|s| s.sequence.cmp(&sequence))
            .ok()
            .and_then(|idx| self.entries.get(idx))
    }

    /// Removes every state with a sequence number greater than `sequence` and returns how
    /// many were removed.
    pub fn discard_after(&mut self, sequence: SequenceNumber) -> usize {
        let keep = self.entries.partition_point(|s| s.sequence <= sequence);
        let removed = self.entries.len() - keep;
        self.entries.truncate(keep);
        removed
    }

    /// The newest recorded state.
    #[must_use]
    pub fn latest(&self) -> Option<&EntityState<V>> {
        self.entries.back()
    }

    /// The oldest retained state.
    #[must_use]
    pub fn oldest(&self) -> Option<&EntityState<V>> {
        self.entries.front()
    }

    /// Number of retained states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seconds between the oldest and newest retained states.
    #[must_use]
    pub fn time_span(&self) -> f64 {
        match (self.entries.front(), self.entries.back()) {
            (Some(oldest), Some(newest)) => newest.timestamp - oldest.timestamp,
            _ => 0.0,
        }
    }

    /// Iterates over retained states, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &EntityState<V>> + ExactSizeIterator {
        self.entries.iter()
    }
}

impl<V: Vector> InvariantChecker for StateHistory<V> {
    /// Checks the invariants of the StateHistory.
    ///
    /// # Invariants
    ///
    /// 1. All timestamps are finite
    /// 2. Timestamps and sequence numbers are strictly increasing
    /// 3. The oldest entry is within the retention window of the newest
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if let Some(bad) = self.entries.iter().find(|s| !s.timestamp.is_finite()) {
            return Err(
                InvariantViolation::new("StateHistory", "timestamp is not finite")
                    .with_details(format!("entity={}, sequence={}", self.entity, bad.sequence)),
            );
        }

        for (prev, next) in self.entries.iter().zip(self.entries.iter().skip(1)) {
            if next.timestamp <= prev.timestamp {
                return Err(InvariantViolation::new(
                    "StateHistory",
                    "timestamps not strictly increasing",
                )
                .with_details(format!(
                    "entity={}, {} at t={} followed by {} at t={}",
                    self.entity, prev.sequence, prev.timestamp, next.sequence, next.timestamp
                )));
            }
            if next.sequence <= prev.sequence {
                return Err(InvariantViolation::new(
                    "StateHistory",
                    "sequence numbers not strictly increasing",
                )
                .with_details(format!(
                    "entity={}, {} followed by {}",
                    self.entity, prev.sequence, next.sequence
                )));
            }
        }

        if let (Some(oldest), Some(newest)) = (self.entries.front(), self.entries.back()) {
            if oldest.timestamp < newest.timestamp - self.retention_window {
                return Err(InvariantViolation::new(
                    "StateHistory",
                    "oldest entry outside retention window",
                )
                .with_details(format!(
                    "entity={}, oldest={}, newest={}, window={}",
                    self.entity, oldest.timestamp, newest.timestamp, self.retention_window
                )));
            }
        }

        Ok(())
    }
}

/// One [`StateHistory`] per entity.
///
/// Entities are kept in a `BTreeMap` so iteration order is deterministic.
#[derive(Debug, Clone)]
pub struct HistoryStore<V: Vector> {
    histories: BTreeMap<EntityId, StateHistory<V>>,
    retention_window: Duration,
}

impl<V: Vector> Default for HistoryStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_WINDOW)
    }
}

impl<V: Vector> HistoryStore<V> {
    /// Creates an empty store whose histories retain `retention_window` of states.
    #[must_use]
    pub fn new(retention_window: Duration) -> Self {
        Self {
            histories: BTreeMap::new(),
            retention_window,
        }
    }

    /// Appends `state` to the history of `entity`, creating the history on first use.
    ///
    /// # Errors
    ///
    /// See [`StateHistory::record`].
    pub fn record(&mut self, entity: EntityId, state: EntityState<V>) -> Result<(), FortressError> {
        let retention_window = self.retention_window;
        let history = self
            .histories
            .entry(entity)
            .or_insert_with(|| StateHistory::new(entity, retention_window));
        let result = history.record(state);
        // a rejected first record must not leave an empty history behind
        if history.is_empty() {
            self.histories.remove(&entity);
        }
        result
    }

    /// Returns the state of `entity` closest to `target_time`.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::NoHistory`] if `entity` has no recorded states.
    pub fn query_at(&self, entity: EntityId, target_time: f64) -> Result<EntityState<V>, FortressError> {
        self.require(entity)?.query_at(target_time).copied()
    }

    /// Returns the newest state of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::NoHistory`] if `entity` has no recorded states.
    pub fn latest(&self, entity: EntityId) -> Result<EntityState<V>, FortressError> {
        self.require(entity)?
            .latest()
            .copied()
            .ok_or(FortressError::NoHistory { entity })
    }

    /// Returns the history of `entity`, if any.
    #[must_use]
    pub fn history(&self, entity: EntityId) -> Option<&StateHistory<V>> {
        self.histories.get(&entity)
    }

    fn require(&self, entity: EntityId) -> Result<&StateHistory<V>, FortressError> {
        self.histories
            .get(&entity)
            .filter(|history| !history.is_empty())
            .ok_or(FortressError::NoHistory { entity })
    }

    /// Drops the history of `entity` and returns it.
    pub fn remove_entity(&mut self, entity: EntityId) -> Option<StateHistory<V>> {
        self.histories.remove(&entity)
    }

    /// Entities with a history, in ascending id order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.histories.keys().copied()
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    /// Returns `true` if no entity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// The retention window applied to new histories.
    #[must_use]
    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;

    const ENTITY: EntityId = EntityId::new(1);

    fn state(seq: u64, t: f64, x: f64) -> EntityState<Vec2> {
        EntityState::new(
            Vec2::new(x, 0.0),
            Vec2::zero(),
            t,
            SequenceNumber::new(seq),
        )
    }

    /// Ten snapshots at t = 0.0, 0.1, ..., 0.9 with x = 0..9.
    fn ten_snapshots() -> StateHistory<Vec2> {
        let mut history = StateHistory::new(ENTITY, DEFAULT_RETENTION_WINDOW);
        for i in 0..10u32 {
            history
                .record(state(u64::from(i), f64::from(i) / 10.0, f64::from(i)))
                .unwrap();
        }
        history
    }

    // ========================================================================
    // record
    // ========================================================================

    #[test]
    fn record_rejects_duplicate_sequence() {
        let mut history = ten_snapshots();
        let err = history.record(state(9, 5.0, 0.0)).unwrap_err();
        assert_eq!(
            err,
            FortressError::StaleState {
                sequence: SequenceNumber::new(9),
                last: SequenceNumber::new(9),
            }
        );
        assert!(err.is_recoverable());
        assert_eq!(history.len(), 10);
    }

    #[test]
    fn record_rejects_non_increasing_timestamp() {
        let mut history = ten_snapshots();
        assert!(matches!(
            history.record(state(10, 0.9, 0.0)),
            Err(FortressError::StaleState { .. })
        ));
    }

    #[test]
    fn record_rejects_nan_timestamp() {
        let mut history = StateHistory::new(ENTITY, DEFAULT_RETENTION_WINDOW);
        assert!(matches!(
            history.record(state(1, f64::NAN, 0.0)),
            Err(FortressError::InvalidRequest { .. })
        ));
        assert!(history.is_empty());
    }

    #[test]
    fn eviction_keeps_window_and_newest() {
        let mut history = StateHistory::new(ENTITY, Duration::from_millis(500));
        for i in 0..20u32 {
            history.record(state(u64::from(i), f64::from(i) * 0.1, 0.0)).unwrap();
        }
        let newest = history.latest().unwrap().timestamp;
        let oldest = history.oldest().unwrap().timestamp;
        assert!(oldest >= newest - 0.5);
        assert!(history.check_invariants().is_ok());
    }

    #[test]
    fn newest_survives_a_large_gap() {
        let mut history = ten_snapshots();
        history.record(state(10, 100.0, 42.0)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().position.x, 42.0);
    }

    #[test]
    fn zero_window_retains_only_newest() {
        let mut history = StateHistory::new(ENTITY, Duration::ZERO);
        history.record(state(1, 0.0, 0.0)).unwrap();
        history.record(state(2, 0.1, 0.0)).unwrap();
        assert_eq!(history.len(), 1);
    }

    // ========================================================================
    // query_at
    // ========================================================================

    #[test]
    fn query_at_empty_is_no_history() {
        let history: StateHistory<Vec2> = StateHistory::new(ENTITY, DEFAULT_RETENTION_WINDOW);
        assert_eq!(
            history.query_at(0.0),
            Err(FortressError::NoHistory { entity: ENTITY })
        );
    }

    #[test]
    fn query_at_exact_match() {
        let history = ten_snapshots();
        assert_eq!(history.query_at(0.5).unwrap().position.x, 5.0);
    }

    #[test]
    fn query_at_picks_nearest() {
        let history = ten_snapshots();
        assert_eq!(history.query_at(0.42).unwrap().position.x, 4.0);
        assert_eq!(history.query_at(0.48).unwrap().position.x, 5.0);
    }

    #[test]
    fn query_at_tie_goes_to_earlier_entry() {
        let mut history = StateHistory::new(ENTITY, DEFAULT_RETENTION_WINDOW);
        history.record(state(1, 1.0, 1.0)).unwrap();
        history.record(state(2, 2.0, 2.0)).unwrap();
        assert_eq!(history.query_at(1.5).unwrap().position.x, 1.0);
    }

    #[test]
    fn query_at_clamps_outside_range() {
        let history = ten_snapshots();
        assert_eq!(history.query_at(-3.0).unwrap().position.x, 0.0);
        assert_eq!(history.query_at(7.0).unwrap().position.x, 9.0);
        assert_eq!(history.query_at(f64::INFINITY).unwrap().position.x, 9.0);
    }

    #[test]
    fn query_at_nan_is_invalid() {
        let history = ten_snapshots();
        assert!(matches!(
            history.query_at(f64::NAN),
            Err(FortressError::InvalidRequest { .. })
        ));
    }

    // ========================================================================
    // auxiliary queries
    // ========================================================================

    #[test]
    fn bracketing_returns_surrounding_pair() {
        let history = ten_snapshots();
        let (a, b) = history.bracketing(0.35).unwrap();
        assert_eq!(a.position.x, 3.0);
        assert_eq!(b.position.x, 4.0);

        let (a, b) = history.bracketing(0.9).unwrap();
        assert_eq!((a.position.x, b.position.x), (8.0, 9.0));

        assert!(history.bracketing(0.95).is_none());
        assert!(history.bracketing(-0.1).is_none());
    }

    #[test]
    fn get_and_discard_after() {
        let mut history = ten_snapshots();
        assert_eq!(history.get(SequenceNumber::new(4)).unwrap().position.x, 4.0);
        assert!(history.get(SequenceNumber::new(40)).is_none());

        assert_eq!(history.discard_after(SequenceNumber::new(6)), 3);
        assert_eq!(history.latest().unwrap().sequence, SequenceNumber::new(6));
        assert_eq!(history.discard_after(SequenceNumber::new(6)), 0);
        // the tail can be re-recorded after a discard
        history.record(state(7, 0.7, 70.0)).unwrap();
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn time_span_and_iter() {
        let history = ten_snapshots();
        assert!((history.time_span() - 0.9).abs() < 1e-12);
        let xs: Vec<f64> = history.iter().map(|s| s.position.x).collect();
        assert_eq!(xs.first(), Some(&0.0));
        assert_eq!(xs.last(), Some(&9.0));
        assert_eq!(history.iter().len(), 10);
    }

    // ========================================================================
    // HistoryStore
    // ========================================================================

    #[test]
    fn store_routes_by_entity() {
        let mut store = HistoryStore::default();
        store.record(EntityId::new(2), state(0, 0.0, 20.0)).unwrap();
        store.record(EntityId::new(1), state(0, 0.0, 10.0)).unwrap();

        assert_eq!(store.query_at(EntityId::new(1), 0.0).unwrap().position.x, 10.0);
        assert_eq!(store.latest(EntityId::new(2)).unwrap().position.x, 20.0);
        assert_eq!(
            store.entity_ids().collect::<Vec<_>>(),
            vec![EntityId::new(1), EntityId::new(2)]
        );
    }

    #[test]
    fn store_unknown_entity_is_no_history() {
        let store: HistoryStore<Vec2> = HistoryStore::default();
        assert_eq!(
            store.query_at(EntityId::new(9), 0.0),
            Err(FortressError::NoHistory {
                entity: EntityId::new(9)
            })
        );
    }

    #[test]
    fn store_remove_entity() {
        let mut store = HistoryStore::default();
        store.record(ENTITY, state(0, 0.0, 0.0)).unwrap();
        assert!(store.remove_entity(ENTITY).is_some());
        assert!(store.is_empty());
        assert!(store.latest(ENTITY).is_err());
    }

    #[test]
    fn store_rejected_first_record_tracks_nothing() {
        let mut store = HistoryStore::default();
        assert!(store.record(ENTITY, state(0, f64::NAN, 0.0)).is_err());
        assert!(store.is_empty());
        assert!(store.history(ENTITY).is_none());
    }
}
