//! Thread-safe handle to a [`HistoryStore`].

use tracing::trace;

use crate::history::{HistoryStore, StateHistory};
use crate::state::EntityState;
use crate::sync::{Arc, RwLock};
use crate::vector::Vector;
use crate::{EntityId, FortressError};

/// A cloneable, thread-safe [`HistoryStore`].
///
/// Writes (append plus eviction) hold the write lock for their whole duration, and
/// every read holds the read lock while it runs, so a reader always sees a history
/// either entirely before or entirely after a write. Lag-compensated lookups never
/// observe a buffer that is mid-eviction.
///
/// # Examples
///
/// ```
/// use fortress_sync::{EntityId, EntityState, SequenceNumber, SharedHistory, Vec2};
/// use web_time::Duration;
///
/// let history = SharedHistory::new(Duration::from_secs(1));
/// let writer = history.clone();
/// let entity = EntityId::new(3);
///
/// writer
///     .record(entity, EntityState::seed(Vec2::new(1.0, 0.0), Vec2::zero(), 0.0))
///     .unwrap();
///
/// assert_eq!(history.query_at(entity, 0.0).unwrap().position, Vec2::new(1.0, 0.0));
/// ```
pub struct SharedHistory<V: Vector> {
    inner: Arc<RwLock<HistoryStore<V>>>,
}

impl<V: Vector> SharedHistory<V> {
    /// Creates an empty shared store whose histories retain `retention_window` of states.
    #[must_use]
    pub fn new(retention_window: web_time::Duration) -> Self {
        Self::from_store(HistoryStore::new(retention_window))
    }

    /// Wraps an existing store.
    #[must_use]
    pub fn from_store(store: HistoryStore<V>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Appends `state` to the history of `entity` under the write lock.
    ///
    /// # Errors
    ///
    /// See [`StateHistory::record`].
    pub fn record(&self, entity: EntityId, state: EntityState<V>) -> Result<(), FortressError> {
        self.inner.write().record(entity, state)
    }

    /// Returns the state of `entity` closest to `target_time`.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::NoHistory`] if `entity` has no recorded states.
    pub fn query_at(&self, entity: EntityId, target_time: f64) -> Result<EntityState<V>, FortressError> {
        let store = self.inner.read();
        let found = store.query_at(entity, target_time);
        trace!(
            "Shared lookup for entity {} at t={} ({} entities tracked)",
            entity,
            target_time,
            store.len()
        );
        found
    }

    /// Returns the newest state of `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::NoHistory`] if `entity` has no recorded states.
    pub fn latest(&self, entity: EntityId) -> Result<EntityState<V>, FortressError> {
        self.inner.read().latest(entity)
    }

    /// Copies out the full history of `entity` as one consistent snapshot.
    #[must_use]
    pub fn snapshot(&self, entity: EntityId) -> Option<StateHistory<V>> {
        self.inner.read().history(entity).cloned()
    }

    /// Runs `f` against the store while holding the read lock.
    ///
    /// Every query made inside `f` observes the same version of every history.
    pub fn with_read<R>(&self, f: impl FnOnce(&HistoryStore<V>) -> R) -> R {
        f(&self.inner.read())
    }

    /// Drops the history of `entity`.
    pub fn remove_entity(&self, entity: EntityId) -> Option<StateHistory<V>> {
        self.inner.write().remove_entity(entity)
    }

    /// Tracked entities, in ascending id order.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.inner.read().entity_ids().collect()
    }
}

impl<V: Vector> Clone for SharedHistory<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Vector> Default for SharedHistory<V> {
    fn default() -> Self {
        Self::from_store(HistoryStore::default())
    }
}

impl<V: Vector> std::fmt::Debug for SharedHistory<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHistory")
            .field("entities", &self.inner.read().len())
            .finish()
    }
}
