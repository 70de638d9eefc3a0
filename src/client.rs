//! A predictor and reconciler pair behind one lock.
//!
//! Authoritative updates usually arrive on a network thread while the simulation ticks on
//! another. Applying an update must not interleave with a tick, so [`SharedClient`] holds a
//! single mutex for the whole of each tick and each reconciliation pass.
//!
//! With the `sync-send` feature enabled, `SharedClient` is `Send + Sync`.

use crate::prediction::ClientPredictor;
use crate::reconciliation::{ReconciliationResult, Reconciler};
use crate::state::{AuthoritativeUpdate, Control, EntityState, InputCommand};
use crate::sync::{Arc, Mutex};
use crate::vector::Vector;
use crate::{FortressError, SequenceNumber};

struct ClientCore<V: Vector> {
    predictor: ClientPredictor<V>,
    reconciler: Reconciler,
}

/// Cloneable handle to a locally predicted entity.
///
/// # Examples
///
/// ```
/// use fortress_sync::{EntityId, EntityState, SyncBuilder, Vec2};
///
/// let client = SyncBuilder::new()
///     .build_client(EntityId::new(1), EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0))
///     .unwrap();
///
/// let network = client.clone();
/// client.issue(fortress_sync::Control::Velocity(Vec2::new(10.0, 0.0)), 0.1).unwrap();
/// assert_eq!(network.current_state().position, Vec2::new(1.0, 0.0));
/// ```
pub struct SharedClient<V: Vector> {
    inner: Arc<Mutex<ClientCore<V>>>,
}

impl<V: Vector> SharedClient<V> {
    /// Wraps a predictor and the reconciler that will correct it.
    #[must_use]
    pub fn new(predictor: ClientPredictor<V>, reconciler: Reconciler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClientCore {
                predictor,
                reconciler,
            })),
        }
    }

    /// See [`ClientPredictor::apply_input`].
    ///
    /// # Errors
    ///
    /// Same as [`ClientPredictor::apply_input`].
    pub fn apply_input(&self, input: InputCommand<V>) -> Result<EntityState<V>, FortressError> {
        self.inner.lock().predictor.apply_input(input)
    }

    /// See [`ClientPredictor::issue`].
    ///
    /// # Errors
    ///
    /// Same as [`ClientPredictor::apply_input`].
    pub fn issue(
        &self,
        control: Control<V>,
        dt: f64,
    ) -> Result<(InputCommand<V>, EntityState<V>), FortressError> {
        self.inner.lock().predictor.issue(control, dt)
    }

    /// Applies an authoritative update. No tick can run while this is in progress.
    ///
    /// # Errors
    ///
    /// Same as [`Reconciler::reconcile`].
    pub fn reconcile(
        &self,
        update: AuthoritativeUpdate<V>,
    ) -> Result<ReconciliationResult<V>, FortressError> {
        let mut core = self.inner.lock();
        let ClientCore {
            predictor,
            reconciler,
        } = &mut *core;
        reconciler.reconcile(predictor, update)
    }

    /// The current predicted (or corrected) state.
    #[must_use]
    pub fn current_state(&self) -> EntityState<V> {
        *self.inner.lock().predictor.current_state()
    }

    /// Number of inputs awaiting acknowledgement.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock().predictor.pending_inputs().len()
    }

    /// The highest input sequence issued so far.
    #[must_use]
    pub fn last_issued(&self) -> SequenceNumber {
        self.inner.lock().predictor.last_issued()
    }

    /// Runs `f` against the predictor while holding the lock.
    pub fn with_predictor<R>(&self, f: impl FnOnce(&ClientPredictor<V>) -> R) -> R {
        f(&self.inner.lock().predictor)
    }
}

impl<V: Vector> Clone for SharedClient<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Vector> std::fmt::Debug for SharedClient<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("SharedClient")
            .field("predictor", &core.predictor)
            .field("reconciler", &core.reconciler)
            .finish()
    }
}
