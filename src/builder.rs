use std::sync::Arc;

use web_time::Duration;

use crate::client::SharedClient;
use crate::config::SyncConfig;
use crate::history::SharedHistory;
use crate::interpolation::RemoteEntityView;
use crate::lag_compensation::LagCompensator;
use crate::latency::RttEstimator;
use crate::prediction::ClientPredictor;
use crate::reconciliation::{CorrectionPolicy, Reconciler};
use crate::state::EntityState;
use crate::telemetry::ViolationObserver;
use crate::timestep::FixedTimestep;
use crate::vector::Vector;
use crate::{EntityId, FortressError};

/// The [`SyncBuilder`] builds every engine component from one [`SyncConfig`].
///
/// Set the configuration and an optional violation observer, then call the `build_*`
/// method for each component you need. The configuration is validated on every build,
/// so an invalid setting is reported before any component exists.
///
/// # Examples
///
/// ```
/// use fortress_sync::{EntityId, EntityState, SyncBuilder, SyncConfig, Vec2};
///
/// let builder = SyncBuilder::new().with_config(SyncConfig::competitive());
///
/// // client side
/// let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
/// let predictor = builder.build_predictor(EntityId::new(1), seed).unwrap();
/// let reconciler = builder.build_reconciler().unwrap();
///
/// // server side
/// let history = builder.build_history::<Vec2>().unwrap();
/// let compensator = builder.build_lag_compensator(history.clone()).unwrap();
/// # let _ = (predictor, reconciler, compensator);
/// ```
#[must_use = "SyncBuilder has no effect unless a build_* method is called"]
#[derive(Clone, Default)]
pub struct SyncBuilder {
    config: SyncConfig,
    /// Optional observer for contract violations.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for SyncBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            config,
            violation_observer,
        } = self;

        f.debug_struct("SyncBuilder")
            .field("config", config)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl SyncBuilder {
    /// Construct a new builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how much history each entity keeps.
    pub fn with_retention_window(mut self, retention_window: Duration) -> Self {
        self.config.retention_window = retention_window;
        self
    }

    /// Sets the simulation rate.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if `tick_rate` is 0.
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Result<Self, FortressError> {
        if tick_rate == 0 {
            return Err(FortressError::InvalidRequest {
                info: "tick rate should be higher than 0".to_owned(),
            });
        }
        self.config.tick_rate = tick_rate;
        Ok(self)
    }

    /// Sets how far behind the render clock remote entities are sampled.
    pub fn with_interpolation_delay(mut self, delay: Duration) -> Self {
        self.config.interpolation_delay = delay;
        self
    }

    /// Sets the distance above which corrections are flagged for snapping.
    pub fn with_snap_threshold(mut self, threshold: f64) -> Self {
        self.config.snap_threshold = threshold;
        self
    }

    /// Sets a custom observer for contract violations.
    ///
    /// Predictors, reconcilers, clients, lag compensators, timesteps and RTT estimators
    /// built afterwards report to this observer. Histories and remote views take no
    /// observer, and failed invariant checks always go to `tracing`. If no observer is
    /// set, violations are logged via the `tracing` crate.
    ///
    /// # Example
    ///
    /// ```
    /// use fortress_sync::{telemetry::CollectingObserver, SyncBuilder};
    /// use std::sync::Arc;
    ///
    /// let observer = Arc::new(CollectingObserver::new());
    /// let builder = SyncBuilder::new().with_violation_observer(observer.clone());
    /// # let _ = builder;
    /// ```
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// The configuration components will be built with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Builds a client predictor seeded with `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration or seed is invalid.
    pub fn build_predictor<V: Vector>(
        &self,
        entity: EntityId,
        seed: EntityState<V>,
    ) -> Result<ClientPredictor<V>, FortressError> {
        self.config.validate()?;
        let predictor = ClientPredictor::new(entity, seed, self.config.retention_window)?;
        Ok(match &self.violation_observer {
            Some(observer) => predictor.with_violation_observer(observer.clone()),
            None => predictor,
        })
    }

    /// Builds a reconciler using the configured snap threshold.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration is invalid.
    pub fn build_reconciler(&self) -> Result<Reconciler, FortressError> {
        self.config.validate()?;
        let reconciler =
            Reconciler::new().with_policy(CorrectionPolicy::new(self.config.snap_threshold));
        Ok(match &self.violation_observer {
            Some(observer) => reconciler.with_violation_observer(observer.clone()),
            None => reconciler,
        })
    }

    /// Builds a predictor and reconciler pair behind a shared lock.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration or seed is invalid.
    pub fn build_client<V: Vector>(
        &self,
        entity: EntityId,
        seed: EntityState<V>,
    ) -> Result<SharedClient<V>, FortressError> {
        Ok(SharedClient::new(
            self.build_predictor(entity, seed)?,
            self.build_reconciler()?,
        ))
    }

    /// Builds an empty shared history store.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration is invalid.
    pub fn build_history<V: Vector>(&self) -> Result<SharedHistory<V>, FortressError> {
        self.config.validate()?;
        Ok(SharedHistory::new(self.config.retention_window))
    }

    /// Builds a lag compensator reading from `history`.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration is invalid.
    pub fn build_lag_compensator<V: Vector>(
        &self,
        history: SharedHistory<V>,
    ) -> Result<LagCompensator<V>, FortressError> {
        self.config.validate()?;
        let compensator = LagCompensator::new(history);
        Ok(match &self.violation_observer {
            Some(observer) => compensator.with_violation_observer(observer.clone()),
            None => compensator,
        })
    }

    /// Builds a render-side view of a remote entity.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration is invalid.
    pub fn build_remote_view<V: Vector>(
        &self,
        entity: EntityId,
    ) -> Result<RemoteEntityView<V>, FortressError> {
        self.config.validate()?;
        Ok(RemoteEntityView::new(
            entity,
            self.config.retention_window,
            self.config.interpolation_delay,
            self.config.max_extrapolation,
        ))
    }

    /// Builds the fixed-timestep scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration is invalid.
    pub fn build_timestep(&self) -> Result<FixedTimestep, FortressError> {
        self.config.validate()?;
        let timestep = FixedTimestep::new(self.config.tick_rate, self.config.max_frame_time)?;
        Ok(match &self.violation_observer {
            Some(observer) => timestep.with_violation_observer(observer.clone()),
            None => timestep,
        })
    }

    /// Builds a round-trip estimator with the configured window.
    ///
    /// # Errors
    ///
    /// Returns [`FortressError::InvalidRequest`] if the configuration is invalid.
    pub fn build_rtt_estimator(&self) -> Result<RttEstimator, FortressError> {
        self.config.validate()?;
        let estimator = RttEstimator::with_window(self.config.rtt_window_size);
        Ok(match &self.violation_observer {
            Some(observer) => estimator.with_violation_observer(observer.clone()),
            None => estimator,
        })
    }
}
