//! Reporting of contract anomalies.
//!
//! Some conditions are not errors for the caller but still mean something went
//! sideways: a rewind that reached past the retained history, a predicted state the
//! local history refused, a frame with a negative elapsed time. Components report
//! these as [`SpecViolation`]s to an injected [`ViolationObserver`], or to
//! [`TracingObserver`] when none was injected.
//!
//! Reordered snapshots and other expected network conditions are not violations.
//! They surface as [`FortressError::StaleState`](crate::FortressError::StaleState).
//!
//! # Example
//!
//! ```
//! use fortress_sync::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! // hand `observer.clone()` to SyncBuilder::with_violation_observer, run, then:
//! assert!(observer.violations().is_empty());
//! assert!(!observer.has_violation(ViolationKind::Reconciliation));
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

/// How bad a reported anomaly is, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViolationSeverity {
    /// The operation continued with a fallback answer.
    Warning,
    /// The operation completed but dropped something it should have kept.
    Error,
    /// An internal invariant no longer holds.
    Critical,
}

impl ViolationSeverity {
    /// Lowercase label for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The component that reported an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum ViolationKind {
    /// The predictor could not record a predicted state.
    Prediction,
    /// The reconciler saw an impossible acknowledgement or could not rewrite history.
    Reconciliation,
    /// A rewind fell back to the oldest state, or a latency sample was unusable.
    LagCompensation,
    /// The fixed timestep was fed an unusable elapsed time.
    Timestep,
    /// A runtime invariant check failed (debug builds or the `paranoid` feature).
    Invariant,
}

impl ViolationKind {
    /// Lowercase label for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prediction => "prediction",
            Self::Reconciliation => "reconciliation",
            Self::LagCompensation => "lag_compensation",
            Self::Timestep => "timestep",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported anomaly.
#[derive(Debug, Clone)]
pub struct SpecViolation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Which component reported it.
    pub kind: ViolationKind,
    /// What happened, including the entity and sequence involved.
    pub message: String,
    /// `file:line` of the report site.
    pub location: &'static str,
}

impl SpecViolation {
    /// Creates a violation record.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
        }
    }
}

impl std::fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {})",
            self.severity, self.kind, self.message, self.location
        )
    }
}

/// Receives reported anomalies.
///
/// # Example
///
/// ```
/// use fortress_sync::telemetry::{SpecViolation, ViolationObserver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingObserver {
///     count: AtomicUsize,
/// }
///
/// impl ViolationObserver for CountingObserver {
///     fn on_violation(&self, _violation: &SpecViolation) {
///         self.count.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
#[cfg(feature = "sync-send")]
pub trait ViolationObserver: Send + Sync {
    /// Called at the report site, possibly in the middle of a simulation tick.
    fn on_violation(&self, violation: &SpecViolation);
}

/// Receives reported anomalies.
#[cfg(not(feature = "sync-send"))]
pub trait ViolationObserver {
    /// Called at the report site, possibly in the middle of a simulation tick.
    fn on_violation(&self, violation: &SpecViolation);
}

/// Logs anomalies through `tracing`: warnings at `warn`, everything else at `error`.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(severity, kind, location, "{}", violation.message);
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(severity, kind, location, "{}", violation.message);
            },
        }
    }
}

/// Keeps every reported anomaly, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<SpecViolation>>,
}

impl CollectingObserver {
    /// Creates an observer with nothing collected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything collected so far, in report order.
    #[must_use]
    pub fn violations(&self) -> Vec<SpecViolation> {
        self.violations.lock().clone()
    }

    /// Returns `true` if a violation of `kind` was collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Returns `true` if a violation of `severity` was collected.
    #[must_use]
    pub fn has_severity(&self, severity: ViolationSeverity) -> bool {
        self.violations
            .lock()
            .iter()
            .any(|v| v.severity == severity)
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &SpecViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Sends `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &SpecViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation straight to [`TracingObserver`], tagged with the call site.
///
/// Components that hold an observer use [`report_violation_to!`] instead.
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($fmt $(, $arg)*),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a violation to a component's `Option<Arc<dyn ViolationObserver>>`.
///
/// # Example
///
/// ```
/// use fortress_sync::report_violation_to;
/// use fortress_sync::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
/// use std::sync::Arc;
///
/// let collecting = Arc::new(CollectingObserver::new());
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(collecting.clone());
///
/// report_violation_to!(&observer, ViolationSeverity::Warning, ViolationKind::Timestep,
///     "dropped {} s", 0.5);
/// assert!(collecting.has_violation(ViolationKind::Timestep));
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let violation = $crate::telemetry::SpecViolation::new(
            $severity,
            $kind,
            format!($fmt $(, $arg)*),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Panics with the collected list unless `observer` is empty.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};
}

/// Panics with the collected list unless `observer` holds a violation of `kind`.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}

/// A broken internal invariant.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// The type that failed its check.
    pub type_name: &'static str,
    /// Which invariant broke.
    pub invariant: String,
    /// The values that broke it.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates an invariant violation without details.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Attaches the offending values.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Types that can verify their own internal invariants.
pub trait InvariantChecker {
    /// Returns the first broken invariant, if any.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Runs `check_invariants` and reports a [`ViolationKind::Invariant`] on failure.
///
/// Compiles to nothing in release builds unless the `paranoid` feature is enabled.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [context: {}]",
                violation,
                $context
            );
        }
    }};
}

/// No-op version for release builds without `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr, $context:expr) => {{}};
}
