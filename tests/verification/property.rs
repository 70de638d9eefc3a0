//! Property-based tests for history, prediction, reconciliation and interpolation.
//!
//! These tests use proptest to verify invariants hold under random inputs,
//! leveraging the exposed __internal module for direct component testing.
//!
//! # Invariants Tested
//!
//! ## StateHistory
//! - Timestamps and sequence numbers stay strictly increasing
//! - The retained span never exceeds the retention window
//! - Rejected records leave the history untouched
//! - `query_at` returns the nearest entry, earlier on ties
//!
//! ## Prediction and Reconciliation
//! - A client reconciling against a server running the same inputs never sees an error
//! - After every input is acknowledged the client state equals the server state
//! - The pending queue stays strictly ordered and above the acknowledged sequence
//!
//! ## Interpolation
//! - Endpoints are reproduced exactly
//! - Out-of-range factors clamp
//! - Interpolated positions stay between the two snapshots

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

use fortress_sync::__internal::{replay, InvariantChecker};
use fortress_sync::interpolation::{interpolate, RemoteEntityView};
use fortress_sync::kinematics::apply_command;
use fortress_sync::{
    AuthoritativeUpdate, ClientPredictor, Control, EntityId, EntityState, FortressError,
    InputCommand, Reconciler, SequenceNumber, StateHistory, Vec2, Vector,
};
use proptest::prelude::*;
use web_time::Duration;

const ENTITY: EntityId = EntityId::new(1);

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Strategy for gaps between consecutive snapshots, in seconds
fn gap_strategy() -> impl Strategy<Value = f64> {
    0.001f64..0.2
}

/// Strategy for retention windows, in milliseconds
fn retention_strategy() -> impl Strategy<Value = u64> {
    50u64..2000
}

/// Strategy for bounded, finite vectors
fn vec2_strategy() -> impl Strategy<Value = Vec2> {
    (-100.0f64..100.0, -100.0f64..100.0).prop_map(|(x, y)| Vec2::new(x, y))
}

/// Strategy for control inputs of either kind
fn control_strategy() -> impl Strategy<Value = Control<Vec2>> {
    prop_oneof![
        vec2_strategy().prop_map(Control::Velocity),
        vec2_strategy().prop_map(Control::Acceleration),
    ]
}

/// Strategy for a run of (control, dt) pairs
fn input_run_strategy() -> impl Strategy<Value = Vec<(Control<Vec2>, f64)>> {
    prop::collection::vec((control_strategy(), 0.001f64..0.05), 1..64)
}

fn build_history(retention_ms: u64, gaps: &[f64]) -> StateHistory<Vec2> {
    let mut history = StateHistory::new(ENTITY, Duration::from_millis(retention_ms));
    let mut t = 0.0;
    for (i, gap) in gaps.iter().enumerate() {
        t += gap;
        let state = EntityState::new(
            Vec2::new(t, 0.0),
            Vec2::zero(),
            t,
            SequenceNumber::new(i as u64 + 1),
        );
        history.record(state).unwrap();
    }
    history
}

// ============================================================================
// StateHistory Invariant Tests
// ============================================================================

proptest! {
    /// Recording increasing states keeps the history ordered and within its window
    #[test]
    fn prop_history_ordered_and_bounded(
        retention_ms in retention_strategy(),
        gaps in prop::collection::vec(gap_strategy(), 1..300),
    ) {
        let history = build_history(retention_ms, &gaps);

        let result = history.check_invariants();
        prop_assert!(result.is_ok(), "History invariants failed: {:?}", result.err());

        let window = retention_ms as f64 / 1000.0;
        prop_assert!(history.time_span() <= window + 1e-9);
        prop_assert!(!history.is_empty());
        prop_assert_eq!(history.latest().unwrap().sequence, SequenceNumber::new(gaps.len() as u64));

        let timestamps: Vec<f64> = history.iter().map(|s| s.timestamp).collect();
        prop_assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    /// Stale or non-finite records are rejected without modifying the history
    #[test]
    fn prop_rejected_records_leave_history_untouched(
        gaps in prop::collection::vec(gap_strategy(), 2..50),
        back in 0usize..50,
    ) {
        let mut history = build_history(60_000, &gaps);
        let before: Vec<EntityState<Vec2>> = history.iter().copied().collect();

        let victim = before[back % before.len()];
        let stale = history.record(victim);
        let is_stale = matches!(stale, Err(FortressError::StaleState { .. }));
        prop_assert!(is_stale, "expected StaleState, got {:?}", stale);

        let newest = *history.latest().unwrap();
        let non_finite = EntityState::new(
            Vec2::zero(),
            Vec2::zero(),
            f64::NAN,
            newest.sequence.next(),
        );
        prop_assert!(history.record(non_finite).is_err());

        let after: Vec<EntityState<Vec2>> = history.iter().copied().collect();
        prop_assert_eq!(before, after);
    }

    /// query_at returns the nearest retained state, the earlier one on ties
    #[test]
    fn prop_query_returns_nearest(
        gaps in prop::collection::vec(gap_strategy(), 1..100),
        target in -1.0f64..25.0,
    ) {
        let history = build_history(60_000, &gaps);
        let found = history.query_at(target).unwrap();
        let found_distance = (found.timestamp - target).abs();

        for entry in history.iter() {
            let distance = (entry.timestamp - target).abs();
            prop_assert!(
                distance >= found_distance,
                "t={} is nearer to {} than chosen t={}",
                entry.timestamp,
                target,
                found.timestamp
            );
            if distance == found_distance {
                prop_assert!(entry.timestamp >= found.timestamp, "tie not resolved earlier");
            }
        }
    }
}

// ============================================================================
// Prediction and Reconciliation Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// An agreeing server never produces a correction and the client converges on it
    #[test]
    fn prop_reconciliation_converges(
        run in input_run_strategy(),
        ack_lag in 0usize..6,
    ) {
        let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
        let mut predictor = ClientPredictor::new(ENTITY, seed, Duration::from_secs(1)).unwrap();
        let mut reconciler = Reconciler::new();
        let mut server = seed;
        let mut issued = Vec::new();
        let mut acknowledged = 0usize;

        for (control, dt) in run {
            let (input, _) = predictor.issue(control, dt).unwrap();
            issued.push(input);

            while issued.len() - acknowledged > ack_lag {
                let input = issued[acknowledged];
                server = apply_command(&server, &input).unwrap();
                acknowledged += 1;

                let result = reconciler
                    .reconcile(&mut predictor, AuthoritativeUpdate::new(server, input.sequence))
                    .unwrap();
                prop_assert_eq!(result.error, 0.0);
                prop_assert_eq!(result.replayed_inputs, issued.len() - acknowledged);

                let pending = predictor.pending_inputs();
                prop_assert!(pending.iter().all(|p| p.sequence > input.sequence));
                prop_assert!(pending.windows(2).all(|w| w[0].sequence < w[1].sequence));
            }
        }

        for input in &issued[acknowledged..] {
            server = apply_command(&server, input).unwrap();
            reconciler
                .reconcile(&mut predictor, AuthoritativeUpdate::new(server, input.sequence))
                .unwrap();
        }
        prop_assert!(predictor.pending_inputs().is_empty());
        prop_assert_eq!(*predictor.current_state(), server);
        prop_assert!(predictor.history().check_invariants().is_ok());
    }

    /// After reconciling against a diverged state, the client lands on a replay of its
    /// own pending inputs from that state
    #[test]
    fn prop_reconciliation_replays_pending_from_authority(
        run in input_run_strategy(),
        offset in vec2_strategy(),
        ack_fraction in 0.0f64..1.0,
    ) {
        let seed = EntityState::seed(Vec2::zero(), Vec2::zero(), 0.0);
        let mut predictor = ClientPredictor::new(ENTITY, seed, Duration::from_secs(1)).unwrap();
        let mut issued: Vec<InputCommand<Vec2>> = Vec::new();
        for (control, dt) in run {
            issued.push(predictor.issue(control, dt).unwrap().0);
        }

        let ack_index = ((issued.len() - 1) as f64 * ack_fraction) as usize;
        let ack = issued[ack_index].sequence;
        let mut authority = replay(&seed, &issued[..=ack_index]).unwrap();
        authority.position = authority.position + offset;

        let mut reconciler = Reconciler::new();
        let result = reconciler
            .reconcile(&mut predictor, AuthoritativeUpdate::new(authority, ack))
            .unwrap();

        let expected = replay(&authority, &issued[ack_index + 1..]).unwrap();
        prop_assert_eq!(result.corrected_state.position, expected.position);
        prop_assert_eq!(result.corrected_state.velocity, expected.velocity);
        prop_assert_eq!(result.acknowledged_inputs, ack_index + 1);
        prop_assert_eq!(result.replayed_inputs, issued.len() - ack_index - 1);
    }
}

// ============================================================================
// Interpolation Tests
// ============================================================================

proptest! {
    /// Interpolation reproduces endpoints, clamps its factor and stays between snapshots
    #[test]
    fn prop_interpolation_boundaries(
        a in vec2_strategy(),
        b in vec2_strategy(),
        alpha in -2.0f64..3.0,
    ) {
        let sa = EntityState::seed(a, Vec2::zero(), 0.0);
        let sb = EntityState::seed(b, Vec2::zero(), 0.1);

        prop_assert_eq!(interpolate(&sa, &sb, 0.0), a);
        prop_assert_eq!(interpolate(&sa, &sb, 1.0), b);

        let p = interpolate(&sa, &sb, alpha);
        if alpha <= 0.0 {
            prop_assert_eq!(p, a);
        } else if alpha >= 1.0 {
            prop_assert_eq!(p, b);
        }

        let tolerance = 1e-9;
        prop_assert!(p.x >= a.x.min(b.x) - tolerance && p.x <= a.x.max(b.x) + tolerance);
        prop_assert!(p.y >= a.y.min(b.y) - tolerance && p.y <= a.y.max(b.y) + tolerance);
    }

    /// A remote view never renders outside the extrapolation limit
    #[test]
    fn prop_remote_view_extrapolation_capped(
        velocity in vec2_strategy(),
        ahead in 0.0f64..5.0,
    ) {
        let mut view = RemoteEntityView::new(
            ENTITY,
            Duration::from_secs(1),
            Duration::from_millis(100),
            Duration::from_millis(250),
        );
        let newest = EntityState::new(Vec2::zero(), velocity, 1.0, SequenceNumber::new(1));
        view.push(newest).unwrap();

        // render time puts the sample point `ahead` seconds past the newest snapshot
        let p = view.sample(1.0 + 0.1 + ahead).unwrap();
        let limit = velocity.length() * 0.25;
        prop_assert!(p.length() <= limit + 1e-6, "{:?} beyond {}", p, limit);
    }
}
