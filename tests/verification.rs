//! Verification integration tests.
//!
//! This module contains property-based and determinism tests:
//! - Determinism tests - identical inputs produce bit-identical states
//! - Property tests - property-based testing with proptest

// Verification test modules
mod verification {
    pub mod determinism;
    pub mod property;
}
