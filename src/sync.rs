//! Synchronization primitives abstraction for loom testing compatibility.
//!
//! This module provides a unified interface to synchronization primitives that works
//! with both production code (using `parking_lot` for performance) and loom tests
//! (using `loom::sync` for model checking).
//!
//! # Usage
//!
//! Import from this module instead of directly from `parking_lot` or `std::sync`:
//!
//! ```ignore
//! // Instead of:
//! use parking_lot::RwLock;
//! use std::sync::Arc;
//!
//! // Use:
//! use crate::sync::{Arc, RwLock};
//! ```
//!
//! The lock wrappers expose the `parking_lot` calling convention (guards are
//! returned directly, no poisoning) under both backends, so the history and
//! client code does not need `cfg(loom)` branches.
//!
//! # Loom Testing
//!
//! Run loom tests from the isolated `loom-tests/` crate:
//! ```bash
//! cd loom-tests
//! RUSTFLAGS="--cfg loom" cargo test --release
//! ```

// ============================================================================
// LOOM CONFIGURATION
// ============================================================================

/// When running under loom (`RUSTFLAGS="--cfg loom"`), use loom's types
#[cfg(loom)]
pub(crate) mod inner {
    pub use loom::sync::Arc;
    #[allow(unused_imports)] // Used for API consistency
    pub use loom::thread;

    /// Mutual exclusion lock with `parking_lot` ergonomics on top of loom.
    pub struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
            self.0
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Reader-writer lock with `parking_lot` ergonomics on top of loom.
    pub struct RwLock<T>(loom::sync::RwLock<T>);

    impl<T> RwLock<T> {
        pub fn new(value: T) -> Self {
            Self(loom::sync::RwLock::new(value))
        }

        pub fn read(&self) -> loom::sync::RwLockReadGuard<'_, T> {
            self.0
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        pub fn write(&self) -> loom::sync::RwLockWriteGuard<'_, T> {
            self.0
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Yield to the loom scheduler. This is important for testing spin-loops
    /// and other constructs that assume fair scheduling.
    #[inline]
    #[allow(dead_code)] // May not be used in all loom tests
    pub fn yield_now() {
        loom::thread::yield_now();
    }
}

/// In production, use parking_lot for performance
#[cfg(not(loom))]
pub(crate) mod inner {
    pub use parking_lot::Mutex;
    pub use parking_lot::RwLock;
    pub use std::sync::Arc;
    #[allow(unused_imports)] // Used for loom compatibility abstraction
    pub use std::thread;

    /// No-op in production - only meaningful under loom
    #[inline]
    #[allow(dead_code)] // Used via loom compatibility abstraction in tests
    pub fn yield_now() {
        std::thread::yield_now();
    }
}

// Re-export at module level for convenience
pub(crate) use inner::*;

// ============================================================================
// TESTS
// ============================================================================
