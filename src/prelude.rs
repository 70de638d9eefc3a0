//! Convenient re-exports for common usage.
//!
//! This module provides a "prelude" that re-exports the most commonly used types
//! from Fortress Sync, allowing you to import them all at once.
//!
//! # Usage
//!
//! ```rust
//! use fortress_sync::prelude::*;
//! ```
//!
//! # What's Included
//!
//! The prelude includes:
//!
//! - **Identifiers**: [`EntityId`], [`SequenceNumber`]
//! - **State types**: [`EntityState`], [`Control`], [`InputCommand`], [`AuthoritativeUpdate`]
//! - **Vectors**: [`Vec2`], [`Vec3`], [`Vector`]
//! - **Client side**: [`ClientPredictor`], [`Reconciler`], [`ReconciliationResult`], [`Correction`], [`SharedClient`]
//! - **Server side**: [`SharedHistory`], [`LagCompensator`], [`LatencyEstimator`], [`RttEstimator`]
//! - **Rendering**: [`RemoteEntityView`], [`FixedTimestep`]
//! - **Setup**: [`SyncBuilder`], [`SyncConfig`]
//! - **Error handling**: [`FortressError`], [`FortressResult`]
//!
//! # Example
//!
//! ```rust
//! use fortress_sync::prelude::*;
//!
//! # fn main() -> FortressResult<()> {
//! let builder = SyncBuilder::new().with_config(SyncConfig::lan());
//!
//! // server keeps history of every entity for lag compensation
//! let history: SharedHistory<Vec2> = builder.build_history()?;
//! let compensator = builder.build_lag_compensator(history.clone())?;
//!
//! // renderer samples remote entities slightly in the past
//! let view: RemoteEntityView<Vec2> = builder.build_remote_view(EntityId::new(2))?;
//! # let _ = (compensator, view);
//! # Ok(())
//! # }
//! ```

// Identifiers
pub use crate::{EntityId, SequenceNumber};

// State and input types
pub use crate::{AuthoritativeUpdate, Control, EntityState, InputCommand};

// Vector math
pub use crate::{Vec2, Vec3, Vector};

// Client-side prediction and reconciliation
pub use crate::{ClientPredictor, Correction, ReconciliationResult, Reconciler, SharedClient};

// Server-side history and lag compensation
pub use crate::{HistoryStore, LagCompensator, LatencyEstimator, RttEstimator, SharedHistory};

// Rendering and scheduling
pub use crate::{FixedTimestep, RemoteEntityView};

// Configuration
pub use crate::{SyncBuilder, SyncConfig};

// Error handling
pub use crate::{FortressError, FortressResult};
