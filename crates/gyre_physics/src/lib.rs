//! Rigid-body synchronization for the gyre engine
//!
//! This crate keeps the scene graph of [`gyre_core`] consistent with a
//! rigid-body simulation:
//!
//! - [`shapes`] - Collider to native shape translation
//! - [`PhysicsBackend`] - The engine seam; [`PhysicsWorld`] implements it on rapier
//! - [`SyncRecord`] - Per-body bridge with dirty tracking and reconciliation
//! - [`RecordObserver`] - Scene events to dirty flags
//! - [`PhysicsSystem`] - Registration, invalidation queue, and the frame loop
//! - [`RaycastResult`] - Ray queries resolved back to entities and colliders

pub mod backend;
pub mod error;
pub mod glue;
pub mod query;
pub mod queue;
pub mod record;
pub mod shapes;
pub mod system;
pub mod world;

// Re-export commonly used types
pub use backend::{
    ActivationPolicy, BodyDesc, BodyKey, MotionStateKey, NativeRayHit, PhysicsBackend,
    SharedBackend, ShapeKey,
};
pub use error::PhysicsError;
pub use glue::RecordObserver;
pub use query::RaycastResult;
pub use queue::{InvalidationQueue, SharedQueue};
pub use record::{ColliderDirty, DirtyState, PullBack, RecordKey, SyncRecord};
pub use shapes::{shape_desc, ShapeDesc, BOX2D_HALF_DEPTH};
pub use system::{FrameStats, PhysicsSystem};
pub use world::{PhysicsConfig, PhysicsWorld};
