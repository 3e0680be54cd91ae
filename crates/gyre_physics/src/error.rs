//! Physics synchronization error types

use gyre_core::{EntityKey, WorldError};
use thiserror::Error;

/// Errors from [`crate::PhysicsSystem`] and [`crate::SyncRecord`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    /// A query or mutation needs a physics world and none is attached
    #[error("no physics world is attached")]
    NoWorld,
    #[error("entity {0:?} has no rigid body")]
    MissingRigidBody(EntityKey),
    #[error("entity {0:?} is already registered")]
    AlreadyRegistered(EntityKey),
    #[error("entity {0:?} is not registered")]
    NotRegistered(EntityKey),
    /// The record has no native body (never activated, or deactivated)
    #[error("rigid body of entity {0:?} is not attached to a physics world")]
    Detached(EntityKey),
    /// Writing simulation results back into the scene failed
    #[error(transparent)]
    World(#[from] WorldError),
}
