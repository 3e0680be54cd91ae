//! Core scene-graph types for the gyre engine
//!
//! This crate provides the authoritative, user-facing state that the physics
//! layer keeps in sync with its simulation:
//!
//! - [`Transform`] - Local position, rotation, and scale
//! - [`RigidBody`] / [`Collider`] - Physics descriptors attached to entities
//! - [`Entity`] - A named node with components and parent/child links
//! - [`World`] - Container for all entities and colliders
//! - [`EventHub`] / [`ChangeObserver`] / [`Subscription`] - Change notification
//! - [`Scene`] / [`EntityTemplate`] - RON persistence

mod components;
mod entity;
mod error;
mod events;
mod scene;
mod transform;
mod world;

pub use components::{
    CapsuleAxis, Collider, ColliderChanges, ColliderShape, RigidBody, RigidBodyChanges,
};
pub use entity::Entity;
pub use error::WorldError;
pub use events::{
    ChangeObserver, ComponentKind, EventHub, EventMask, MuteGuard, SceneEvent, Subscription,
};
pub use scene::{EntityTemplate, Scene, SceneError};
pub use transform::Transform;
pub use world::{ColliderKey, EntityKey, World};

// Re-export the math types used throughout the public API
pub use nalgebra::{Isometry3, Matrix4, Point3, UnitQuaternion, Vector2, Vector3};
