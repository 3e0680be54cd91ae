//! Physics backend interface
//!
//! [`PhysicsBackend`] is the single seam between the synchronization layer and
//! a rigid-body engine. Everything native lives behind generational keys owned
//! by the backend: shapes (primitives and compounds), motion states, and
//! bodies. [`crate::PhysicsWorld`] implements it on top of rapier; tests plug
//! in call-counting stubs.
//!
//! Operations on a stale key are ignored (setters) or return `None` (getters).

use crate::shapes::ShapeDesc;
use nalgebra::{Isometry3, Point3, Vector3};
use slotmap::new_key_type;
use std::cell::RefCell;
use std::rc::Rc;

new_key_type! {
    /// Key for a native rigid body
    pub struct BodyKey;
}

new_key_type! {
    /// Key for a native collision shape (primitive or compound)
    pub struct ShapeKey;
}

new_key_type! {
    /// Key for a motion state bridge
    pub struct MotionStateKey;
}

/// Shared, single-threaded handle to a backend
pub type SharedBackend = Rc<RefCell<dyn PhysicsBackend>>;

/// Sleep behaviour of a body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationPolicy {
    /// Never put to sleep by the solver (dynamic bodies)
    NeverSleep,
    /// Asleep unless woken (static bodies)
    PreferSleep,
}

/// Construction parameters for a native body
#[derive(Clone, Copy, Debug)]
pub struct BodyDesc {
    /// Mass; zero for static bodies
    pub mass: f32,
    /// Motion state providing the initial pose
    pub motion_state: MotionStateKey,
    /// Compound shape attached to the body
    pub shape: ShapeKey,
    /// Principal inertia in the body frame
    pub local_inertia: Vector3<f32>,
}

/// A native ray hit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NativeRayHit {
    /// Body whose shape was struck
    pub body: BodyKey,
    /// Child of the body's compound that was struck, if it could be resolved
    pub child_shape: Option<ShapeKey>,
    /// World-space hit point
    pub point: Point3<f32>,
    /// World-space surface normal
    pub normal: Vector3<f32>,
    /// Position along the ray, 0 at `from` and 1 at `to`
    pub fraction: f32,
}

/// Everything the synchronization layer needs from a rigid-body engine
pub trait PhysicsBackend {
    // --- Shapes ---

    /// Create a primitive shape
    fn create_shape(&mut self, desc: &ShapeDesc) -> ShapeKey;
    /// Create an empty compound shape
    fn create_compound(&mut self) -> ShapeKey;
    /// Add `child` to `compound` at a local offset
    fn add_child_shape(&mut self, compound: ShapeKey, offset: &Isometry3<f32>, child: ShapeKey);
    /// Remove `child` from `compound`; the child shape itself survives
    fn remove_child_shape(&mut self, compound: ShapeKey, child: ShapeKey);
    /// Children of a compound, in insertion order
    fn child_shapes(&self, compound: ShapeKey) -> Vec<ShapeKey>;
    /// Description a primitive was created from
    fn shape_desc(&self, shape: ShapeKey) -> Option<ShapeDesc>;
    /// Principal inertia of a shape at the given mass
    fn calculate_local_inertia(&self, shape: ShapeKey, mass: f32) -> Vector3<f32>;
    /// Free a shape
    fn destroy_shape(&mut self, shape: ShapeKey);

    // --- Motion states ---

    /// Create a motion state holding `pose`
    fn create_motion_state(&mut self, pose: &Isometry3<f32>) -> MotionStateKey;
    /// Last pose written to (or by) the motion state
    fn motion_state_pose(&self, state: MotionStateKey) -> Option<Isometry3<f32>>;
    /// Overwrite the motion state's pose
    fn set_motion_state_pose(&mut self, state: MotionStateKey, pose: &Isometry3<f32>);
    /// Free a motion state
    fn destroy_motion_state(&mut self, state: MotionStateKey);

    // --- Bodies ---

    /// Create a body outside the world
    fn create_body(&mut self, desc: &BodyDesc) -> BodyKey;
    /// Free a body; it must already be out of the world
    fn destroy_body(&mut self, body: BodyKey);
    /// Set mass and principal inertia
    fn set_mass_props(&mut self, body: BodyKey, mass: f32, inertia: Vector3<f32>);
    /// Current mass
    fn body_mass(&self, body: BodyKey) -> Option<f32>;
    /// World pose of the body
    fn body_pose(&self, body: BodyKey) -> Option<Isometry3<f32>>;
    /// Teleport the body
    fn set_body_pose(&mut self, body: BodyKey, pose: &Isometry3<f32>);
    /// Linear velocity
    fn linear_velocity(&self, body: BodyKey) -> Option<Vector3<f32>>;
    /// Set linear velocity
    fn set_linear_velocity(&mut self, body: BodyKey, velocity: Vector3<f32>);
    /// Angular velocity
    fn angular_velocity(&self, body: BodyKey) -> Option<Vector3<f32>>;
    /// Set angular velocity
    fn set_angular_velocity(&mut self, body: BodyKey, velocity: Vector3<f32>);
    /// Per-axis linear motion factor
    fn set_linear_factor(&mut self, body: BodyKey, factor: Vector3<f32>);
    /// Per-axis angular motion factor
    fn set_angular_factor(&mut self, body: BodyKey, factor: Vector3<f32>);
    /// Switch between static and dynamic collision behaviour
    fn set_static(&mut self, body: BodyKey, is_static: bool);
    /// Whether world gravity acts on the body
    fn set_gravity_enabled(&mut self, body: BodyKey, enabled: bool);
    /// Drop accumulated forces and torques
    fn clear_forces(&mut self, body: BodyKey);
    /// Accumulate a force through the center of mass
    fn apply_central_force(&mut self, body: BodyKey, force: Vector3<f32>);
    /// Apply an impulse through the center of mass
    fn apply_central_impulse(&mut self, body: BodyKey, impulse: Vector3<f32>);
    /// Set sleep behaviour
    fn set_activation_policy(&mut self, body: BodyKey, policy: ActivationPolicy);
    /// Wake the body so the next step considers it
    fn activate(&mut self, body: BodyKey);

    // --- World ---

    /// Put a body into the simulated world
    fn add_body(&mut self, body: BodyKey);
    /// Take a body out of the simulated world
    fn remove_body(&mut self, body: BodyKey);
    /// Whether a body is in the simulated world
    fn contains_body(&self, body: BodyKey) -> bool;
    /// Advance by `dt` in fixed steps; returns the number of steps taken
    fn step_simulation(&mut self, dt: f32, max_sub_steps: u32, fixed_time_step: f32) -> u32;
    /// Refresh broad-phase data after a teleport
    fn clean_overlap_cache(&mut self, body: BodyKey);
    /// World gravity
    fn gravity(&self) -> Vector3<f32>;
    /// Change world gravity, waking every body
    fn set_gravity(&mut self, gravity: Vector3<f32>);
    /// Closest hit on the segment `from`..`to`
    fn ray_test(&mut self, from: &Point3<f32>, to: &Point3<f32>) -> Option<NativeRayHit>;
    /// Release everything; the backend is empty but usable afterwards
    fn cleanup(&mut self);
}
