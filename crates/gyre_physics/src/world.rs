//! Rapier-backed physics world
//!
//! [`PhysicsWorld`] owns the rapier pipeline and every native object the
//! synchronization layer creates through [`PhysicsBackend`]. Each body carries
//! at most one rapier collider whose shape is the body's compound; an empty
//! compound means no collider at all. Mass comes exclusively from the body's
//! additional mass properties (colliders have zero density).
//!
//! Rapier has no notion of a body living outside the world, so world
//! membership is modelled with the enabled flags of the body and its collider.

use crate::backend::{
    ActivationPolicy, BodyDesc, BodyKey, MotionStateKey, NativeRayHit, PhysicsBackend, ShapeKey,
};
use crate::shapes::ShapeDesc;
use gyre_core::CapsuleAxis;
use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::prelude::*;
use slotmap::{Key, KeyData, SlotMap};
use std::collections::HashSet;

/// Ray hits closer than this to the origin are reported, not skipped
const SOLID_RAYS: bool = true;

/// Tolerance when counting whole fixed steps in the accumulator
const STEP_EPSILON: f32 = 1e-4;

/// Configuration for the physics simulation
#[derive(Clone, Debug)]
pub struct PhysicsConfig {
    /// Gravity acceleration
    pub gravity: Vector3<f32>,
    /// Length of one fixed simulation step, in seconds
    pub fixed_time_step: f32,
    /// Upper bound on fixed steps taken per frame
    pub max_sub_steps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, -9.81, 0.0),
            fixed_time_step: 1.0 / 60.0,
            max_sub_steps: 10,
        }
    }
}

impl PhysicsConfig {
    /// Create a config with the given gravity and default stepping
    pub fn new(gravity: Vector3<f32>) -> Self {
        Self {
            gravity,
            ..Self::default()
        }
    }

    /// Builder: set the fixed step length
    pub fn with_fixed_time_step(mut self, fixed_time_step: f32) -> Self {
        self.fixed_time_step = fixed_time_step;
        self
    }

    /// Builder: set the sub-step cap
    pub fn with_max_sub_steps(mut self, max_sub_steps: u32) -> Self {
        self.max_sub_steps = max_sub_steps;
        self
    }
}

enum NativeShape {
    Primitive {
        desc: ShapeDesc,
        shape: SharedShape,
    },
    Compound {
        children: Vec<(ShapeKey, Isometry3<f32>)>,
        /// Body whose collider mirrors this compound
        body: Option<BodyKey>,
    },
}

struct NativeBody {
    handle: RigidBodyHandle,
    collider: Option<ColliderHandle>,
    compound: ShapeKey,
    motion_state: MotionStateKey,
    linear_factor: Vector3<f32>,
    angular_factor: Vector3<f32>,
    in_world: bool,
}

/// The physics world containing all native bodies and shapes
pub struct PhysicsWorld {
    bodies: SlotMap<BodyKey, NativeBody>,
    shapes: SlotMap<ShapeKey, NativeShape>,
    motion_states: SlotMap<MotionStateKey, Isometry3<f32>>,

    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    /// Simulated time not yet consumed by a fixed step
    accumulator: f32,
}

impl PhysicsWorld {
    /// Create a new physics world with default configuration
    pub fn new() -> Self {
        Self::with_config(&PhysicsConfig::default())
    }

    /// Create a new physics world with custom configuration
    pub fn with_config(config: &PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.fixed_time_step;
        Self {
            bodies: SlotMap::with_key(),
            shapes: SlotMap::with_key(),
            motion_states: SlotMap::with_key(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: config.gravity,
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            accumulator: 0.0,
        }
    }

    /// Get the number of native bodies (in or out of the world)
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Get the number of live shapes, compounds included
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Get the number of live motion states
    pub fn motion_state_count(&self) -> usize {
        self.motion_states.len()
    }

    /// Whether the body is asleep; `None` for an unknown key
    pub fn is_sleeping(&self, body: BodyKey) -> Option<bool> {
        let native = self.bodies.get(body)?;
        self.rigid_body_set.get(native.handle).map(|rb| rb.is_sleeping())
    }

    fn rigid_body(&self, body: BodyKey) -> Option<&RigidBody> {
        let native = self.bodies.get(body)?;
        self.rigid_body_set.get(native.handle)
    }

    fn rigid_body_mut(&mut self, body: BodyKey) -> Option<&mut RigidBody> {
        let native = self.bodies.get(body)?;
        self.rigid_body_set.get_mut(native.handle)
    }

    fn build_primitive(desc: &ShapeDesc) -> SharedShape {
        match *desc {
            ShapeDesc::Cuboid { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            ShapeDesc::Ball { radius } => SharedShape::ball(radius),
            ShapeDesc::Capsule {
                axis,
                half_height,
                radius,
            } => match axis {
                CapsuleAxis::X => SharedShape::capsule_x(half_height, radius),
                CapsuleAxis::Y => SharedShape::capsule_y(half_height, radius),
                CapsuleAxis::Z => SharedShape::capsule_z(half_height, radius),
            },
        }
    }

    /// Assemble the rapier compound for a compound key; `None` when empty
    fn compound_shape(&self, compound: ShapeKey) -> Option<SharedShape> {
        let Some(NativeShape::Compound { children, .. }) = self.shapes.get(compound) else {
            return None;
        };
        let parts: Vec<(Isometry<Real>, SharedShape)> = children
            .iter()
            .filter_map(|(child, offset)| match self.shapes.get(*child) {
                Some(NativeShape::Primitive { shape, .. }) => Some((*offset, shape.clone())),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| SharedShape::compound(parts))
    }

    /// Rebuild the collider of the body mirroring `compound`
    fn refresh_collider(&mut self, compound: ShapeKey) {
        let Some(NativeShape::Compound {
            body: Some(body), ..
        }) = self.shapes.get(compound)
        else {
            return;
        };
        let body = *body;
        let shape = self.compound_shape(compound);
        let Some(native) = self.bodies.get_mut(body) else {
            return;
        };

        match (shape, native.collider) {
            (Some(shape), Some(handle)) => {
                if let Some(collider) = self.collider_set.get_mut(handle) {
                    collider.set_shape(shape);
                }
            }
            (Some(shape), None) => {
                let collider = ColliderBuilder::new(shape)
                    .density(0.0)
                    .enabled(native.in_world)
                    .user_data(body.data().as_ffi() as u128)
                    .build();
                native.collider = Some(self.collider_set.insert_with_parent(
                    collider,
                    native.handle,
                    &mut self.rigid_body_set,
                ));
            }
            (None, Some(handle)) => {
                self.collider_set.remove(
                    handle,
                    &mut self.island_manager,
                    &mut self.rigid_body_set,
                    true,
                );
                native.collider = None;
            }
            (None, None) => {}
        }
    }

    fn apply_locked_axes(&mut self, body: BodyKey) {
        let Some(native) = self.bodies.get(body) else {
            return;
        };
        let axes = locked_axes(&native.linear_factor, &native.angular_factor);
        if let Some(rb) = self.rigid_body_set.get_mut(native.handle) {
            rb.set_locked_axes(axes, true);
        }
    }

    fn set_membership(&mut self, body: BodyKey, in_world: bool) {
        let Some(native) = self.bodies.get_mut(body) else {
            return;
        };
        if native.in_world == in_world {
            return;
        }
        native.in_world = in_world;
        if let Some(rb) = self.rigid_body_set.get_mut(native.handle) {
            rb.set_enabled(in_world);
        }
        if let Some(collider) = native.collider.and_then(|h| self.collider_set.get_mut(h)) {
            collider.set_enabled(in_world);
        }
    }

    /// Write each in-world body's simulated pose into its motion state
    ///
    /// Leftover accumulator time is not extrapolated: the motion state always
    /// matches the native body.
    fn sync_motion_states(&mut self) {
        for native in self.bodies.values() {
            if !native.in_world {
                continue;
            }
            let Some(rb) = self.rigid_body_set.get(native.handle) else {
                continue;
            };
            if let Some(state) = self.motion_states.get_mut(native.motion_state) {
                *state = *rb.position();
            }
        }
    }

    fn step_once(&mut self) {
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// Which child of a body's compound a ray struck first
    fn struck_child(&self, body: BodyKey, ray: &Ray, time_of_impact: f32) -> Option<ShapeKey> {
        let native = self.bodies.get(body)?;
        let collider = self.collider_set.get(native.collider?)?;
        let Some(NativeShape::Compound { children, .. }) = self.shapes.get(native.compound) else {
            return None;
        };
        let body_pose = collider.position();

        children
            .iter()
            .filter_map(|(child, offset)| {
                let Some(NativeShape::Primitive { shape, .. }) = self.shapes.get(*child) else {
                    return None;
                };
                let toi = shape.cast_ray(&(body_pose * offset), ray, time_of_impact + 1e-3, SOLID_RAYS)?;
                Some((*child, (toi - time_of_impact).abs()))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(child, _)| child)
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Rapier axis locks for per-axis motion factors; a zero factor locks its axis
fn locked_axes(linear: &Vector3<f32>, angular: &Vector3<f32>) -> LockedAxes {
    let mut axes = LockedAxes::empty();
    let flags = [
        (linear.x, LockedAxes::TRANSLATION_LOCKED_X),
        (linear.y, LockedAxes::TRANSLATION_LOCKED_Y),
        (linear.z, LockedAxes::TRANSLATION_LOCKED_Z),
        (angular.x, LockedAxes::ROTATION_LOCKED_X),
        (angular.y, LockedAxes::ROTATION_LOCKED_Y),
        (angular.z, LockedAxes::ROTATION_LOCKED_Z),
    ];
    for (factor, flag) in flags {
        if factor == 0.0 {
            axes |= flag;
        }
    }
    axes
}

impl PhysicsBackend for PhysicsWorld {
    fn create_shape(&mut self, desc: &ShapeDesc) -> ShapeKey {
        self.shapes.insert(NativeShape::Primitive {
            desc: *desc,
            shape: Self::build_primitive(desc),
        })
    }

    fn create_compound(&mut self) -> ShapeKey {
        self.shapes.insert(NativeShape::Compound {
            children: Vec::new(),
            body: None,
        })
    }

    fn add_child_shape(&mut self, compound: ShapeKey, offset: &Isometry3<f32>, child: ShapeKey) {
        if !matches!(self.shapes.get(child), Some(NativeShape::Primitive { .. })) {
            log::warn!("add_child_shape: {:?} is not a primitive shape", child);
            return;
        }
        match self.shapes.get_mut(compound) {
            Some(NativeShape::Compound { children, .. }) => children.push((child, *offset)),
            _ => return,
        }
        self.refresh_collider(compound);
    }

    fn remove_child_shape(&mut self, compound: ShapeKey, child: ShapeKey) {
        match self.shapes.get_mut(compound) {
            Some(NativeShape::Compound { children, .. }) => children.retain(|(c, _)| *c != child),
            _ => return,
        }
        self.refresh_collider(compound);
    }

    fn child_shapes(&self, compound: ShapeKey) -> Vec<ShapeKey> {
        match self.shapes.get(compound) {
            Some(NativeShape::Compound { children, .. }) => children.iter().map(|(c, _)| *c).collect(),
            _ => Vec::new(),
        }
    }

    fn shape_desc(&self, shape: ShapeKey) -> Option<ShapeDesc> {
        match self.shapes.get(shape)? {
            NativeShape::Primitive { desc, .. } => Some(*desc),
            NativeShape::Compound { .. } => None,
        }
    }

    fn calculate_local_inertia(&self, shape: ShapeKey, mass: f32) -> Vector3<f32> {
        let shape = match self.shapes.get(shape) {
            Some(NativeShape::Primitive { shape, .. }) => Some(shape.clone()),
            Some(NativeShape::Compound { .. }) => self.compound_shape(shape),
            None => None,
        };
        let Some(shape) = shape else {
            return Vector3::zeros();
        };
        // Unit-density properties scaled to the requested mass
        let unit = shape.mass_properties(1.0);
        if unit.mass() <= f32::EPSILON || mass <= 0.0 {
            return Vector3::zeros();
        }
        unit.principal_inertia() * (mass / unit.mass())
    }

    fn destroy_shape(&mut self, shape: ShapeKey) {
        // Children keep their own keys; a compound going away only detaches them
        if let Some(NativeShape::Compound {
            body: Some(body), ..
        }) = self.shapes.get(shape)
        {
            log::warn!("Destroying compound {:?} still attached to body {:?}", shape, body);
        }
        self.shapes.remove(shape);
    }

    fn create_motion_state(&mut self, pose: &Isometry3<f32>) -> MotionStateKey {
        self.motion_states.insert(*pose)
    }

    fn motion_state_pose(&self, state: MotionStateKey) -> Option<Isometry3<f32>> {
        self.motion_states.get(state).copied()
    }

    fn set_motion_state_pose(&mut self, state: MotionStateKey, pose: &Isometry3<f32>) {
        if let Some(current) = self.motion_states.get_mut(state) {
            *current = *pose;
        }
    }

    fn destroy_motion_state(&mut self, state: MotionStateKey) {
        self.motion_states.remove(state);
    }

    fn create_body(&mut self, desc: &BodyDesc) -> BodyKey {
        let pose = self
            .motion_states
            .get(desc.motion_state)
            .copied()
            .unwrap_or_else(Isometry3::identity);
        let rb = RigidBodyBuilder::dynamic()
            .position(pose)
            .enabled(false)
            .can_sleep(false)
            .additional_mass_properties(MassProperties::new(
                Point3::origin(),
                desc.mass,
                desc.local_inertia,
            ))
            .build();
        let handle = self.rigid_body_set.insert(rb);

        let key = self.bodies.insert(NativeBody {
            handle,
            collider: None,
            compound: desc.shape,
            motion_state: desc.motion_state,
            linear_factor: Vector3::repeat(1.0),
            angular_factor: Vector3::repeat(1.0),
            in_world: false,
        });
        if let Some(rb) = self.rigid_body_set.get_mut(handle) {
            rb.user_data = key.data().as_ffi() as u128;
        }
        if let Some(NativeShape::Compound { body, .. }) = self.shapes.get_mut(desc.shape) {
            *body = Some(key);
        }
        self.refresh_collider(desc.shape);
        if let Some(rb) = self.rigid_body_set.get_mut(handle) {
            rb.recompute_mass_properties_from_colliders(&self.collider_set);
        }
        key
    }

    fn destroy_body(&mut self, body: BodyKey) {
        let Some(native) = self.bodies.remove(body) else {
            return;
        };
        if native.in_world {
            log::warn!("Destroying body {:?} that is still in the world", body);
        }
        if let Some(NativeShape::Compound { body: owner, .. }) = self.shapes.get_mut(native.compound) {
            *owner = None;
        }
        // Removing the rapier body also removes its collider
        self.rigid_body_set.remove(
            native.handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    fn set_mass_props(&mut self, body: BodyKey, mass: f32, inertia: Vector3<f32>) {
        let Some(native) = self.bodies.get(body) else {
            return;
        };
        if let Some(rb) = self.rigid_body_set.get_mut(native.handle) {
            rb.set_additional_mass_properties(
                MassProperties::new(Point3::origin(), mass, inertia),
                true,
            );
            rb.recompute_mass_properties_from_colliders(&self.collider_set);
        }
    }

    fn body_mass(&self, body: BodyKey) -> Option<f32> {
        self.rigid_body(body).map(|rb| rb.mass())
    }

    fn body_pose(&self, body: BodyKey) -> Option<Isometry3<f32>> {
        self.rigid_body(body).map(|rb| *rb.position())
    }

    fn set_body_pose(&mut self, body: BodyKey, pose: &Isometry3<f32>) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_position(*pose, true);
        }
    }

    fn linear_velocity(&self, body: BodyKey) -> Option<Vector3<f32>> {
        self.rigid_body(body).map(|rb| *rb.linvel())
    }

    fn set_linear_velocity(&mut self, body: BodyKey, velocity: Vector3<f32>) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_linvel(velocity, true);
        }
    }

    fn angular_velocity(&self, body: BodyKey) -> Option<Vector3<f32>> {
        self.rigid_body(body).map(|rb| *rb.angvel())
    }

    fn set_angular_velocity(&mut self, body: BodyKey, velocity: Vector3<f32>) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_angvel(velocity, true);
        }
    }

    fn set_linear_factor(&mut self, body: BodyKey, factor: Vector3<f32>) {
        if let Some(native) = self.bodies.get_mut(body) {
            native.linear_factor = factor;
            self.apply_locked_axes(body);
        }
    }

    fn set_angular_factor(&mut self, body: BodyKey, factor: Vector3<f32>) {
        if let Some(native) = self.bodies.get_mut(body) {
            native.angular_factor = factor;
            self.apply_locked_axes(body);
        }
    }

    fn set_static(&mut self, body: BodyKey, is_static: bool) {
        let body_type = if is_static {
            RigidBodyType::Fixed
        } else {
            RigidBodyType::Dynamic
        };
        if let Some(rb) = self.rigid_body_mut(body) {
            if is_static {
                // Velocity setters are ignored once the body is fixed
                rb.set_linvel(Vector3::zeros(), false);
                rb.set_angvel(Vector3::zeros(), false);
            }
            rb.set_body_type(body_type, true);
        }
    }

    fn set_gravity_enabled(&mut self, body: BodyKey, enabled: bool) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.set_gravity_scale(if enabled { 1.0 } else { 0.0 }, true);
        }
    }

    fn clear_forces(&mut self, body: BodyKey) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
    }

    fn apply_central_force(&mut self, body: BodyKey, force: Vector3<f32>) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.add_force(force, true);
        }
    }

    fn apply_central_impulse(&mut self, body: BodyKey, impulse: Vector3<f32>) {
        if let Some(rb) = self.rigid_body_mut(body) {
            rb.apply_impulse(impulse, true);
        }
    }

    fn set_activation_policy(&mut self, body: BodyKey, policy: ActivationPolicy) {
        let Some(rb) = self.rigid_body_mut(body) else {
            return;
        };
        match policy {
            ActivationPolicy::NeverSleep => {
                *rb.activation_mut() = RigidBodyActivation::cannot_sleep();
                rb.wake_up(true);
            }
            ActivationPolicy::PreferSleep => {
                *rb.activation_mut() = RigidBodyActivation::active();
                rb.sleep();
            }
        }
    }

    fn activate(&mut self, body: BodyKey) {
        if let Some(rb) = self.rigid_body_mut(body) {
            if rb.is_dynamic() {
                rb.wake_up(true);
            }
        }
    }

    fn add_body(&mut self, body: BodyKey) {
        self.set_membership(body, true);
    }

    fn remove_body(&mut self, body: BodyKey) {
        self.set_membership(body, false);
    }

    fn contains_body(&self, body: BodyKey) -> bool {
        self.bodies.get(body).map_or(false, |b| b.in_world)
    }

    fn step_simulation(&mut self, dt: f32, max_sub_steps: u32, fixed_time_step: f32) -> u32 {
        debug_assert!(fixed_time_step > 0.0, "fixed time step must be positive");
        self.accumulator += dt.max(0.0);

        let available = ((self.accumulator / fixed_time_step) + STEP_EPSILON).floor() as u32;
        // Surplus steps beyond the cap are dropped to keep frames bounded
        self.accumulator = (self.accumulator - available as f32 * fixed_time_step).max(0.0);
        let steps = available.min(max_sub_steps);

        self.integration_parameters.dt = fixed_time_step;
        for _ in 0..steps {
            self.step_once();
        }
        self.sync_motion_states();
        steps
    }

    fn clean_overlap_cache(&mut self, body: BodyKey) {
        let Some(native) = self.bodies.get(body) else {
            return;
        };
        let Some(pose) = self.rigid_body_set.get(native.handle).map(|rb| *rb.position()) else {
            return;
        };
        if let Some(collider) = native.collider.and_then(|h| self.collider_set.get_mut(h)) {
            let local = collider
                .position_wrt_parent()
                .copied()
                .unwrap_or_else(Isometry3::identity);
            collider.set_position(pose * local);
        }
    }

    fn gravity(&self) -> Vector3<f32> {
        self.gravity
    }

    fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.gravity = gravity;
        for native in self.bodies.values() {
            if let Some(rb) = self.rigid_body_set.get_mut(native.handle) {
                if rb.is_dynamic() {
                    rb.wake_up(true);
                }
            }
        }
    }

    fn ray_test(&mut self, from: &Point3<f32>, to: &Point3<f32>) -> Option<NativeRayHit> {
        let dir = to - from;
        if dir.norm_squared() <= f32::EPSILON {
            return None;
        }
        self.query_pipeline.update(&self.collider_set);

        let ray = Ray::new(*from, dir);
        let bodies = &self.rigid_body_set;
        let in_world = |_: ColliderHandle, collider: &Collider| {
            collider.is_enabled()
                && collider
                    .parent()
                    .and_then(|p| bodies.get(p))
                    .map_or(false, |rb| rb.is_enabled())
        };
        let filter = QueryFilter::new().predicate(&in_world);

        let (handle, hit) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            1.0,
            SOLID_RAYS,
            filter,
        )?;
        let collider = self.collider_set.get(handle)?;
        let body = BodyKey::from(KeyData::from_ffi(collider.user_data as u64));
        if !self.bodies.contains_key(body) {
            return None;
        }

        Some(NativeRayHit {
            body,
            child_shape: self.struck_child(body, &ray, hit.time_of_impact),
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            fraction: hit.time_of_impact,
        })
    }

    fn cleanup(&mut self) {
        // Joints first, then bodies (with their colliders), then shapes
        self.impulse_joint_set = ImpulseJointSet::new();
        self.multibody_joint_set = MultibodyJointSet::new();

        for (_, native) in self.bodies.drain() {
            self.rigid_body_set.remove(
                native.handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        self.motion_states.clear();

        // Children may be shared between compounds; free each exactly once
        let mut freed = HashSet::new();
        let compounds: Vec<ShapeKey> = self
            .shapes
            .iter()
            .filter(|(_, s)| matches!(s, NativeShape::Compound { .. }))
            .map(|(k, _)| k)
            .collect();
        for compound in compounds {
            if let Some(NativeShape::Compound { children, .. }) = self.shapes.remove(compound) {
                for (child, _) in children {
                    if freed.insert(child) {
                        self.shapes.remove(child);
                    }
                }
            }
        }
        self.shapes.clear();

        self.rigid_body_set = RigidBodySet::new();
        self.collider_set = ColliderSet::new();
        self.physics_pipeline = PhysicsPipeline::new();
        self.island_manager = IslandManager::new();
        self.broad_phase = DefaultBroadPhase::new();
        self.narrow_phase = NarrowPhase::new();
        self.ccd_solver = CCDSolver::new();
        self.query_pipeline = QueryPipeline::new();
        self.accumulator = 0.0;
    }
}
