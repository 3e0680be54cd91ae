//! Call-counting physics backend shared by the integration tests
//!
//! Keeps just enough state to answer the getters the sync layer uses, and
//! integrates velocity (plus gravity) for in-world dynamic bodies.

#![allow(dead_code)]

use gyre_core::{Collider, ColliderKey, EntityKey, RigidBody, Transform, World};
use gyre_physics::{
    ActivationPolicy, BodyDesc, BodyKey, MotionStateKey, NativeRayHit, PhysicsBackend,
    SharedBackend, ShapeDesc, ShapeKey,
};
use nalgebra::{Isometry3, Point3, Vector3};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::rc::Rc;

pub enum StubShape {
    Primitive(ShapeDesc),
    Compound(Vec<(ShapeKey, Isometry3<f32>)>),
}

#[derive(Clone, Debug)]
pub struct StubBody {
    pub mass: f32,
    pub inertia: Vector3<f32>,
    pub pose: Isometry3<f32>,
    pub compound: ShapeKey,
    pub motion_state: MotionStateKey,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub linear_factor: Vector3<f32>,
    pub angular_factor: Vector3<f32>,
    pub is_static: bool,
    pub gravity: bool,
    pub force: Vector3<f32>,
    pub policy: Option<ActivationPolicy>,
    pub in_world: bool,
}

pub struct StubBackend {
    calls: RefCell<Vec<&'static str>>,
    pub shapes: SlotMap<ShapeKey, StubShape>,
    pub motion_states: SlotMap<MotionStateKey, Isometry3<f32>>,
    pub bodies: SlotMap<BodyKey, StubBody>,
    pub gravity: Vector3<f32>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            shapes: SlotMap::with_key(),
            motion_states: SlotMap::with_key(),
            bodies: SlotMap::with_key(),
            gravity: Vector3::new(0.0, -9.81, 0.0),
        }
    }

    fn log(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn body(&self, body: BodyKey) -> &StubBody {
        &self.bodies[body]
    }

    /// Children of a compound without logging a call
    pub fn children(&self, compound: ShapeKey) -> Vec<(ShapeKey, Isometry3<f32>)> {
        match self.shapes.get(compound) {
            Some(StubShape::Compound(children)) => children.clone(),
            _ => Vec::new(),
        }
    }

    pub fn primitive(&self, shape: ShapeKey) -> Option<ShapeDesc> {
        match self.shapes.get(shape)? {
            StubShape::Primitive(desc) => Some(*desc),
            StubShape::Compound(_) => None,
        }
    }

    fn body_mut(&mut self, body: BodyKey) -> Option<&mut StubBody> {
        self.bodies.get_mut(body)
    }
}

impl PhysicsBackend for StubBackend {
    fn create_shape(&mut self, desc: &ShapeDesc) -> ShapeKey {
        self.log("create_shape");
        self.shapes.insert(StubShape::Primitive(*desc))
    }

    fn create_compound(&mut self) -> ShapeKey {
        self.log("create_compound");
        self.shapes.insert(StubShape::Compound(Vec::new()))
    }

    fn add_child_shape(&mut self, compound: ShapeKey, offset: &Isometry3<f32>, child: ShapeKey) {
        self.log("add_child_shape");
        if let Some(StubShape::Compound(children)) = self.shapes.get_mut(compound) {
            children.push((child, *offset));
        }
    }

    fn remove_child_shape(&mut self, compound: ShapeKey, child: ShapeKey) {
        self.log("remove_child_shape");
        if let Some(StubShape::Compound(children)) = self.shapes.get_mut(compound) {
            children.retain(|(c, _)| *c != child);
        }
    }

    fn child_shapes(&self, compound: ShapeKey) -> Vec<ShapeKey> {
        self.log("child_shapes");
        self.children(compound).into_iter().map(|(c, _)| c).collect()
    }

    fn shape_desc(&self, shape: ShapeKey) -> Option<ShapeDesc> {
        self.log("shape_desc");
        self.primitive(shape)
    }

    fn calculate_local_inertia(&self, _shape: ShapeKey, mass: f32) -> Vector3<f32> {
        self.log("calculate_local_inertia");
        Vector3::repeat(mass)
    }

    fn destroy_shape(&mut self, shape: ShapeKey) {
        self.log("destroy_shape");
        self.shapes.remove(shape);
    }

    fn create_motion_state(&mut self, pose: &Isometry3<f32>) -> MotionStateKey {
        self.log("create_motion_state");
        self.motion_states.insert(*pose)
    }

    fn motion_state_pose(&self, state: MotionStateKey) -> Option<Isometry3<f32>> {
        self.log("motion_state_pose");
        self.motion_states.get(state).copied()
    }

    fn set_motion_state_pose(&mut self, state: MotionStateKey, pose: &Isometry3<f32>) {
        self.log("set_motion_state_pose");
        if let Some(current) = self.motion_states.get_mut(state) {
            *current = *pose;
        }
    }

    fn destroy_motion_state(&mut self, state: MotionStateKey) {
        self.log("destroy_motion_state");
        self.motion_states.remove(state);
    }

    fn create_body(&mut self, desc: &BodyDesc) -> BodyKey {
        self.log("create_body");
        let pose = self
            .motion_states
            .get(desc.motion_state)
            .copied()
            .unwrap_or_else(Isometry3::identity);
        self.bodies.insert(StubBody {
            mass: desc.mass,
            inertia: desc.local_inertia,
            pose,
            compound: desc.shape,
            motion_state: desc.motion_state,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            linear_factor: Vector3::repeat(1.0),
            angular_factor: Vector3::repeat(1.0),
            is_static: false,
            gravity: true,
            force: Vector3::zeros(),
            policy: None,
            in_world: false,
        })
    }

    fn destroy_body(&mut self, body: BodyKey) {
        self.log("destroy_body");
        self.bodies.remove(body);
    }

    fn set_mass_props(&mut self, body: BodyKey, mass: f32, inertia: Vector3<f32>) {
        self.log("set_mass_props");
        if let Some(b) = self.body_mut(body) {
            b.mass = mass;
            b.inertia = inertia;
        }
    }

    fn body_mass(&self, body: BodyKey) -> Option<f32> {
        self.log("body_mass");
        self.bodies.get(body).map(|b| b.mass)
    }

    fn body_pose(&self, body: BodyKey) -> Option<Isometry3<f32>> {
        self.log("body_pose");
        self.bodies.get(body).map(|b| b.pose)
    }

    fn set_body_pose(&mut self, body: BodyKey, pose: &Isometry3<f32>) {
        self.log("set_body_pose");
        if let Some(b) = self.body_mut(body) {
            b.pose = *pose;
        }
    }

    fn linear_velocity(&self, body: BodyKey) -> Option<Vector3<f32>> {
        self.log("linear_velocity");
        self.bodies.get(body).map(|b| b.linear_velocity)
    }

    fn set_linear_velocity(&mut self, body: BodyKey, velocity: Vector3<f32>) {
        self.log("set_linear_velocity");
        if let Some(b) = self.body_mut(body) {
            b.linear_velocity = velocity;
        }
    }

    fn angular_velocity(&self, body: BodyKey) -> Option<Vector3<f32>> {
        self.log("angular_velocity");
        self.bodies.get(body).map(|b| b.angular_velocity)
    }

    fn set_angular_velocity(&mut self, body: BodyKey, velocity: Vector3<f32>) {
        self.log("set_angular_velocity");
        if let Some(b) = self.body_mut(body) {
            b.angular_velocity = velocity;
        }
    }

    fn set_linear_factor(&mut self, body: BodyKey, factor: Vector3<f32>) {
        self.log("set_linear_factor");
        if let Some(b) = self.body_mut(body) {
            b.linear_factor = factor;
        }
    }

    fn set_angular_factor(&mut self, body: BodyKey, factor: Vector3<f32>) {
        self.log("set_angular_factor");
        if let Some(b) = self.body_mut(body) {
            b.angular_factor = factor;
        }
    }

    fn set_static(&mut self, body: BodyKey, is_static: bool) {
        self.log("set_static");
        if let Some(b) = self.body_mut(body) {
            b.is_static = is_static;
        }
    }

    fn set_gravity_enabled(&mut self, body: BodyKey, enabled: bool) {
        self.log("set_gravity_enabled");
        if let Some(b) = self.body_mut(body) {
            b.gravity = enabled;
        }
    }

    fn clear_forces(&mut self, body: BodyKey) {
        self.log("clear_forces");
        if let Some(b) = self.body_mut(body) {
            b.force = Vector3::zeros();
        }
    }

    fn apply_central_force(&mut self, body: BodyKey, force: Vector3<f32>) {
        self.log("apply_central_force");
        if let Some(b) = self.body_mut(body) {
            b.force += force;
        }
    }

    fn apply_central_impulse(&mut self, body: BodyKey, impulse: Vector3<f32>) {
        self.log("apply_central_impulse");
        if let Some(b) = self.body_mut(body) {
            if b.mass > 0.0 {
                b.linear_velocity += impulse / b.mass;
            }
        }
    }

    fn set_activation_policy(&mut self, body: BodyKey, policy: ActivationPolicy) {
        self.log("set_activation_policy");
        if let Some(b) = self.body_mut(body) {
            b.policy = Some(policy);
        }
    }

    fn activate(&mut self, _body: BodyKey) {
        self.log("activate");
    }

    fn add_body(&mut self, body: BodyKey) {
        self.log("add_body");
        if let Some(b) = self.body_mut(body) {
            b.in_world = true;
        }
    }

    fn remove_body(&mut self, body: BodyKey) {
        self.log("remove_body");
        if let Some(b) = self.body_mut(body) {
            b.in_world = false;
        }
    }

    fn contains_body(&self, body: BodyKey) -> bool {
        self.log("contains_body");
        self.bodies.get(body).map_or(false, |b| b.in_world)
    }

    fn step_simulation(&mut self, dt: f32, max_sub_steps: u32, fixed_time_step: f32) -> u32 {
        self.log("step_simulation");
        let steps = ((dt / fixed_time_step) + 1e-4).floor().max(0.0) as u32;
        let steps = steps.min(max_sub_steps);
        let gravity = self.gravity;

        for body in self.bodies.values_mut() {
            if !body.in_world || body.is_static {
                continue;
            }
            for _ in 0..steps {
                let mut acceleration = body.force / body.mass;
                if body.gravity {
                    acceleration += gravity;
                }
                body.linear_velocity += acceleration.component_mul(&body.linear_factor) * fixed_time_step;
                body.pose.translation.vector += body.linear_velocity * fixed_time_step;
            }
            if let Some(state) = self.motion_states.get_mut(body.motion_state) {
                *state = body.pose;
            }
        }
        steps
    }

    fn clean_overlap_cache(&mut self, _body: BodyKey) {
        self.log("clean_overlap_cache");
    }

    fn gravity(&self) -> Vector3<f32> {
        self.log("gravity");
        self.gravity
    }

    fn set_gravity(&mut self, gravity: Vector3<f32>) {
        self.log("set_gravity");
        self.gravity = gravity;
    }

    fn ray_test(&mut self, _from: &Point3<f32>, _to: &Point3<f32>) -> Option<NativeRayHit> {
        self.log("ray_test");
        None
    }

    fn cleanup(&mut self) {
        self.log("cleanup");
        self.bodies.clear();
        self.motion_states.clear();
        self.shapes.clear();
    }
}

/// A stub backend plus the same backend behind the shared trait-object handle
pub fn stub() -> (Rc<RefCell<StubBackend>>, SharedBackend) {
    let backend = Rc::new(RefCell::new(StubBackend::new()));
    let shared: SharedBackend = backend.clone();
    (backend, shared)
}

/// Entity with a transform at `position`, a rigid body, and one box collider
pub fn spawn_box(
    world: &mut World,
    position: Vector3<f32>,
    rigid_body: RigidBody,
    size: Vector3<f32>,
) -> (EntityKey, ColliderKey) {
    let entity = world.spawn_empty();
    world
        .set_transform(entity, Transform::from_position(position))
        .expect("entity exists");
    world
        .add_rigid_body(entity, rigid_body)
        .expect("valid rigid body");
    let collider = world
        .add_collider(entity, Collider::cuboid(size))
        .expect("entity exists");
    (entity, collider)
}
