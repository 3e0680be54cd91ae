//! Integration tests for the synchronization layer against a call-counting backend
//!
//! These tests verify:
//! 1. Reconciliation only touches the backend for what is actually dirty
//! 2. The invalidation queue holds each record at most once
//! 3. Compound shapes track exactly the enabled colliders
//! 4. Static/dynamic transitions and pull-back semantics
//! 5. Release order and stale queue entries

mod common;

use common::{spawn_box, stub};
use gyre_core::{Collider, EntityKey, RigidBody, World};
use gyre_physics::{
    ActivationPolicy, InvalidationQueue, PhysicsSystem, RecordKey, ShapeDesc, SyncRecord,
};
use nalgebra::{Isometry3, Vector3};
use slotmap::SlotMap;
use std::collections::HashSet;

fn unit_box(world: &mut World) -> EntityKey {
    spawn_box(world, Vector3::zeros(), RigidBody::dynamic(1.0), Vector3::repeat(2.0)).0
}

fn record_key() -> RecordKey {
    let mut keys: SlotMap<RecordKey, ()> = SlotMap::with_key();
    keys.insert(())
}

// ==================== Reconciliation Tests ====================

/// A record with nothing dirty must not call into the backend at all
#[test]
fn test_reconcile_without_changes_makes_no_calls() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let queue = InvalidationQueue::shared();

    let mut record = SyncRecord::new(record_key(), entity);
    record.activate(&world, &shared, &queue).unwrap();
    backend.borrow().clear_calls();

    let reconciled = record.reconcile(&world, &mut *backend.borrow_mut()).unwrap();
    assert!(!reconciled);
    assert!(backend.borrow().calls().is_empty(), "no native calls expected");

    record.deactivate(&mut *backend.borrow_mut());
}

/// Flag tests use `&` semantics: only the flag that is set reaches the backend
#[test]
fn record_applies_only_flags_that_are_set() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let queue = InvalidationQueue::shared();

    let mut record = SyncRecord::new(record_key(), entity);
    record.activate(&world, &shared, &queue).unwrap();
    backend.borrow().clear_calls();

    world
        .update_rigid_body(entity, |rb| rb.linear_velocity = Vector3::new(1.0, 0.0, 0.0))
        .unwrap();
    assert_eq!(queue.borrow().len(), 1);

    record.reconcile(&world, &mut *backend.borrow_mut()).unwrap();
    assert_eq!(
        backend.borrow().calls(),
        vec!["set_linear_velocity", "activate"],
        "only the linear velocity should be pushed"
    );

    record.deactivate(&mut *backend.borrow_mut());
}

/// Scenario A: one box collider becomes one child of half-extents (1, 1, 1)
#[test]
fn test_single_box_body() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    system.update(&mut world, 0.0).unwrap();

    let record = system.record(entity).expect("record exists");
    let backend = backend.borrow();
    let children = backend.children(record.compound().unwrap());
    assert_eq!(children.len(), 1);
    assert_eq!(
        backend.primitive(children[0].0),
        Some(ShapeDesc::Cuboid {
            half_extents: Vector3::repeat(1.0)
        })
    );
    let body = backend.body(record.body().unwrap());
    assert_eq!(body.mass, 1.0);
    assert!(body.in_world);
    assert_eq!(body.policy, Some(ActivationPolicy::NeverSleep));
}

/// Scenario B: disabling the only collider empties the compound, body survives
#[test]
fn test_disabled_collider_leaves_compound() {
    let mut world = World::new();
    let (entity, collider) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(1.0),
        Vector3::repeat(2.0),
    );
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    backend.borrow().clear_calls();

    world.update_collider(collider, |c| c.enabled = false).unwrap();
    let stats = system.update(&mut world, 0.0).unwrap();
    assert_eq!(stats.reconciled, 1);

    let record = system.record(entity).unwrap();
    assert_eq!(record.attached_children(), 0);
    assert!(backend.borrow().children(record.compound().unwrap()).is_empty());
    assert_eq!(backend.borrow().count("destroy_body"), 0);
    assert!(backend.borrow().bodies.contains_key(record.body().unwrap()));
}

/// Offset changes reuse the child shape; parameter changes rebuild it
#[test]
fn test_offset_reuses_shape_params_rebuild() {
    let mut world = World::new();
    let (entity, collider) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(1.0),
        Vector3::repeat(2.0),
    );
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    let original = system.record(entity).unwrap().child_shape(collider).unwrap();
    backend.borrow().clear_calls();

    world
        .update_collider(collider, |c| c.offset = Isometry3::translation(0.0, 1.0, 0.0))
        .unwrap();
    system.update(&mut world, 0.0).unwrap();
    assert_eq!(backend.borrow().count("create_shape"), 0);
    assert_eq!(backend.borrow().count("remove_child_shape"), 1);
    assert_eq!(system.record(entity).unwrap().child_shape(collider), Some(original));
    let compound = system.record(entity).unwrap().compound().unwrap();
    assert_eq!(
        backend.borrow().children(compound)[0].1,
        Isometry3::translation(0.0, 1.0, 0.0)
    );

    backend.borrow().clear_calls();
    world
        .update_collider(collider, |c| c.shape = gyre_core::ColliderShape::Sphere { radius: 0.5 })
        .unwrap();
    system.update(&mut world, 0.0).unwrap();
    assert_eq!(backend.borrow().count("destroy_shape"), 1);
    assert_eq!(backend.borrow().count("create_shape"), 1);
    let rebuilt = system.record(entity).unwrap().child_shape(collider).unwrap();
    assert_ne!(rebuilt, original);
    assert_eq!(
        backend.borrow().primitive(rebuilt),
        Some(ShapeDesc::Ball { radius: 0.5 })
    );
}

/// After any sequence of collider edits, the compound holds exactly the
/// enabled colliders
#[test]
fn test_compound_matches_enabled_colliders() {
    let mut world = World::new();
    let (entity, c0) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(3.0),
        Vector3::repeat(1.0),
    );
    let c1 = world.add_collider(entity, Collider::ball(0.5)).unwrap();
    let c2 = world
        .add_collider(entity, Collider::cuboid(Vector3::new(1.0, 2.0, 1.0)))
        .unwrap();

    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();

    world.update_collider(c0, |c| c.enabled = false).unwrap();
    let c3 = world.add_collider(entity, Collider::ball(1.0)).unwrap();
    world.remove_collider(c1);
    world.update_collider(c0, |c| c.enabled = true).unwrap();
    world.update_collider(c2, |c| c.enabled = false).unwrap();
    world
        .update_collider(c3, |c| c.shape = gyre_core::ColliderShape::Sphere { radius: 2.0 })
        .unwrap();
    assert_eq!(system.queue_len(), 1);
    system.update(&mut world, 0.0).unwrap();

    let record = system.record(entity).unwrap();
    let expected: HashSet<_> = world
        .colliders_of(entity)
        .filter(|(_, c)| c.enabled)
        .map(|(k, _)| record.child_shape(k).expect("enabled collider has a shape"))
        .collect();
    let actual: HashSet<_> = backend
        .borrow()
        .children(record.compound().unwrap())
        .into_iter()
        .map(|(shape, _)| shape)
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(actual.len(), 2);
    assert_eq!(record.attached_children(), 2);
}

// ==================== Queue Tests ====================

/// Different triggers for the same record enqueue it once
#[test]
fn test_triggers_enqueue_record_once() {
    let mut world = World::new();
    let (entity, collider) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(1.0),
        Vector3::repeat(2.0),
    );
    let (_backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();

    world.set_position(entity, Vector3::new(0.0, 4.0, 0.0)).unwrap();
    world.update_rigid_body(entity, |rb| rb.mass = 5.0).unwrap();
    world
        .update_collider(collider, |c| c.offset = Isometry3::translation(1.0, 0.0, 0.0))
        .unwrap();
    world.set_position(entity, Vector3::new(0.0, 5.0, 0.0)).unwrap();

    assert_eq!(system.queue_len(), 1);
    assert!(system.is_queued(entity));
}

/// Scenario D: a record unregistered while queued is skipped by the drain
#[test]
fn test_unregistered_record_is_skipped() {
    let mut world = World::new();
    let a = unit_box(&mut world);
    let b = spawn_box(
        &mut world,
        Vector3::new(5.0, 0.0, 0.0),
        RigidBody::dynamic(1.0),
        Vector3::repeat(1.0),
    )
    .0;
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, a).unwrap();
    system.register_rigid_body(&world, b).unwrap();

    world.set_position(a, Vector3::new(0.0, 1.0, 0.0)).unwrap();
    world.set_position(b, Vector3::new(5.0, 1.0, 0.0)).unwrap();
    assert_eq!(system.queue_len(), 2);

    system.unregister_rigid_body(a).unwrap();
    backend.borrow().clear_calls();
    let stats = system.update(&mut world, 0.0).unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.reconciled, 1);
    assert_eq!(backend.borrow().count("set_body_pose"), 1);
}

// ==================== Static Transition Tests ====================

/// Going static zeroes velocities and mass; factors are banked and restored
#[test]
fn test_static_transition_round_trip() {
    let mut world = World::new();
    let factor = Vector3::new(1.0, 0.0, 1.0);
    let (entity, _) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(2.0)
            .with_linear_velocity(Vector3::new(1.0, 2.0, 3.0))
            .with_angular_velocity(Vector3::new(1.0, 2.0, 3.0))
            .with_linear_factor(factor),
        Vector3::repeat(2.0),
    );
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    let body = system.record(entity).unwrap().body().unwrap();

    world.update_rigid_body(entity, |rb| rb.is_static = true).unwrap();
    system.update(&mut world, 0.0).unwrap();

    {
        let backend = backend.borrow();
        let native = backend.body(body);
        assert!(native.is_static);
        assert_eq!(native.mass, 0.0);
        assert_eq!(native.inertia, Vector3::zeros());
        assert_eq!(native.linear_factor, Vector3::zeros());
        assert_eq!(native.angular_factor, Vector3::zeros());
        assert!(!native.gravity);
        assert!(native.in_world);
        assert_eq!(native.policy, Some(ActivationPolicy::PreferSleep));
    }
    let rb = world.rigid_body(entity).unwrap();
    assert_eq!(rb.linear_velocity, Vector3::zeros());
    assert_eq!(rb.angular_velocity, Vector3::zeros());
    assert_eq!(rb.mass, 2.0, "stored mass is banked");
    assert_eq!(rb.linear_factor, factor, "descriptor factors are preserved");

    world.update_rigid_body(entity, |rb| rb.is_static = false).unwrap();
    system.update(&mut world, 0.0).unwrap();

    let backend = backend.borrow();
    let native = backend.body(body);
    assert!(!native.is_static);
    assert_eq!(native.mass, 2.0);
    assert_eq!(native.linear_factor, factor);
    assert!(native.gravity);
    assert!(native.in_world);
    assert_eq!(native.policy, Some(ActivationPolicy::NeverSleep));
}

/// Property edits on a static body stay in the descriptor
#[test]
fn test_static_body_banks_property_edits() {
    let mut world = World::new();
    let (entity, _) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::fixed(),
        Vector3::repeat(2.0),
    );
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    backend.borrow().clear_calls();

    world.update_rigid_body(entity, |rb| rb.mass = 9.0).unwrap();
    system.update(&mut world, 0.0).unwrap();
    assert_eq!(backend.borrow().count("set_mass_props"), 0);
    assert_eq!(backend.borrow().count("activate"), 1);
}

// ==================== World Membership Tests ====================

/// Toggling the rigid body's enabled flag attaches/detaches immediately
#[test]
fn test_enabled_toggle_bypasses_queue() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    let body = system.record(entity).unwrap().body().unwrap();

    world.update_rigid_body(entity, |rb| rb.enabled = false).unwrap();
    assert!(!backend.borrow().body(body).in_world);
    assert_eq!(system.queue_len(), 0);

    // Disabled bodies are not pulled back
    let stats = system.update(&mut world, 0.5).unwrap();
    assert_eq!(stats.pulled_back, 0);

    world.update_rigid_body(entity, |rb| rb.enabled = true).unwrap();
    assert!(backend.borrow().body(body).in_world);
}

/// A body registered disabled is created outside the world
#[test]
fn test_disabled_body_starts_outside_world() {
    let mut world = World::new();
    let (entity, _) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(1.0).with_enabled(false),
        Vector3::repeat(2.0),
    );
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();

    let body = system.record(entity).unwrap().body().unwrap();
    assert!(!backend.borrow().body(body).in_world);
    assert_eq!(backend.borrow().count("add_body"), 0);
}

// ==================== Motion Tests ====================

/// Moving the transform teleports the body and refreshes its overlap cache
#[test]
fn test_transform_change_teleports_body() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    backend.borrow().clear_calls();

    world.set_position(entity, Vector3::new(3.0, 4.0, 5.0)).unwrap();
    system.update(&mut world, 0.0).unwrap();

    let record = system.record(entity).unwrap();
    let backend = backend.borrow();
    assert_eq!(
        backend.body(record.body().unwrap()).pose.translation.vector,
        Vector3::new(3.0, 4.0, 5.0)
    );
    assert_eq!(
        backend.motion_states[record.motion_state().unwrap()].translation.vector,
        Vector3::new(3.0, 4.0, 5.0)
    );
    assert_eq!(backend.count("clean_overlap_cache"), 1);
}

/// Simulated motion flows back into the scene without re-queueing the record
#[test]
fn test_pull_back_does_not_requeue() {
    let mut world = World::new();
    let entity = spawn_box(
        &mut world,
        Vector3::new(0.0, 10.0, 0.0),
        RigidBody::dynamic(1.0),
        Vector3::repeat(1.0),
    )
    .0;
    let (_backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();

    let stats = system.update(&mut world, 0.5).unwrap();
    assert_eq!(stats.sub_steps, 10);
    assert_eq!(stats.pulled_back, 1);
    assert!(world.world_position(entity).unwrap().y < 10.0);
    assert!(world.rigid_body(entity).unwrap().linear_velocity.y < 0.0);
    assert_eq!(system.queue_len(), 0);
}

/// An entity without a transform gets an identity motion state and keeps no transform
#[test]
fn test_missing_transform_uses_identity() {
    let mut world = World::new();
    let entity = world.spawn_empty();
    world.add_rigid_body(entity, RigidBody::fixed()).unwrap();
    world.add_collider(entity, Collider::ball(1.0)).unwrap();

    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    system.update(&mut world, 0.1).unwrap();

    let record = system.record(entity).unwrap();
    assert_eq!(
        backend.borrow().motion_states[record.motion_state().unwrap()],
        Isometry3::identity()
    );
    assert!(world.transform(entity).is_none());
}

// ==================== Lifecycle Tests ====================

/// Deactivation releases body, motion state, child shapes, then the compound
#[test]
fn test_release_order() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();
    backend.borrow().clear_calls();

    system.unregister_rigid_body(entity).unwrap();
    assert_eq!(
        backend.borrow().calls(),
        vec![
            "contains_body",
            "remove_body",
            "destroy_body",
            "destroy_motion_state",
            "remove_child_shape",
            "destroy_shape",
            "destroy_shape",
        ]
    );
    let backend = backend.borrow();
    assert!(backend.bodies.is_empty());
    assert!(backend.motion_states.is_empty());
    assert!(backend.shapes.is_empty());
}

/// Removing the rigid body component unregisters the record on the next frame
#[test]
fn test_removed_rigid_body_unregisters() {
    let mut world = World::new();
    let entity = unit_box(&mut world);
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();

    world.remove_rigid_body(entity);
    let stats = system.update(&mut world, 0.0).unwrap();
    assert_eq!(stats.orphaned, 1);
    assert!(!system.is_registered(entity));
    assert!(backend.borrow().bodies.is_empty());
}

/// Records registered before a world exists are built on attach
#[test]
fn test_attach_activates_pending_records() {
    let mut world = World::new();
    let a = unit_box(&mut world);
    let b = unit_box(&mut world);
    let mut system = PhysicsSystem::default();
    assert_eq!(system.register_all(&world).unwrap(), 2);

    let (backend, shared) = stub();
    system.attach(&world, shared).unwrap();
    assert_eq!(backend.borrow().count("create_body"), 2);
    assert!(system.record(a).unwrap().is_active());
    assert!(system.record(b).unwrap().is_active());

    system.shutdown();
    assert_eq!(backend.borrow().count("cleanup"), 1);
    assert!(!system.record(a).unwrap().is_active());
}

/// Impulses go straight to the native body
#[test]
fn test_apply_impulse_reaches_backend() {
    let mut world = World::new();
    let (entity, _) = spawn_box(
        &mut world,
        Vector3::zeros(),
        RigidBody::dynamic(2.0),
        Vector3::repeat(1.0),
    );
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    system.register_rigid_body(&world, entity).unwrap();

    system.apply_impulse(entity, Vector3::new(4.0, 0.0, 0.0)).unwrap();
    let body = system.record(entity).unwrap().body().unwrap();
    assert_eq!(
        backend.borrow().body(body).linear_velocity,
        Vector3::new(2.0, 0.0, 0.0)
    );
}

/// Gravity changes are forwarded to the backend and read back from it
#[test]
fn test_set_gravity_reaches_backend() {
    let world = World::new();
    let (backend, shared) = stub();
    let mut system = PhysicsSystem::default();
    system.attach(&world, shared).unwrap();
    backend.borrow().clear_calls();

    system.set_gravity(Vector3::new(0.0, -3.0, 0.0)).unwrap();
    assert_eq!(backend.borrow().calls(), vec!["set_gravity"]);
    assert_eq!(backend.borrow().gravity, Vector3::new(0.0, -3.0, 0.0));
    assert_eq!(system.gravity().unwrap(), Vector3::new(0.0, -3.0, 0.0));
}
