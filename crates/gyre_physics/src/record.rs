//! Per-body synchronization record
//!
//! A [`SyncRecord`] mirrors one entity's rigid body into the physics backend.
//! While active it owns a compound shape holding one child per enabled
//! collider, a motion state, and the native body. Change events recorded by
//! its observer accumulate in a [`DirtyState`]; [`SyncRecord::reconcile`]
//! pushes them to the backend in a fixed order (shape, motion, body
//! properties) and then wakes the body.
//!
//! ```text
//! new ──activate──▶ active ──reconcile──▶ active ──deactivate──▶ inactive ──destroy
//!                      ▲                                            │
//!                      └───────────────── activate ─────────────────┘
//! ```

use crate::backend::{
    ActivationPolicy, BodyDesc, BodyKey, MotionStateKey, PhysicsBackend, SharedBackend, ShapeKey,
};
use crate::error::PhysicsError;
use crate::glue::RecordObserver;
use crate::queue::SharedQueue;
use crate::shapes::shape_desc;
use gyre_core::{
    ColliderKey, EntityKey, EventMask, RigidBody, RigidBodyChanges, Subscription, World,
};
use nalgebra::{Isometry3, Vector3};
use slotmap::new_key_type;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;

new_key_type! {
    /// Key of a sync record inside the scheduler
    pub struct RecordKey;
}

/// How stale a collider's child shape is
///
/// Ordered by severity: merging two marks keeps the stronger one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColliderDirty {
    /// Only the offset (or enabled flag) changed; the shape can be reused
    Offset,
    /// Shape parameters changed; the shape must be rebuilt
    ShapeParams,
}

impl ColliderDirty {
    pub fn merge(self, other: ColliderDirty) -> ColliderDirty {
        self.max(other)
    }
}

/// Pending work accumulated between reconciliations
#[derive(Debug, Default)]
pub struct DirtyState {
    shape: bool,
    motion: bool,
    body: RigidBodyChanges,
    colliders: BTreeMap<ColliderKey, ColliderDirty>,
    removed: Vec<ColliderKey>,
    orphaned: bool,
}

impl DirtyState {
    /// Mark one collider stale
    pub fn mark_collider(&mut self, collider: ColliderKey, dirty: ColliderDirty) {
        self.colliders
            .entry(collider)
            .and_modify(|d| *d = d.merge(dirty))
            .or_insert(dirty);
        self.shape = true;
    }

    /// Note that a collider left the entity
    pub fn remove_collider(&mut self, collider: ColliderKey) {
        self.colliders.remove(&collider);
        self.removed.push(collider);
        self.shape = true;
    }

    pub fn mark_motion(&mut self) {
        self.motion = true;
    }

    pub fn mark_body(&mut self, changes: RigidBodyChanges) {
        self.body |= changes;
    }

    /// The entity lost its rigid body (or was despawned)
    pub fn mark_orphaned(&mut self, orphaned: bool) {
        self.orphaned = orphaned;
    }

    pub fn is_orphaned(&self) -> bool {
        self.orphaned
    }

    pub fn shape_dirty(&self) -> bool {
        self.shape
    }

    pub fn motion_dirty(&self) -> bool {
        self.motion
    }

    pub fn body_dirty(&self) -> RigidBodyChanges {
        self.body
    }

    /// Per-collider mark, if any
    pub fn collider_dirty(&self, collider: ColliderKey) -> Option<ColliderDirty> {
        self.colliders.get(&collider).copied()
    }

    /// Nothing to push to the backend
    pub fn is_clean(&self) -> bool {
        !self.shape && !self.motion && self.body.is_empty()
    }

    /// Take the pending work, leaving a clean state; orphan status is kept
    fn take(&mut self) -> DirtyState {
        let orphaned = self.orphaned;
        let taken = mem::take(self);
        self.orphaned = orphaned;
        taken
    }
}

/// Native resources owned by an active record
#[derive(Clone, Copy, Debug)]
struct Native {
    body: BodyKey,
    motion_state: MotionStateKey,
    compound: ShapeKey,
}

/// A collider's child shape; `shape` is built lazily
#[derive(Clone, Copy, Debug, Default)]
struct ChildShape {
    shape: Option<ShapeKey>,
    attached: bool,
}

/// Simulation results read back for one record
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PullBack {
    pub pose: Isometry3<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
}

/// Bridge between one entity's rigid body and its native counterpart
pub struct SyncRecord {
    key: RecordKey,
    entity: EntityKey,
    native: Option<Native>,
    children: BTreeMap<ColliderKey, ChildShape>,
    dirty: Rc<RefCell<DirtyState>>,
    subscription: Option<Subscription>,
}

impl SyncRecord {
    /// Create an inactive record for `entity`
    pub fn new(key: RecordKey, entity: EntityKey) -> Self {
        Self {
            key,
            entity,
            native: None,
            children: BTreeMap::new(),
            dirty: Rc::new(RefCell::new(DirtyState::default())),
            subscription: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        self.key
    }

    pub fn entity(&self) -> EntityKey {
        self.entity
    }

    /// Whether native resources exist for this record
    pub fn is_active(&self) -> bool {
        self.native.is_some()
    }

    /// Native body, while active
    pub fn body(&self) -> Option<BodyKey> {
        self.native.map(|n| n.body)
    }

    /// Compound shape, while active
    pub fn compound(&self) -> Option<ShapeKey> {
        self.native.map(|n| n.compound)
    }

    /// Motion state, while active
    pub fn motion_state(&self) -> Option<MotionStateKey> {
        self.native.map(|n| n.motion_state)
    }

    /// Number of colliders currently in the compound
    pub fn attached_children(&self) -> usize {
        self.children.values().filter(|c| c.attached).count()
    }

    /// Child shape built for a collider
    pub fn child_shape(&self, collider: ColliderKey) -> Option<ShapeKey> {
        self.children.get(&collider)?.shape
    }

    /// Collider whose child shape is `shape`
    pub fn collider_for_shape(&self, shape: ShapeKey) -> Option<ColliderKey> {
        self.children
            .iter()
            .find(|(_, c)| c.shape == Some(shape))
            .map(|(k, _)| *k)
    }

    /// Pending work, as recorded by the observer
    pub fn dirty(&self) -> std::cell::Ref<'_, DirtyState> {
        self.dirty.borrow()
    }

    pub fn is_orphaned(&self) -> bool {
        self.dirty.borrow().is_orphaned()
    }

    /// Build native resources and start observing the entity
    ///
    /// The body enters the world only if the descriptor is enabled. Activating
    /// an active record does nothing.
    pub fn activate(
        &mut self,
        world: &World,
        backend: &SharedBackend,
        queue: &SharedQueue,
    ) -> Result<(), PhysicsError> {
        if self.is_active() {
            return Ok(());
        }
        let rigid_body = world
            .rigid_body(self.entity)
            .ok_or(PhysicsError::MissingRigidBody(self.entity))?;

        let native = {
            let mut guard = backend.borrow_mut();
            let backend = &mut *guard;

            let compound = backend.create_compound();
            for (key, collider) in world.colliders_of(self.entity) {
                let mut child = ChildShape::default();
                if collider.enabled {
                    let shape = backend.create_shape(&shape_desc(&collider.shape));
                    backend.add_child_shape(compound, &collider.offset, shape);
                    child = ChildShape {
                        shape: Some(shape),
                        attached: true,
                    };
                }
                self.children.insert(key, child);
            }

            let mass = rigid_body.effective_mass();
            let local_inertia = backend.calculate_local_inertia(compound, mass);
            let motion_state = backend.create_motion_state(&world_pose(world, self.entity));
            let body = backend.create_body(&BodyDesc {
                mass,
                motion_state,
                shape: compound,
                local_inertia,
            });
            let native = Native {
                body,
                motion_state,
                compound,
            };

            backend.set_linear_velocity(body, rigid_body.linear_velocity);
            backend.set_angular_velocity(body, rigid_body.angular_velocity);
            if rigid_body.is_static {
                make_static(backend, native);
            } else {
                backend.set_linear_factor(body, rigid_body.linear_factor);
                backend.set_angular_factor(body, rigid_body.angular_factor);
                backend.set_activation_policy(body, ActivationPolicy::NeverSleep);
            }
            if rigid_body.enabled {
                backend.add_body(body);
            }
            native
        };

        self.native = Some(native);
        self.dirty.borrow_mut().take();

        let observer = Rc::new(RecordObserver::new(
            self.key,
            Rc::clone(&self.dirty),
            Rc::clone(queue),
            Rc::downgrade(backend),
            native.body,
        ));
        self.subscription = Some(world.events().subscribe(self.entity, EventMask::ALL, observer));

        log::debug!(
            "Activated record for {:?} ({} colliders, body {:?})",
            self.entity,
            self.children.len(),
            native.body
        );
        Ok(())
    }

    /// Push pending changes to the backend
    ///
    /// Returns `Ok(false)` without touching the backend when nothing is dirty.
    pub fn reconcile(
        &mut self,
        world: &World,
        backend: &mut dyn PhysicsBackend,
    ) -> Result<bool, PhysicsError> {
        let native = self.native.ok_or(PhysicsError::Detached(self.entity))?;
        if self.dirty.borrow().is_clean() {
            return Ok(false);
        }
        let rigid_body = world
            .rigid_body(self.entity)
            .ok_or(PhysicsError::MissingRigidBody(self.entity))?;
        let work = self.dirty.borrow_mut().take();

        if work.shape {
            self.rebuild_compound(world, backend, native, rigid_body, work.colliders, work.removed);
        }

        if work.motion {
            let pose = world_pose(world, self.entity);
            backend.set_motion_state_pose(native.motion_state, &pose);
            backend.set_body_pose(native.body, &pose);
            backend.clean_overlap_cache(native.body);
        }

        let changes = work.body;
        if changes.contains(RigidBodyChanges::STATIC) {
            self.transition(world, backend, native, rigid_body);
        }
        // Properties of a static body stay banked in the descriptor
        if !rigid_body.is_static {
            if changes.contains(RigidBodyChanges::MASS) && !changes.contains(RigidBodyChanges::STATIC) {
                let inertia = backend.calculate_local_inertia(native.compound, rigid_body.mass);
                backend.set_mass_props(native.body, rigid_body.mass, inertia);
            }
            if changes.contains(RigidBodyChanges::LINEAR_VELOCITY) {
                backend.set_linear_velocity(native.body, rigid_body.linear_velocity);
            }
            if changes.contains(RigidBodyChanges::ANGULAR_VELOCITY) {
                backend.set_angular_velocity(native.body, rigid_body.angular_velocity);
            }
            if changes.contains(RigidBodyChanges::LINEAR_FACTOR) {
                backend.set_linear_factor(native.body, rigid_body.linear_factor);
            }
            if changes.contains(RigidBodyChanges::ANGULAR_FACTOR) {
                backend.set_angular_factor(native.body, rigid_body.angular_factor);
            }
        }

        backend.activate(native.body);
        Ok(true)
    }

    /// Two-pass compound update: the dirty set was collected up front, so the
    /// compound is only mutated here
    fn rebuild_compound(
        &mut self,
        world: &World,
        backend: &mut dyn PhysicsBackend,
        native: Native,
        rigid_body: &RigidBody,
        changed: BTreeMap<ColliderKey, ColliderDirty>,
        removed: Vec<ColliderKey>,
    ) {
        for key in removed {
            if let Some(child) = self.children.remove(&key) {
                release_child(backend, native.compound, child);
            }
        }

        for (key, change) in changed {
            if world.collider_owner(key) != Some(self.entity) {
                continue;
            }
            let Some(collider) = world.collider(key) else {
                continue;
            };
            let child = self.children.entry(key).or_default();

            if child.attached {
                if let Some(shape) = child.shape {
                    backend.remove_child_shape(native.compound, shape);
                }
                child.attached = false;
            }
            if change == ColliderDirty::ShapeParams {
                if let Some(old) = child.shape.take() {
                    backend.destroy_shape(old);
                }
            }
            if collider.enabled {
                let shape = match child.shape {
                    Some(shape) => shape,
                    None => backend.create_shape(&shape_desc(&collider.shape)),
                };
                child.shape = Some(shape);
                backend.add_child_shape(native.compound, &collider.offset, shape);
                child.attached = true;
            }
        }

        let mass = rigid_body.effective_mass();
        let inertia = backend.calculate_local_inertia(native.compound, mass);
        backend.set_mass_props(native.body, mass, inertia);
    }

    /// Static/dynamic switch: the body leaves the world, is reconfigured, gets
    /// its pose re-synced, and re-enters if enabled
    fn transition(
        &self,
        world: &World,
        backend: &mut dyn PhysicsBackend,
        native: Native,
        rigid_body: &RigidBody,
    ) {
        if backend.contains_body(native.body) {
            backend.remove_body(native.body);
        }

        if rigid_body.is_static {
            make_static(backend, native);
        } else {
            backend.set_static(native.body, false);
            let inertia = backend.calculate_local_inertia(native.compound, rigid_body.mass);
            backend.set_mass_props(native.body, rigid_body.mass, inertia);
            backend.set_activation_policy(native.body, ActivationPolicy::NeverSleep);
            backend.set_linear_factor(native.body, rigid_body.linear_factor);
            backend.set_angular_factor(native.body, rigid_body.angular_factor);
            backend.set_gravity_enabled(native.body, true);
            backend.clear_forces(native.body);
        }

        let pose = world_pose(world, self.entity);
        backend.set_motion_state_pose(native.motion_state, &pose);
        backend.set_body_pose(native.body, &pose);

        if rigid_body.enabled {
            backend.add_body(native.body);
        }
        log::trace!(
            "{:?} is now {}",
            self.entity,
            if rigid_body.is_static { "static" } else { "dynamic" }
        );
    }

    /// Read simulation results for this record
    ///
    /// `None` when inactive or when the rigid body is disabled.
    pub fn sample(&self, world: &World, backend: &dyn PhysicsBackend) -> Option<PullBack> {
        let native = self.native?;
        if !world.rigid_body(self.entity)?.enabled {
            return None;
        }
        Some(PullBack {
            pose: backend.motion_state_pose(native.motion_state)?,
            linear_velocity: backend.linear_velocity(native.body)?,
            angular_velocity: backend.angular_velocity(native.body)?,
        })
    }

    /// Write simulation results into the scene without re-dirtying this record
    pub fn write_back(&self, world: &mut World, sample: &PullBack) -> Result<(), PhysicsError> {
        let subscription = self
            .subscription
            .as_ref()
            .ok_or(PhysicsError::Detached(self.entity))?;

        if world.transform(self.entity).is_some()
            && world.world_pose(self.entity) != Some(sample.pose)
        {
            let _muted = subscription.mute(EventMask::TRANSFORM);
            world.set_world_pose(self.entity, &sample.pose)?;
        }

        let _muted = subscription.mute(EventMask::RIGID_BODY);
        world.update_rigid_body(self.entity, |rb| {
            rb.linear_velocity = sample.linear_velocity;
            rb.angular_velocity = sample.angular_velocity;
        })?;
        Ok(())
    }

    /// Stop observing and release every native resource
    ///
    /// Release order is body, motion state, child shapes, compound. Pending
    /// work is discarded.
    pub fn deactivate(&mut self, backend: &mut dyn PhysicsBackend) {
        self.subscription = None;
        let Some(native) = self.native.take() else {
            return;
        };

        if backend.contains_body(native.body) {
            backend.remove_body(native.body);
        }
        backend.destroy_body(native.body);
        backend.destroy_motion_state(native.motion_state);
        for (_, child) in mem::take(&mut self.children) {
            release_child(backend, native.compound, child);
        }
        backend.destroy_shape(native.compound);
        self.dirty.borrow_mut().take();

        log::debug!("Deactivated record for {:?}", self.entity);
    }

    /// Dispose of the record; it must already be inactive
    pub fn destroy(mut self) {
        self.subscription = None;
        if !self.is_active() {
            log::trace!("Destroyed record for {:?}", self.entity);
        }
    }
}

impl Drop for SyncRecord {
    fn drop(&mut self) {
        if let Some(native) = self.native {
            log::warn!(
                "Sync record for {:?} dropped while active; body {:?} leaked",
                self.entity,
                native.body
            );
        }
    }
}

impl std::fmt::Debug for SyncRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRecord")
            .field("entity", &self.entity)
            .field("active", &self.is_active())
            .field("children", &self.children.len())
            .finish()
    }
}

/// Take a child out of the compound and free its shape
fn release_child(backend: &mut dyn PhysicsBackend, compound: ShapeKey, child: ChildShape) {
    let Some(shape) = child.shape else {
        return;
    };
    if child.attached {
        backend.remove_child_shape(compound, shape);
    }
    backend.destroy_shape(shape);
}

/// Configure a body as static: zero mass, fixed, locked, no gravity, at rest
fn make_static(backend: &mut dyn PhysicsBackend, native: Native) {
    let inertia = backend.calculate_local_inertia(native.compound, 0.0);
    backend.set_mass_props(native.body, 0.0, inertia);
    backend.set_static(native.body, true);
    backend.set_linear_factor(native.body, Vector3::zeros());
    backend.set_angular_factor(native.body, Vector3::zeros());
    backend.set_gravity_enabled(native.body, false);
    backend.set_linear_velocity(native.body, Vector3::zeros());
    backend.set_angular_velocity(native.body, Vector3::zeros());
    backend.clear_forces(native.body);
    backend.set_activation_policy(native.body, ActivationPolicy::PreferSleep);
}

/// World pose of an entity; identity when it has no transform
fn world_pose(world: &World, entity: EntityKey) -> Isometry3<f32> {
    world.world_pose(entity).unwrap_or_else(Isometry3::identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn collider_keys(n: usize) -> Vec<ColliderKey> {
        let mut map: SlotMap<ColliderKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_collider_dirty_merge_keeps_stronger() {
        use ColliderDirty::*;
        assert_eq!(Offset.merge(ShapeParams), ShapeParams);
        assert_eq!(ShapeParams.merge(Offset), ShapeParams);
        assert_eq!(Offset.merge(Offset), Offset);
    }

    #[test]
    fn test_dirty_state_marks() {
        let keys = collider_keys(2);
        let mut state = DirtyState::default();
        assert!(state.is_clean());

        state.mark_collider(keys[0], ColliderDirty::Offset);
        state.mark_collider(keys[0], ColliderDirty::ShapeParams);
        state.mark_collider(keys[0], ColliderDirty::Offset);
        assert!(state.shape_dirty());
        assert_eq!(state.collider_dirty(keys[0]), Some(ColliderDirty::ShapeParams));

        state.mark_body(RigidBodyChanges::MASS);
        state.mark_body(RigidBodyChanges::LINEAR_VELOCITY);
        assert_eq!(
            state.body_dirty(),
            RigidBodyChanges::MASS | RigidBodyChanges::LINEAR_VELOCITY
        );
    }

    #[test]
    fn test_removed_collider_drops_pending_mark() {
        let keys = collider_keys(1);
        let mut state = DirtyState::default();
        state.mark_collider(keys[0], ColliderDirty::ShapeParams);
        state.remove_collider(keys[0]);
        assert_eq!(state.collider_dirty(keys[0]), None);
        assert_eq!(state.removed, keys);
    }

    #[test]
    fn test_take_preserves_orphan_flag() {
        let mut state = DirtyState::default();
        state.mark_motion();
        state.mark_orphaned(true);

        let taken = state.take();
        assert!(taken.motion_dirty());
        assert!(state.is_clean());
        assert!(state.is_orphaned());
    }

    #[test]
    fn test_inactive_record_refuses_reconcile() {
        let mut world = World::new();
        let entity = world.spawn_empty();
        world.add_rigid_body(entity, RigidBody::default()).unwrap();

        let mut records: SlotMap<RecordKey, ()> = SlotMap::with_key();
        let mut record = SyncRecord::new(records.insert(()), entity);
        let mut backend = crate::PhysicsWorld::new();
        assert_eq!(
            record.reconcile(&world, &mut backend),
            Err(PhysicsError::Detached(entity))
        );
        assert!(!record.is_active());
        record.destroy();
    }
}
