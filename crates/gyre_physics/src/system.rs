//! Synchronization scheduler
//!
//! [`PhysicsSystem`] owns every [`SyncRecord`] and the invalidation queue, and
//! drives the per-frame sequence:
//!
//! 1. drain the queue, reconciling each record that is still active
//! 2. step the attached backend once
//! 3. pull poses and velocities back for every active record
//!
//! The backend is injected with [`PhysicsSystem::attach`] and shared with the
//! records' observers through weak handles.

use crate::backend::{BodyKey, SharedBackend};
use crate::error::PhysicsError;
use crate::query::RaycastResult;
use crate::queue::{InvalidationQueue, SharedQueue};
use crate::record::{PullBack, RecordKey, SyncRecord};
use crate::world::PhysicsConfig;
use gyre_core::{ColliderKey, EntityKey, World};
use nalgebra::{Point3, Vector3};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::rc::Rc;

/// What one [`PhysicsSystem::update`] did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Records whose pending changes were pushed to the backend
    pub reconciled: usize,
    /// Queue entries skipped because their record was unregistered
    pub skipped: usize,
    /// Records unregistered because their entity lost its rigid body
    pub orphaned: usize,
    /// Fixed simulation steps taken
    pub sub_steps: u32,
    /// Records whose results were written back to the scene
    pub pulled_back: usize,
}

/// Keeps registered rigid bodies in sync with a physics backend
pub struct PhysicsSystem {
    config: PhysicsConfig,
    backend: Option<SharedBackend>,
    records: SlotMap<RecordKey, SyncRecord>,
    by_entity: HashMap<EntityKey, RecordKey>,
    by_body: HashMap<BodyKey, RecordKey>,
    queue: SharedQueue,
    colliders: Vec<ColliderKey>,
}

impl PhysicsSystem {
    /// Create a system with no backend attached
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            config,
            backend: None,
            records: SlotMap::with_key(),
            by_entity: HashMap::new(),
            by_body: HashMap::new(),
            queue: InvalidationQueue::shared(),
            colliders: Vec::new(),
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn is_attached(&self) -> bool {
        self.backend.is_some()
    }

    /// The attached backend
    pub fn backend(&self) -> Option<&SharedBackend> {
        self.backend.as_ref()
    }

    // --- Registration ---

    /// Start synchronizing an entity's rigid body
    ///
    /// The record is activated immediately when a backend is attached.
    pub fn register_rigid_body(
        &mut self,
        world: &World,
        entity: EntityKey,
    ) -> Result<RecordKey, PhysicsError> {
        if world.rigid_body(entity).is_none() {
            return Err(PhysicsError::MissingRigidBody(entity));
        }
        if self.by_entity.contains_key(&entity) {
            return Err(PhysicsError::AlreadyRegistered(entity));
        }

        let key = self
            .records
            .insert_with_key(|key| SyncRecord::new(key, entity));
        self.by_entity.insert(entity, key);

        if let Some(backend) = self.backend.clone() {
            if let Err(err) = self.activate_record(key, world, &backend) {
                self.discard(key);
                return Err(err);
            }
        }
        Ok(key)
    }

    /// Stop synchronizing an entity; its native resources are released
    pub fn unregister_rigid_body(&mut self, entity: EntityKey) -> Result<(), PhysicsError> {
        let key = self
            .by_entity
            .get(&entity)
            .copied()
            .ok_or(PhysicsError::NotRegistered(entity))?;
        self.discard(key);
        Ok(())
    }

    /// Track a collider; returns false if it was already tracked
    pub fn register_collider(&mut self, collider: ColliderKey) -> bool {
        if self.colliders.contains(&collider) {
            return false;
        }
        self.colliders.push(collider);
        true
    }

    /// Stop tracking a collider; returns false if it was not tracked
    pub fn unregister_collider(&mut self, collider: ColliderKey) -> bool {
        let before = self.colliders.len();
        self.colliders.retain(|&c| c != collider);
        self.colliders.len() != before
    }

    /// Tracked colliders, in registration order
    pub fn colliders(&self) -> &[ColliderKey] {
        &self.colliders
    }

    /// Register every rigid body and collider of `world` not yet known
    ///
    /// Returns the number of newly registered rigid bodies.
    pub fn register_all(&mut self, world: &World) -> Result<usize, PhysicsError> {
        let entities: Vec<EntityKey> = world
            .rigid_bodies()
            .map(|(entity, _)| entity)
            .filter(|entity| !self.by_entity.contains_key(entity))
            .collect();
        for &entity in &entities {
            self.register_rigid_body(world, entity)?;
        }
        for (collider, _, _) in world.colliders() {
            self.register_collider(collider);
        }
        Ok(entities.len())
    }

    fn activate_record(
        &mut self,
        key: RecordKey,
        world: &World,
        backend: &SharedBackend,
    ) -> Result<(), PhysicsError> {
        let Some(record) = self.records.get_mut(key) else {
            return Ok(());
        };
        record.activate(world, backend, &self.queue)?;
        if let Some(body) = record.body() {
            self.by_body.insert(body, key);
        }
        Ok(())
    }

    /// Deactivate (if attached) and destroy a record
    fn discard(&mut self, key: RecordKey) {
        let Some(mut record) = self.records.remove(key) else {
            return;
        };
        self.by_entity.remove(&record.entity());
        if let Some(body) = record.body() {
            self.by_body.remove(&body);
        }
        if let Some(backend) = &self.backend {
            record.deactivate(&mut *backend.borrow_mut());
        }
        record.destroy();
    }

    // --- World lifecycle ---

    /// Attach a backend and activate every registered record
    ///
    /// A previously attached backend is detached first. Records whose entity
    /// no longer has a rigid body are unregistered.
    pub fn attach(&mut self, world: &World, backend: SharedBackend) -> Result<(), PhysicsError> {
        if self.backend.is_some() {
            self.detach();
        }
        self.backend = Some(Rc::clone(&backend));

        let keys: Vec<RecordKey> = self.records.keys().collect();
        for key in keys {
            match self.activate_record(key, world, &backend) {
                Ok(()) => {}
                Err(PhysicsError::MissingRigidBody(entity)) => {
                    log::info!("Dropping record for {:?}: rigid body is gone", entity);
                    self.discard(key);
                }
                Err(err) => return Err(err),
            }
        }
        log::info!("Physics world attached ({} bodies)", self.records.len());
        Ok(())
    }

    /// Deactivate every record and hand back the backend
    ///
    /// Records stay registered and are re-activated by the next
    /// [`PhysicsSystem::attach`].
    pub fn detach(&mut self) -> Option<SharedBackend> {
        let backend = self.backend.take()?;
        {
            let mut native = backend.borrow_mut();
            for record in self.records.values_mut() {
                record.deactivate(&mut *native);
            }
        }
        self.by_body.clear();
        self.queue.borrow_mut().clear();
        log::debug!("Physics world detached");
        Some(backend)
    }

    /// Detach and release everything the backend still holds
    pub fn shutdown(&mut self) {
        if let Some(backend) = self.detach() {
            backend.borrow_mut().cleanup();
            log::info!("Physics world shut down");
        }
    }

    // --- Frame ---

    /// Run one frame: drain, step, pull back
    ///
    /// Without an attached backend this does nothing.
    pub fn update(&mut self, world: &mut World, dt: f32) -> Result<FrameStats, PhysicsError> {
        let Some(backend) = self.backend.clone() else {
            return Ok(FrameStats::default());
        };
        let mut stats = FrameStats::default();

        loop {
            let next = self.queue.borrow_mut().pop();
            let Some(key) = next else {
                break;
            };
            let Some(record) = self.records.get_mut(key) else {
                log::trace!("Skipping stale queue entry {:?}", key);
                stats.skipped += 1;
                continue;
            };
            if record.is_orphaned() {
                log::info!("Unregistering {:?}: rigid body removed", record.entity());
                self.discard(key);
                stats.orphaned += 1;
                continue;
            }
            if record.reconcile(world, &mut *backend.borrow_mut())? {
                stats.reconciled += 1;
            }
        }

        stats.sub_steps = backend.borrow_mut().step_simulation(
            dt,
            self.config.max_sub_steps,
            self.config.fixed_time_step,
        );

        // Sample everything first; writing back emits events that may touch
        // the backend
        let samples: Vec<(RecordKey, PullBack)> = {
            let native = backend.borrow();
            let scene: &World = world;
            self.records
                .iter()
                .filter_map(|(key, record)| record.sample(scene, &*native).map(|s| (key, s)))
                .collect()
        };
        for (key, sample) in samples {
            if let Some(record) = self.records.get(key) {
                record.write_back(world, &sample)?;
                stats.pulled_back += 1;
            }
        }

        log::trace!("Physics frame: {:?}", stats);
        Ok(stats)
    }

    // --- Queries ---

    /// Cast a ray from `origin` to `destination`
    pub fn raycast(
        &self,
        origin: &Point3<f32>,
        destination: &Point3<f32>,
    ) -> Result<RaycastResult, PhysicsError> {
        let backend = self.backend.as_ref().ok_or(PhysicsError::NoWorld)?;
        let Some(hit) = backend.borrow_mut().ray_test(origin, destination) else {
            return Ok(RaycastResult::miss(origin, destination));
        };

        let record = self
            .by_body
            .get(&hit.body)
            .and_then(|key| self.records.get(*key));
        Ok(RaycastResult {
            hit: true,
            point: hit.point,
            normal: hit
                .normal
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vector3::zeros),
            distance: (hit.point - origin).norm(),
            rigid_body: record.map(SyncRecord::entity),
            collider: record
                .zip(hit.child_shape)
                .and_then(|(record, shape)| record.collider_for_shape(shape)),
        })
    }

    /// Cast a ray of length `max_distance` along `direction`
    pub fn raycast_dir(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
        max_distance: f32,
    ) -> Result<RaycastResult, PhysicsError> {
        let destination = match direction.try_normalize(f32::EPSILON) {
            Some(unit) => origin + unit * max_distance,
            None => *origin,
        };
        self.raycast(origin, &destination)
    }

    pub fn gravity(&self) -> Result<Vector3<f32>, PhysicsError> {
        let backend = self.backend.as_ref().ok_or(PhysicsError::NoWorld)?;
        Ok(backend.borrow().gravity())
    }

    /// Change world gravity; every body is woken
    pub fn set_gravity(&mut self, gravity: Vector3<f32>) -> Result<(), PhysicsError> {
        let backend = self.backend.as_ref().ok_or(PhysicsError::NoWorld)?;
        backend.borrow_mut().set_gravity(gravity);
        self.config.gravity = gravity;
        Ok(())
    }

    // --- Forces ---

    fn native_body(&self, entity: EntityKey) -> Result<(&SharedBackend, BodyKey), PhysicsError> {
        let key = self
            .by_entity
            .get(&entity)
            .ok_or(PhysicsError::NotRegistered(entity))?;
        let backend = self.backend.as_ref().ok_or(PhysicsError::NoWorld)?;
        let body = self
            .records
            .get(*key)
            .and_then(SyncRecord::body)
            .ok_or(PhysicsError::Detached(entity))?;
        Ok((backend, body))
    }

    /// Apply an impulse through the body's center of mass
    pub fn apply_impulse(&self, entity: EntityKey, impulse: Vector3<f32>) -> Result<(), PhysicsError> {
        let (backend, body) = self.native_body(entity)?;
        let mut native = backend.borrow_mut();
        native.apply_central_impulse(body, impulse);
        native.activate(body);
        Ok(())
    }

    /// Accumulate a force through the body's center of mass for the next step
    pub fn apply_force(&self, entity: EntityKey, force: Vector3<f32>) -> Result<(), PhysicsError> {
        let (backend, body) = self.native_body(entity)?;
        let mut native = backend.borrow_mut();
        native.apply_central_force(body, force);
        native.activate(body);
        Ok(())
    }

    pub fn clear_forces(&self, entity: EntityKey) -> Result<(), PhysicsError> {
        let (backend, body) = self.native_body(entity)?;
        backend.borrow_mut().clear_forces(body);
        Ok(())
    }

    // --- Introspection ---

    pub fn is_registered(&self, entity: EntityKey) -> bool {
        self.by_entity.contains_key(&entity)
    }

    /// Sync record of a registered entity
    pub fn record(&self, entity: EntityKey) -> Option<&SyncRecord> {
        self.records.get(*self.by_entity.get(&entity)?)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Records currently waiting for reconciliation
    pub fn queue_len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_queued(&self, entity: EntityKey) -> bool {
        self.by_entity
            .get(&entity)
            .map_or(false, |key| self.queue.borrow().contains(*key))
    }
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl Drop for PhysicsSystem {
    fn drop(&mut self) {
        self.detach();
    }
}
