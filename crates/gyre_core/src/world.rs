//! World container for entities
//!
//! The World owns every entity, every collider, and the [`EventHub`] through
//! which component changes are announced. Mutations go through `World`
//! methods; each one emits the matching [`SceneEvent`] after the change has
//! been applied.

use crate::components::{Collider, ColliderChanges, RigidBody, RigidBodyChanges};
use crate::entity::Entity;
use crate::error::WorldError;
use crate::events::{ComponentKind, EventHub, SceneEvent};
use crate::transform::Transform;
use nalgebra::{Isometry3, Matrix4, Point3, UnitQuaternion, Vector3};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generational key to an entity in the world
    ///
    /// Keys are never reused; a key for a despawned entity stays invalid even
    /// after new entities take its slot.
    pub struct EntityKey;
}

new_key_type! {
    /// Generational key to a collider in the world
    pub struct ColliderKey;
}

#[derive(Clone, Debug)]
struct ColliderSlot {
    owner: EntityKey,
    collider: Collider,
}

/// The scene graph: entities, their components, and change notification
#[derive(Debug, Default)]
pub struct World {
    entities: SlotMap<EntityKey, Entity>,
    colliders: SlotMap<ColliderKey, ColliderSlot>,
    events: EventHub,
}

impl World {
    /// Create a new empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a world with pre-allocated capacity for entities
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: SlotMap::with_capacity_and_key(capacity),
            colliders: SlotMap::with_key(),
            events: EventHub::new(),
        }
    }

    /// The hub observers subscribe to
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    // --- Entities ---

    /// Add an entity and return its key
    pub fn spawn(&mut self, mut entity: Entity) -> EntityKey {
        entity.parent = None;
        entity.children.clear();
        entity.colliders.clear();
        entity.world_cache.set(None);
        self.entities.insert(entity)
    }

    /// Add an anonymous entity with an identity transform
    pub fn spawn_empty(&mut self) -> EntityKey {
        self.spawn(Entity::new().with_transform(Transform::identity()))
    }

    /// Remove an entity and all of its components
    ///
    /// Removal events are emitted for every component before the entity goes
    /// away. Children are re-parented to the root, keeping their local
    /// transforms.
    pub fn despawn(&mut self, key: EntityKey) -> bool {
        let Some(entity) = self.entities.get(key) else {
            return false;
        };
        let colliders = entity.colliders.clone();
        let children = entity.children.clone();
        let parent = entity.parent;

        for collider in colliders {
            self.remove_collider(collider);
        }
        self.remove_rigid_body(key);
        self.remove_transform(key);

        if let Some(parent) = parent {
            if let Some(p) = self.entities.get_mut(parent) {
                p.children.retain(|&c| c != key);
            }
        }
        for child in children {
            if let Some(c) = self.entities.get_mut(child) {
                c.parent = None;
            }
            self.transform_changed(child, true);
        }

        self.entities.remove(key);
        log::debug!("Despawned entity {:?}", key);
        true
    }

    /// Get an entity by key
    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Whether the key refers to a live entity
    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Get the number of entities in the world
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Check if the world is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over all entities with their keys
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entities.iter()
    }

    /// Find the first entity with the given name
    pub fn find_by_name(&self, name: &str) -> Option<EntityKey> {
        self.entities
            .iter()
            .find(|(_, e)| e.name() == Some(name))
            .map(|(k, _)| k)
    }

    /// All entities carrying a tag
    pub fn entities_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = EntityKey> + 'a {
        self.entities
            .iter()
            .filter(move |(_, e)| e.has_tag(tag))
            .map(|(k, _)| k)
    }

    fn entity_mut(&mut self, key: EntityKey) -> Result<&mut Entity, WorldError> {
        self.entities.get_mut(key).ok_or(WorldError::NoSuchEntity(key))
    }

    // --- Transforms ---

    /// Local transform of an entity
    pub fn transform(&self, key: EntityKey) -> Option<&Transform> {
        self.entities.get(key)?.transform.as_ref()
    }

    /// Attach or replace the local transform
    pub fn set_transform(&mut self, key: EntityKey, transform: Transform) -> Result<(), WorldError> {
        let entity = self.entity_mut(key)?;
        let added = entity.transform.is_none();
        entity.transform = Some(transform);

        if added {
            self.events
                .emit(key, &SceneEvent::ComponentAdded(ComponentKind::Transform));
        }
        self.transform_changed(key, !added);
        Ok(())
    }

    /// Detach the local transform
    pub fn remove_transform(&mut self, key: EntityKey) -> Option<Transform> {
        let removed = self.entities.get_mut(key)?.transform.take()?;
        self.events
            .emit(key, &SceneEvent::ComponentRemoved(ComponentKind::Transform));
        self.transform_changed(key, false);
        Some(removed)
    }

    /// Edit the existing local transform in place
    pub fn update_transform(
        &mut self,
        key: EntityKey,
        f: impl FnOnce(&mut Transform),
    ) -> Result<(), WorldError> {
        let entity = self.entity_mut(key)?;
        let transform = entity.transform.as_mut().ok_or(WorldError::MissingComponent {
            entity: key,
            component: "Transform",
        })?;
        let before = *transform;
        f(transform);
        if *transform != before {
            self.transform_changed(key, true);
        }
        Ok(())
    }

    /// Set the local position
    pub fn set_position(&mut self, key: EntityKey, position: Vector3<f32>) -> Result<(), WorldError> {
        self.update_transform(key, |t| t.position = position)
    }

    /// Set the local rotation
    pub fn set_rotation(
        &mut self,
        key: EntityKey,
        rotation: UnitQuaternion<f32>,
    ) -> Result<(), WorldError> {
        self.update_transform(key, |t| t.rotation = rotation)
    }

    /// Set the local scale
    pub fn set_scale(&mut self, key: EntityKey, scale: Vector3<f32>) -> Result<(), WorldError> {
        self.update_transform(key, |t| t.scale = scale)
    }

    /// Place the entity at a world-space pose, keeping its local scale
    ///
    /// The local transform is solved against the parent's world transform.
    pub fn set_world_pose(&mut self, key: EntityKey, pose: &Isometry3<f32>) -> Result<(), WorldError> {
        let parent_world = self
            .entities
            .get(key)
            .ok_or(WorldError::NoSuchEntity(key))?
            .parent
            .map(|p| self.cached_world(p));

        let (position, rotation) = match parent_world {
            Some(parent) => {
                let inv = parent.inverse();
                let position = inv.transform_point(&Point3::from(pose.translation.vector)).coords;
                (position, parent.rotation.inverse() * pose.rotation)
            }
            None => (pose.translation.vector, pose.rotation),
        };

        self.update_transform(key, |t| {
            t.position = position;
            t.rotation = rotation;
        })
    }

    /// Move the entity to a world-space position, keeping its world rotation
    pub fn set_world_position(
        &mut self,
        key: EntityKey,
        position: Vector3<f32>,
    ) -> Result<(), WorldError> {
        let mut pose = self.world_pose(key).ok_or(WorldError::MissingComponent {
            entity: key,
            component: "Transform",
        })?;
        pose.translation.vector = position;
        self.set_world_pose(key, &pose)
    }

    /// World transform, or `None` if the entity has no transform
    ///
    /// Ancestors without a transform count as identity.
    pub fn world_transform(&self, key: EntityKey) -> Option<Transform> {
        let entity = self.entities.get(key)?;
        entity.transform.map(|_| self.cached_world(key))
    }

    /// World pose (translation and rotation) of an entity
    pub fn world_pose(&self, key: EntityKey) -> Option<Isometry3<f32>> {
        self.world_transform(key).map(|t| t.to_isometry())
    }

    /// World TRS matrix of an entity
    pub fn world_matrix(&self, key: EntityKey) -> Option<Matrix4<f32>> {
        self.world_transform(key).map(|t| t.to_matrix())
    }

    /// World position of an entity
    pub fn world_position(&self, key: EntityKey) -> Option<Vector3<f32>> {
        self.world_transform(key).map(|t| t.position)
    }

    /// World rotation of an entity
    pub fn world_rotation(&self, key: EntityKey) -> Option<UnitQuaternion<f32>> {
        self.world_transform(key).map(|t| t.rotation)
    }

    fn cached_world(&self, key: EntityKey) -> Transform {
        let Some(entity) = self.entities.get(key) else {
            return Transform::identity();
        };
        if let Some(cached) = entity.world_cache.get() {
            return cached;
        }
        let local = entity.transform.unwrap_or_default();
        let world = match entity.parent {
            Some(parent) => self.cached_world(parent).compose(&local),
            None => local,
        };
        entity.world_cache.set(Some(world));
        world
    }

    /// Drop cached world transforms under `key` and announce the move
    fn transform_changed(&mut self, key: EntityKey, include_self: bool) {
        let mut stack = vec![key];
        let mut notify = Vec::new();
        while let Some(current) = stack.pop() {
            let Some(entity) = self.entities.get(current) else {
                continue;
            };
            entity.world_cache.set(None);
            if entity.transform.is_some() && (include_self || current != key) {
                notify.push(current);
            }
            stack.extend(entity.children.iter().copied());
        }
        for entity in notify {
            self.events.emit(entity, &SceneEvent::TransformChanged);
        }
    }

    // --- Hierarchy ---

    /// Attach `child` under `parent`, or to the root with `None`
    ///
    /// The local transform is kept, so the child's world transform changes.
    pub fn set_parent(&mut self, child: EntityKey, parent: Option<EntityKey>) -> Result<(), WorldError> {
        let old_parent = self
            .entities
            .get(child)
            .ok_or(WorldError::NoSuchEntity(child))?
            .parent;
        if old_parent == parent {
            return Ok(());
        }

        if let Some(parent) = parent {
            if !self.entities.contains_key(parent) {
                return Err(WorldError::NoSuchEntity(parent));
            }
            let mut ancestor = Some(parent);
            while let Some(current) = ancestor {
                if current == child {
                    return Err(WorldError::HierarchyCycle { child, parent });
                }
                ancestor = self.entities.get(current).and_then(|e| e.parent);
            }
        }

        if let Some(old) = old_parent {
            if let Some(p) = self.entities.get_mut(old) {
                p.children.retain(|&c| c != child);
            }
        }
        if let Some(parent) = parent {
            if let Some(p) = self.entities.get_mut(parent) {
                p.children.push(child);
            }
        }
        if let Some(c) = self.entities.get_mut(child) {
            c.parent = parent;
        }
        self.transform_changed(child, true);
        Ok(())
    }

    /// Parent of an entity
    pub fn parent(&self, key: EntityKey) -> Option<EntityKey> {
        self.entities.get(key)?.parent
    }

    /// Direct children of an entity
    pub fn children(&self, key: EntityKey) -> &[EntityKey] {
        self.entities
            .get(key)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
    }

    // --- Rigid bodies ---

    /// Rigid-body descriptor of an entity
    pub fn rigid_body(&self, key: EntityKey) -> Option<&RigidBody> {
        self.entities.get(key)?.rigid_body.as_ref()
    }

    /// Iterate over every entity that has a rigid body
    pub fn rigid_bodies(&self) -> impl Iterator<Item = (EntityKey, &RigidBody)> {
        self.entities
            .iter()
            .filter_map(|(k, e)| e.rigid_body.as_ref().map(|rb| (k, rb)))
    }

    /// Attach a rigid body; an existing one is replaced as if edited
    pub fn add_rigid_body(&mut self, key: EntityKey, rigid_body: RigidBody) -> Result<(), WorldError> {
        if !rigid_body.has_valid_mass() {
            return Err(WorldError::InvalidMass(rigid_body.mass));
        }
        let entity = self.entity_mut(key)?;
        if entity.rigid_body.is_some() {
            return self.update_rigid_body(key, |rb| *rb = rigid_body).map(|_| ());
        }
        entity.rigid_body = Some(rigid_body);
        self.events
            .emit(key, &SceneEvent::ComponentAdded(ComponentKind::RigidBody));
        Ok(())
    }

    /// Detach the rigid body
    pub fn remove_rigid_body(&mut self, key: EntityKey) -> Option<RigidBody> {
        let removed = self.entities.get_mut(key)?.rigid_body.take()?;
        self.events
            .emit(key, &SceneEvent::ComponentRemoved(ComponentKind::RigidBody));
        Some(removed)
    }

    /// Edit a rigid body and announce what changed
    ///
    /// Property changes are emitted as one [`SceneEvent::RigidBodyChanged`];
    /// toggling `enabled` additionally emits
    /// [`SceneEvent::RigidBodyEnabledChanged`]. An edit that leaves the mass
    /// non-positive or non-finite is rejected and nothing changes.
    pub fn update_rigid_body(
        &mut self,
        key: EntityKey,
        f: impl FnOnce(&mut RigidBody),
    ) -> Result<RigidBodyChanges, WorldError> {
        let entity = self.entity_mut(key)?;
        let current = entity.rigid_body.as_mut().ok_or(WorldError::MissingComponent {
            entity: key,
            component: "RigidBody",
        })?;

        let mut edited = current.clone();
        f(&mut edited);
        if !edited.has_valid_mass() {
            return Err(WorldError::InvalidMass(edited.mass));
        }

        let changes = current.diff(&edited);
        let enabled = (current.enabled != edited.enabled).then_some(edited.enabled);
        *current = edited;

        if !changes.is_empty() {
            self.events.emit(key, &SceneEvent::RigidBodyChanged(changes));
        }
        if let Some(enabled) = enabled {
            self.events
                .emit(key, &SceneEvent::RigidBodyEnabledChanged(enabled));
        }
        Ok(changes)
    }

    // --- Colliders ---

    /// Attach a collider to an entity
    pub fn add_collider(&mut self, key: EntityKey, collider: Collider) -> Result<ColliderKey, WorldError> {
        if !self.entities.contains_key(key) {
            return Err(WorldError::NoSuchEntity(key));
        }
        let collider_key = self.colliders.insert(ColliderSlot {
            owner: key,
            collider,
        });
        self.entity_mut(key)?.colliders.push(collider_key);
        self.events.emit(
            key,
            &SceneEvent::ComponentAdded(ComponentKind::Collider(collider_key)),
        );
        Ok(collider_key)
    }

    /// Detach and return a collider
    pub fn remove_collider(&mut self, key: ColliderKey) -> Option<Collider> {
        let slot = self.colliders.remove(key)?;
        if let Some(owner) = self.entities.get_mut(slot.owner) {
            owner.colliders.retain(|&c| c != key);
        }
        self.events.emit(
            slot.owner,
            &SceneEvent::ComponentRemoved(ComponentKind::Collider(key)),
        );
        Some(slot.collider)
    }

    /// Get a collider by key
    pub fn collider(&self, key: ColliderKey) -> Option<&Collider> {
        self.colliders.get(key).map(|s| &s.collider)
    }

    /// Entity a collider is attached to
    pub fn collider_owner(&self, key: ColliderKey) -> Option<EntityKey> {
        self.colliders.get(key).map(|s| s.owner)
    }

    /// Colliders attached to an entity, in insertion order
    pub fn colliders_of(&self, key: EntityKey) -> impl Iterator<Item = (ColliderKey, &Collider)> {
        self.entities
            .get(key)
            .map(|e| e.colliders.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&c| self.colliders.get(c).map(|s| (c, &s.collider)))
    }

    /// Iterate over every collider with its owner
    pub fn colliders(&self) -> impl Iterator<Item = (ColliderKey, EntityKey, &Collider)> {
        self.colliders.iter().map(|(k, s)| (k, s.owner, &s.collider))
    }

    /// Edit a collider and announce what changed
    ///
    /// Shape/offset changes are emitted as one [`SceneEvent::ColliderChanged`];
    /// toggling `enabled` emits [`SceneEvent::ColliderEnabledChanged`].
    pub fn update_collider(
        &mut self,
        key: ColliderKey,
        f: impl FnOnce(&mut Collider),
    ) -> Result<ColliderChanges, WorldError> {
        let slot = self
            .colliders
            .get_mut(key)
            .ok_or(WorldError::NoSuchCollider(key))?;

        let mut edited = slot.collider.clone();
        f(&mut edited);
        let changes = slot.collider.diff(&edited);
        let enabled = (slot.collider.enabled != edited.enabled).then_some(edited.enabled);
        slot.collider = edited;
        let owner = slot.owner;

        if !changes.is_empty() {
            self.events.emit(
                owner,
                &SceneEvent::ColliderChanged {
                    collider: key,
                    changes,
                },
            );
        }
        if let Some(enabled) = enabled {
            self.events.emit(
                owner,
                &SceneEvent::ColliderEnabledChanged {
                    collider: key,
                    enabled,
                },
            );
        }
        Ok(changes)
    }

    /// Remove all entities and colliders
    ///
    /// Emits removal events for every component, like [`World::despawn`].
    pub fn clear(&mut self) {
        let keys: Vec<EntityKey> = self.entities.keys().collect();
        for key in keys {
            self.despawn(key);
        }
    }
}
