//! Entity type
//!
//! An Entity is a named node in the scene graph. It carries an optional local
//! [`Transform`], an optional [`RigidBody`], any number of colliders (held by
//! key; the collider data lives in the world), and parent/child links.
//!
//! Entities are read through the [`crate::World`]; all mutation goes through the
//! world so that observers are notified.

use crate::components::RigidBody;
use crate::transform::Transform;
use crate::world::{ColliderKey, EntityKey};
use std::cell::Cell;
use std::collections::HashSet;

/// A node in the scene graph
#[derive(Clone, Debug, Default)]
pub struct Entity {
    /// Optional name for lookup
    pub(crate) name: Option<String>,
    /// Tags for categorization
    pub(crate) tags: HashSet<String>,
    /// Local transform relative to the parent
    pub(crate) transform: Option<Transform>,
    /// Rigid-body descriptor
    pub(crate) rigid_body: Option<RigidBody>,
    /// Attached colliders, in insertion order
    pub(crate) colliders: Vec<ColliderKey>,
    pub(crate) parent: Option<EntityKey>,
    pub(crate) children: Vec<EntityKey>,
    /// World transform, cleared whenever this entity or an ancestor moves
    pub(crate) world_cache: Cell<Option<Transform>>,
}

impl Entity {
    /// Create an anonymous entity with no components
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity with a name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    /// Builder: set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Builder: add several tags
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for tag in tags {
            self.tags.insert(tag.into());
        }
        self
    }

    /// Builder: start with a local transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The entity's name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// All tags on this entity
    pub fn tags(&self) -> &HashSet<String> {
        &self.tags
    }

    /// Check if this entity has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Local transform, if the entity has one
    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Rigid-body descriptor, if the entity has one
    pub fn rigid_body(&self) -> Option<&RigidBody> {
        self.rigid_body.as_ref()
    }

    /// Keys of attached colliders
    pub fn colliders(&self) -> &[ColliderKey] {
        &self.colliders
    }

    /// Parent entity, if any
    pub fn parent(&self) -> Option<EntityKey> {
        self.parent
    }

    /// Direct children
    pub fn children(&self) -> &[EntityKey] {
        &self.children
    }
}
