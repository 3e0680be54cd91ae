//! Scene serialization
//!
//! Provides [`Scene`] for loading/saving scenes from RON files. A scene is a
//! flat list of [`EntityTemplate`]s; templates are the persistence boundary
//! for entities and carry every descriptor field the physics layer reads
//! (mass, velocities, factors, static flag, shape parameters, offsets).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::components::{Collider, RigidBody};
use crate::entity::Entity;
use crate::error::WorldError;
use crate::transform::Transform;
use crate::world::{EntityKey, World};

/// Serializable description of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    /// Optional name for lookup and parenting
    #[serde(default)]
    pub name: Option<String>,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Name of the parent entity in the same scene
    #[serde(default)]
    pub parent: Option<String>,
    /// Local transform
    #[serde(default)]
    pub transform: Option<Transform>,
    /// Rigid-body descriptor
    #[serde(default)]
    pub rigid_body: Option<RigidBody>,
    /// Attached colliders
    #[serde(default)]
    pub colliders: Vec<Collider>,
}

impl EntityTemplate {
    /// Create an empty template with an identity transform
    pub fn new() -> Self {
        Self {
            name: None,
            tags: Vec::new(),
            parent: None,
            transform: Some(Transform::identity()),
            rigid_body: None,
            colliders: Vec::new(),
        }
    }

    /// Builder: set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Builder: set the parent by name
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Builder: set the local transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Builder: set the rigid body
    pub fn with_rigid_body(mut self, rigid_body: RigidBody) -> Self {
        self.rigid_body = Some(rigid_body);
        self
    }

    /// Builder: add a collider
    pub fn with_collider(mut self, collider: Collider) -> Self {
        self.colliders.push(collider);
        self
    }
}

impl Default for EntityTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an entity from a template
    ///
    /// The template's `parent` is ignored here; [`Scene::instantiate`]
    /// resolves parents by name.
    pub fn spawn_template(&mut self, template: &EntityTemplate) -> Result<EntityKey, WorldError> {
        let mut entity = Entity::new().with_tags(template.tags.iter().cloned());
        entity.name = template.name.clone();
        entity.transform = template.transform;
        let key = self.spawn(entity);

        if let Some(rigid_body) = &template.rigid_body {
            if let Err(err) = self.add_rigid_body(key, rigid_body.clone()) {
                self.despawn(key);
                return Err(err);
            }
        }
        for collider in &template.colliders {
            self.add_collider(key, collider.clone())?;
        }
        Ok(key)
    }

    /// Capture an entity as a template
    pub fn to_template(&self, key: EntityKey) -> Option<EntityTemplate> {
        let entity = self.entity(key)?;
        let mut tags: Vec<String> = entity.tags().iter().cloned().collect();
        tags.sort();
        Some(EntityTemplate {
            name: entity.name().map(str::to_owned),
            tags,
            parent: entity
                .parent()
                .and_then(|p| self.entity(p))
                .and_then(|p| p.name().map(str::to_owned)),
            transform: entity.transform().copied(),
            rigid_body: entity.rigid_body().cloned(),
            colliders: self.colliders_of(key).map(|(_, c)| c.clone()).collect(),
        })
    }
}

/// A serializable scene containing entity templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene name (for display/debugging)
    pub name: String,
    /// Gravity vector for physics
    #[serde(default)]
    pub gravity: Option<[f32; 3]>,
    /// Entity templates in this scene
    pub entities: Vec<EntityTemplate>,
}

impl Scene {
    /// Create a new empty scene
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gravity: None,
            entities: Vec::new(),
        }
    }

    /// Set the gravity for this scene
    pub fn with_gravity(mut self, gravity: [f32; 3]) -> Self {
        self.gravity = Some(gravity);
        self
    }

    /// Add an entity template to this scene
    pub fn add_entity(&mut self, entity: EntityTemplate) {
        self.entities.push(entity);
    }

    /// Parse a scene from RON text
    pub fn from_ron_str(contents: &str) -> Result<Self, SceneError> {
        Ok(ron::from_str(contents)?)
    }

    /// Render the scene as pretty RON
    pub fn to_ron_string(&self) -> Result<String, SceneError> {
        let pretty = ron::ser::PrettyConfig::new()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load a scene from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Save a scene to a RON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneError> {
        fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    /// Spawn every template into `world`, wiring parents by name
    ///
    /// Returns the new keys in template order.
    pub fn instantiate(&self, world: &mut World) -> Result<Vec<EntityKey>, SceneError> {
        let mut keys = Vec::with_capacity(self.entities.len());
        let mut by_name = HashMap::new();
        for template in &self.entities {
            let key = world.spawn_template(template)?;
            if let Some(name) = &template.name {
                by_name.insert(name.clone(), key);
            }
            keys.push(key);
        }

        for (template, &key) in self.entities.iter().zip(&keys) {
            if let Some(parent) = &template.parent {
                let parent_key = by_name
                    .get(parent)
                    .copied()
                    .ok_or_else(|| SceneError::UnknownParent(parent.clone()))?;
                world.set_parent(key, Some(parent_key))?;
            }
        }
        log::info!("Instantiated scene '{}' ({} entities)", self.name, keys.len());
        Ok(keys)
    }

    /// Capture entities of `world` into a scene
    pub fn capture(name: impl Into<String>, world: &World) -> Self {
        Self {
            name: name.into(),
            gravity: None,
            entities: world.iter().filter_map(|(k, _)| world.to_template(k)).collect(),
        }
    }
}

/// Errors from scene loading, saving, and instantiation
#[derive(Debug, Error)]
pub enum SceneError {
    /// IO error (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Parse error (invalid RON syntax)
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Serialization error
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),
    /// A template names a parent that is not in the scene
    #[error("Unknown parent entity '{0}'")]
    UnknownParent(String),
    /// A template was rejected by the world
    #[error(transparent)]
    World(#[from] WorldError),
}
