//! SceneBuilder - Declarative scene construction
//!
//! Provides a fluent API for building physics scenes. The builder collects
//! [`EntityTemplate`]s into a [`Scene`], so anything it builds can also be
//! saved to RON and loaded back.

use gyre_core::{
    Collider, EntityTemplate, RigidBody, Scene, SceneError, Transform, Vector3, World,
};
use gyre_physics::PhysicsConfig;

/// Builder for constructing physics scenes
///
/// # Example
/// ```ignore
/// let (world, physics) = SceneBuilder::new("demo")
///     .with_gravity(Vector3::new(0.0, -9.81, 0.0))
///     .add_floor(0.0, 20.0)
///     .add_box("crate", Vector3::new(0.0, 4.0, 0.0), Vector3::repeat(1.0), 2.0)
///     .build()?;
/// ```
pub struct SceneBuilder {
    scene: Scene,
    physics: PhysicsConfig,
}

impl SceneBuilder {
    /// Create a new, empty scene builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scene: Scene::new(name),
            physics: PhysicsConfig::default(),
        }
    }

    /// Start from a loaded scene
    ///
    /// The scene's gravity, when present, overrides the one in `physics`.
    pub fn from_scene(scene: Scene, physics: PhysicsConfig) -> Self {
        let physics = match scene.gravity {
            Some(gravity) => PhysicsConfig {
                gravity: Vector3::from(gravity),
                ..physics
            },
            None => physics,
        };
        Self { scene, physics }
    }

    /// Use the given physics configuration
    pub fn with_physics(mut self, physics: PhysicsConfig) -> Self {
        self.physics = physics;
        self
    }

    /// Set gravity; it is also stored in the scene
    pub fn with_gravity(mut self, gravity: Vector3<f32>) -> Self {
        self.physics.gravity = gravity;
        self.scene.gravity = Some([gravity.x, gravity.y, gravity.z]);
        self
    }

    /// Add a static floor slab whose top face sits at `y`
    pub fn add_floor(self, y: f32, size: f32) -> Self {
        let thickness = 1.0;
        self.add_entity(
            EntityTemplate::new()
                .with_name("floor")
                .with_tag("static")
                .with_transform(Transform::from_position(Vector3::new(0.0, y - thickness / 2.0, 0.0)))
                .with_rigid_body(RigidBody::fixed())
                .with_collider(Collider::cuboid(Vector3::new(size, thickness, size))),
        )
    }

    /// Add a dynamic box
    pub fn add_box(self, name: &str, position: Vector3<f32>, size: Vector3<f32>, mass: f32) -> Self {
        self.add_entity(
            EntityTemplate::new()
                .with_name(name)
                .with_tag("dynamic")
                .with_transform(Transform::from_position(position))
                .with_rigid_body(RigidBody::dynamic(mass))
                .with_collider(Collider::cuboid(size)),
        )
    }

    /// Add a dynamic sphere
    pub fn add_sphere(self, name: &str, position: Vector3<f32>, radius: f32, mass: f32) -> Self {
        self.add_entity(
            EntityTemplate::new()
                .with_name(name)
                .with_tag("dynamic")
                .with_transform(Transform::from_position(position))
                .with_rigid_body(RigidBody::dynamic(mass))
                .with_collider(Collider::ball(radius)),
        )
    }

    /// Add a custom entity to the scene
    ///
    /// For entities that don't fit the standard patterns.
    pub fn add_entity(mut self, template: EntityTemplate) -> Self {
        self.scene.add_entity(template);
        self
    }

    /// The scene collected so far
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Physics configuration the scene will run with
    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    /// Instantiate the scene into a fresh world
    pub fn build(self) -> Result<(World, PhysicsConfig), SceneError> {
        let mut world = World::with_capacity(self.scene.entities.len());
        self.scene.instantiate(&mut world)?;
        Ok((world, self.physics))
    }
}
