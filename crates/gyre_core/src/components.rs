//! Physics-facing component descriptors
//!
//! [`RigidBody`] and [`Collider`] are the authoritative, user-editable state that
//! the physics layer mirrors into its native simulation. They live on entities
//! inside the [`crate::World`] and are mutated through the world so that every
//! change is announced as a [`crate::SceneEvent`].

use bitflags::bitflags;
use nalgebra::{Isometry3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which rigid-body properties differ between two descriptors
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RigidBodyChanges: u8 {
        /// No changes
        const NONE = 0;
        /// Static/dynamic mode changed
        const STATIC = 1 << 0;
        /// Mass changed
        const MASS = 1 << 1;
        /// Linear velocity changed
        const LINEAR_VELOCITY = 1 << 2;
        /// Angular velocity changed
        const ANGULAR_VELOCITY = 1 << 3;
        /// Per-axis linear motion factor changed
        const LINEAR_FACTOR = 1 << 4;
        /// Per-axis angular motion factor changed
        const ANGULAR_FACTOR = 1 << 5;
        /// Both velocities
        const VELOCITY = Self::LINEAR_VELOCITY.bits() | Self::ANGULAR_VELOCITY.bits();
        /// Everything
        const ALL = Self::STATIC.bits() | Self::MASS.bits() | Self::VELOCITY.bits()
            | Self::LINEAR_FACTOR.bits() | Self::ANGULAR_FACTOR.bits();
    }
}

/// Rigid-body descriptor attached to an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBody {
    /// Whether the body takes part in the simulation at all
    pub enabled: bool,
    /// Static bodies never move; their mass is treated as zero
    pub is_static: bool,
    /// Mass in kilograms (must be > 0; banked while static)
    pub mass: f32,
    /// Linear velocity in world space
    pub linear_velocity: Vector3<f32>,
    /// Angular velocity in world space (radians per second)
    pub angular_velocity: Vector3<f32>,
    /// Per-axis multiplier on linear motion (0 locks the axis)
    pub linear_factor: Vector3<f32>,
    /// Per-axis multiplier on angular motion (0 locks the axis)
    pub angular_factor: Vector3<f32>,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            enabled: true,
            is_static: false,
            mass: 1.0,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            linear_factor: Vector3::repeat(1.0),
            angular_factor: Vector3::repeat(1.0),
        }
    }
}

impl RigidBody {
    /// A dynamic body with the given mass
    pub fn dynamic(mass: f32) -> Self {
        Self {
            mass,
            ..Self::default()
        }
    }

    /// A static body
    pub fn fixed() -> Self {
        Self {
            is_static: true,
            ..Self::default()
        }
    }

    /// Builder: set the mass
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    /// Builder: set the linear velocity
    pub fn with_linear_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Builder: set the angular velocity
    pub fn with_angular_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.angular_velocity = velocity;
        self
    }

    /// Builder: set the linear factor
    pub fn with_linear_factor(mut self, factor: Vector3<f32>) -> Self {
        self.linear_factor = factor;
        self
    }

    /// Builder: set the angular factor
    pub fn with_angular_factor(mut self, factor: Vector3<f32>) -> Self {
        self.angular_factor = factor;
        self
    }

    /// Builder: set whether the body is enabled
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Mass used for inertia: zero while static, the stored mass otherwise
    #[inline]
    pub fn effective_mass(&self) -> f32 {
        if self.is_static {
            0.0
        } else {
            self.mass
        }
    }

    /// Whether the mass is usable (finite and strictly positive)
    #[inline]
    pub fn has_valid_mass(&self) -> bool {
        self.mass.is_finite() && self.mass > 0.0
    }

    /// Property changes between `self` and `other`
    ///
    /// `enabled` is not part of the set; it is reported separately.
    pub fn diff(&self, other: &RigidBody) -> RigidBodyChanges {
        let mut changes = RigidBodyChanges::NONE;
        if self.is_static != other.is_static {
            changes |= RigidBodyChanges::STATIC;
        }
        if self.mass != other.mass {
            changes |= RigidBodyChanges::MASS;
        }
        if self.linear_velocity != other.linear_velocity {
            changes |= RigidBodyChanges::LINEAR_VELOCITY;
        }
        if self.angular_velocity != other.angular_velocity {
            changes |= RigidBodyChanges::ANGULAR_VELOCITY;
        }
        if self.linear_factor != other.linear_factor {
            changes |= RigidBodyChanges::LINEAR_FACTOR;
        }
        if self.angular_factor != other.angular_factor {
            changes |= RigidBodyChanges::ANGULAR_FACTOR;
        }
        changes
    }
}

/// Native capsule orientation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapsuleAxis {
    X,
    Y,
    Z,
}

/// Collision shape parameters of a collider
///
/// All shapes are centered on the collider's local origin; the collider offset
/// places them relative to the entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ColliderShape {
    /// Axis-aligned box with full side lengths
    Box {
        size: Vector3<f32>,
    },
    /// Flat box for 2D gameplay, with unit depth
    Box2D {
        size: Vector2<f32>,
    },
    /// Sphere
    Sphere {
        radius: f32,
    },
    /// Capsule; `length` is the distance between the two cap centers
    Capsule {
        radius: f32,
        length: f32,
        axis: CapsuleAxis,
    },
}

impl ColliderShape {
    /// Cube with the given side length
    pub fn cube(size: f32) -> Self {
        ColliderShape::Box {
            size: Vector3::repeat(size),
        }
    }
}

bitflags! {
    /// Which collider properties differ between two descriptors
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ColliderChanges: u8 {
        /// No changes
        const NONE = 0;
        /// Shape variant or parameters changed
        const SHAPE = 1 << 0;
        /// Local offset changed
        const OFFSET = 1 << 1;
    }
}

/// Collider descriptor; several may share one entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    /// Shape and its parameters
    pub shape: ColliderShape,
    /// Placement relative to the owning entity's origin
    #[serde(default = "default_offset")]
    pub offset: Isometry3<f32>,
    /// Disabled colliders are excluded from collision entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_offset() -> Isometry3<f32> {
    Isometry3::identity()
}

fn default_enabled() -> bool {
    true
}

impl Collider {
    /// Create an enabled collider at the entity origin
    pub fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            offset: Isometry3::identity(),
            enabled: true,
        }
    }

    /// Box collider with full side lengths
    pub fn cuboid(size: Vector3<f32>) -> Self {
        Self::new(ColliderShape::Box { size })
    }

    /// Sphere collider
    pub fn ball(radius: f32) -> Self {
        Self::new(ColliderShape::Sphere { radius })
    }

    /// Capsule collider along `axis`
    pub fn capsule(axis: CapsuleAxis, radius: f32, length: f32) -> Self {
        Self::new(ColliderShape::Capsule {
            radius,
            length,
            axis,
        })
    }

    /// Builder: set the local offset
    pub fn with_offset(mut self, offset: Isometry3<f32>) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: set whether the collider is enabled
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Property changes between `self` and `other`, excluding `enabled`
    pub fn diff(&self, other: &Collider) -> ColliderChanges {
        let mut changes = ColliderChanges::NONE;
        if self.shape != other.shape {
            changes |= ColliderChanges::SHAPE;
        }
        if self.offset != other.offset {
            changes |= ColliderChanges::OFFSET;
        }
        changes
    }
}
