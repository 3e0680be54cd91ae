//! Transform (position, rotation, scale)
//!
//! A Transform represents the local position, rotation, and per-axis scale of an
//! entity relative to its parent. World transforms are derived by composing
//! local transforms down the hierarchy (see [`crate::World::world_transform`]).

use nalgebra::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D transform with position, rotation, and per-axis scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position relative to the parent
    pub position: Vector3<f32>,
    /// Rotation relative to the parent
    pub rotation: UnitQuaternion<f32>,
    /// Per-axis scale factor
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Create an identity transform (no translation, rotation, or scale change)
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }

    /// Create a transform with just a position
    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            rotation,
            scale: Vector3::repeat(1.0),
        }
    }

    /// Create a transform from a rigid pose (unit scale)
    pub fn from_isometry(pose: &Isometry3<f32>) -> Self {
        Self::from_position_rotation(pose.translation.vector, pose.rotation)
    }

    /// Builder: replace the scale
    pub fn with_scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }

    /// The rigid part of this transform (translation and rotation, scale dropped)
    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }

    /// Full TRS matrix (scale applied first, then rotation, then translation)
    pub fn to_matrix(&self) -> Matrix4<f32> {
        self.to_isometry().to_homogeneous() * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// Transform a point from local space to parent space
    ///
    /// Applies scale, then rotation, then translation.
    pub fn transform_point(&self, p: &Point3<f32>) -> Point3<f32> {
        let scaled = p.coords.component_mul(&self.scale);
        Point3::from(self.rotation * scaled + self.position)
    }

    /// Transform a direction from local space to parent space
    ///
    /// Applies scale and rotation, but not translation.
    pub fn transform_direction(&self, d: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * d.component_mul(&self.scale)
    }

    /// Compute the inverse transform
    ///
    /// Exact for uniform scale. Non-uniform scale combined with rotation has no
    /// exact TRS inverse; the per-axis reciprocal is used.
    pub fn inverse(&self) -> Self {
        let inv_scale = self.scale.map(|s| if s.abs() > f32::EPSILON { 1.0 / s } else { 0.0 });
        let inv_rotation = self.rotation.inverse();
        let inv_position = (inv_rotation * -self.position).component_mul(&inv_scale);
        Self {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Compose this transform with a child transform
    ///
    /// The result maps the child's local space straight into this transform's
    /// parent space: `self.compose(&child).transform_point(p)` equals
    /// `self.transform_point(&child.transform_point(p))` for uniform scale.
    pub fn compose(&self, child: &Transform) -> Self {
        Self {
            position: self.transform_point(&Point3::from(child.position)).coords,
            rotation: self.rotation * child.rotation,
            scale: self.scale.component_mul(&child.scale),
        }
    }

    /// Translate by a delta vector
    pub fn translate(&mut self, delta: Vector3<f32>) {
        self.position += delta;
    }

    /// Apply an additional rotation on top of the current one
    pub fn rotate(&mut self, rotation: UnitQuaternion<f32>) {
        self.rotation = rotation * self.rotation;
    }
}
