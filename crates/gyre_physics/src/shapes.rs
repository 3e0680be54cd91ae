//! Collider to native shape translation
//!
//! Maps each [`ColliderShape`] variant to the primitive the physics backend
//! builds. Pure and stateless; invoked only when a collider's shape actually
//! needs (re)building.

use gyre_core::{CapsuleAxis, ColliderShape};
use nalgebra::Vector3;

/// Depth given to flat 2D boxes, as a half-extent
pub const BOX2D_HALF_DEPTH: f32 = 1.0;

/// Backend-neutral description of a primitive collision shape
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShapeDesc {
    /// Box given by half-extents
    Cuboid { half_extents: Vector3<f32> },
    /// Sphere
    Ball { radius: f32 },
    /// Capsule along one local axis; `half_height` is half the distance
    /// between the two cap centers
    Capsule {
        axis: CapsuleAxis,
        half_height: f32,
        radius: f32,
    },
}

/// Build the native shape description for a collider shape
///
/// Non-positive or non-finite dimensions are a programming error.
pub fn shape_desc(shape: &ColliderShape) -> ShapeDesc {
    match *shape {
        ColliderShape::Box { size } => {
            debug_assert!(size.iter().all(|s| s.is_finite() && *s > 0.0), "invalid box size {size:?}");
            ShapeDesc::Cuboid {
                half_extents: size / 2.0,
            }
        }
        ColliderShape::Box2D { size } => {
            debug_assert!(size.iter().all(|s| s.is_finite() && *s > 0.0), "invalid 2D box size {size:?}");
            ShapeDesc::Cuboid {
                half_extents: Vector3::new(size.x / 2.0, size.y / 2.0, BOX2D_HALF_DEPTH),
            }
        }
        ColliderShape::Sphere { radius } => {
            debug_assert!(radius.is_finite() && radius > 0.0, "invalid sphere radius {radius}");
            ShapeDesc::Ball { radius }
        }
        ColliderShape::Capsule {
            radius,
            length,
            axis,
        } => {
            debug_assert!(radius.is_finite() && radius > 0.0, "invalid capsule radius {radius}");
            debug_assert!(length.is_finite() && length >= 0.0, "invalid capsule length {length}");
            ShapeDesc::Capsule {
                axis,
                half_height: length / 2.0,
                radius,
            }
        }
    }
}
