//! Raycast results in scene terms

use gyre_core::{ColliderKey, EntityKey};
use nalgebra::{Point3, Vector3};

/// Outcome of a ray query
///
/// Always check [`RaycastResult::hit`]: a miss still carries a point (the
/// queried destination).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastResult {
    /// Whether anything was struck
    pub hit: bool,
    /// Hit point, or the ray's destination on a miss
    pub point: Point3<f32>,
    /// Unit surface normal at the hit; zero on a miss
    pub normal: Vector3<f32>,
    /// Distance from the ray origin to `point`
    pub distance: f32,
    /// Entity owning the struck rigid body
    pub rigid_body: Option<EntityKey>,
    /// Collider that was struck, when it could be resolved
    pub collider: Option<ColliderKey>,
}

impl RaycastResult {
    /// A miss ending at `destination`
    pub fn miss(origin: &Point3<f32>, destination: &Point3<f32>) -> Self {
        Self {
            hit: false,
            point: *destination,
            normal: Vector3::zeros(),
            distance: (destination - origin).norm(),
            rigid_body: None,
            collider: None,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.hit
    }
}
