//! Scene-graph error types

use crate::world::{ColliderKey, EntityKey};
use thiserror::Error;

/// Errors from [`crate::World`] mutations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("entity {0:?} does not exist")]
    NoSuchEntity(EntityKey),
    #[error("entity {entity:?} has no {component} component")]
    MissingComponent {
        entity: EntityKey,
        component: &'static str,
    },
    #[error("collider {0:?} does not exist")]
    NoSuchCollider(ColliderKey),
    #[error("rigid body mass must be finite and positive, got {0}")]
    InvalidMass(f32),
    #[error("parenting {child:?} under {parent:?} would create a cycle")]
    HierarchyCycle { child: EntityKey, parent: EntityKey },
}
