//! Scene events to dirty flags
//!
//! One [`RecordObserver`] is subscribed per active record. It only records
//! what changed and enqueues the record; the sole native call made from a
//! callback is attaching or detaching the body when the rigid body's enabled
//! flag flips.

use crate::backend::{BodyKey, PhysicsBackend};
use crate::queue::SharedQueue;
use crate::record::{ColliderDirty, DirtyState, RecordKey};
use gyre_core::{
    ChangeObserver, ColliderChanges, ComponentKind, EntityKey, RigidBodyChanges, SceneEvent,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Observer translating one entity's events into record state
pub struct RecordObserver {
    record: RecordKey,
    dirty: Rc<RefCell<DirtyState>>,
    queue: SharedQueue,
    backend: Weak<RefCell<dyn PhysicsBackend>>,
    body: BodyKey,
}

impl RecordObserver {
    pub fn new(
        record: RecordKey,
        dirty: Rc<RefCell<DirtyState>>,
        queue: SharedQueue,
        backend: Weak<RefCell<dyn PhysicsBackend>>,
        body: BodyKey,
    ) -> Self {
        Self {
            record,
            dirty,
            queue,
            backend,
            body,
        }
    }

    /// Add or remove the body from the world right away
    fn set_in_world(&self, enabled: bool) {
        let Some(backend) = self.backend.upgrade() else {
            return;
        };
        let Ok(mut backend) = backend.try_borrow_mut() else {
            log::warn!("Backend busy; cannot toggle body {:?}", self.body);
            return;
        };
        match (enabled, backend.contains_body(self.body)) {
            (true, false) => backend.add_body(self.body),
            (false, true) => backend.remove_body(self.body),
            _ => {}
        }
    }

    /// Apply an event to the dirty state; returns whether to enqueue
    fn mark(&self, event: &SceneEvent) -> bool {
        let mut dirty = self.dirty.borrow_mut();
        match *event {
            SceneEvent::TransformChanged
            | SceneEvent::ComponentAdded(ComponentKind::Transform)
            | SceneEvent::ComponentRemoved(ComponentKind::Transform) => dirty.mark_motion(),
            SceneEvent::ComponentAdded(ComponentKind::Collider(collider)) => {
                dirty.mark_collider(collider, ColliderDirty::ShapeParams)
            }
            SceneEvent::ComponentRemoved(ComponentKind::Collider(collider)) => {
                dirty.remove_collider(collider)
            }
            SceneEvent::ColliderChanged { collider, changes } => {
                let mark = if changes.contains(ColliderChanges::SHAPE) {
                    ColliderDirty::ShapeParams
                } else {
                    ColliderDirty::Offset
                };
                dirty.mark_collider(collider, mark);
            }
            SceneEvent::ColliderEnabledChanged { collider, .. } => {
                dirty.mark_collider(collider, ColliderDirty::Offset)
            }
            SceneEvent::RigidBodyChanged(changes) => dirty.mark_body(changes),
            SceneEvent::ComponentAdded(ComponentKind::RigidBody) => {
                // A replacement descriptor: push all of it
                dirty.mark_orphaned(false);
                dirty.mark_body(RigidBodyChanges::ALL);
                dirty.mark_motion();
            }
            SceneEvent::ComponentRemoved(ComponentKind::RigidBody) => dirty.mark_orphaned(true),
            SceneEvent::RigidBodyEnabledChanged(_) => return false,
        }
        true
    }
}

impl ChangeObserver for RecordObserver {
    fn on_event(&self, entity: EntityKey, event: &SceneEvent) {
        if let SceneEvent::RigidBodyEnabledChanged(enabled) = *event {
            self.set_in_world(enabled);
            return;
        }
        if self.mark(event) && self.queue.borrow_mut().push(self.record) {
            log::trace!("Queued {:?} after {:?}", entity, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BodyDesc, SharedBackend};
    use crate::queue::InvalidationQueue;
    use crate::world::PhysicsWorld;
    use gyre_core::ColliderKey;
    use nalgebra::Isometry3;
    use slotmap::SlotMap;

    struct Fixture {
        observer: RecordObserver,
        dirty: Rc<RefCell<DirtyState>>,
        queue: SharedQueue,
        backend: SharedBackend,
        body: BodyKey,
        entity: EntityKey,
        collider: ColliderKey,
    }

    fn fixture() -> Fixture {
        let backend: SharedBackend = Rc::new(RefCell::new(PhysicsWorld::new()));
        let body = {
            let mut native = backend.borrow_mut();
            let shape = native.create_compound();
            let motion_state = native.create_motion_state(&Isometry3::identity());
            native.create_body(&BodyDesc {
                mass: 1.0,
                motion_state,
                shape,
                local_inertia: nalgebra::Vector3::zeros(),
            })
        };
        let mut records: SlotMap<RecordKey, ()> = SlotMap::with_key();
        let mut entities: SlotMap<EntityKey, ()> = SlotMap::with_key();
        let mut colliders: SlotMap<ColliderKey, ()> = SlotMap::with_key();

        let dirty = Rc::new(RefCell::new(DirtyState::default()));
        let queue = InvalidationQueue::shared();
        let observer = RecordObserver::new(
            records.insert(()),
            Rc::clone(&dirty),
            Rc::clone(&queue),
            Rc::downgrade(&backend),
            body,
        );
        Fixture {
            observer,
            dirty,
            queue,
            backend,
            body,
            entity: entities.insert(()),
            collider: colliders.insert(()),
        }
    }

    #[test]
    fn test_transform_change_marks_motion() {
        let f = fixture();
        f.observer.on_event(f.entity, &SceneEvent::TransformChanged);
        assert!(f.dirty.borrow().motion_dirty());
        assert_eq!(f.queue.borrow().len(), 1);
    }

    #[test]
    fn test_repeated_events_enqueue_once() {
        let f = fixture();
        f.observer.on_event(f.entity, &SceneEvent::TransformChanged);
        f.observer
            .on_event(f.entity, &SceneEvent::RigidBodyChanged(RigidBodyChanges::MASS));
        f.observer.on_event(
            f.entity,
            &SceneEvent::ColliderEnabledChanged {
                collider: f.collider,
                enabled: false,
            },
        );
        assert_eq!(f.queue.borrow().len(), 1);
    }

    #[test]
    fn test_collider_events_map_to_marks() {
        let f = fixture();
        f.observer.on_event(
            f.entity,
            &SceneEvent::ColliderChanged {
                collider: f.collider,
                changes: ColliderChanges::OFFSET,
            },
        );
        assert_eq!(
            f.dirty.borrow().collider_dirty(f.collider),
            Some(ColliderDirty::Offset)
        );

        f.observer.on_event(
            f.entity,
            &SceneEvent::ColliderChanged {
                collider: f.collider,
                changes: ColliderChanges::SHAPE | ColliderChanges::OFFSET,
            },
        );
        assert_eq!(
            f.dirty.borrow().collider_dirty(f.collider),
            Some(ColliderDirty::ShapeParams)
        );
        assert!(f.dirty.borrow().shape_dirty());
    }

    #[test]
    fn test_rigid_body_removal_orphans() {
        let f = fixture();
        f.observer.on_event(
            f.entity,
            &SceneEvent::ComponentRemoved(ComponentKind::RigidBody),
        );
        assert!(f.dirty.borrow().is_orphaned());
        assert_eq!(f.queue.borrow().len(), 1);

        f.observer
            .on_event(f.entity, &SceneEvent::ComponentAdded(ComponentKind::RigidBody));
        assert!(!f.dirty.borrow().is_orphaned());
        assert_eq!(f.dirty.borrow().body_dirty(), RigidBodyChanges::ALL);
    }

    #[test]
    fn test_enabled_change_bypasses_queue() {
        let f = fixture();
        f.observer
            .on_event(f.entity, &SceneEvent::RigidBodyEnabledChanged(true));
        assert!(f.backend.borrow().contains_body(f.body));
        assert!(f.queue.borrow().is_empty());
        assert!(f.dirty.borrow().is_clean());

        f.observer
            .on_event(f.entity, &SceneEvent::RigidBodyEnabledChanged(false));
        assert!(!f.backend.borrow().contains_body(f.body));
    }

    #[test]
    fn test_enabled_change_after_backend_dropped() {
        let f = fixture();
        let Fixture {
            observer, backend, entity, ..
        } = f;
        drop(backend);
        observer.on_event(entity, &SceneEvent::RigidBodyEnabledChanged(true));
    }
}
