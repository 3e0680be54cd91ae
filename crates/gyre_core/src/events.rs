//! Change notification for entities and their components
//!
//! Every mutation performed through [`crate::World`] is announced as a
//! [`SceneEvent`] to observers that subscribed for the mutated entity.
//! Subscriptions are RAII guards: dropping a [`Subscription`] unregisters the
//! observer, so a subscribe is always paired with exactly one unsubscribe.
//!
//! Dispatch is synchronous and single-threaded. Observers are snapshotted
//! before any of them run, so an observer may freely drop its own (or another)
//! subscription from inside a callback; such observers still see the event
//! currently being dispatched.

use crate::components::{ColliderChanges, RigidBodyChanges};
use crate::world::{ColliderKey, EntityKey};
use bitflags::bitflags;
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Which component an add/remove event refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    RigidBody,
    Collider(ColliderKey),
}

/// A change to an entity or one of its components
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SceneEvent {
    /// A component was attached to the entity
    ComponentAdded(ComponentKind),
    /// A component was detached from the entity
    ComponentRemoved(ComponentKind),
    /// The entity's world transform changed (directly or through an ancestor)
    TransformChanged,
    /// Shape parameters and/or offset of a collider changed
    ColliderChanged {
        collider: ColliderKey,
        changes: ColliderChanges,
    },
    /// A collider was enabled or disabled
    ColliderEnabledChanged { collider: ColliderKey, enabled: bool },
    /// Rigid-body properties changed
    RigidBodyChanged(RigidBodyChanges),
    /// The rigid body was enabled or disabled
    RigidBodyEnabledChanged(bool),
}

bitflags! {
    /// Event families an observer is interested in
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        /// Component added/removed
        const COMPOSITION = 1 << 0;
        /// Transform changed
        const TRANSFORM = 1 << 1;
        /// Collider property and enabled changes
        const COLLIDER = 1 << 2;
        /// Rigid-body property changes
        const RIGID_BODY = 1 << 3;
        /// Rigid-body enabled changes
        const RIGID_BODY_ENABLED = 1 << 4;
        /// Every family
        const ALL = Self::COMPOSITION.bits() | Self::TRANSFORM.bits() | Self::COLLIDER.bits()
            | Self::RIGID_BODY.bits() | Self::RIGID_BODY_ENABLED.bits();
    }
}

impl SceneEvent {
    /// The family this event belongs to
    pub fn mask(&self) -> EventMask {
        match self {
            SceneEvent::ComponentAdded(_) | SceneEvent::ComponentRemoved(_) => EventMask::COMPOSITION,
            SceneEvent::TransformChanged => EventMask::TRANSFORM,
            SceneEvent::ColliderChanged { .. } | SceneEvent::ColliderEnabledChanged { .. } => {
                EventMask::COLLIDER
            }
            SceneEvent::RigidBodyChanged(_) => EventMask::RIGID_BODY,
            SceneEvent::RigidBodyEnabledChanged(_) => EventMask::RIGID_BODY_ENABLED,
        }
    }
}

/// Receiver of scene events
///
/// Callbacks run while the world is mid-mutation, so implementors must not
/// expect to read the world from inside `on_event`; record what changed and
/// act on it later.
pub trait ChangeObserver {
    /// Called once per matching event
    fn on_event(&self, entity: EntityKey, event: &SceneEvent);
}

new_key_type! {
    /// Key of a registered observer
    struct SubscriberKey;
}

struct Subscriber {
    /// `None` observes every entity
    entity: Option<EntityKey>,
    mask: EventMask,
    muted: EventMask,
    observer: Rc<dyn ChangeObserver>,
}

impl Subscriber {
    fn wants(&self, entity: EntityKey, family: EventMask) -> bool {
        self.entity.map_or(true, |e| e == entity)
            && self.mask.intersects(family)
            && !self.muted.intersects(family)
    }
}

type Registry = RefCell<SlotMap<SubscriberKey, Subscriber>>;

/// Registry of observers, owned by the world
#[derive(Default)]
pub struct EventHub {
    registry: Rc<Registry>,
}

impl EventHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe events of `mask` families on one entity
    pub fn subscribe(
        &self,
        entity: EntityKey,
        mask: EventMask,
        observer: Rc<dyn ChangeObserver>,
    ) -> Subscription {
        self.insert(Some(entity), mask, observer)
    }

    /// Observe events of `mask` families on every entity
    pub fn subscribe_all(&self, mask: EventMask, observer: Rc<dyn ChangeObserver>) -> Subscription {
        self.insert(None, mask, observer)
    }

    fn insert(
        &self,
        entity: Option<EntityKey>,
        mask: EventMask,
        observer: Rc<dyn ChangeObserver>,
    ) -> Subscription {
        let key = self.registry.borrow_mut().insert(Subscriber {
            entity,
            mask,
            muted: EventMask::empty(),
            observer,
        });
        Subscription {
            registry: Rc::downgrade(&self.registry),
            key,
        }
    }

    /// Deliver an event to every interested, unmuted observer
    pub fn emit(&self, entity: EntityKey, event: &SceneEvent) {
        let family = event.mask();
        let targets: Vec<Rc<dyn ChangeObserver>> = self
            .registry
            .borrow()
            .values()
            .filter(|s| s.wants(entity, family))
            .map(|s| Rc::clone(&s.observer))
            .collect();

        for observer in targets {
            observer.on_event(entity, event);
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().len()
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Scoped registration of an observer; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Registry>,
    key: SubscriberKey,
}

impl Subscription {
    /// Whether the observer is still registered with a live hub
    pub fn is_live(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |r| r.borrow().contains_key(self.key))
    }

    /// Suppress delivery of `mask` families to this observer until the guard drops
    ///
    /// Guards nest; each restores the mute state it found.
    pub fn mute(&self, mask: EventMask) -> MuteGuard<'_> {
        let previous = self.update_muted(|muted| *muted |= mask);
        MuteGuard {
            subscription: self,
            previous,
        }
    }

    /// Apply `f` to the muted set, returning the set as it was before
    fn update_muted(&self, f: impl FnOnce(&mut EventMask)) -> EventMask {
        let Some(registry) = self.registry.upgrade() else {
            return EventMask::empty();
        };
        let mut registry = registry.borrow_mut();
        match registry.get_mut(self.key) {
            Some(subscriber) => {
                let previous = subscriber.muted;
                f(&mut subscriber.muted);
                previous
            }
            None => EventMask::empty(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.key);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.is_live())
            .finish()
    }
}

/// Restores a subscription's mute state on drop
pub struct MuteGuard<'a> {
    subscription: &'a Subscription,
    previous: EventMask,
}

impl Drop for MuteGuard<'_> {
    fn drop(&mut self) {
        let previous = self.previous;
        self.subscription.update_muted(|muted| *muted = previous);
    }
}
