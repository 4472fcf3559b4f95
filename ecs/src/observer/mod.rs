//! Observers: runtime callbacks reacting to component lifecycle events.
//!
//! Hooks are fixed per component type. Observers can be added at any time, any number of them
//! per `(event, component)` pair. Adding one raises the matching [`ArchetypeFlags`] on every
//! archetype holding the component, and archetypes created later pick the flag up on creation.
//!
//! # Ordering
//!
//! | Event | Order |
//! |-------|-------|
//! | `OnAdd`, `OnInsert` | hooks, then observers |
//! | `OnReplace`, `OnRemove`, `OnDespawn` | observers, then hooks |
//!
//! Despawning fires `OnDespawn`, then `OnReplace`, then `OnRemove`.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    archetype::ArchetypeFlags,
    component::ComponentId,
    entity::Entity,
    world::DeferredWorld,
};

/// A component lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The component was added to an entity that did not have it.
    OnAdd,
    /// The component was written to an entity, added or replaced.
    OnInsert,
    /// The component value is about to be overwritten or removed. The old value is readable.
    OnReplace,
    /// The component is about to be removed. The value is still readable.
    OnRemove,
    /// The entity holding the component is about to be despawned.
    OnDespawn,
}

impl LifecycleEvent {
    /// Every event, in declaration order.
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::OnAdd,
        LifecycleEvent::OnInsert,
        LifecycleEvent::OnReplace,
        LifecycleEvent::OnRemove,
        LifecycleEvent::OnDespawn,
    ];

    #[inline]
    const fn index(self) -> usize {
        match self {
            LifecycleEvent::OnAdd => 0,
            LifecycleEvent::OnInsert => 1,
            LifecycleEvent::OnReplace => 2,
            LifecycleEvent::OnRemove => 3,
            LifecycleEvent::OnDespawn => 4,
        }
    }

    /// The archetype flag raised when a component has a hook for this event.
    pub const fn hook_flag(self) -> ArchetypeFlags {
        match self {
            LifecycleEvent::OnAdd => ArchetypeFlags::ON_ADD_HOOK,
            LifecycleEvent::OnInsert => ArchetypeFlags::ON_INSERT_HOOK,
            LifecycleEvent::OnReplace => ArchetypeFlags::ON_REPLACE_HOOK,
            LifecycleEvent::OnRemove => ArchetypeFlags::ON_REMOVE_HOOK,
            LifecycleEvent::OnDespawn => ArchetypeFlags::ON_DESPAWN_HOOK,
        }
    }

    /// The archetype flag raised when a component has observers for this event.
    pub const fn observer_flag(self) -> ArchetypeFlags {
        match self {
            LifecycleEvent::OnAdd => ArchetypeFlags::ON_ADD_OBSERVER,
            LifecycleEvent::OnInsert => ArchetypeFlags::ON_INSERT_OBSERVER,
            LifecycleEvent::OnReplace => ArchetypeFlags::ON_REPLACE_OBSERVER,
            LifecycleEvent::OnRemove => ArchetypeFlags::ON_REMOVE_OBSERVER,
            LifecycleEvent::OnDespawn => ArchetypeFlags::ON_DESPAWN_OBSERVER,
        }
    }

    /// Returns `true` if hooks run before observers for this event.
    #[inline]
    pub const fn hooks_first(self) -> bool {
        matches!(self, LifecycleEvent::OnAdd | LifecycleEvent::OnInsert)
    }
}

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u32);

impl ObserverId {
    /// The raw id.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// What an observer is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverTrigger {
    /// The observer being run.
    pub observer: ObserverId,
    /// The event that fired.
    pub event: LifecycleEvent,
    /// The entity the event is about.
    pub entity: Entity,
    /// The component the event is about.
    pub component_id: ComponentId,
}

/// An observer callback.
pub type ObserverCallback = Arc<dyn Fn(DeferredWorld<'_>, ObserverTrigger) + Send + Sync>;

#[derive(Clone)]
struct ObserverEntry {
    id: ObserverId,
    callback: ObserverCallback,
}

/// Every observer of a world, grouped by event and component.
#[derive(Default)]
pub struct Observers {
    by_event: [HashMap<ComponentId, Vec<ObserverEntry>>; 5],
    next_id: u32,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("len", &self.len()).finish()
    }
}

impl Observers {
    /// The number of registered observers.
    pub fn len(&self) -> usize {
        self.by_event
            .iter()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Returns `true` if no observer is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if any observer watches `event` on `component_id`.
    pub fn has_observers(&self, event: LifecycleEvent, component_id: ComponentId) -> bool {
        self.by_event[event.index()]
            .get(&component_id)
            .is_some_and(|entries| !entries.is_empty())
    }

    pub(crate) fn register(
        &mut self,
        event: LifecycleEvent,
        component_id: ComponentId,
        callback: ObserverCallback,
    ) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.by_event[event.index()]
            .entry(component_id)
            .or_default()
            .push(ObserverEntry { id, callback });
        id
    }

    /// Remove an observer. Archetype flags stay raised, triggering then finds no callback.
    pub(crate) fn unregister(&mut self, id: ObserverId) -> bool {
        for map in &mut self.by_event {
            for entries in map.values_mut() {
                if let Some(index) = entries.iter().position(|entry| entry.id == id) {
                    entries.remove(index);
                    return true;
                }
            }
        }
        false
    }

    /// Raise the observer flags of an archetype holding `component_id`.
    pub(crate) fn update_archetype_flags(&self, component_id: ComponentId, flags: &mut ArchetypeFlags) {
        for event in LifecycleEvent::ALL {
            if self.has_observers(event, component_id) {
                flags.insert(event.observer_flag());
            }
        }
    }

    /// Snapshot of the callbacks for `(event, component_id)`, in registration order.
    pub(crate) fn callbacks(
        &self,
        event: LifecycleEvent,
        component_id: ComponentId,
    ) -> Vec<(ObserverId, ObserverCallback)> {
        self.by_event[event.index()]
            .get(&component_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| (entry.id, entry.callback.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback() -> ObserverCallback {
        Arc::new(|_world: DeferredWorld<'_>, _trigger: ObserverTrigger| {})
    }

    #[test]
    fn register_sets_flags_for_event() {
        // Given
        let mut observers = Observers::default();
        let id = ComponentId::new(2);

        // When
        observers.register(LifecycleEvent::OnRemove, id, callback());

        // Then
        let mut flags = ArchetypeFlags::empty();
        observers.update_archetype_flags(id, &mut flags);
        assert!(flags.contains(ArchetypeFlags::ON_REMOVE_OBSERVER));
        assert!(!flags.contains(ArchetypeFlags::ON_ADD_OBSERVER));
        assert!(observers.has_observers(LifecycleEvent::OnRemove, id));
    }

    #[test]
    fn unregister_removes_callback() {
        // Given
        let mut observers = Observers::default();
        let component = ComponentId::new(0);
        let first = observers.register(LifecycleEvent::OnAdd, component, callback());
        let second = observers.register(LifecycleEvent::OnAdd, component, callback());

        // When
        let removed = observers.unregister(first);

        // Then
        assert!(removed);
        assert!(!observers.unregister(first));
        let remaining: Vec<ObserverId> = observers
            .callbacks(LifecycleEvent::OnAdd, component)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(remaining, vec![second]);
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn only_add_and_insert_run_hooks_first() {
        // Then
        assert!(LifecycleEvent::OnAdd.hooks_first());
        assert!(LifecycleEvent::OnInsert.hooks_first());
        assert!(!LifecycleEvent::OnReplace.hooks_first());
        assert!(!LifecycleEvent::OnRemove.hooks_first());
        assert!(!LifecycleEvent::OnDespawn.hooks_first());
    }
}
