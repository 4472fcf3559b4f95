use std::ops::Deref;

use crate::{
    archetype::ArchetypeFlags,
    change_detection::{Mut, ResMut},
    component::{Component, ComponentId, HookContext, Mutable},
    entity::Entity,
    observer::{LifecycleEvent, ObserverTrigger},
    resource::Resource,
    world::World,
};

/// A [`World`] that can read everything and mutate values, but never move an entity.
///
/// Hooks and observers run in the middle of an archetype move, so spawning, inserting, removing
/// and despawning are not reachable from here. Everything readable on [`World`] is reachable
/// through `Deref`.
pub struct DeferredWorld<'w> {
    world: &'w mut World,
}

impl<'w> From<&'w mut World> for DeferredWorld<'w> {
    fn from(world: &'w mut World) -> Self {
        Self { world }
    }
}

impl Deref for DeferredWorld<'_> {
    type Target = World;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.world
    }
}

impl<'w> DeferredWorld<'w> {
    /// A shorter lived copy, for handing to a callee.
    #[inline]
    pub fn reborrow(&mut self) -> DeferredWorld<'_> {
        DeferredWorld {
            world: &mut *self.world,
        }
    }

    /// Mutable access to a component of `entity`.
    #[inline]
    pub fn get_mut<T: Component<Mutability = Mutable>>(
        &mut self,
        entity: Entity,
    ) -> Option<Mut<'_, T>> {
        self.world.get_mut(entity)
    }

    /// Mutable access to a resource.
    ///
    /// # Panics
    ///
    /// Panics if the resource does not exist.
    #[inline]
    pub fn resource_mut<R: Resource>(&mut self) -> ResMut<'_, R> {
        self.world.resource_mut()
    }

    /// Mutable access to a resource, if it exists.
    #[inline]
    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<ResMut<'_, R>> {
        self.world.get_resource_mut()
    }

    /// Run the hooks and observers of `event` for every component in `targets`.
    ///
    /// `flags` are the flags of the archetype the components live in; events nobody listens to
    /// are skipped without looking anything up.
    pub(crate) fn trigger_lifecycle_event(
        &mut self,
        event: LifecycleEvent,
        flags: ArchetypeFlags,
        entity: Entity,
        targets: impl Iterator<Item = ComponentId> + Clone,
    ) {
        let run_hooks = flags.contains(event.hook_flag());
        let run_observers = flags.contains(event.observer_flag());
        if event.hooks_first() {
            if run_hooks {
                self.run_hooks(event, entity, targets.clone());
            }
            if run_observers {
                self.run_observers(event, entity, targets);
            }
        } else {
            if run_observers {
                self.run_observers(event, entity, targets.clone());
            }
            if run_hooks {
                self.run_hooks(event, entity, targets);
            }
        }
    }

    fn run_hooks(
        &mut self,
        event: LifecycleEvent,
        entity: Entity,
        targets: impl Iterator<Item = ComponentId>,
    ) {
        for component_id in targets {
            let hook = self
                .world
                .components
                .get_info(component_id)
                .and_then(|info| info.hooks().get(event));
            if let Some(hook) = hook {
                hook(
                    self.reborrow(),
                    HookContext {
                        entity,
                        component_id,
                    },
                );
            }
        }
    }

    fn run_observers(
        &mut self,
        event: LifecycleEvent,
        entity: Entity,
        targets: impl Iterator<Item = ComponentId>,
    ) {
        for component_id in targets {
            for (observer, callback) in self.world.observers.callbacks(event, component_id) {
                callback(
                    self.reborrow(),
                    ObserverTrigger {
                        observer,
                        event,
                        entity,
                        component_id,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);

    impl Component for Health {
        type Mutability = Mutable;
    }

    #[test]
    fn deferred_world_mutates_values() {
        // Given
        let mut world = World::new();
        let entity = world.spawn(Health(10));

        // When
        let mut deferred = DeferredWorld::from(&mut world);
        deferred.get_mut::<Health>(entity).unwrap().0 = 5;

        // Then
        assert_eq!(world.get::<Health>(entity), Some(&Health(5)));
    }

    #[test]
    fn observers_run_when_flag_is_raised() {
        // Given
        let mut world = World::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let id = world.register_component::<Health>();
        let observed = order.clone();
        world.add_observer(
            LifecycleEvent::OnRemove,
            id,
            move |_world: DeferredWorld<'_>, _trigger: ObserverTrigger| {
                observed.lock().unwrap().push("observer");
            },
        );
        let mut flags = ArchetypeFlags::empty();
        flags.insert(LifecycleEvent::OnRemove.observer_flag());
        let entity = world.spawn(Health(1));

        // When
        DeferredWorld::from(&mut world).trigger_lifecycle_event(
            LifecycleEvent::OnRemove,
            flags,
            entity,
            [id].into_iter(),
        );

        // Then
        assert_eq!(*order.lock().unwrap(), vec!["observer"]);
    }

    #[test]
    fn unflagged_events_are_skipped() {
        // Given
        let mut world = World::new();
        let calls = Arc::new(Mutex::new(0));
        let id = world.register_component::<Health>();
        let counted = calls.clone();
        world.add_observer(
            LifecycleEvent::OnAdd,
            id,
            move |_world: DeferredWorld<'_>, _trigger: ObserverTrigger| {
                *counted.lock().unwrap() += 1;
            },
        );
        let entity = world.spawn(Health(1));
        *calls.lock().unwrap() = 0;

        // When
        DeferredWorld::from(&mut world).trigger_lifecycle_event(
            LifecycleEvent::OnAdd,
            ArchetypeFlags::empty(),
            entity,
            [id].into_iter(),
        );

        // Then
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
