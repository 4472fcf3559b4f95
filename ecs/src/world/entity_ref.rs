use std::any::Any;

use crate::{
    archetype::Archetype,
    change_detection::{ComponentTicks, Ref, Ticks},
    component::{Component, ComponentId},
    entity::{Entity, EntityLocation},
    world::World,
};

/// Read-only access to every component of one entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    entity: Entity,
    location: EntityLocation,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(world: &'w World, entity: Entity, location: EntityLocation) -> Self {
        Self {
            world,
            entity,
            location,
        }
    }

    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    #[inline]
    pub fn location(&self) -> EntityLocation {
        self.location
    }

    /// The archetype the entity belongs to.
    #[inline]
    pub fn archetype(&self) -> &'w Archetype {
        &self.world.archetypes[self.location.archetype_id]
    }

    /// Returns `true` if the entity has a `T`.
    #[inline]
    pub fn contains<T: Component>(&self) -> bool {
        self.world
            .components
            .valid_component_id::<T>()
            .is_some_and(|id| self.contains_id(id))
    }

    /// Returns `true` if the entity has the component `component_id`.
    #[inline]
    pub fn contains_id(&self, component_id: ComponentId) -> bool {
        self.archetype().contains(component_id)
    }

    pub fn get<T: Component>(&self) -> Option<&'w T> {
        let component_id = self.world.components.valid_component_id::<T>()?;
        self.world
            .storages
            .get_with_ticks::<T>(component_id, T::STORAGE_TYPE, self.entity, self.location)
            .map(|(value, _, _)| value)
    }

    /// The component together with its change ticks, seen from the world's last clear.
    pub fn get_ref<T: Component>(&self) -> Option<Ref<'w, T>> {
        let component_id = self.world.components.valid_component_id::<T>()?;
        let (value, added, changed) = self.world.storages.get_with_ticks::<T>(
            component_id,
            T::STORAGE_TYPE,
            self.entity,
            self.location,
        )?;
        Some(Ref::new(
            value,
            Ticks {
                added,
                changed,
                last_run: self.world.last_change_tick(),
                this_run: self.world.read_change_tick(),
            },
        ))
    }

    /// The component `component_id`, type-erased.
    pub fn get_by_id(&self, component_id: ComponentId) -> Option<ComponentRef<'w>> {
        let storage_type = self.archetype().get_storage_type(component_id)?;
        let (value, ticks) = self.world.storages.get_any_with_ticks(
            component_id,
            storage_type,
            self.entity,
            self.location,
        )?;
        Some(ComponentRef::new(component_id, value, ticks))
    }

    /// Ids of every component of the entity.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + 'w {
        self.archetype().components()
    }
}

impl std::fmt::Debug for EntityRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRef")
            .field("entity", &self.entity)
            .field("location", &self.location)
            .finish()
    }
}

/// A type-erased, read-only component value and its ticks.
#[derive(Clone, Copy)]
pub struct ComponentRef<'w> {
    component_id: ComponentId,
    value: &'w dyn Any,
    ticks: ComponentTicks,
}

impl<'w> ComponentRef<'w> {
    pub(crate) fn new(component_id: ComponentId, value: &'w dyn Any, ticks: ComponentTicks) -> Self {
        Self {
            component_id,
            value,
            ticks,
        }
    }

    #[inline]
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    #[inline]
    pub fn ticks(&self) -> ComponentTicks {
        self.ticks
    }

    #[inline]
    pub fn as_any(&self) -> &'w dyn Any {
        self.value
    }

    /// The value as a `T`, if that is what it is.
    #[inline]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&'w T> {
        self.value.downcast_ref()
    }
}

impl std::fmt::Debug for ComponentRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRef")
            .field("component_id", &self.component_id)
            .field("ticks", &self.ticks)
            .finish()
    }
}
