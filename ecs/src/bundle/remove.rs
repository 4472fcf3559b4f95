use std::any::Any;

use crate::{
    archetype::ArchetypeId,
    bundle::{Bundle, BundleError, ComponentSource},
    component::{Component, ComponentId, Components, StorageType},
    entity::{Entity, EntityLocation},
    observer::LifecycleEvent,
    storage::TableId,
    world::{DeferredWorld, World},
};

/// Values pulled out of storage by a take, keyed by component.
pub(crate) type TakenComponents = Vec<(ComponentId, Box<dyn Any + Send + Sync>)>;

/// Removes one bundle type from entities of one source archetype.
pub(crate) struct BundleRemover {
    archetype_id: ArchetypeId,
    table_id: TableId,
    new_archetype_id: ArchetypeId,
    new_table_id: TableId,
    removed_table_components: bool,
    removed: Box<[ComponentId]>,
    removed_sparse: Box<[ComponentId]>,
}

impl BundleRemover {
    /// Prepare removing `T` from entities of `archetype_id`.
    ///
    /// With `intersection`, only the part of `T` the archetype has is removed. Without it,
    /// `Ok(None)` is returned unless the archetype has all of `T`.
    pub(crate) fn new<T: Bundle>(
        world: &mut World,
        archetype_id: ArchetypeId,
        intersection: bool,
    ) -> Result<Option<Self>, BundleError> {
        let bundle_id = world.register_bundle::<T>()?;
        let Some(new_archetype_id) = world.bundles[bundle_id].remove_bundle_from_archetype(
            &mut world.archetypes,
            &mut world.storages,
            &world.components,
            &world.observers,
            archetype_id,
            intersection,
        ) else {
            return Ok(None);
        };

        let archetype = &world.archetypes[archetype_id];
        let mut removed = Vec::new();
        let mut removed_sparse = Vec::new();
        let mut removed_table_components = false;
        for &component_id in world.bundles[bundle_id].explicit_components() {
            match archetype.get_storage_type(component_id) {
                Some(StorageType::Table) => {
                    removed.push(component_id);
                    removed_table_components = true;
                }
                Some(StorageType::SparseSet) => {
                    removed.push(component_id);
                    removed_sparse.push(component_id);
                }
                None => {}
            }
        }
        Ok(Some(Self {
            archetype_id,
            table_id: archetype.table_id(),
            new_archetype_id,
            new_table_id: world.archetypes[new_archetype_id].table_id(),
            removed_table_components,
            removed: removed.into(),
            removed_sparse: removed_sparse.into(),
        }))
    }

    /// Remove the bundle from `entity`, which lives at `location` in the source archetype.
    ///
    /// Fires `OnReplace` then `OnRemove` for the removed components while they are still
    /// readable. With `take`, the removed values are returned instead of dropped.
    pub(crate) fn remove(
        &self,
        world: &mut World,
        entity: Entity,
        location: EntityLocation,
        take: bool,
    ) -> (EntityLocation, TakenComponents) {
        debug_assert_eq!(location.archetype_id, self.archetype_id);
        if self.removed.is_empty() {
            return (location, Vec::new());
        }

        let flags = world.archetypes[self.archetype_id].flags();
        let mut deferred = DeferredWorld::from(&mut *world);
        deferred.trigger_lifecycle_event(
            LifecycleEvent::OnReplace,
            flags,
            entity,
            self.removed.iter().copied(),
        );
        deferred.trigger_lifecycle_event(
            LifecycleEvent::OnRemove,
            flags,
            entity,
            self.removed.iter().copied(),
        );

        let mut taken = Vec::new();
        for &component_id in self.removed_sparse.iter() {
            let Some(set) = world.storages.sparse_sets.get_mut(component_id) else {
                continue;
            };
            if take {
                if let Some(value) = set.remove_and_take(entity) {
                    taken.push((component_id, value));
                }
            } else {
                set.remove(entity);
            }
        }

        let result = world.archetypes[self.archetype_id].swap_remove(location.archetype_row);
        if let Some(swapped) = result.swapped_entity {
            world.update_archetype_row(swapped, location.archetype_row);
        }

        let new_location = if !self.removed_table_components {
            world.archetypes[self.new_archetype_id].allocate(entity, result.table_row)
        } else {
            let (table, new_table) = world
                .storages
                .tables
                .get_2_mut(self.table_id, self.new_table_id);
            let moved = if take {
                let (moved, values) = table.move_to_and_take_missing(result.table_row, new_table);
                taken.extend(values);
                moved
            } else {
                table.move_to_and_drop_missing(result.table_row, new_table)
            };
            let new_location = world.archetypes[self.new_archetype_id].allocate(entity, moved.new_row);
            if let Some(swapped) = moved.swapped_entity {
                world.update_table_row(swapped, result.table_row);
            }
            new_location
        };
        world.entities.set(entity.index(), new_location);
        (new_location, taken)
    }
}

/// Rebuilds a bundle from values a take pulled out of storage.
pub(crate) struct TakenSource<'a> {
    components: &'a Components,
    taken: TakenComponents,
}

impl<'a> TakenSource<'a> {
    pub(crate) fn new(components: &'a Components, taken: TakenComponents) -> Self {
        Self { components, taken }
    }
}

impl ComponentSource for TakenSource<'_> {
    fn take<C: Component>(&mut self) -> C {
        let component_id = self
            .components
            .valid_component_id::<C>()
            .unwrap_or_else(|| panic!("taken component {} is not registered", std::any::type_name::<C>()));
        let index = self
            .taken
            .iter()
            .position(|(id, _)| *id == component_id)
            .unwrap_or_else(|| panic!("component {} was not taken", std::any::type_name::<C>()));
        let (_, value) = self.taken.swap_remove(index);
        match value.downcast::<C>() {
            Ok(value) => *value,
            Err(_) => panic!("taken value is not a {}", std::any::type_name::<C>()),
        }
    }
}
