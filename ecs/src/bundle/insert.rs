use std::sync::Arc;

use crate::{
    archetype::{ArchetypeAfterBundleInsert, ArchetypeId},
    bundle::{Bundle, BundleError, BundleId, ComponentWriter, DynamicBundle, InsertMode, writer},
    entity::{Entity, EntityLocation},
    observer::LifecycleEvent,
    storage::TableId,
    world::{DeferredWorld, World},
};

/// How an insert moves its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchetypeMoveType {
    /// Every component already exists, values are written in place.
    SameArchetype,
    /// Only sparse set components are added, the table row stays put.
    NewArchetypeSameTable,
    /// The row migrates to a wider table.
    NewArchetypeNewTable,
}

/// Inserts one bundle type into entities of one source archetype.
pub(crate) struct BundleInserter {
    bundle_id: BundleId,
    archetype_id: ArchetypeId,
    table_id: TableId,
    new_archetype_id: ArchetypeId,
    new_table_id: TableId,
    after: Arc<ArchetypeAfterBundleInsert>,
    move_type: ArchetypeMoveType,
}

impl BundleInserter {
    pub(crate) fn new<T: Bundle>(
        world: &mut World,
        archetype_id: ArchetypeId,
    ) -> Result<Self, BundleError> {
        let bundle_id = world.register_bundle::<T>()?;
        Ok(Self::new_with_id(world, archetype_id, bundle_id))
    }

    pub(crate) fn new_with_id(
        world: &mut World,
        archetype_id: ArchetypeId,
        bundle_id: BundleId,
    ) -> Self {
        let new_archetype_id = world.bundles[bundle_id].insert_bundle_into_archetype(
            &mut world.archetypes,
            &mut world.storages,
            &world.components,
            &world.observers,
            archetype_id,
        );
        let after = world.archetypes[archetype_id]
            .edges()
            .get_archetype_after_bundle_insert(bundle_id)
            .cloned()
            .unwrap_or_else(|| panic!("insert edge for {bundle_id:?} was just cached"));
        let table_id = world.archetypes[archetype_id].table_id();
        let new_table_id = world.archetypes[new_archetype_id].table_id();
        let move_type = if new_archetype_id == archetype_id {
            ArchetypeMoveType::SameArchetype
        } else if new_table_id == table_id {
            ArchetypeMoveType::NewArchetypeSameTable
        } else {
            ArchetypeMoveType::NewArchetypeNewTable
        };
        Self {
            bundle_id,
            archetype_id,
            table_id,
            new_archetype_id,
            new_table_id,
            after,
            move_type,
        }
    }

    /// Write `bundle` to `entity`, which lives at `location` in the source archetype.
    ///
    /// With [`InsertMode::Replace`], `OnReplace` fires for existing components before anything
    /// is written. Afterwards `OnAdd` fires for added components and `OnInsert` for every written
    /// one.
    pub(crate) fn insert<T: DynamicBundle>(
        &self,
        world: &mut World,
        entity: Entity,
        location: EntityLocation,
        bundle: T,
        mode: InsertMode,
    ) -> (EntityLocation, T::Effect) {
        debug_assert_eq!(location.archetype_id, self.archetype_id);
        if mode == InsertMode::Replace {
            let flags = world.archetypes[self.archetype_id].flags();
            DeferredWorld::from(&mut *world).trigger_lifecycle_event(
                LifecycleEvent::OnReplace,
                flags,
                entity,
                self.after.iter_existing(),
            );
        }

        let change_tick = world.change_tick();
        let (new_location, effect) = match self.move_type {
            ArchetypeMoveType::SameArchetype => {
                let effect = writer::write_components(
                    ComponentWriter::new(
                        &mut world.storages.tables[self.table_id],
                        location.table_row,
                        &mut world.storages.sparse_sets,
                        entity,
                        change_tick,
                    ),
                    world.bundles[self.bundle_id].explicit_components(),
                    &*self.after,
                    mode,
                    &self.after.required_components,
                    bundle,
                );
                (location, effect)
            }
            ArchetypeMoveType::NewArchetypeSameTable => {
                let result = world.archetypes[self.archetype_id].swap_remove(location.archetype_row);
                if let Some(swapped) = result.swapped_entity {
                    world.update_archetype_row(swapped, location.archetype_row);
                }
                let new_location =
                    world.archetypes[self.new_archetype_id].allocate(entity, result.table_row);
                world.entities.set(entity.index(), new_location);
                let effect = writer::write_components(
                    ComponentWriter::new(
                        &mut world.storages.tables[self.new_table_id],
                        result.table_row,
                        &mut world.storages.sparse_sets,
                        entity,
                        change_tick,
                    ),
                    world.bundles[self.bundle_id].explicit_components(),
                    &*self.after,
                    mode,
                    &self.after.required_components,
                    bundle,
                );
                (new_location, effect)
            }
            ArchetypeMoveType::NewArchetypeNewTable => {
                let result = world.archetypes[self.archetype_id].swap_remove(location.archetype_row);
                if let Some(swapped) = result.swapped_entity {
                    world.update_archetype_row(swapped, location.archetype_row);
                }
                let (table, new_table) = world
                    .storages
                    .tables
                    .get_2_mut(self.table_id, self.new_table_id);
                let moved = table.move_to_superset(result.table_row, new_table);
                let new_location =
                    world.archetypes[self.new_archetype_id].allocate(entity, moved.new_row);
                world.entities.set(entity.index(), new_location);
                if let Some(swapped) = moved.swapped_entity {
                    world.update_table_row(swapped, result.table_row);
                }
                let effect = writer::write_components(
                    ComponentWriter::new(
                        &mut world.storages.tables[self.new_table_id],
                        moved.new_row,
                        &mut world.storages.sparse_sets,
                        entity,
                        change_tick,
                    ),
                    world.bundles[self.bundle_id].explicit_components(),
                    &*self.after,
                    mode,
                    &self.after.required_components,
                    bundle,
                );
                (new_location, effect)
            }
        };

        let flags = world.archetypes[self.new_archetype_id].flags();
        let mut deferred = DeferredWorld::from(&mut *world);
        deferred.trigger_lifecycle_event(
            LifecycleEvent::OnAdd,
            flags,
            entity,
            self.after.iter_added(),
        );
        match mode {
            InsertMode::Replace => deferred.trigger_lifecycle_event(
                LifecycleEvent::OnInsert,
                flags,
                entity,
                self.after.iter_inserted(),
            ),
            InsertMode::Keep => deferred.trigger_lifecycle_event(
                LifecycleEvent::OnInsert,
                flags,
                entity,
                self.after.iter_added(),
            ),
        }
        (new_location, effect)
    }
}
