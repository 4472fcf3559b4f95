use std::sync::Arc;

use crate::{
    archetype::{ArchetypeAfterBundleInsert, ArchetypeId, SpawnBundleStatus},
    bundle::{Bundle, BundleError, BundleId, ComponentWriter, DynamicBundle, InsertMode, writer},
    entity::{Entity, EntityLocation},
    observer::LifecycleEvent,
    storage::TableId,
    world::{DeferredWorld, World},
};

/// Spawns entities of one bundle type into the archetype that bundle leads to from
/// [`ArchetypeId::EMPTY`].
pub(crate) struct BundleSpawner {
    bundle_id: BundleId,
    archetype_id: ArchetypeId,
    table_id: TableId,
    after: Arc<ArchetypeAfterBundleInsert>,
}

impl BundleSpawner {
    pub(crate) fn new<T: Bundle>(world: &mut World) -> Result<Self, BundleError> {
        let bundle_id = world.register_bundle::<T>()?;
        Ok(Self::new_with_id(world, bundle_id))
    }

    pub(crate) fn new_with_id(world: &mut World, bundle_id: BundleId) -> Self {
        let archetype_id = world.bundles[bundle_id].insert_bundle_into_archetype(
            &mut world.archetypes,
            &mut world.storages,
            &world.components,
            &world.observers,
            ArchetypeId::EMPTY,
        );
        let after = world
            .archetypes
            .empty()
            .edges()
            .get_archetype_after_bundle_insert(bundle_id)
            .cloned()
            .unwrap_or_else(|| panic!("insert edge for {bundle_id:?} was just cached"));
        let table_id = world.archetypes[archetype_id].table_id();
        Self {
            bundle_id,
            archetype_id,
            table_id,
            after,
        }
    }

    pub(crate) fn reserve_storage(&self, world: &mut World, additional: usize) {
        world.archetypes[self.archetype_id].reserve(additional);
        world.storages.tables[self.table_id].reserve(additional);
    }

    /// Store `bundle` for `entity`, which must be allocated but not yet stored anywhere.
    ///
    /// Fires `OnAdd` then `OnInsert` for every component, required ones included.
    pub(crate) fn spawn_non_existent<T: DynamicBundle>(
        &self,
        world: &mut World,
        entity: Entity,
        bundle: T,
    ) -> (EntityLocation, T::Effect) {
        let change_tick = world.change_tick();
        let table = &mut world.storages.tables[self.table_id];
        let table_row = table.allocate(entity);
        let effect = writer::write_components(
            ComponentWriter::new(
                table,
                table_row,
                &mut world.storages.sparse_sets,
                entity,
                change_tick,
            ),
            world.bundles[self.bundle_id].explicit_components(),
            &SpawnBundleStatus,
            InsertMode::Replace,
            &self.after.required_components,
            bundle,
        );
        let archetype = &mut world.archetypes[self.archetype_id];
        let location = archetype.allocate(entity, table_row);
        let flags = archetype.flags();
        world.entities.set(entity.index(), location);

        let mut deferred = DeferredWorld::from(&mut *world);
        deferred.trigger_lifecycle_event(
            LifecycleEvent::OnAdd,
            flags,
            entity,
            self.after.iter_added(),
        );
        deferred.trigger_lifecycle_event(
            LifecycleEvent::OnInsert,
            flags,
            entity,
            self.after.iter_inserted(),
        );
        (location, effect)
    }
}
