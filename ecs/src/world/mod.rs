//! The World owns every entity, component, resource and observer.
//!
//! A `World` coordinates several subsystems:
//! - **Entities**: generational ids and their storage locations
//! - **Components**: type metadata, hooks and required components
//! - **Archetypes**: component signatures and their transition edges
//! - **Storages**: tables, sparse sets and resources holding the values
//! - **Bundles**: cached metadata for every bundle type ever inserted
//! - **Observers**: runtime callbacks for component lifecycle events
//!
//! Structural changes (spawn, insert, remove, despawn) take `&mut World`. Hooks and observers
//! run in the middle of those and get a [`DeferredWorld`], which can only touch values.
//!
//! # Example
//!
//! ```ignore
//! use rusty_ecs::prelude::*;
//!
//! let mut world = World::new();
//!
//! // Spawn an entity with components
//! let entity = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 0.0 }));
//!
//! // Access the entity
//! if let Some(entity_ref) = world.entity(entity) {
//!     let pos = entity_ref.get::<Position>().unwrap();
//! }
//!
//! // Despawn the entity
//! world.despawn(entity);
//! ```
mod deferred;
mod entity_ref;
mod error;

use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

use log::{trace, warn};

use crate::{
    archetype::{ArchetypeId, ArchetypeRow, Archetypes},
    bundle::{
        Bundle, BundleEffect, BundleError, BundleId, BundleInserter, BundleRemover, BundleSpawner,
        Bundles, InsertMode, TakenSource,
    },
    change_detection::{
        CHECK_TICK_THRESHOLD, CheckChangeTicks, Mut, Ref, Res, ResMut, Tick, Ticks, TicksMut,
    },
    component::{
        Component, ComponentDescriptor, ComponentHooks, ComponentId, Components,
        ComponentsRegistrator, HookError, Mutable, RequiredComponentConstructor,
        RequiredComponentsError,
    },
    entity::{Entities, Entity, EntityLocation},
    observer::{LifecycleEvent, ObserverId, ObserverTrigger, Observers},
    query::{QueryData, QueryFilter, QueryState},
    resource::Resource,
    storage::{Storages, TableId, TableRow},
};

pub use deferred::DeferredWorld;
pub use entity_ref::{ComponentRef, EntityRef};
pub use error::{EntityError, WorldError};

/// A world identifier, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorldId(usize);

impl WorldId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        WorldId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw identifier value.
    #[inline]
    pub const fn id(&self) -> usize {
        self.0
    }
}

/// The central container for entities, their components, and resources.
pub struct World {
    id: WorldId,
    pub(crate) entities: Entities,
    pub(crate) components: Components,
    pub(crate) archetypes: Archetypes,
    pub(crate) storages: Storages,
    pub(crate) bundles: Bundles,
    pub(crate) observers: Observers,
    change_tick: AtomicU32,
    last_change_tick: Tick,
    last_check_tick: Tick,
}

impl Default for World {
    fn default() -> Self {
        Self {
            id: WorldId::next(),
            entities: Entities::new(),
            components: Components::new(),
            archetypes: Archetypes::new(),
            storages: Storages::default(),
            bundles: Bundles::default(),
            observers: Observers::default(),
            // Ticks start at 1 so everything stored is newer than a fresh `last_run` of 0.
            change_tick: AtomicU32::new(1),
            last_change_tick: Tick::new(0),
            last_check_tick: Tick::new(0),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entity_count", &self.entities.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_count", &self.components.len())
            .field("resource_count", &self.storages.resources.len())
            .finish()
    }
}

impl World {
    /// An empty world with a fresh [`WorldId`]. Only the empty archetype and table exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id [`QueryState`]s use to check they are run against the world that built them.
    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Entity metadata: generations and the location of every live entity.
    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Registered components and resources, with their hooks and required components.
    #[inline]
    pub fn components(&self) -> &Components {
        &self.components
    }

    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    /// Raw tables, sparse sets and resources.
    #[inline]
    pub fn storages(&self) -> &Storages {
        &self.storages
    }

    #[inline]
    pub fn bundles(&self) -> &Bundles {
        &self.bundles
    }

    #[inline]
    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// A registrator for components that need more than [`World::register_component`].
    #[inline]
    pub fn components_registrator(&mut self) -> ComponentsRegistrator<'_> {
        ComponentsRegistrator::new(&mut self.components)
    }

    /// Register `T`, returning its id. Registering twice returns the same id.
    pub fn register_component<T: Component>(&mut self) -> ComponentId {
        self.components_registrator().register_component::<T>()
    }

    /// Register a component described at runtime.
    pub fn register_component_with_descriptor(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> ComponentId {
        self.components_registrator()
            .register_component_with_descriptor(descriptor)
    }

    /// Register the resource `R`, returning its id.
    pub fn register_resource<R: Resource>(&mut self) -> ComponentId {
        self.components_registrator().register_resource::<R>()
    }

    /// The id of `T`, if it was registered or queued.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.components.component_id::<T>()
    }

    /// Register the bundle type `T` and every component in it.
    pub fn register_bundle<T: Bundle>(&mut self) -> Result<BundleId, BundleError> {
        self.bundles.register_info::<T>(
            &mut ComponentsRegistrator::new(&mut self.components),
            &mut self.storages,
        )
    }

    /// Make `T` require `R`, built with `R::default()`.
    ///
    /// # Panics
    ///
    /// Panics where [`World::try_register_required_components`] would fail.
    pub fn register_required_components<T: Component, R: Component + Default>(&mut self) {
        self.try_register_required_components::<T, R>()
            .unwrap_or_else(|error| panic!("{error}"));
    }

    /// Make `T` require `R`, built with `R::default()`.
    pub fn try_register_required_components<T: Component, R: Component + Default>(
        &mut self,
    ) -> Result<(), RequiredComponentsError> {
        self.try_register_required_components_with::<T, R>(R::default)
    }

    /// Make `T` require `R`, built with `constructor`.
    ///
    /// Fails without changing anything if the requirement is cyclic, already registered, or if
    /// `T` is already stored in an archetype built from its old requirements. Bundles registered
    /// earlier that hold `T`, or a component requiring `T`, pick up the new requirement.
    pub fn try_register_required_components_with<T: Component, R: Component>(
        &mut self,
        constructor: impl Fn() -> R + Send + Sync + 'static,
    ) -> Result<(), RequiredComponentsError> {
        let requiree = self.register_component::<T>();
        if !self.archetypes.archetypes_with(requiree).is_empty() {
            return Err(RequiredComponentsError::ArchetypeExists(
                self.components.display_name(requiree),
            ));
        }
        let required = self.register_component::<R>();
        trace!(
            "registering {} as required by {}",
            self.components.display_name(required),
            self.components.display_name(requiree)
        );
        self.components.register_required_components(
            requiree,
            required,
            RequiredComponentConstructor::new(required, constructor),
        )?;

        let mut changed = vec![requiree];
        if let Some(info) = self.components.get_info(requiree) {
            changed.extend(info.required_by().iter().copied());
        }
        self.bundles
            .refresh_required_components(&self.components, &mut self.storages, &changed);
        Ok(())
    }

    /// The hooks of `T`, for setting them at runtime.
    ///
    /// # Panics
    ///
    /// Panics if `T` is already stored in an archetype.
    pub fn register_component_hooks<T: Component>(&mut self) -> &mut ComponentHooks {
        self.try_register_component_hooks::<T>()
            .unwrap_or_else(|error| panic!("{error}"))
    }

    /// The hooks of `T`, unless `T` is already stored in an archetype.
    pub fn try_register_component_hooks<T: Component>(
        &mut self,
    ) -> Result<&mut ComponentHooks, HookError> {
        let component_id = self.register_component::<T>();
        self.try_register_component_hooks_by_id(component_id)
    }

    /// The hooks of the component `component_id`, unless it is already stored in an archetype.
    ///
    /// # Panics
    ///
    /// Panics if `component_id` is not registered.
    pub fn try_register_component_hooks_by_id(
        &mut self,
        component_id: ComponentId,
    ) -> Result<&mut ComponentHooks, HookError> {
        if !self.archetypes.archetypes_with(component_id).is_empty() {
            return Err(HookError::ComponentInUse(
                self.components.display_name(component_id),
            ));
        }
        Ok(self
            .components
            .get_hooks_mut(component_id)
            .unwrap_or_else(|| panic!("component {component_id:?} is not registered")))
    }

    /// Run `callback` every time `event` fires for `component_id`.
    pub fn add_observer(
        &mut self,
        event: LifecycleEvent,
        component_id: ComponentId,
        callback: impl Fn(DeferredWorld<'_>, ObserverTrigger) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = self
            .observers
            .register(event, component_id, Arc::new(callback));
        self.archetypes
            .raise_flag(component_id, event.observer_flag());
        id
    }

    /// Run `callback` every time `event` fires for `T`.
    pub fn observe<T: Component>(
        &mut self,
        event: LifecycleEvent,
        callback: impl Fn(DeferredWorld<'_>, ObserverTrigger) + Send + Sync + 'static,
    ) -> ObserverId {
        let component_id = self.register_component::<T>();
        self.add_observer(event, component_id, callback)
    }

    /// Stop an observer. Returns `false` if it was already gone.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    /// Give storage to reserved entities and finish queued component registrations.
    ///
    /// Reserved entities land in the empty archetype.
    pub fn flush(&mut self) {
        let empty_archetype = self.archetypes.empty_mut();
        let empty_table = &mut self.storages.tables[TableId::EMPTY];
        self.entities.flush(|entity, location| {
            let table_row = empty_table.allocate(entity);
            *location = empty_archetype.allocate(entity, table_row);
        });
        if self.components.any_queued() {
            self.components_registrator().apply_queued_registrations();
        }
    }

    /// Reserve an entity from `&self`. It becomes addressable on the next [`World::flush`].
    #[inline]
    pub fn reserve_entity(&self) -> Entity {
        self.entities.reserve_entity()
    }

    /// Spawn an entity with `bundle` and every component it requires.
    ///
    /// # Panics
    ///
    /// Panics if the bundle holds the same component twice.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        self.try_spawn(bundle)
            .unwrap_or_else(|error| panic!("{error}"))
    }

    /// Spawn an entity with `bundle` and every component it requires.
    pub fn try_spawn<B: Bundle>(&mut self, bundle: B) -> Result<Entity, WorldError> {
        self.flush();
        let spawner = BundleSpawner::new::<B>(self)?;
        let entity = self.entities.alloc();
        let (_location, effect) = spawner.spawn_non_existent(self, entity, bundle);
        effect.apply(self, entity);
        Ok(entity)
    }

    /// Spawn an entity without components.
    pub fn spawn_empty(&mut self) -> Entity {
        self.flush();
        let entity = self.entities.alloc();
        let table_row = self.storages.tables[TableId::EMPTY].allocate(entity);
        let location = self.archetypes.empty_mut().allocate(entity, table_row);
        self.entities.set(entity.index(), location);
        entity
    }

    /// Spawn one entity per bundle.
    ///
    /// # Panics
    ///
    /// Panics if the bundle type holds the same component twice.
    pub fn spawn_batch<I>(&mut self, bundles: I) -> Vec<Entity>
    where
        I: IntoIterator,
        I::Item: Bundle,
    {
        self.flush();
        let spawner = BundleSpawner::new::<I::Item>(self).unwrap_or_else(|error| panic!("{error}"));
        let bundles = bundles.into_iter();
        let (lower, _) = bundles.size_hint();
        spawner.reserve_storage(self, lower);
        let mut entities = Vec::with_capacity(lower);
        for bundle in bundles {
            let entity = self.entities.alloc();
            let (_location, effect) = spawner.spawn_non_existent(self, entity, bundle);
            effect.apply(self, entity);
            entities.push(entity);
        }
        entities
    }

    fn location_of(&self, entity: Entity) -> Result<EntityLocation, EntityError> {
        self.entities.get(entity).ok_or_else(|| {
            warn!("entity {entity} does not exist");
            EntityError::NoSuchEntity(entity)
        })
    }

    /// Insert `bundle` into `entity`, moving it to a new archetype if needed.
    ///
    /// With [`InsertMode::Keep`], components the entity already has keep their value.
    pub fn insert<B: Bundle>(
        &mut self,
        entity: Entity,
        bundle: B,
        mode: InsertMode,
    ) -> Result<(), WorldError> {
        self.flush();
        let location = self.location_of(entity)?;
        let inserter = BundleInserter::new::<B>(self, location.archetype_id)?;
        let (_location, effect) = inserter.insert(self, entity, location, bundle, mode);
        effect.apply(self, entity);
        Ok(())
    }

    /// Remove the components of `B` that `entity` has, dropping them.
    pub fn remove<B: Bundle>(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.flush();
        let location = self.location_of(entity)?;
        if let Some(remover) = BundleRemover::new::<B>(self, location.archetype_id, true)? {
            remover.remove(self, entity, location, false);
        }
        Ok(())
    }

    /// Remove `B` from `entity` and return it, if `entity` has all of `B`.
    ///
    /// # Panics
    ///
    /// Panics if the bundle holds the same component twice.
    pub fn take<B: Bundle>(&mut self, entity: Entity) -> Option<B> {
        match self.try_take(entity) {
            Ok(taken) => taken,
            Err(WorldError::Entity(_)) => None,
            Err(error) => panic!("{error}"),
        }
    }

    /// Remove `B` from `entity` and return it, if `entity` has all of `B`.
    pub fn try_take<B: Bundle>(&mut self, entity: Entity) -> Result<Option<B>, WorldError> {
        self.flush();
        let location = self.location_of(entity)?;
        let Some(remover) = BundleRemover::new::<B>(self, location.archetype_id, false)? else {
            return Ok(None);
        };
        let (_location, taken) = remover.remove(self, entity, location, true);
        let mut source = TakenSource::new(&self.components, taken);
        Ok(Some(B::from_components(&mut source)))
    }

    /// Despawn `entity`, dropping every component. Returns `false` if it did not exist.
    ///
    /// Fires `OnDespawn`, `OnReplace` and `OnRemove`, in that order, while the values are still
    /// readable.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.flush();
        let Some(location) = self.entities.get(entity) else {
            warn!("cannot despawn entity {entity}, it does not exist");
            return false;
        };

        let archetype = &self.archetypes[location.archetype_id];
        let flags = archetype.flags();
        let component_ids: Vec<ComponentId> = archetype.components().collect();
        let mut deferred = DeferredWorld::from(&mut *self);
        for event in [
            LifecycleEvent::OnDespawn,
            LifecycleEvent::OnReplace,
            LifecycleEvent::OnRemove,
        ] {
            deferred.trigger_lifecycle_event(event, flags, entity, component_ids.iter().copied());
        }

        let archetype = &mut self.archetypes[location.archetype_id];
        for &component_id in archetype.sparse_set_components() {
            if let Some(set) = self.storages.sparse_sets.get_mut(component_id) {
                set.remove(entity);
            }
        }
        let removed = archetype.swap_remove(location.archetype_row);
        if let Some(swapped) = removed.swapped_entity {
            self.update_archetype_row(swapped, location.archetype_row);
        }
        if let Some(swapped) = self.storages.tables[location.table_id].swap_remove(removed.table_row) {
            self.update_table_row(swapped, removed.table_row);
        }
        self.entities.free(entity);
        true
    }

    /// Despawn every entity, keeping archetypes, tables and resources.
    pub fn clear_entities(&mut self) {
        self.storages.tables.clear();
        self.storages.sparse_sets.clear_entities();
        self.archetypes.clear_entities();
        self.entities.clear();
    }

    /// Record that `entity` moved to `row` of its archetype.
    pub(crate) fn update_archetype_row(&mut self, entity: Entity, row: ArchetypeRow) {
        let mut location = self
            .entities
            .get(entity)
            .unwrap_or_else(|| panic!("moved entity {entity} has no location"));
        location.archetype_row = row;
        self.entities.set(entity.index(), location);
    }

    /// Record that `entity` moved to `row` of its table.
    pub(crate) fn update_table_row(&mut self, entity: Entity, row: TableRow) {
        let mut location = self
            .entities
            .get(entity)
            .unwrap_or_else(|| panic!("moved entity {entity} has no location"));
        location.table_row = row;
        self.entities.set(entity.index(), location);
        self.archetypes[location.archetype_id].set_entity_table_row(location.archetype_row, row);
    }

    /// Read-only access to every component of `entity`.
    pub fn entity(&self, entity: Entity) -> Option<EntityRef<'_>> {
        let location = self.entities.get(entity)?;
        Some(EntityRef::new(self, entity, location))
    }

    /// Returns `true` if `entity` is live and has storage.
    #[inline]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.entities.get(entity).is_some()
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.entity(entity)?.get::<T>()
    }

    /// The component together with its change ticks.
    pub fn get_ref<T: Component>(&self, entity: Entity) -> Option<Ref<'_, T>> {
        self.entity(entity)?.get_ref::<T>()
    }

    /// Mutable access to a component. Writing through it stamps the changed tick.
    pub fn get_mut<T: Component<Mutability = Mutable>>(
        &mut self,
        entity: Entity,
    ) -> Option<Mut<'_, T>> {
        let location = self.entities.get(entity)?;
        let component_id = self.components.valid_component_id::<T>()?;
        let last_run = self.last_change_tick;
        let this_run = self.change_tick();
        let (value, added, changed) = self.storages.get_with_ticks_mut::<T>(
            component_id,
            T::STORAGE_TYPE,
            entity,
            location,
        )?;
        Some(Mut::new(
            value,
            TicksMut {
                added,
                changed,
                last_run,
                this_run,
            },
        ))
    }

    /// The component `component_id` of `entity`, type-erased.
    pub fn get_by_id(&self, entity: Entity, component_id: ComponentId) -> Option<ComponentRef<'_>> {
        self.entity(entity)?.get_by_id(component_id)
    }

    /// The component `component_id` of the entity at `archetype_row` of `archetype_id`.
    pub fn get_component(
        &self,
        archetype_id: ArchetypeId,
        archetype_row: ArchetypeRow,
        component_id: ComponentId,
    ) -> Option<ComponentRef<'_>> {
        let archetype = self.archetypes.get(archetype_id)?;
        let archetype_entity = archetype.entity(archetype_row)?;
        let storage_type = archetype.get_storage_type(component_id)?;
        let location = EntityLocation {
            archetype_id,
            archetype_row,
            table_id: archetype.table_id(),
            table_row: archetype_entity.table_row(),
        };
        let (value, ticks) = self.storages.get_any_with_ticks(
            component_id,
            storage_type,
            archetype_entity.id(),
            location,
        )?;
        Some(ComponentRef::new(component_id, value, ticks))
    }

    /// A query over entities with `D`.
    pub fn query<D: QueryData>(&mut self) -> QueryState<D, ()> {
        QueryState::new(self)
    }

    /// A query over entities with `D` that pass `F`.
    pub fn query_filtered<D: QueryData, F: QueryFilter>(&mut self) -> QueryState<D, F> {
        QueryState::new(self)
    }

    /// Insert or overwrite the resource `R`.
    pub fn insert_resource<R: Resource>(&mut self, value: R) {
        let component_id = self.register_resource::<R>();
        let change_tick = self.change_tick();
        self.storages
            .resources
            .get_or_insert(component_id, std::any::type_name::<R>())
            .insert(value, change_tick);
    }

    /// Insert `R::default()` unless `R` already exists.
    pub fn init_resource<R: Resource + Default>(&mut self) -> ComponentId {
        let component_id = self.register_resource::<R>();
        if !self.contains_resource::<R>() {
            self.insert_resource(R::default());
        }
        component_id
    }

    /// Remove the resource `R` and return it.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        let component_id = self.components.valid_resource_id::<R>()?;
        self.storages.resources.get_mut(component_id)?.remove::<R>()
    }

    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.components
            .valid_resource_id::<R>()
            .and_then(|id| self.storages.resources.get(id))
            .is_some_and(|data| data.is_present())
    }

    /// # Panics
    ///
    /// Panics if the resource does not exist.
    pub fn resource<R: Resource>(&self) -> &R {
        self.get_resource::<R>()
            .unwrap_or_else(|| panic!("{}", missing_resource::<R>()))
    }

    pub fn get_resource<R: Resource>(&self) -> Option<&R> {
        let component_id = self.components.valid_resource_id::<R>()?;
        self.storages.resources.get(component_id)?.get::<R>()
    }

    /// # Panics
    ///
    /// Panics if the resource does not exist.
    pub fn resource_ref<R: Resource>(&self) -> Res<'_, R> {
        self.get_resource_ref::<R>()
            .unwrap_or_else(|| panic!("{}", missing_resource::<R>()))
    }

    /// The resource together with its change ticks.
    pub fn get_resource_ref<R: Resource>(&self) -> Option<Res<'_, R>> {
        let component_id = self.components.valid_resource_id::<R>()?;
        let (value, ticks) = self
            .storages
            .resources
            .get(component_id)?
            .get_with_ticks::<R>()?;
        Some(Res::new(
            value,
            Ticks {
                added: &ticks.added,
                changed: &ticks.changed,
                last_run: self.last_change_tick,
                this_run: self.read_change_tick(),
            },
        ))
    }

    /// # Panics
    ///
    /// Panics if the resource does not exist.
    pub fn resource_mut<R: Resource>(&mut self) -> ResMut<'_, R> {
        self.get_resource_mut::<R>()
            .unwrap_or_else(|| panic!("{}", missing_resource::<R>()))
    }

    /// Mutable access to a resource. Writing through it stamps the changed tick.
    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<ResMut<'_, R>> {
        let component_id = self.components.valid_resource_id::<R>()?;
        let last_run = self.last_change_tick;
        let this_run = self.change_tick();
        let (value, ticks) = self
            .storages
            .resources
            .get_mut(component_id)?
            .get_with_ticks_mut::<R>()?;
        Some(ResMut::new(
            value,
            TicksMut {
                added: &mut ticks.added,
                changed: &mut ticks.changed,
                last_run,
                this_run,
            },
        ))
    }

    /// Advance the change tick, returning the previous value.
    #[inline]
    pub fn increment_change_tick(&self) -> Tick {
        Tick::new(self.change_tick.fetch_add(1, Ordering::AcqRel))
    }

    /// The current change tick, read without exclusive access.
    #[inline]
    pub fn read_change_tick(&self) -> Tick {
        Tick::new(self.change_tick.load(Ordering::Acquire))
    }

    /// The current change tick.
    #[inline]
    pub fn change_tick(&mut self) -> Tick {
        Tick::new(*self.change_tick.get_mut())
    }

    /// The tick of the last [`World::clear_trackers`]. Changes after it count as new.
    #[inline]
    pub fn last_change_tick(&self) -> Tick {
        self.last_change_tick
    }

    /// Start a new change detection window.
    pub fn clear_trackers(&mut self) {
        self.last_change_tick = self.increment_change_tick();
    }

    /// Clamp every stored tick that grew too old, if enough ticks passed since the last sweep.
    ///
    /// Must run at least once every [`CHECK_TICK_THRESHOLD`] ticks for change detection to stay
    /// correct across `u32` wraparound.
    pub fn check_change_ticks(&mut self) -> Option<CheckChangeTicks> {
        let change_tick = self.change_tick();
        if change_tick.relative_to(self.last_check_tick).get() < CHECK_TICK_THRESHOLD {
            return None;
        }
        let check = CheckChangeTicks::new(change_tick);
        self.storages.check_change_ticks(check);
        self.last_check_tick = change_tick;
        Some(check)
    }
}

fn missing_resource<R: Resource>() -> String {
    format!(
        "requested resource {} does not exist, did you forget to insert it with `World::insert_resource`?",
        std::any::type_name::<R>()
    )
}
