//! Cached query state and iteration.
//!
//! A [`QueryState`] resolves the component ids of its data and filter once, validates that the
//! data does not alias itself, and remembers which archetypes match. Archetypes created later
//! are picked up incrementally the next time the state is used.

use std::{fmt, iter::Enumerate, marker::PhantomData, slice};

use fixedbitset::FixedBitSet;
use log::debug;

use crate::{
    archetype::{Archetype, ArchetypeEntity, ArchetypeId, ArchetypeRow},
    change_detection::Tick,
    entity::{Entity, EntityLocation},
    query::{
        access::{AccessConflicts, FilteredAccess},
        fetch::{QueryData, ReadOnlyQueryData, UnsafeWorldCell},
        filter::QueryFilter,
    },
    world::{World, WorldId},
};

/// The resolved state of a query over `D`, filtered by `F`.
///
/// A state belongs to the world it was built from; using it with another world panics.
pub struct QueryState<D: QueryData, F: QueryFilter = ()> {
    world_id: WorldId,
    /// Number of archetypes already checked.
    archetype_generation: usize,
    matched_archetypes: FixedBitSet,
    matched_archetype_ids: Vec<ArchetypeId>,
    component_access: FilteredAccess,
    fetch_state: D::State,
    filter_state: F::State,
    marker: PhantomData<fn() -> (D, F)>,
}

impl<D: QueryData, F: QueryFilter> fmt::Debug for QueryState<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("world_id", &self.world_id)
            .field("matched_archetype_count", &self.matched_archetype_ids.len())
            .field("component_access", &self.component_access)
            .finish()
    }
}

impl<D: QueryData, F: QueryFilter> QueryState<D, F> {
    /// Build the state, registering every component the query names.
    ///
    /// # Panics
    ///
    /// Panics if the data of the query aliases itself, like `(&mut A, &A)`.
    pub fn new(world: &mut World) -> Self {
        world.flush();
        let fetch_state = D::init_state(world);
        let filter_state = F::init_state(world);

        let mut component_access = FilteredAccess::default();
        D::update_component_access(&fetch_state, &mut component_access);

        // The filter is declared separately so `(&mut A, Changed<A>)` does not trip the
        // aliasing check, then merged as a conjunction.
        let mut filter_access = FilteredAccess::default();
        F::update_component_access(&filter_state, &mut filter_access);
        component_access.extend(&filter_access);

        let mut state = Self {
            world_id: world.id(),
            archetype_generation: 0,
            matched_archetypes: FixedBitSet::new(),
            matched_archetype_ids: Vec::new(),
            component_access,
            fetch_state,
            filter_state,
            marker: PhantomData,
        };
        state.update_archetypes(world);
        state
    }

    /// The world this state belongs to.
    #[inline]
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// # Panics
    ///
    /// Panics if `world_id` is not the world this state was built from.
    #[inline]
    #[track_caller]
    pub fn validate_world(&self, world_id: WorldId) {
        assert_eq!(
            self.world_id, world_id,
            "query state was built from a different world"
        );
    }

    /// Check the archetypes created since the last update.
    pub fn update_archetypes(&mut self, world: &World) {
        self.validate_world(world.id());
        let archetypes = world.archetypes();
        let new_generation = archetypes.len();
        for archetype in archetypes.iter().skip(self.archetype_generation) {
            self.new_archetype(archetype);
        }
        self.archetype_generation = new_generation;
    }

    fn new_archetype(&mut self, archetype: &Archetype) {
        let contains = |id| archetype.contains(id);
        if D::matches_component_set(&self.fetch_state, &contains)
            && F::matches_component_set(&self.filter_state, &contains)
        {
            let index = archetype.id().index();
            self.matched_archetypes.grow(index + 1);
            self.matched_archetypes.insert(index);
            self.matched_archetype_ids.push(archetype.id());
            debug!(
                "query {} matched archetype {index}",
                std::any::type_name::<D>()
            );
        }
    }

    /// Returns `true` if entities of `archetype_id` are seen by the query.
    #[inline]
    pub fn matches_archetype(&self, archetype_id: ArchetypeId) -> bool {
        self.matched_archetypes.contains(archetype_id.index())
    }

    /// The archetypes seen by the query, in the order they were created.
    pub fn matched_archetypes(&self) -> impl Iterator<Item = ArchetypeId> + '_ {
        self.matched_archetype_ids.iter().copied()
    }

    /// Everything the query reads and writes, with its filters.
    #[inline]
    pub fn component_access(&self) -> &FilteredAccess {
        &self.component_access
    }

    /// Returns `true` if this query and `other` can be held at the same time.
    pub fn is_compatible<D2: QueryData, F2: QueryFilter>(&self, other: &QueryState<D2, F2>) -> bool {
        self.component_access.is_compatible(&other.component_access)
    }

    /// What keeps this query and `other` from being held at the same time.
    pub fn get_conflicts<D2: QueryData, F2: QueryFilter>(
        &self,
        other: &QueryState<D2, F2>,
    ) -> AccessConflicts {
        self.component_access.get_conflicts(&other.component_access)
    }

    /// Iterate the items of every matching entity.
    pub fn iter<'w, 's>(&'s mut self, world: &'w World) -> QueryIter<'w, 's, D, F>
    where
        D: ReadOnlyQueryData,
    {
        self.update_archetypes(world);
        let ticks = (world.last_change_tick(), world.read_change_tick());
        // SAFETY: the data only reads, and the world is shared for 'w.
        unsafe { QueryIter::new(UnsafeWorldCell::new_readonly(world), self, ticks) }
    }

    /// Iterate the items of every matching entity, mutably.
    pub fn iter_mut<'w, 's>(&'s mut self, world: &'w mut World) -> QueryIter<'w, 's, D, F> {
        self.update_archetypes(world);
        let ticks = (world.last_change_tick(), world.read_change_tick());
        let world = UnsafeWorldCell::new_mutable(world);
        // SAFETY: the world is borrowed exclusively for 'w, and the state validated that its
        // data does not alias itself.
        unsafe { QueryIter::new(world, self, ticks) }
    }

    /// The item of `entity`, if it is seen by the query.
    pub fn get<'w>(&mut self, world: &'w World, entity: Entity) -> Option<D::Item<'w>>
    where
        D: ReadOnlyQueryData,
    {
        self.update_archetypes(world);
        let ticks = (world.last_change_tick(), world.read_change_tick());
        let location = world.entities().get(entity)?;
        // SAFETY: the data only reads, and the world is shared for 'w.
        unsafe { self.fetch_at(UnsafeWorldCell::new_readonly(world), entity, location, ticks) }
    }

    /// The item of `entity`, mutably, if it is seen by the query.
    pub fn get_mut<'w>(&mut self, world: &'w mut World, entity: Entity) -> Option<D::Item<'w>> {
        self.update_archetypes(world);
        let ticks = (world.last_change_tick(), world.read_change_tick());
        let location = world.entities().get(entity)?;
        let cell = UnsafeWorldCell::new_mutable(world);
        // SAFETY: the world is borrowed exclusively for 'w and only one item is produced.
        unsafe { self.fetch_at(cell, entity, location, ticks) }
    }

    /// # Safety
    ///
    /// `cell` must allow every access of the query for 'w, and `location` must be current.
    unsafe fn fetch_at<'w>(
        &self,
        cell: UnsafeWorldCell<'w>,
        entity: Entity,
        location: EntityLocation,
        (last_run, this_run): (Tick, Tick),
    ) -> Option<D::Item<'w>> {
        if !self.matches_archetype(location.archetype_id) {
            return None;
        }
        // SAFETY: the archetype matches, the rest is forwarded from the caller.
        unsafe {
            if !F::filter_fetch(
                cell,
                &self.filter_state,
                entity,
                location,
                last_run,
                this_run,
            ) {
                return None;
            }
            Some(D::fetch(
                cell,
                &self.fetch_state,
                entity,
                location,
                last_run,
                this_run,
            ))
        }
    }
}

/// Iterator over the items of a [`QueryState`].
pub struct QueryIter<'w, 's, D: QueryData, F: QueryFilter> {
    world: UnsafeWorldCell<'w>,
    state: &'s QueryState<D, F>,
    archetype_ids: slice::Iter<'s, ArchetypeId>,
    archetype: Option<&'w Archetype>,
    entities: Enumerate<slice::Iter<'w, ArchetypeEntity>>,
    last_run: Tick,
    this_run: Tick,
}

impl<'w, 's, D: QueryData, F: QueryFilter> QueryIter<'w, 's, D, F> {
    /// # Safety
    ///
    /// `world` must allow every access of `state` for 'w.
    unsafe fn new(
        world: UnsafeWorldCell<'w>,
        state: &'s QueryState<D, F>,
        (last_run, this_run): (Tick, Tick),
    ) -> Self {
        Self {
            world,
            state,
            archetype_ids: state.matched_archetype_ids.iter(),
            archetype: None,
            entities: <&[ArchetypeEntity]>::default().iter().enumerate(),
            last_run,
            this_run,
        }
    }
}

impl<'w, D: QueryData, F: QueryFilter> Iterator for QueryIter<'w, '_, D, F> {
    type Item = D::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(archetype) = self.archetype {
                for (row, archetype_entity) in self.entities.by_ref() {
                    let entity = archetype_entity.id();
                    let location = EntityLocation {
                        archetype_id: archetype.id(),
                        archetype_row: ArchetypeRow::new(row),
                        table_id: archetype.table_id(),
                        table_row: archetype_entity.table_row(),
                    };
                    // SAFETY: the archetype matches and the location was read from it. Access
                    // was granted when the iterator was built.
                    unsafe {
                        if !F::IS_ARCHETYPAL
                            && !F::filter_fetch(
                                self.world,
                                &self.state.filter_state,
                                entity,
                                location,
                                self.last_run,
                                self.this_run,
                            )
                        {
                            continue;
                        }
                        return Some(D::fetch(
                            self.world,
                            &self.state.fetch_state,
                            entity,
                            location,
                            self.last_run,
                            self.this_run,
                        ));
                    }
                }
            }

            let archetype_id = *self.archetype_ids.next()?;
            // SAFETY: archetypes are never mutated while iterating.
            let archetype = &unsafe { self.world.archetypes() }[archetype_id];
            self.archetype = Some(archetype);
            self.entities = archetype.entities().iter().enumerate();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // SAFETY: archetypes are never mutated while iterating.
        let archetypes = unsafe { self.world.archetypes() };
        let remaining: usize = self.entities.len()
            + self
                .archetype_ids
                .clone()
                .map(|&id| archetypes[id].len())
                .sum::<usize>();
        if F::IS_ARCHETYPAL {
            (remaining, Some(remaining))
        } else {
            (0, Some(remaining))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        change_detection::{DetectChanges, Mut, Ref},
        component::{Component, Immutable, Mutable, StorageType},
        query::{
            fetch::Has,
            filter::{Added, Changed, Or, With, Without},
        },
        world::EntityRef,
    };

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(i32);
    impl Component for Position {
        type Mutability = Mutable;
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(i32);
    impl Component for Velocity {
        type Mutability = Mutable;
    }

    #[derive(Debug, PartialEq)]
    struct Frozen;
    impl Component for Frozen {
        const STORAGE_TYPE: StorageType = StorageType::SparseSet;
        type Mutability = Immutable;
    }

    #[test]
    fn iterates_every_matching_archetype() {
        // Given
        let mut world = World::new();
        world.spawn(Position(1));
        world.spawn((Position(2), Velocity(1)));
        world.spawn(Velocity(5));

        // When
        let mut query = world.query::<&Position>();
        let mut seen: Vec<_> = query.iter(&world).map(|p| p.0).collect();
        seen.sort();

        // Then
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(query.matched_archetypes().count(), 2);
    }

    #[test]
    fn picks_up_archetypes_created_later() {
        // Given
        let mut world = World::new();
        let mut query = world.query::<(Entity, &Velocity)>();
        assert_eq!(query.iter(&world).count(), 0);

        // When
        let entity = world.spawn((Position(0), Velocity(3)));

        // Then
        let items: Vec<_> = query.iter(&world).map(|(e, v)| (e, *v)).collect();
        assert_eq!(items, vec![(entity, Velocity(3))]);
    }

    #[test]
    fn iter_mut_writes_and_marks_changed() {
        // Given
        let mut world = World::new();
        let entity = world.spawn((Position(1), Velocity(2)));
        world.clear_trackers();

        // When
        let mut query = world.query::<(&mut Position, &Velocity)>();
        for (mut position, velocity) in query.iter_mut(&mut world) {
            position.0 += velocity.0;
        }

        // Then
        assert_eq!(world.get::<Position>(entity), Some(&Position(3)));
        let mut changed = world.query_filtered::<Entity, Changed<Position>>();
        assert_eq!(changed.iter(&world).collect::<Vec<_>>(), vec![entity]);
        let mut velocity_changed = world.query_filtered::<Entity, Changed<Velocity>>();
        assert_eq!(velocity_changed.iter(&world).count(), 0);
    }

    #[test]
    fn with_and_without_filter_archetypes() {
        // Given
        let mut world = World::new();
        let moving = world.spawn((Position(0), Velocity(1)));
        let frozen = world.spawn((Position(0), Velocity(1), Frozen));

        // When
        let mut active = world.query_filtered::<Entity, (With<Velocity>, Without<Frozen>)>();
        let mut stopped = world.query_filtered::<Entity, With<Frozen>>();

        // Then
        assert_eq!(active.iter(&world).collect::<Vec<_>>(), vec![moving]);
        assert_eq!(stopped.iter(&world).collect::<Vec<_>>(), vec![frozen]);
    }

    #[test]
    fn added_only_sees_new_components() {
        // Given
        let mut world = World::new();
        world.spawn(Position(1));
        world.clear_trackers();
        let fresh = world.spawn(Position(2));

        // When
        let mut query = world.query_filtered::<Entity, Added<Position>>();

        // Then
        assert_eq!(query.iter(&world).collect::<Vec<_>>(), vec![fresh]);
    }

    #[test]
    fn or_checks_each_filter_per_archetype() {
        // Given
        let mut world = World::new();
        let positioned = world.spawn(Position(0));
        let moving = world.spawn(Velocity(0));
        world.spawn(Frozen);

        // When
        let mut query = world.query_filtered::<Entity, Or<(With<Position>, With<Velocity>)>>();
        let mut seen: Vec<_> = query.iter(&world).collect();
        seen.sort();

        // Then
        assert_eq!(seen, vec![positioned, moving]);
    }

    #[test]
    fn or_with_change_filter_skips_missing_components() {
        // Given
        let mut world = World::new();
        let old = world.spawn((Position(0), Velocity(0)));
        let only_position = world.spawn(Position(0));
        world.clear_trackers();
        world.get_mut::<Velocity>(old).unwrap().0 = 1;

        // When
        let mut query =
            world.query_filtered::<Entity, Or<(Changed<Velocity>, Without<Velocity>)>>();
        let mut seen: Vec<_> = query.iter(&world).collect();
        seen.sort();

        // Then
        assert_eq!(seen, vec![old, only_position]);
    }

    #[test]
    fn optional_and_has_do_not_filter() {
        // Given
        let mut world = World::new();
        let plain = world.spawn(Position(1));
        let moving = world.spawn((Position(2), Velocity(4)));

        // When
        let mut query = world.query::<(Entity, Option<&Velocity>, Has<Velocity>)>();
        let mut items: Vec<_> = query
            .iter(&world)
            .map(|(entity, velocity, has)| (entity, velocity.copied(), has))
            .collect();
        items.sort_by_key(|(entity, _, _)| *entity);

        // Then
        assert_eq!(
            items,
            vec![(plain, None, false), (moving, Some(Velocity(4)), true)]
        );
    }

    #[test]
    fn ref_reports_ticks() {
        // Given
        let mut world = World::new();
        let entity = world.spawn(Position(1));

        // When
        let mut query = world.query::<Ref<Position>>();
        let position = query.get(&world, entity).unwrap();

        // Then
        assert!(position.is_added());
        assert!(position.is_changed());
    }

    #[test]
    fn entity_ref_reads_everything() {
        // Given
        let mut world = World::new();
        let entity = world.spawn((Position(1), Frozen));

        // When
        let mut query = world.query::<EntityRef>();
        let entity_ref = query.get(&world, entity).unwrap();

        // Then
        assert_eq!(entity_ref.get::<Position>(), Some(&Position(1)));
        assert_eq!(entity_ref.get::<Frozen>(), Some(&Frozen));
        assert!(query.component_access().access().has_read_all_components());
    }

    #[test]
    fn get_mut_respects_filters() {
        // Given
        let mut world = World::new();
        let moving = world.spawn((Position(0), Velocity(1)));
        let frozen = world.spawn((Position(0), Frozen));

        // When
        let mut query = world.query_filtered::<Mut<Position>, Without<Frozen>>();
        query.get_mut(&mut world, moving).unwrap().0 = 7;

        // Then
        assert!(query.get_mut(&mut world, frozen).is_none());
        assert_eq!(world.get::<Position>(moving), Some(&Position(7)));
    }

    #[test]
    fn mutable_data_with_change_filter_on_same_component() {
        // Given
        let mut world = World::new();
        let entity = world.spawn(Position(1));

        // When
        let mut query = world.query_filtered::<&mut Position, Changed<Position>>();
        let count = query.iter_mut(&mut world).count();

        // Then
        assert_eq!(count, 1);
        assert!(world.get::<Position>(entity).is_some());
    }

    #[test]
    #[should_panic(expected = "Mutable component access must be unique")]
    fn aliasing_query_panics() {
        let mut world = World::new();
        world.query::<(&mut Position, &mut Position)>();
    }

    #[test]
    #[should_panic(expected = "different world")]
    fn state_is_tied_to_its_world() {
        let mut world = World::new();
        let other = World::new();
        let mut query = world.query::<&Position>();
        query.iter(&other).count();
    }

    #[test]
    fn disjoint_filters_make_queries_compatible() {
        // Given
        let mut world = World::new();
        let with_frozen = world.query_filtered::<&mut Position, With<Frozen>>();
        let without_frozen = world.query_filtered::<&mut Position, Without<Frozen>>();
        let unfiltered = world.query::<&Position>();

        // Then
        assert!(with_frozen.is_compatible(&without_frozen));
        assert!(!with_frozen.is_compatible(&unfiltered));
        let position = world.component_id::<Position>().unwrap();
        assert_eq!(
            with_frozen.get_conflicts(&unfiltered).ids(),
            Some(vec![position])
        );
    }

    #[test]
    fn size_hint_is_exact_for_archetypal_filters() {
        // Given
        let mut world = World::new();
        world.spawn_batch((0..4).map(Position));
        world.spawn((Position(9), Velocity(0)));

        // When
        let mut query = world.query_filtered::<&Position, Without<Velocity>>();
        let iter = query.iter(&world);

        // Then
        assert_eq!(iter.size_hint(), (4, Some(4)));
    }
}
