//! What a query yields per entity.
//!
//! # QueryData
//!
//! [`QueryData`] is implemented by:
//! - [`Entity`]: the entity id itself
//! - [`EntityRef`]: read-only access to every component of the entity
//! - `&T`: a shared borrow of a component
//! - `&mut T`: a [`Mut<T>`] that stamps the changed tick when written
//! - [`Ref<T>`]: a shared borrow together with its change ticks
//! - `Option<D>`: `D` when the entity has it, `None` otherwise
//! - [`Has<T>`]: whether the entity has `T`, without reading it
//! - `()` and tuples of `QueryData` (up to 15 elements)
//!
//! # Access Validation
//!
//! Every item fetched from the same entity aliases the same world, so a query declares its
//! accesses up front in [`QueryData::update_component_access`]. A declaration that conflicts
//! with one already made (`(&mut A, &A)`, or `(EntityRef, &mut A)`) panics while the query is
//! being built, which is what makes the unsafe fetches below sound.

use std::marker::PhantomData;

use crate::{
    archetype::Archetypes,
    change_detection::{Mut, Ref, Ticks, TicksMut, Tick},
    component::{Component, ComponentId, Mutable},
    entity::{Entity, EntityLocation},
    query::access::FilteredAccess,
    storage::Storages,
    world::{EntityRef, World},
};

/// A world pointer that several query items may borrow from at once.
///
/// The cell itself asserts nothing; whoever dereferences it must make sure the borrows it
/// hands out do not overlap. Queries do so through their [`FilteredAccess`].
#[derive(Clone, Copy)]
pub struct UnsafeWorldCell<'w>(*mut World, PhantomData<&'w World>);

impl<'w> UnsafeWorldCell<'w> {
    /// A cell that must only ever be read through.
    #[inline]
    pub(crate) fn new_readonly(world: &'w World) -> Self {
        Self(std::ptr::from_ref(world).cast_mut(), PhantomData)
    }

    /// A cell that may be written through.
    #[inline]
    pub(crate) fn new_mutable(world: &'w mut World) -> Self {
        Self(std::ptr::from_mut(world), PhantomData)
    }

    /// # Safety
    ///
    /// Nothing reachable from the returned reference may be mutably borrowed for `'w`, except
    /// data the caller has been granted exclusive access to and does not read through it.
    #[inline]
    pub(crate) unsafe fn world(self) -> &'w World {
        // SAFETY: the pointer came from a reference that lives for 'w.
        unsafe { &*self.0 }
    }

    /// # Safety
    ///
    /// See [`UnsafeWorldCell::world`].
    #[inline]
    pub(crate) unsafe fn storages(self) -> &'w Storages {
        // SAFETY: field projection through a pointer valid for 'w.
        unsafe { &(*self.0).storages }
    }

    /// # Safety
    ///
    /// The cell must have been built with [`UnsafeWorldCell::new_mutable`], and the caller must
    /// only touch the values it was granted exclusive access to.
    #[inline]
    pub(crate) unsafe fn storages_mut(self) -> &'w mut Storages {
        // SAFETY: upheld by the caller.
        unsafe { &mut (*self.0).storages }
    }

    /// # Safety
    ///
    /// See [`UnsafeWorldCell::world`].
    #[inline]
    pub(crate) unsafe fn archetypes(self) -> &'w Archetypes {
        // SAFETY: archetypes are never mutated while a query runs.
        unsafe { &(*self.0).archetypes }
    }
}

/// Types a query can yield per entity.
///
/// # Safety
///
/// [`QueryData::update_component_access`] must declare every component
/// [`QueryData::fetch`] reads or writes, and must panic if a declaration conflicts with one
/// already in the access. `fetch` must not touch anything else.
pub unsafe trait QueryData {
    /// The value yielded for one entity.
    type Item<'w>;

    /// Ids and other data resolved once, when the query is built.
    type State: Send + Sync + Clone;

    /// Resolve the state, registering components as needed.
    fn init_state(world: &mut World) -> Self::State;

    /// Declare the accesses of this data.
    ///
    /// # Panics
    ///
    /// Panics if an access conflicts with one already in `access`.
    fn update_component_access(state: &Self::State, access: &mut FilteredAccess);

    /// Returns `true` if an archetype holding the components `set_contains_id` accepts can
    /// produce this data.
    fn matches_component_set(
        state: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool;

    /// Fetch the item of `entity`.
    ///
    /// # Safety
    ///
    /// - `location` must be the current location of `entity`, in an archetype that matches
    /// - `world` must allow every access declared by `update_component_access`
    /// - no other live item may conflict with those accesses
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        state: &Self::State,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w>;
}

/// [`QueryData`] that only ever reads.
///
/// # Safety
///
/// `update_component_access` must not declare any write.
pub unsafe trait ReadOnlyQueryData: QueryData {}

/// Whether the entity has a `T`, checked without reading it.
pub struct Has<T>(PhantomData<T>);

#[track_caller]
fn missing_component(component_id: ComponentId, entity: Entity) -> ! {
    panic!("component {component_id:?} of {entity} vanished from a matched archetype")
}

// SAFETY: reads nothing.
unsafe impl QueryData for Entity {
    type Item<'w> = Entity;
    type State = ();

    fn init_state(_world: &mut World) -> Self::State {}

    fn update_component_access(_state: &Self::State, _access: &mut FilteredAccess) {}

    fn matches_component_set(
        _state: &Self::State,
        _set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        true
    }

    #[inline]
    unsafe fn fetch<'w>(
        _world: UnsafeWorldCell<'w>,
        _state: &Self::State,
        entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        entity
    }
}

// SAFETY: only reads.
unsafe impl ReadOnlyQueryData for Entity {}

// SAFETY: declares a read of every component, and refuses to coexist with any write.
unsafe impl QueryData for EntityRef<'_> {
    type Item<'w> = EntityRef<'w>;
    type State = ();

    fn init_state(_world: &mut World) -> Self::State {}

    fn update_component_access(_state: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_any_component_write(),
            "EntityRef conflicts with a previous access in this query. Shared access cannot coincide with exclusive access."
        );
        access.read_all_components();
    }

    fn matches_component_set(
        _state: &Self::State,
        _set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        true
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        _state: &Self::State,
        entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: every component is declared as read, so nothing is written for 'w.
        let world = unsafe { world.world() };
        EntityRef::new(world, entity, location)
    }
}

// SAFETY: only reads.
unsafe impl ReadOnlyQueryData for EntityRef<'_> {}

// SAFETY: declares a read of `T` and fetches only `T`.
unsafe impl<T: Component> QueryData for &T {
    type Item<'w> = &'w T;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.register_component::<T>()
    }

    fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_write(component_id),
            "&{} conflicts with a previous access in this query. Shared access cannot coincide with exclusive access.",
            std::any::type_name::<T>(),
        );
        access.add_component_read(component_id);
    }

    fn matches_component_set(
        &component_id: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        set_contains_id(component_id)
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        &component_id: &Self::State,
        entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: `T` is declared as read, so nobody writes it for 'w.
        let storages = unsafe { world.storages() };
        storages
            .get_with_ticks::<T>(component_id, T::STORAGE_TYPE, entity, location)
            .map(|(value, _, _)| value)
            .unwrap_or_else(|| missing_component(component_id, entity))
    }
}

// SAFETY: only reads.
unsafe impl<T: Component> ReadOnlyQueryData for &T {}

// SAFETY: declares a read of `T` and fetches only `T` and its ticks.
unsafe impl<T: Component> QueryData for Ref<'_, T> {
    type Item<'w> = Ref<'w, T>;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.register_component::<T>()
    }

    fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_write(component_id),
            "Ref<{}> conflicts with a previous access in this query. Shared access cannot coincide with exclusive access.",
            std::any::type_name::<T>(),
        );
        access.add_component_read(component_id);
    }

    fn matches_component_set(
        &component_id: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        set_contains_id(component_id)
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        &component_id: &Self::State,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: `T` is declared as read, so nobody writes it for 'w.
        let storages = unsafe { world.storages() };
        let (value, added, changed) = storages
            .get_with_ticks::<T>(component_id, T::STORAGE_TYPE, entity, location)
            .unwrap_or_else(|| missing_component(component_id, entity));
        Ref::new(
            value,
            Ticks {
                added,
                changed,
                last_run,
                this_run,
            },
        )
    }
}

// SAFETY: only reads.
unsafe impl<T: Component> ReadOnlyQueryData for Ref<'_, T> {}

// SAFETY: declares a write of `T` and fetches only `T` and its ticks.
unsafe impl<T: Component<Mutability = Mutable>> QueryData for &mut T {
    type Item<'w> = Mut<'w, T>;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.register_component::<T>()
    }

    fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_read(component_id),
            "&mut {} conflicts with a previous access in this query. Mutable component access must be unique.",
            std::any::type_name::<T>(),
        );
        access.add_component_write(component_id);
    }

    fn matches_component_set(
        &component_id: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        set_contains_id(component_id)
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        &component_id: &Self::State,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: `T` is declared as written, and the access check guarantees no other item of
        // this query touches it. Distinct entities live in distinct rows.
        let storages = unsafe { world.storages_mut() };
        let (value, added, changed) = storages
            .get_with_ticks_mut::<T>(component_id, T::STORAGE_TYPE, entity, location)
            .unwrap_or_else(|| missing_component(component_id, entity));
        Mut::new(
            value,
            TicksMut {
                added,
                changed,
                last_run,
                this_run,
            },
        )
    }
}

// SAFETY: same accesses as `&mut T`.
unsafe impl<T: Component<Mutability = Mutable>> QueryData for Mut<'_, T> {
    type Item<'w> = Mut<'w, T>;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        <&mut T as QueryData>::init_state(world)
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        <&mut T as QueryData>::update_component_access(state, access);
    }

    fn matches_component_set(
        state: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        <&mut T as QueryData>::matches_component_set(state, set_contains_id)
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        state: &Self::State,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: forwarded from the caller.
        unsafe { <&mut T as QueryData>::fetch(world, state, entity, location, last_run, this_run) }
    }
}

// SAFETY: declares the accesses of `D` without requiring its components.
unsafe impl<D: QueryData> QueryData for Option<D> {
    type Item<'w> = Option<D::Item<'w>>;
    type State = D::State;

    fn init_state(world: &mut World) -> Self::State {
        D::init_state(world)
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        // Keep the accesses of `D` but none of its filters: `Option<&A>` matches entities
        // without `A` too.
        let mut intermediate = access.clone();
        D::update_component_access(state, &mut intermediate);
        access.extend_access(&intermediate);
    }

    fn matches_component_set(
        _state: &Self::State,
        _set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        true
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        state: &Self::State,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: archetypes are only read.
        let archetype = &unsafe { world.archetypes() }[location.archetype_id];
        D::matches_component_set(state, &|id| archetype.contains(id))
            // SAFETY: the archetype matches `D`, the rest is forwarded from the caller.
            .then(|| unsafe { D::fetch(world, state, entity, location, last_run, this_run) })
    }
}

// SAFETY: `D` only reads.
unsafe impl<D: ReadOnlyQueryData> ReadOnlyQueryData for Option<D> {}

// SAFETY: only checks the archetype, which is declared as archetypal access.
unsafe impl<T: Component> QueryData for Has<T> {
    type Item<'w> = bool;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.register_component::<T>()
    }

    fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
        access.access_mut().add_archetypal(component_id);
    }

    fn matches_component_set(
        _state: &Self::State,
        _set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        true
    }

    #[inline]
    unsafe fn fetch<'w>(
        world: UnsafeWorldCell<'w>,
        &component_id: &Self::State,
        _entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: archetypes are only read.
        let archetypes = unsafe { world.archetypes() };
        archetypes[location.archetype_id].contains(component_id)
    }
}

// SAFETY: only reads.
unsafe impl<T: Component> ReadOnlyQueryData for Has<T> {}

// SAFETY: declares nothing and fetches nothing.
unsafe impl QueryData for () {
    type Item<'w> = ();
    type State = ();

    fn init_state(_world: &mut World) -> Self::State {}

    fn update_component_access(_state: &Self::State, _access: &mut FilteredAccess) {}

    fn matches_component_set(
        _state: &Self::State,
        _set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        true
    }

    #[inline]
    unsafe fn fetch<'w>(
        _world: UnsafeWorldCell<'w>,
        _state: &Self::State,
        _entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
    }
}

// SAFETY: reads nothing.
unsafe impl ReadOnlyQueryData for () {}

macro_rules! impl_query_data_tuple {
    ($($name: ident),*) => {
        // SAFETY: every element declares its own accesses into the same `FilteredAccess`, so
        // conflicts between elements panic.
        #[allow(non_snake_case)]
        unsafe impl<$($name: QueryData),*> QueryData for ($($name,)*) {
            type Item<'w> = ($($name::Item<'w>,)*);
            type State = ($($name::State,)*);

            fn init_state(world: &mut World) -> Self::State {
                ($($name::init_state(world),)*)
            }

            fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
                let ($($name,)*) = state;
                $($name::update_component_access($name, access);)*
            }

            fn matches_component_set(
                state: &Self::State,
                set_contains_id: &impl Fn(ComponentId) -> bool,
            ) -> bool {
                let ($($name,)*) = state;
                true $(&& $name::matches_component_set($name, set_contains_id))*
            }

            #[inline]
            unsafe fn fetch<'w>(
                world: UnsafeWorldCell<'w>,
                state: &Self::State,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> Self::Item<'w> {
                let ($($name,)*) = state;
                // SAFETY: forwarded from the caller; elements never conflict with each other.
                unsafe { ($($name::fetch(world, $name, entity, location, last_run, this_run),)*) }
            }
        }

        // SAFETY: every element only reads.
        unsafe impl<$($name: ReadOnlyQueryData),*> ReadOnlyQueryData for ($($name,)*) {}
    };
}

all_tuples!(impl_query_data_tuple);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Immutable;

    struct A;
    impl Component for A {
        type Mutability = Mutable;
    }

    struct B;
    impl Component for B {
        type Mutability = Immutable;
    }

    fn access_of<D: QueryData>(world: &mut World) -> FilteredAccess {
        let state = D::init_state(world);
        let mut access = FilteredAccess::default();
        D::update_component_access(&state, &mut access);
        access
    }

    #[test]
    fn shared_reads_are_declared_and_required() {
        // Given
        let mut world = World::new();

        // When
        let access = access_of::<(&A, &B)>(&mut world);

        // Then
        let a = world.component_id::<A>().unwrap();
        let b = world.component_id::<B>().unwrap();
        assert!(access.access().has_component_read(a));
        assert!(access.access().has_component_read(b));
        assert!(!access.access().has_any_component_write());
        assert_eq!(access.required().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn optional_data_is_not_required() {
        // Given
        let mut world = World::new();

        // When
        let access = access_of::<(Entity, Option<&mut A>)>(&mut world);

        // Then
        let a = world.component_id::<A>().unwrap();
        assert!(access.access().has_component_write(a));
        assert_eq!(access.required().count(), 0);
        assert_eq!(access.filter_sets()[0].with().count(), 0);
    }

    #[test]
    fn has_is_archetypal_only() {
        // Given
        let mut world = World::new();

        // When
        let access = access_of::<Has<A>>(&mut world);

        // Then
        let a = world.component_id::<A>().unwrap();
        assert!(access.access().has_archetypal(a));
        assert!(!access.access().has_component_read(a));
    }

    #[test]
    #[should_panic(expected = "Shared access cannot coincide with exclusive access")]
    fn read_after_write_panics() {
        let mut world = World::new();
        access_of::<(&mut A, &A)>(&mut world);
    }

    #[test]
    #[should_panic(expected = "Mutable component access must be unique")]
    fn duplicate_write_panics() {
        let mut world = World::new();
        access_of::<(&mut A, Mut<A>)>(&mut world);
    }

    #[test]
    #[should_panic(expected = "Mutable component access must be unique")]
    fn write_after_entity_ref_panics() {
        let mut world = World::new();
        access_of::<(EntityRef, &mut A)>(&mut world);
    }

    #[test]
    fn matches_requires_every_element() {
        // Given
        let mut world = World::new();
        let state = <(&A, Option<&B>)>::init_state(&mut world);
        let a = world.component_id::<A>().unwrap();

        // Then
        assert!(<(&A, Option<&B>)>::matches_component_set(&state, &|id| id == a));
        assert!(!<(&A, Option<&B>)>::matches_component_set(&state, &|_| false));
    }
}
