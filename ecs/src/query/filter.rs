//! Filters narrowing which entities a query sees.
//!
//! - [`With<T>`] and [`Without<T>`] are archetypal: they are decided once per archetype.
//! - [`Added<T>`] and [`Changed<T>`] compare the ticks of `T` against the query's last run,
//!   entity by entity.
//! - [`Or<(..)>`] passes when any of its filters does; a plain tuple passes when all do.

use std::marker::PhantomData;

use crate::{
    change_detection::Tick,
    component::{Component, ComponentId},
    entity::{Entity, EntityLocation},
    query::{access::FilteredAccess, fetch::UnsafeWorldCell},
    world::World,
};

/// Types that can narrow the entities of a query.
///
/// # Safety
///
/// [`QueryFilter::update_component_access`] must declare every component
/// [`QueryFilter::filter_fetch`] reads, and `filter_fetch` must never write.
pub unsafe trait QueryFilter {
    /// Ids resolved once, when the query is built.
    type State: Send + Sync + Clone;

    /// `true` if [`QueryFilter::filter_fetch`] always passes on matching archetypes.
    const IS_ARCHETYPAL: bool;

    fn init_state(world: &mut World) -> Self::State;

    /// Declare the accesses and `With`/`Without` filters of this filter.
    fn update_component_access(state: &Self::State, access: &mut FilteredAccess);

    /// Returns `true` if entities of an archetype holding the components `set_contains_id`
    /// accepts may pass.
    fn matches_component_set(
        state: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool;

    /// Returns `true` if `entity` passes.
    ///
    /// # Safety
    ///
    /// `location` must be the current location of `entity`, in an archetype that matches, and
    /// nothing declared as read may be written for the duration of the call.
    unsafe fn filter_fetch(
        world: UnsafeWorldCell<'_>,
        state: &Self::State,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> bool;
}

/// Only entities that have a `T`.
pub struct With<T>(PhantomData<T>);

/// Only entities that do not have a `T`.
pub struct Without<T>(PhantomData<T>);

/// Only entities whose `T` was added since the query last ran.
pub struct Added<T>(PhantomData<T>);

/// Only entities whose `T` was added or mutated since the query last ran.
pub struct Changed<T>(PhantomData<T>);

/// Entities passing any of the filters of the tuple `T`.
pub struct Or<T>(PhantomData<T>);

// SAFETY: reads nothing.
unsafe impl<T: Component> QueryFilter for With<T> {
    type State = ComponentId;
    const IS_ARCHETYPAL: bool = true;

    fn init_state(world: &mut World) -> Self::State {
        world.register_component::<T>()
    }

    fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
        access.and_with(component_id);
    }

    fn matches_component_set(
        &component_id: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        set_contains_id(component_id)
    }

    #[inline]
    unsafe fn filter_fetch(
        _world: UnsafeWorldCell<'_>,
        _state: &Self::State,
        _entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> bool {
        true
    }
}

// SAFETY: reads nothing.
unsafe impl<T: Component> QueryFilter for Without<T> {
    type State = ComponentId;
    const IS_ARCHETYPAL: bool = true;

    fn init_state(world: &mut World) -> Self::State {
        world.register_component::<T>()
    }

    fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
        access.and_without(component_id);
    }

    fn matches_component_set(
        &component_id: &Self::State,
        set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        !set_contains_id(component_id)
    }

    #[inline]
    unsafe fn filter_fetch(
        _world: UnsafeWorldCell<'_>,
        _state: &Self::State,
        _entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> bool {
        true
    }
}

macro_rules! impl_tick_filter {
    ($name: ident, $check: ident) => {
        // SAFETY: declares a read of `T` and only reads its ticks.
        unsafe impl<T: Component> QueryFilter for $name<T> {
            type State = ComponentId;
            const IS_ARCHETYPAL: bool = false;

            fn init_state(world: &mut World) -> Self::State {
                world.register_component::<T>()
            }

            fn update_component_access(&component_id: &Self::State, access: &mut FilteredAccess) {
                assert!(
                    !access.access().has_component_write(component_id),
                    "{}<{}> conflicts with a previous access in this query. Shared access cannot coincide with exclusive access.",
                    stringify!($name),
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
            unsafe fn filter_fetch(
                world: UnsafeWorldCell<'_>,
                &component_id: &Self::State,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> bool {
                // SAFETY: `T` is declared as read.
                let storages = unsafe { world.storages() };
                storages
                    .get_ticks(component_id, T::STORAGE_TYPE, entity, location)
                    .is_some_and(|ticks| ticks.$check(last_run, this_run))
            }
        }
    };
}

impl_tick_filter!(Added, is_added);
impl_tick_filter!(Changed, is_changed);

// SAFETY: nothing to declare.
unsafe impl QueryFilter for () {
    type State = ();
    const IS_ARCHETYPAL: bool = true;

    fn init_state(_world: &mut World) -> Self::State {}

    fn update_component_access(_state: &Self::State, _access: &mut FilteredAccess) {}

    fn matches_component_set(
        _state: &Self::State,
        _set_contains_id: &impl Fn(ComponentId) -> bool,
    ) -> bool {
        true
    }

    #[inline]
    unsafe fn filter_fetch(
        _world: UnsafeWorldCell<'_>,
        _state: &Self::State,
        _entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> bool {
        true
    }
}

macro_rules! impl_query_filter_tuple {
    ($($name: ident),*) => {
        // SAFETY: every element declares its own reads.
        #[allow(non_snake_case)]
        unsafe impl<$($name: QueryFilter),*> QueryFilter for ($($name,)*) {
            type State = ($($name::State,)*);
            const IS_ARCHETYPAL: bool = true $(&& $name::IS_ARCHETYPAL)*;

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
            unsafe fn filter_fetch(
                world: UnsafeWorldCell<'_>,
                state: &Self::State,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> bool {
                let ($($name,)*) = state;
                // SAFETY: forwarded from the caller.
                true $(&& unsafe { $name::filter_fetch(world, $name, entity, location, last_run, this_run) })*
            }
        }

        // SAFETY: every element declares its own reads, and the filters are merged as
        // alternatives.
        #[allow(non_snake_case)]
        unsafe impl<$($name: QueryFilter),*> QueryFilter for Or<($($name,)*)> {
            type State = ($($name::State,)*);
            const IS_ARCHETYPAL: bool = true $(&& $name::IS_ARCHETYPAL)*;

            fn init_state(world: &mut World) -> Self::State {
                ($($name::init_state(world),)*)
            }

            fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
                let ($($name,)*) = state;
                // Each filter sees the access built so far, and contributes its own branches.
                let mut new_access = FilteredAccess::matches_nothing();
                $(
                    let mut intermediate = access.clone();
                    $name::update_component_access($name, &mut intermediate);
                    new_access.append_or(&intermediate);
                    new_access.extend_access(&intermediate);
                )*
                // Alternatives never require anything beyond what was required before.
                new_access.required = std::mem::take(&mut access.required);
                *access = new_access;
            }

            fn matches_component_set(
                state: &Self::State,
                set_contains_id: &impl Fn(ComponentId) -> bool,
            ) -> bool {
                let ($($name,)*) = state;
                false $(|| $name::matches_component_set($name, set_contains_id))*
            }

            #[inline]
            unsafe fn filter_fetch(
                world: UnsafeWorldCell<'_>,
                state: &Self::State,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> bool {
                let ($($name,)*) = state;
                // SAFETY: archetypes are only read.
                let archetype = &unsafe { world.archetypes() }[location.archetype_id];
                let contains = |id| archetype.contains(id);
                // SAFETY: each filter is only fetched on an archetype it matches.
                false $(|| ($name::matches_component_set($name, &contains)
                    && unsafe { $name::filter_fetch(world, $name, entity, location, last_run, this_run) }))*
            }
        }
    };
}

all_tuples!(impl_query_filter_tuple);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Mutable;

    struct A;
    impl Component for A {
        type Mutability = Mutable;
    }

    struct B;
    impl Component for B {
        type Mutability = Mutable;
    }

    struct C;
    impl Component for C {
        type Mutability = Mutable;
    }

    fn access_of<F: QueryFilter>(world: &mut World) -> FilteredAccess {
        let state = F::init_state(world);
        let mut access = FilteredAccess::default();
        F::update_component_access(&state, &mut access);
        access
    }

    #[test]
    fn with_and_without_only_filter() {
        // Given
        let mut world = World::new();

        // When
        let access = access_of::<(With<A>, Without<B>)>(&mut world);

        // Then
        let a = world.component_id::<A>().unwrap();
        let b = world.component_id::<B>().unwrap();
        assert!(!access.access().has_any_component_read());
        assert_eq!(access.filter_sets().len(), 1);
        assert_eq!(access.filter_sets()[0].with().collect::<Vec<_>>(), vec![a]);
        assert_eq!(access.filter_sets()[0].without().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn or_produces_one_branch_per_filter() {
        // Given
        let mut world = World::new();

        // When
        let access = access_of::<(Without<C>, Or<(With<A>, Changed<B>)>)>(&mut world);

        // Then
        let a = world.component_id::<A>().unwrap();
        let b = world.component_id::<B>().unwrap();
        let c = world.component_id::<C>().unwrap();
        assert_eq!(access.filter_sets().len(), 2);
        assert!(access.access().has_component_read(b));
        assert_eq!(access.required().count(), 0);
        for filter in access.filter_sets() {
            assert_eq!(filter.without().collect::<Vec<_>>(), vec![c]);
        }
        assert_eq!(access.filter_sets()[0].with().collect::<Vec<_>>(), vec![a]);
        assert_eq!(access.filter_sets()[1].with().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn archetypal_flag_follows_elements() {
        assert!(<(With<A>, Without<B>)>::IS_ARCHETYPAL);
        assert!(!<(With<A>, Added<B>)>::IS_ARCHETYPAL);
        assert!(!<Or<(With<A>, Changed<B>)>>::IS_ARCHETYPAL);
        assert!(<Or<(With<A>, With<B>)>>::IS_ARCHETYPAL);
    }

    #[test]
    fn or_matches_any_archetype_of_its_filters() {
        // Given
        let mut world = World::new();
        let state = <Or<(With<A>, With<B>)>>::init_state(&mut world);
        let a = world.component_id::<A>().unwrap();

        // Then
        assert!(<Or<(With<A>, With<B>)>>::matches_component_set(&state, &|id| id == a));
        assert!(!<Or<(With<A>, With<B>)>>::matches_component_set(&state, &|_| false));
    }
}
