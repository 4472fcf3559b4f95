//! Bundles: statically known groups of components inserted or spawned together.
//!
//! Every [`Component`] is a bundle of one, and tuples of bundles are bundles. A bundle type gets
//! a [`BundleInfo`] the first time it is used, which fixes the order of its explicit components
//! and the required components they pull in.
//!
//! # Write protocol
//!
//! For each component of a bundle, given its [`ComponentStatus`](crate::archetype::ComponentStatus)
//! and the [`InsertMode`]:
//!
//! | Status | Mode | Effect |
//! |--------|------|--------|
//! | `Added` | any | slot initialized, added and changed ticks stamped |
//! | `Existing` | `Replace` | value overwritten, changed tick stamped |
//! | `Existing` | `Keep` | incoming value dropped |
//!
//! Then every required component the entity still lacks is default constructed.

mod info;
mod insert;
mod remove;
mod spawner;
mod writer;

use thiserror::Error;

use crate::{
    component::{Component, ComponentId, Components, ComponentsRegistrator},
    entity::Entity,
    storage::SparseSetIndex,
    world::World,
};

pub use info::{BundleInfo, Bundles};
pub(crate) use insert::BundleInserter;
pub(crate) use remove::{BundleRemover, TakenSource};
pub(crate) use spawner::BundleSpawner;
pub use writer::ComponentWriter;

/// The identifier of a registered bundle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleId(u32);

impl BundleId {
    /// Create an id from an index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// The index of the id.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl SparseSetIndex for BundleId {
    #[inline]
    fn sparse_set_index(&self) -> usize {
        self.index()
    }

    #[inline]
    fn get_sparse_set_index(value: usize) -> Self {
        Self::new(value)
    }
}

/// What to do with a bundle component the entity already has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
    /// Overwrite the existing value.
    #[default]
    Replace,
    /// Keep the existing value and drop the incoming one.
    Keep,
}

/// Failure to register a bundle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundleError {
    /// The bundle names a component more than once.
    #[error("bundle {bundle} contains duplicate components: {}", names.join(", "))]
    DuplicateComponents {
        /// The bundle type.
        bundle: String,
        /// Every duplicated component, once each.
        names: Vec<String>,
    },
}

/// A statically known group of components.
///
/// Implemented for every [`Component`] and for tuples of bundles up to 15 elements.
pub trait Bundle: DynamicBundle + Send + Sync + 'static {
    /// Register the bundle's components, reporting their ids in bundle order.
    fn component_ids(
        components: &mut ComponentsRegistrator<'_>,
        ids: &mut impl FnMut(ComponentId),
    );

    /// Report the ids of the bundle's components in bundle order, `None` for unregistered ones.
    fn get_component_ids(components: &Components, ids: &mut impl FnMut(Option<ComponentId>));

    /// Rebuild the bundle from components handed out by `source`, in bundle order.
    fn from_components<S: ComponentSource>(source: &mut S) -> Self
    where
        Self: Sized;
}

/// The write half of a bundle.
pub trait DynamicBundle {
    /// Applied to the entity once the bundle has been written.
    type Effect: BundleEffect;

    /// Hand every component to `sink`, in bundle order.
    fn get_components(self, sink: &mut impl ComponentSink) -> Self::Effect;
}

/// Receives the components of a bundle being written.
pub trait ComponentSink {
    /// Accept the next component.
    fn push<C: Component>(&mut self, component: C);
}

/// Hands out the components of a bundle being rebuilt.
pub trait ComponentSource {
    /// Produce the next component.
    fn take<C: Component>(&mut self) -> C;
}

/// A follow-up action run after a bundle was written to an entity.
pub trait BundleEffect {
    /// Run the effect.
    fn apply(self, world: &mut World, entity: Entity);
}

impl BundleEffect for () {
    #[inline]
    fn apply(self, _world: &mut World, _entity: Entity) {}
}

impl<C: Component> Bundle for C {
    fn component_ids(
        components: &mut ComponentsRegistrator<'_>,
        ids: &mut impl FnMut(ComponentId),
    ) {
        ids(components.register_component::<C>());
    }

    fn get_component_ids(components: &Components, ids: &mut impl FnMut(Option<ComponentId>)) {
        ids(components.valid_component_id::<C>());
    }

    fn from_components<S: ComponentSource>(source: &mut S) -> Self {
        source.take::<C>()
    }
}

impl<C: Component> DynamicBundle for C {
    type Effect = ();

    #[inline]
    fn get_components(self, sink: &mut impl ComponentSink) -> Self::Effect {
        sink.push(self);
    }
}

impl Bundle for () {
    fn component_ids(
        _components: &mut ComponentsRegistrator<'_>,
        _ids: &mut impl FnMut(ComponentId),
    ) {
    }

    fn get_component_ids(_components: &Components, _ids: &mut impl FnMut(Option<ComponentId>)) {}

    fn from_components<S: ComponentSource>(_source: &mut S) -> Self {}
}

impl DynamicBundle for () {
    type Effect = ();

    #[inline]
    fn get_components(self, _sink: &mut impl ComponentSink) -> Self::Effect {}
}

macro_rules! tuple_impl {
    ($($name: ident),*) => {
        impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            fn component_ids(
                components: &mut ComponentsRegistrator<'_>,
                ids: &mut impl FnMut(ComponentId),
            ) {
                $(<$name as Bundle>::component_ids(components, ids);)*
            }

            fn get_component_ids(
                components: &Components,
                ids: &mut impl FnMut(Option<ComponentId>),
            ) {
                $(<$name as Bundle>::get_component_ids(components, ids);)*
            }

            fn from_components<S: ComponentSource>(source: &mut S) -> Self {
                ($(<$name as Bundle>::from_components(source),)*)
            }
        }

        impl<$($name: DynamicBundle),*> DynamicBundle for ($($name,)*) {
            type Effect = ($($name::Effect,)*);

            #[allow(non_snake_case)]
            fn get_components(self, sink: &mut impl ComponentSink) -> Self::Effect {
                let ($($name,)*) = self;
                ($($name.get_components(sink),)*)
            }
        }

        impl<$($name: BundleEffect),*> BundleEffect for ($($name,)*) {
            #[allow(non_snake_case)]
            fn apply(self, world: &mut World, entity: Entity) {
                let ($($name,)*) = self;
                $($name.apply(world, entity);)*
            }
        }
    };
}

all_tuples!(tuple_impl);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Mutable;

    struct A(u8);
    impl Component for A {
        type Mutability = Mutable;
    }

    struct B(u16);
    impl Component for B {
        type Mutability = Mutable;
    }

    #[derive(Default)]
    struct Names(Vec<&'static str>);

    impl ComponentSink for Names {
        fn push<C: Component>(&mut self, _component: C) {
            self.0.push(std::any::type_name::<C>());
        }
    }

    #[test]
    fn nested_tuples_flatten_in_order() {
        // Given
        let mut components = Components::new();
        let mut ids = Vec::new();

        // When
        <(A, (B, A))>::component_ids(&mut ComponentsRegistrator::new(&mut components), &mut |id| {
            ids.push(id)
        });

        // Then
        let a = components.component_id::<A>().unwrap();
        let b = components.component_id::<B>().unwrap();
        assert_eq!(ids, vec![a, b, a]);
    }

    #[test]
    fn get_components_visits_every_component() {
        // Given
        let mut names = Names::default();

        // When
        (A(1), (B(2),)).get_components(&mut names);

        // Then
        assert_eq!(names.0.len(), 2);
        assert!(names.0[0].ends_with("A"));
        assert!(names.0[1].ends_with("B"));
    }

    #[test]
    fn get_component_ids_reports_unregistered() {
        // Given
        let mut components = Components::new();
        ComponentsRegistrator::new(&mut components).register_component::<A>();
        let mut ids = Vec::new();

        // When
        <(A, B)>::get_component_ids(&components, &mut |id| ids.push(id));

        // Then
        assert_eq!(ids, vec![components.component_id::<A>(), None]);
    }

    #[test]
    fn duplicate_error_lists_names() {
        // Given
        let error = BundleError::DuplicateComponents {
            bundle: "(A, A)".into(),
            names: vec!["A".into()],
        };

        // Then
        assert_eq!(error.to_string(), "bundle (A, A) contains duplicate components: A");
    }
}
