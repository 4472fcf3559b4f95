//! Component types and their registration.
//!
//! Components are the data attached to entities. Every component type is registered once per
//! world, which assigns it a dense [`ComponentId`] and records a [`ComponentInfo`] describing how
//! it is stored and what it requires.
//!
//! ## Architecture
//!
//! - [`Component`]: the trait every component type implements, usually via `#[derive(Component)]`.
//! - [`ComponentId`]: the dense id used everywhere below registration.
//! - [`Components`]: the registry of [`ComponentInfo`] indexed by id.
//! - [`ComponentsRegistrator`]: exclusive access used to register types and required components.
//! - [`RequiredComponents`]: the direct and transitive requirements of a component.
//! - [`ComponentHooks`]: per-component lifecycle callbacks.
//!
//! ## Queued registration
//!
//! [`Components::queue_register_component`] reserves an id through `&Components`. The id is
//! usable as a key right away and becomes a full registration on the next
//! [`ComponentsRegistrator::apply_queued_registrations`], or when the same type is registered
//! directly.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rusty_ecs::prelude::*;
//!
//! #[derive(Component, Default)]
//! struct Health(u32);
//!
//! #[derive(Component)]
//! #[component(storage = "SparseSet")]
//! #[require(Health = Health(100))]
//! struct Enemy;
//!
//! let mut world = World::new();
//! let enemy = world.register_component::<Enemy>();
//! let info = world.components().get_info(enemy).unwrap();
//! assert_eq!(info.storage_type(), StorageType::SparseSet);
//! ```

mod hooks;
mod info;
mod queued;
mod registry;
mod required;

pub use hooks::{ComponentHook, ComponentHooks, HookContext, HookError};
pub use info::{ComponentCloneBehavior, ComponentDescriptor, ComponentInfo};
pub use registry::{Components, ComponentsRegistrator};
pub use required::{
    RequiredComponent, RequiredComponentConstructor, RequiredComponents,
    RequiredComponentsError, RequiredComponentsRegistrator,
};

use crate::storage::SparseSetIndex;

/// A component identifier, dense across components and resources of one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Construct a component id from its raw index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the index of this component if it were to live in indexable storage (e.g. Vec)
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl SparseSetIndex for ComponentId {
    #[inline]
    fn sparse_set_index(&self) -> usize {
        self.index()
    }

    #[inline]
    fn get_sparse_set_index(value: usize) -> Self {
        Self::new(value)
    }
}

/// Where the values of a component live.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// A column in the archetype's table. Fast iteration, moving between archetypes copies it.
    #[default]
    Table,
    /// A per-component sparse set keyed by entity. Cheap to add and remove.
    SparseSet,
}

mod sealed {
    pub trait Sealed {}
}

/// Whether a component may be mutated in place after insertion.
pub trait ComponentMutability: sealed::Sealed + 'static {
    /// `true` for [`Mutable`].
    const MUTABLE: bool;
}

/// Marker for components that can be borrowed mutably.
pub struct Mutable;

/// Marker for components that can only be replaced, never mutated in place.
pub struct Immutable;

impl sealed::Sealed for Mutable {}
impl sealed::Sealed for Immutable {}

impl ComponentMutability for Mutable {
    const MUTABLE: bool = true;
}

impl ComponentMutability for Immutable {
    const MUTABLE: bool = false;
}

/// A data type that can be attached to entities.
///
/// # Derive Macro
///
/// ```rust,ignore
/// #[derive(Component)]
/// #[component(storage = "SparseSet", on_add = log_added)]
/// #[require(Transform)]
/// struct Marker;
/// ```
///
/// # Trait Bounds
///
/// - `'static`: No borrowed data
/// - `Send + Sync`: Safe to share across threads
pub trait Component: Send + Sync + 'static {
    /// Where values of this component are stored.
    const STORAGE_TYPE: StorageType = StorageType::Table;

    /// [`Mutable`] or [`Immutable`].
    type Mutability: ComponentMutability;

    /// Declare the components this one requires.
    ///
    /// Called once, while `component_id` is being registered.
    fn register_required_components(
        _component_id: ComponentId,
        _required: &mut RequiredComponentsRegistrator<'_, '_>,
    ) {
    }

    /// Hook run when the component is added to an entity that did not have it.
    fn on_add() -> Option<ComponentHook> {
        None
    }

    /// Hook run every time the component is written by an insert, new or not.
    fn on_insert() -> Option<ComponentHook> {
        None
    }

    /// Hook run before an existing value is overwritten or removed.
    fn on_replace() -> Option<ComponentHook> {
        None
    }

    /// Hook run before the component is removed from an entity.
    fn on_remove() -> Option<ComponentHook> {
        None
    }

    /// Hook run before an entity holding the component is despawned.
    fn on_despawn() -> Option<ComponentHook> {
        None
    }

    /// How the component behaves when its entity is cloned.
    fn clone_behavior() -> ComponentCloneBehavior {
        ComponentCloneBehavior::Default
    }
}
