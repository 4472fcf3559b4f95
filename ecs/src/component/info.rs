use std::{
    any::{TypeId, type_name},
    borrow::Cow,
};

use indexmap::IndexSet;

use crate::{
    archetype::ArchetypeFlags,
    component::{Component, ComponentHooks, ComponentId, RequiredComponents, StorageType},
    resource::Resource,
    storage::ValueVec,
};

/// How a component behaves when the entity holding it is cloned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ComponentCloneBehavior {
    /// Clone the value if the component supports it.
    #[default]
    Default,
    /// Leave the component off the clone.
    Ignore,
}

/// The static description of a component, fixed before registration.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: Cow<'static, str>,
    storage_type: StorageType,
    type_id: Option<TypeId>,
    mutable: bool,
    clone_behavior: ComponentCloneBehavior,
    new_values: fn() -> Box<dyn ValueVec>,
}

fn new_values<T: Send + Sync + 'static>() -> Box<dyn ValueVec> {
    Box::new(Vec::<T>::new())
}

impl ComponentDescriptor {
    /// Describe the Rust component type `T`.
    pub fn new<T: Component>() -> Self {
        Self {
            name: Cow::Borrowed(type_name::<T>()),
            storage_type: T::STORAGE_TYPE,
            type_id: Some(TypeId::of::<T>()),
            mutable: <T::Mutability as crate::component::ComponentMutability>::MUTABLE,
            clone_behavior: T::clone_behavior(),
            new_values: new_values::<T>,
        }
    }

    /// Describe the Rust resource type `R`.
    ///
    /// Resources live in their own storage, the storage type is only nominal.
    pub fn new_resource<R: Resource>() -> Self {
        Self {
            name: Cow::Borrowed(type_name::<R>()),
            storage_type: StorageType::Table,
            type_id: Some(TypeId::of::<R>()),
            mutable: true,
            clone_behavior: ComponentCloneBehavior::Default,
            new_values: new_values::<R>,
        }
    }

    /// Describe a component that has no Rust type of its own.
    ///
    /// Values are stored as `V`. Two dynamic descriptors never deduplicate against each other,
    /// each registration gets a fresh id.
    pub fn new_dynamic<V: Send + Sync + 'static>(
        name: impl Into<Cow<'static, str>>,
        storage_type: StorageType,
        mutable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            storage_type,
            type_id: None,
            mutable,
            clone_behavior: ComponentCloneBehavior::Default,
            new_values: new_values::<V>,
        }
    }

    /// Override the clone behavior.
    pub fn with_clone_behavior(mut self, clone_behavior: ComponentCloneBehavior) -> Self {
        self.clone_behavior = clone_behavior;
        self
    }

    /// Where values of the component are stored.
    #[inline]
    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// The Rust type id, `None` for dynamic components.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// The component's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the component can be mutated in place.
    #[inline]
    pub fn mutable(&self) -> bool {
        self.mutable
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("storage_type", &self.storage_type)
            .field("type_id", &self.type_id)
            .field("mutable", &self.mutable)
            .field("clone_behavior", &self.clone_behavior)
            .finish()
    }
}

/// Everything the world knows about one registered component.
///
/// The descriptor never changes after registration. Hooks and required components can be
/// extended later.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub(super) id: ComponentId,
    pub(super) descriptor: ComponentDescriptor,
    pub(super) hooks: ComponentHooks,
    pub(super) required_components: RequiredComponents,
    /// Components that require this one, directly or through other components.
    pub(super) required_by: IndexSet<ComponentId>,
}

impl ComponentInfo {
    pub(crate) fn new(id: ComponentId, descriptor: ComponentDescriptor) -> Self {
        Self {
            id,
            descriptor,
            hooks: ComponentHooks::default(),
            required_components: RequiredComponents::default(),
            required_by: IndexSet::default(),
        }
    }

    /// The component's id.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The component's name.
    #[inline]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Whether the component can be mutated in place.
    #[inline]
    pub fn mutable(&self) -> bool {
        self.descriptor.mutable
    }

    /// How the component behaves when its entity is cloned.
    #[inline]
    pub fn clone_behavior(&self) -> ComponentCloneBehavior {
        self.descriptor.clone_behavior
    }

    /// The Rust type id, `None` for dynamic components.
    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.descriptor.type_id
    }

    /// Where values of the component are stored.
    #[inline]
    pub fn storage_type(&self) -> StorageType {
        self.descriptor.storage_type
    }

    /// The component's hooks.
    #[inline]
    pub fn hooks(&self) -> &ComponentHooks {
        &self.hooks
    }

    /// The component's direct and transitive requirements.
    #[inline]
    pub fn required_components(&self) -> &RequiredComponents {
        &self.required_components
    }

    /// Components that require this one, directly or transitively.
    #[inline]
    pub fn required_by(&self) -> &IndexSet<ComponentId> {
        &self.required_by
    }

    /// A fresh, empty value vector for this component's type.
    #[inline]
    pub(crate) fn new_values(&self) -> Box<dyn ValueVec> {
        (self.descriptor.new_values)()
    }

    /// Raise the hook flags of an archetype holding this component.
    pub(crate) fn update_archetype_flags(&self, flags: &mut ArchetypeFlags) {
        if self.hooks.on_add.is_some() {
            flags.insert(ArchetypeFlags::ON_ADD_HOOK);
        }
        if self.hooks.on_insert.is_some() {
            flags.insert(ArchetypeFlags::ON_INSERT_HOOK);
        }
        if self.hooks.on_replace.is_some() {
            flags.insert(ArchetypeFlags::ON_REPLACE_HOOK);
        }
        if self.hooks.on_remove.is_some() {
            flags.insert(ArchetypeFlags::ON_REMOVE_HOOK);
        }
        if self.hooks.on_despawn.is_some() {
            flags.insert(ArchetypeFlags::ON_DESPAWN_HOOK);
        }
    }
}
