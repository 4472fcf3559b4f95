use std::{
    any::TypeId,
    collections::HashMap,
    ops::Deref,
    sync::atomic::{AtomicU32, Ordering},
};

use log::{debug, trace};

use super::queued::{QueuedComponents, QueuedRegistration};
use crate::{
    component::{
        Component, ComponentDescriptor, ComponentHooks, ComponentId, ComponentInfo,
        RequiredComponents, RequiredComponentsRegistrator,
    },
    resource::Resource,
};

/// The registry of every component and resource known to a world.
///
/// Ids are handed out by an atomic counter so [`Components::queue_register_component`] can
/// reserve them through a shared reference. Everything else that mutates the registry goes
/// through a [`ComponentsRegistrator`].
#[derive(Debug, Default)]
pub struct Components {
    pub(super) components: Vec<Option<ComponentInfo>>,
    pub(super) indices: HashMap<TypeId, ComponentId>,
    pub(super) resource_indices: HashMap<TypeId, ComponentId>,
    pub(super) queued: QueuedComponents,
    next_id: AtomicU32,
}

impl Components {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next component id.
    #[inline]
    fn next_id(&self) -> ComponentId {
        ComponentId::new(self.next_id.fetch_add(1, Ordering::Relaxed) as usize)
    }

    /// Store the info for `id`, growing the id space if needed.
    pub(super) fn insert_info(
        &mut self,
        id: ComponentId,
        descriptor: ComponentDescriptor,
    ) -> &mut ComponentInfo {
        let index = id.index();
        if self.components.len() <= index {
            self.components.resize_with(index + 1, || None);
        }
        trace!("registered component {} as {:?}", descriptor.name(), id);
        self.components[index].insert(ComponentInfo::new(id, descriptor))
    }

    /// Info of a registered component.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered, which is a bug in the caller.
    pub(super) fn info(&self, id: ComponentId) -> &ComponentInfo {
        self.get_info(id)
            .unwrap_or_else(|| panic!("component {id:?} is not registered"))
    }

    /// Mutable info of a registered component.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered, which is a bug in the caller.
    pub(super) fn info_mut(&mut self, id: ComponentId) -> &mut ComponentInfo {
        self.components
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("component {id:?} is not registered"))
    }

    /// The number of ids handed out, queued ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    /// Returns `true` if no id has been handed out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of fully registered components and resources.
    pub fn num_registered(&self) -> usize {
        self.components.iter().filter(|info| info.is_some()).count()
    }

    /// The number of queued registrations.
    #[inline]
    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    /// Returns `true` if any registration is queued.
    #[inline]
    pub fn any_queued(&self) -> bool {
        self.num_queued() > 0
    }

    /// Info of a registered component, `None` for unknown or queued ids.
    #[inline]
    pub fn get_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.get(id.index()).and_then(Option::as_ref)
    }

    /// The name of a registered component.
    #[inline]
    pub fn get_name(&self, id: ComponentId) -> Option<&str> {
        self.get_info(id).map(ComponentInfo::name)
    }

    /// The name of `id`, or its debug form when it is not registered.
    pub(crate) fn display_name(&self, id: ComponentId) -> String {
        self.get_name(id)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{id:?}"))
    }

    /// Returns `true` if `id` is fully registered.
    #[inline]
    pub fn is_id_valid(&self, id: ComponentId) -> bool {
        self.get_info(id).is_some()
    }

    /// Hooks of a registered component.
    #[inline]
    pub(crate) fn get_hooks_mut(&mut self, id: ComponentId) -> Option<&mut ComponentHooks> {
        self.components
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .map(|info| &mut info.hooks)
    }

    /// Required components of a registered component.
    #[inline]
    pub fn get_required_components(&self, id: ComponentId) -> Option<&RequiredComponents> {
        self.get_info(id).map(ComponentInfo::required_components)
    }

    /// The id of the component type `type_id`, registered or queued.
    pub fn get_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.indices.get(&type_id).copied().or_else(|| {
            self.queued
                .components
                .get(&type_id)
                .map(|queued| queued.id)
        })
    }

    /// The id of component `T`, registered or queued.
    #[inline]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.get_id(TypeId::of::<T>())
    }

    /// The id of component `T`, only if fully registered.
    #[inline]
    pub fn valid_component_id<T: Component>(&self) -> Option<ComponentId> {
        self.indices.get(&TypeId::of::<T>()).copied()
    }

    /// The id of the resource type `type_id`, registered or queued.
    pub fn get_resource_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.resource_indices.get(&type_id).copied().or_else(|| {
            self.queued
                .resources
                .get(&type_id)
                .map(|queued| queued.id)
        })
    }

    /// The id of resource `R`, registered or queued.
    #[inline]
    pub fn resource_id<R: Resource>(&self) -> Option<ComponentId> {
        self.get_resource_id(TypeId::of::<R>())
    }

    /// The id of resource `R`, only if fully registered.
    #[inline]
    pub fn valid_resource_id<R: Resource>(&self) -> Option<ComponentId> {
        self.resource_indices.get(&TypeId::of::<R>()).copied()
    }

    /// Every fully registered component and resource, in id order.
    pub fn iter_registered(&self) -> impl Iterator<Item = &ComponentInfo> + '_ {
        self.components.iter().filter_map(Option::as_ref)
    }

    /// Reserve an id for component `T` without exclusive access.
    ///
    /// Returns the existing id if `T` is registered or already queued. The id becomes fully
    /// registered on the next [`ComponentsRegistrator::apply_queued_registrations`].
    pub fn queue_register_component<T: Component>(&self) -> ComponentId {
        if let Some(id) = self.indices.get(&TypeId::of::<T>()) {
            return *id;
        }
        self.queued
            .components
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                QueuedRegistration::new(
                    self.next_id(),
                    ComponentDescriptor::new::<T>(),
                    |registrator, id, _descriptor| registrator.register_component_unchecked::<T>(id),
                )
            })
            .id
    }

    /// Reserve an id for resource `R` without exclusive access.
    pub fn queue_register_resource<R: Resource>(&self) -> ComponentId {
        if let Some(id) = self.resource_indices.get(&TypeId::of::<R>()) {
            return *id;
        }
        self.queued
            .resources
            .entry(TypeId::of::<R>())
            .or_insert_with(|| {
                QueuedRegistration::new(
                    self.next_id(),
                    ComponentDescriptor::new_resource::<R>(),
                    |registrator, id, descriptor| {
                        registrator.register_resource_unchecked(TypeId::of::<R>(), id, descriptor)
                    },
                )
            })
            .id
    }

    /// Reserve an id for a dynamic component without exclusive access.
    ///
    /// Every call reserves a new id.
    pub fn queue_register_component_with_descriptor(
        &self,
        descriptor: ComponentDescriptor,
    ) -> ComponentId {
        let id = self.next_id();
        self.queued
            .dynamic_registrations
            .push(QueuedRegistration::new(id, descriptor, |registrator, id, descriptor| {
                registrator.components.insert_info(id, descriptor);
            }));
        id
    }
}

/// Exclusive access to [`Components`] for registering types.
///
/// Tracks the chain of components whose required components are being registered, so a type
/// that transitively requires itself is caught instead of silently forming a cycle.
pub struct ComponentsRegistrator<'w> {
    pub(super) components: &'w mut Components,
    recursion_check_stack: Vec<ComponentId>,
}

impl Deref for ComponentsRegistrator<'_> {
    type Target = Components;

    fn deref(&self) -> &Self::Target {
        self.components
    }
}

impl<'w> ComponentsRegistrator<'w> {
    /// Wrap the registry for registration.
    pub fn new(components: &'w mut Components) -> Self {
        Self {
            components,
            recursion_check_stack: Vec::new(),
        }
    }

    /// Register component `T`, returning its id.
    ///
    /// Registering the same type again returns the same id. A queued registration of `T` is
    /// consumed and keeps its reserved id.
    ///
    /// # Panics
    ///
    /// Panics if `T` is reached again while its own required components are being registered.
    pub fn register_component<T: Component>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.components.indices.get(&type_id) {
            self.enforce_no_required_components_recursion(id);
            return id;
        }

        if let Some((_, queued)) = self.components.queued.components.remove(&type_id) {
            return queued.register(self);
        }

        let id = self.components.next_id();
        self.register_component_unchecked::<T>(id);
        id
    }

    /// Register `T` under an id that is already reserved for it.
    pub(super) fn register_component_unchecked<T: Component>(&mut self, id: ComponentId) {
        self.components.indices.insert(TypeId::of::<T>(), id);
        self.components
            .insert_info(id, ComponentDescriptor::new::<T>())
            .hooks
            .update_from_component::<T>();

        self.recursion_check_stack.push(id);
        let mut required = RequiredComponentsRegistrator::new(self, id);
        T::register_required_components(id, &mut required);
        let direct = required.into_direct();
        self.recursion_check_stack.pop();

        self.components.set_direct_required_components(id, direct);
    }

    /// Register a component described at runtime. Every call creates a new id.
    pub fn register_component_with_descriptor(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> ComponentId {
        let id = self.components.next_id();
        self.components.insert_info(id, descriptor);
        id
    }

    /// Register resource `R`, returning its id.
    pub fn register_resource<R: Resource>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<R>();
        if let Some(&id) = self.components.resource_indices.get(&type_id) {
            return id;
        }

        if let Some((_, queued)) = self.components.queued.resources.remove(&type_id) {
            return queued.register(self);
        }

        let id = self.components.next_id();
        self.register_resource_unchecked(type_id, id, ComponentDescriptor::new_resource::<R>());
        id
    }

    fn register_resource_unchecked(
        &mut self,
        type_id: TypeId,
        id: ComponentId,
        descriptor: ComponentDescriptor,
    ) {
        self.components.resource_indices.insert(type_id, id);
        self.components.insert_info(id, descriptor);
    }

    /// Finish every queued registration, in ascending id order.
    pub fn apply_queued_registrations(&mut self) {
        if !self.components.any_queued() {
            return;
        }

        let mut dynamic = Vec::with_capacity(self.components.queued.dynamic_registrations.len());
        while let Some(queued) = self.components.queued.dynamic_registrations.pop() {
            dynamic.push(queued);
        }
        let mut dynamic = dynamic.into_iter().peekable();

        let mut applied = 0usize;
        loop {
            let take_dynamic = match (self.components.queued.lowest_typed_id(), dynamic.peek()) {
                (Some(typed), Some(next_dynamic)) => next_dynamic.id < typed,
                (None, Some(_)) => true,
                (_, None) => false,
            };
            let next = if take_dynamic {
                dynamic.next()
            } else {
                self.components.queued.pop_lowest_typed()
            };
            let Some(queued) = next else {
                break;
            };
            queued.register(self);
            applied += 1;
        }

        debug!("applied {applied} queued component registrations");
    }

    fn enforce_no_required_components_recursion(&self, id: ComponentId) {
        if let Some(position) = self.recursion_check_stack.iter().position(|&x| x == id) {
            let cycle = self.recursion_check_stack[position..]
                .iter()
                .chain(std::iter::once(&id))
                .map(|id| self.components.display_name(*id))
                .collect::<Vec<_>>()
                .join(" → ");
            panic!("Recursive required components detected: {cycle}");
        }
    }
}
