use thiserror::Error;

use crate::{
    component::{Component, ComponentId},
    entity::Entity,
    observer::LifecycleEvent,
    world::DeferredWorld,
};

/// A lifecycle callback attached to a component type.
///
/// Hooks get a [`DeferredWorld`], which can read and mutate component values but cannot change
/// the archetype of any entity.
pub type ComponentHook = for<'w> fn(DeferredWorld<'w>, HookContext);

/// The entity and component a hook or observer is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookContext {
    /// The entity whose component triggered the event.
    pub entity: Entity,

    /// The component the event is about.
    pub component_id: ComponentId,
}

/// Failure to attach a hook.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    /// The component already has a hook for this event.
    #[error("component already has an {0:?} hook")]
    AlreadySet(LifecycleEvent),

    /// The component is already stored in some archetype, whose flags would go stale.
    #[error("hooks for component {0} cannot change once it is stored in an archetype")]
    ComponentInUse(String),
}

/// The lifecycle hooks of one component.
#[derive(Debug, Clone, Default)]
pub struct ComponentHooks {
    pub(crate) on_add: Option<ComponentHook>,
    pub(crate) on_insert: Option<ComponentHook>,
    pub(crate) on_replace: Option<ComponentHook>,
    pub(crate) on_remove: Option<ComponentHook>,
    pub(crate) on_despawn: Option<ComponentHook>,
}

impl ComponentHooks {
    pub(crate) fn update_from_component<C: Component>(&mut self) -> &mut Self {
        if let Some(hook) = C::on_add() {
            self.on_add = Some(hook);
        }
        if let Some(hook) = C::on_insert() {
            self.on_insert = Some(hook);
        }
        if let Some(hook) = C::on_replace() {
            self.on_replace = Some(hook);
        }
        if let Some(hook) = C::on_remove() {
            self.on_remove = Some(hook);
        }
        if let Some(hook) = C::on_despawn() {
            self.on_despawn = Some(hook);
        }
        self
    }

    fn slot(&mut self, event: LifecycleEvent) -> &mut Option<ComponentHook> {
        match event {
            LifecycleEvent::OnAdd => &mut self.on_add,
            LifecycleEvent::OnInsert => &mut self.on_insert,
            LifecycleEvent::OnReplace => &mut self.on_replace,
            LifecycleEvent::OnRemove => &mut self.on_remove,
            LifecycleEvent::OnDespawn => &mut self.on_despawn,
        }
    }

    /// Attach `hook` for `event`, failing if one is already attached.
    pub fn try_set(
        &mut self,
        event: LifecycleEvent,
        hook: ComponentHook,
    ) -> Result<&mut Self, HookError> {
        let slot = self.slot(event);
        if slot.is_some() {
            return Err(HookError::AlreadySet(event));
        }
        *slot = Some(hook);
        Ok(self)
    }

    /// Attach an `on_add` hook.
    ///
    /// # Panics
    ///
    /// Panics if the component already has one.
    pub fn on_add(&mut self, hook: ComponentHook) -> &mut Self {
        self.try_on_add(hook)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Attach an `on_insert` hook.
    ///
    /// # Panics
    ///
    /// Panics if the component already has one.
    pub fn on_insert(&mut self, hook: ComponentHook) -> &mut Self {
        self.try_on_insert(hook)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Attach an `on_replace` hook.
    ///
    /// # Panics
    ///
    /// Panics if the component already has one.
    pub fn on_replace(&mut self, hook: ComponentHook) -> &mut Self {
        self.try_on_replace(hook)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Attach an `on_remove` hook.
    ///
    /// # Panics
    ///
    /// Panics if the component already has one.
    pub fn on_remove(&mut self, hook: ComponentHook) -> &mut Self {
        self.try_on_remove(hook)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Attach an `on_despawn` hook.
    ///
    /// # Panics
    ///
    /// Panics if the component already has one.
    pub fn on_despawn(&mut self, hook: ComponentHook) -> &mut Self {
        self.try_on_despawn(hook)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible [`ComponentHooks::on_add`].
    pub fn try_on_add(&mut self, hook: ComponentHook) -> Result<&mut Self, HookError> {
        self.try_set(LifecycleEvent::OnAdd, hook)
    }

    /// Fallible [`ComponentHooks::on_insert`].
    pub fn try_on_insert(&mut self, hook: ComponentHook) -> Result<&mut Self, HookError> {
        self.try_set(LifecycleEvent::OnInsert, hook)
    }

    /// Fallible [`ComponentHooks::on_replace`].
    pub fn try_on_replace(&mut self, hook: ComponentHook) -> Result<&mut Self, HookError> {
        self.try_set(LifecycleEvent::OnReplace, hook)
    }

    /// Fallible [`ComponentHooks::on_remove`].
    pub fn try_on_remove(&mut self, hook: ComponentHook) -> Result<&mut Self, HookError> {
        self.try_set(LifecycleEvent::OnRemove, hook)
    }

    /// Fallible [`ComponentHooks::on_despawn`].
    pub fn try_on_despawn(&mut self, hook: ComponentHook) -> Result<&mut Self, HookError> {
        self.try_set(LifecycleEvent::OnDespawn, hook)
    }

    /// The hook attached for `event`, if any.
    #[inline]
    pub fn get(&self, event: LifecycleEvent) -> Option<ComponentHook> {
        match event {
            LifecycleEvent::OnAdd => self.on_add,
            LifecycleEvent::OnInsert => self.on_insert,
            LifecycleEvent::OnReplace => self.on_replace,
            LifecycleEvent::OnRemove => self.on_remove,
            LifecycleEvent::OnDespawn => self.on_despawn,
        }
    }
}
