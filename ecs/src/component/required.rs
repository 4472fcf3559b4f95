use std::{fmt, sync::Arc};

use indexmap::{IndexMap, map::Entry};
use log::trace;
use thiserror::Error;

use crate::{
    bundle::ComponentWriter,
    component::{Component, ComponentId, Components, ComponentsRegistrator},
};

/// Builds the default value of a required component and writes it into storage.
#[derive(Clone)]
pub struct RequiredComponentConstructor(Arc<dyn Fn(&mut ComponentWriter<'_>) + Send + Sync>);

impl RequiredComponentConstructor {
    /// A constructor writing `constructor()` as component `component_id`.
    pub fn new<C: Component>(
        component_id: ComponentId,
        constructor: impl Fn() -> C + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(move |writer: &mut ComponentWriter<'_>| {
            writer.initialize(component_id, constructor());
        }))
    }

    /// Build the value and write it.
    #[inline]
    pub(crate) fn initialize(&self, writer: &mut ComponentWriter<'_>) {
        (self.0)(writer)
    }
}

impl fmt::Debug for RequiredComponentConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RequiredComponentConstructor")
    }
}

/// One required component.
#[derive(Debug, Clone)]
pub struct RequiredComponent {
    /// Builds the value when an insert does not provide one.
    pub constructor: RequiredComponentConstructor,
    /// How many requirement hops away the constructor was declared. Direct requirements are 0.
    pub inheritance_depth: u16,
}

/// The requirements of one component.
///
/// `direct` holds what the component declared itself, in declaration order. `all` is the
/// transitive closure: direct requirements first, then each direct requirement's own `all` in
/// order. When several paths lead to the same component, the constructor with the smallest
/// `inheritance_depth` wins, and among equally deep ones the first in that order.
#[derive(Debug, Clone, Default)]
pub struct RequiredComponents {
    pub(crate) direct: IndexMap<ComponentId, RequiredComponent>,
    pub(crate) all: IndexMap<ComponentId, RequiredComponent>,
}

impl RequiredComponents {
    /// The declared requirements.
    #[inline]
    pub fn direct(&self) -> &IndexMap<ComponentId, RequiredComponent> {
        &self.direct
    }

    /// The transitive requirements.
    #[inline]
    pub fn all(&self) -> &IndexMap<ComponentId, RequiredComponent> {
        &self.all
    }

    /// Returns `true` if nothing is required.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Ids of every transitively required component.
    pub fn iter_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.all.keys().copied()
    }
}

/// Failure to add a required component.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequiredComponentsError {
    /// The requirement would make a component require itself.
    #[error(
        "cyclic requirement: {required_name} ({required:?}) already requires {requiree_name} ({requiree:?})"
    )]
    CyclicRequirement {
        requiree: ComponentId,
        requiree_name: String,
        required: ComponentId,
        required_name: String,
    },

    /// The requiree already directly requires the component.
    #[error(
        "duplicate requirement: {requiree_name} ({requiree:?}) already requires {required_name} ({required:?})"
    )]
    DuplicateRegistration {
        requiree: ComponentId,
        requiree_name: String,
        required: ComponentId,
        required_name: String,
    },

    /// The requiree is already stored in an archetype built from its old requirements.
    #[error("{0} is already stored in an archetype, its requirements can no longer change")]
    ArchetypeExists(String),
}

/// Collects the direct requirements of a component while it is being registered.
///
/// Handed to [`Component::register_required_components`].
pub struct RequiredComponentsRegistrator<'a, 'w> {
    registrator: &'a mut ComponentsRegistrator<'w>,
    requiree: ComponentId,
    direct: IndexMap<ComponentId, RequiredComponent>,
}

impl<'a, 'w> RequiredComponentsRegistrator<'a, 'w> {
    pub(super) fn new(registrator: &'a mut ComponentsRegistrator<'w>, requiree: ComponentId) -> Self {
        Self {
            registrator,
            requiree,
            direct: IndexMap::new(),
        }
    }

    pub(super) fn into_direct(self) -> IndexMap<ComponentId, RequiredComponent> {
        self.direct
    }

    /// Require `C`, built by `constructor` when an insert does not provide it.
    ///
    /// # Panics
    ///
    /// Panics if `C` is required twice, or if `C` transitively requires the requiree.
    pub fn register_required<C: Component>(
        &mut self,
        constructor: impl Fn() -> C + Send + Sync + 'static,
    ) {
        let id = self.registrator.register_component::<C>();
        match self.direct.entry(id) {
            Entry::Occupied(_) => panic!(
                "{} requires {} more than once",
                self.registrator.display_name(self.requiree),
                self.registrator.display_name(id),
            ),
            Entry::Vacant(entry) => {
                entry.insert(RequiredComponent {
                    constructor: RequiredComponentConstructor::new(id, constructor),
                    inheritance_depth: 0,
                });
            }
        }
    }
}

impl Components {
    /// Install the direct requirements of a freshly registered component.
    pub(super) fn set_direct_required_components(
        &mut self,
        requiree: ComponentId,
        direct: IndexMap<ComponentId, RequiredComponent>,
    ) {
        if direct.is_empty() {
            return;
        }
        self.info_mut(requiree).required_components.direct = direct;
        self.rebuild_inherited_required_components(requiree);
        self.register_required_by(requiree);
    }

    /// Make `requiree` require `required`.
    ///
    /// Validation happens before any mutation, so on error the registry is unchanged. On success
    /// the transitive requirements of `requiree` and of every component that requires it are
    /// rebuilt, and `required_by` of every newly required component is updated.
    pub(crate) fn register_required_components(
        &mut self,
        requiree: ComponentId,
        required: ComponentId,
        constructor: RequiredComponentConstructor,
    ) -> Result<(), RequiredComponentsError> {
        if requiree == required || self.info(required).required_components.all.contains_key(&requiree)
        {
            return Err(RequiredComponentsError::CyclicRequirement {
                requiree,
                requiree_name: self.display_name(requiree),
                required,
                required_name: self.display_name(required),
            });
        }
        if self.info(requiree).required_components.direct.contains_key(&required) {
            return Err(RequiredComponentsError::DuplicateRegistration {
                requiree,
                requiree_name: self.display_name(requiree),
                required,
                required_name: self.display_name(required),
            });
        }

        self.info_mut(requiree)
            .required_components
            .direct
            .insert(
                required,
                RequiredComponent {
                    constructor,
                    inheritance_depth: 0,
                },
            );

        // A component requiring another one has a strictly larger closure, so rebuilding in
        // ascending closure size rebuilds every component after the ones it inherits from.
        let mut indirect_requirees: Vec<ComponentId> =
            self.info(requiree).required_by.iter().copied().collect();
        indirect_requirees.sort_by_key(|id| self.info(*id).required_components.all.len());

        self.rebuild_inherited_required_components(requiree);
        for &id in &indirect_requirees {
            self.rebuild_inherited_required_components(id);
        }

        self.register_required_by(requiree);
        for &id in &indirect_requirees {
            self.register_required_by(id);
        }

        trace!(
            "{} now requires {}",
            self.display_name(requiree),
            self.display_name(required)
        );
        Ok(())
    }

    fn rebuild_inherited_required_components(&mut self, id: ComponentId) {
        let direct = &self.info(id).required_components.direct;
        let mut all: IndexMap<ComponentId, RequiredComponent> = direct.clone();
        for required_id in direct.keys() {
            for (inherited_id, inherited) in &self.info(*required_id).required_components.all {
                let inheritance_depth = inherited.inheritance_depth.saturating_add(1);
                match all.entry(*inherited_id) {
                    Entry::Vacant(entry) => {
                        entry.insert(RequiredComponent {
                            constructor: inherited.constructor.clone(),
                            inheritance_depth,
                        });
                    }
                    Entry::Occupied(mut entry) => {
                        if inheritance_depth < entry.get().inheritance_depth {
                            *entry.get_mut() = RequiredComponent {
                                constructor: inherited.constructor.clone(),
                                inheritance_depth,
                            };
                        }
                    }
                }
            }
        }
        self.info_mut(id).required_components.all = all;
    }

    fn register_required_by(&mut self, requiree: ComponentId) {
        let required: Vec<ComponentId> = self.info(requiree).required_components.iter_ids().collect();
        for id in required {
            self.info_mut(id).required_by.insert(requiree);
        }
    }
}
