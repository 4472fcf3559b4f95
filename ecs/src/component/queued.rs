use std::{any::TypeId, fmt};

use crossbeam::queue::SegQueue;
use dashmap::DashMap;

use crate::component::{ComponentDescriptor, ComponentId, ComponentsRegistrator};

type Registrator =
    Box<dyn FnOnce(&mut ComponentsRegistrator<'_>, ComponentId, ComponentDescriptor) + Send + Sync>;

/// A registration whose id is already reserved but whose info is not stored yet.
pub(super) struct QueuedRegistration {
    registrator: Registrator,
    pub(super) id: ComponentId,
    descriptor: ComponentDescriptor,
}

impl QueuedRegistration {
    pub(super) fn new(
        id: ComponentId,
        descriptor: ComponentDescriptor,
        registrator: impl FnOnce(&mut ComponentsRegistrator<'_>, ComponentId, ComponentDescriptor)
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            registrator: Box::new(registrator),
            id,
            descriptor,
        }
    }

    /// Perform the registration, returning the now valid id.
    pub(super) fn register(self, registrator: &mut ComponentsRegistrator<'_>) -> ComponentId {
        (self.registrator)(registrator, self.id, self.descriptor);
        self.id
    }
}

/// Registrations queued through `&Components`.
///
/// Typed registrations are keyed by `TypeId` so a repeated queue request returns the same id.
/// Dynamic registrations have no key and are kept in queue order, which is also id order.
#[derive(Default)]
pub(super) struct QueuedComponents {
    pub(super) components: DashMap<TypeId, QueuedRegistration>,
    pub(super) resources: DashMap<TypeId, QueuedRegistration>,
    pub(super) dynamic_registrations: SegQueue<QueuedRegistration>,
}

impl QueuedComponents {
    pub(super) fn len(&self) -> usize {
        self.components.len() + self.resources.len() + self.dynamic_registrations.len()
    }

    fn lowest(map: &DashMap<TypeId, QueuedRegistration>) -> Option<(ComponentId, TypeId)> {
        // The key is copied out so no shard guard outlives this call.
        map.iter()
            .map(|entry| (entry.value().id, *entry.key()))
            .min_by_key(|(id, _)| *id)
    }

    /// The lowest id among typed registrations.
    pub(super) fn lowest_typed_id(&self) -> Option<ComponentId> {
        let component = Self::lowest(&self.components).map(|(id, _)| id);
        let resource = Self::lowest(&self.resources).map(|(id, _)| id);
        component.into_iter().chain(resource).min()
    }

    /// Remove the typed registration with the lowest id, if any.
    pub(super) fn pop_lowest_typed(&self) -> Option<QueuedRegistration> {
        match (Self::lowest(&self.components), Self::lowest(&self.resources)) {
            (Some((c, type_id)), Some((r, _))) if c < r => {
                self.components.remove(&type_id).map(|(_, queued)| queued)
            }
            (_, Some((_, type_id))) => self.resources.remove(&type_id).map(|(_, queued)| queued),
            (Some((_, type_id)), None) => {
                self.components.remove(&type_id).map(|(_, queued)| queued)
            }
            (None, None) => None,
        }
    }
}

impl fmt::Debug for QueuedComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components = self
            .components
            .iter()
            .map(|entry| entry.value().id)
            .collect::<Vec<_>>();
        let resources = self
            .resources
            .iter()
            .map(|entry| entry.value().id)
            .collect::<Vec<_>>();
        write!(
            f,
            "components: {components:?}, resources: {resources:?}, dynamic_registrations: {}",
            self.dynamic_registrations.len()
        )
    }
}
