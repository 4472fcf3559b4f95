use std::sync::Arc;

use crate::{
    archetype::ArchetypeId,
    bundle::BundleId,
    component::{ComponentId, RequiredComponentConstructor},
    storage::SparseArray,
};

/// Whether a bundle component is new to an entity or already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    /// The entity did not have the component.
    Added,
    /// The entity already had the component.
    Existing,
}

/// Reports the [`ComponentStatus`] of each explicit bundle component, by position.
pub trait BundleComponentStatus {
    /// The status of the bundle component at `index`.
    fn get_status(&self, index: usize) -> ComponentStatus;
}

/// Status source for spawning, where every component is new.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnBundleStatus;

impl BundleComponentStatus for SpawnBundleStatus {
    #[inline]
    fn get_status(&self, _index: usize) -> ComponentStatus {
        ComponentStatus::Added
    }
}

/// The cached outcome of inserting a bundle into an archetype.
#[derive(Debug, Clone)]
pub struct ArchetypeAfterBundleInsert {
    /// The destination archetype.
    pub archetype_id: ArchetypeId,
    /// The status of every explicit bundle component, in bundle order.
    pub bundle_status: Box<[ComponentStatus]>,
    /// Constructors for required components the source archetype lacks.
    pub required_components: Box<[RequiredComponentConstructor]>,
    added: Box<[ComponentId]>,
    existing: Box<[ComponentId]>,
}

impl ArchetypeAfterBundleInsert {
    pub(crate) fn new(
        archetype_id: ArchetypeId,
        bundle_status: Vec<ComponentStatus>,
        required_components: Vec<RequiredComponentConstructor>,
        added: Vec<ComponentId>,
        existing: Vec<ComponentId>,
    ) -> Self {
        Self {
            archetype_id,
            bundle_status: bundle_status.into(),
            required_components: required_components.into(),
            added: added.into(),
            existing: existing.into(),
        }
    }

    /// Components the insert adds: explicit ones first, then required ones.
    #[inline]
    pub fn iter_added(&self) -> impl Iterator<Item = ComponentId> + Clone + '_ {
        self.added.iter().copied()
    }

    /// Explicit components the entity already had.
    #[inline]
    pub fn iter_existing(&self) -> impl Iterator<Item = ComponentId> + Clone + '_ {
        self.existing.iter().copied()
    }

    /// Every component the insert writes, added ones first.
    #[inline]
    pub fn iter_inserted(&self) -> impl Iterator<Item = ComponentId> + Clone + '_ {
        self.iter_added().chain(self.iter_existing())
    }

    /// The status of `component_id` after the insert, if the insert touches it.
    pub fn status_of(&self, component_id: ComponentId) -> Option<ComponentStatus> {
        if self.added.contains(&component_id) {
            Some(ComponentStatus::Added)
        } else if self.existing.contains(&component_id) {
            Some(ComponentStatus::Existing)
        } else {
            None
        }
    }
}

impl BundleComponentStatus for ArchetypeAfterBundleInsert {
    #[inline]
    fn get_status(&self, index: usize) -> ComponentStatus {
        self.bundle_status[index]
    }
}

/// Cached archetype transitions, keyed by [`BundleId`].
///
/// Each archetype owns one `Edges`. Once a bundle was inserted into, removed from or taken from an
/// archetype, the destination is remembered so the next identical move is a single lookup.
#[derive(Debug, Default)]
pub struct Edges {
    insert_bundle: SparseArray<BundleId, Arc<ArchetypeAfterBundleInsert>>,
    remove_bundle: SparseArray<BundleId, Option<ArchetypeId>>,
    take_bundle: SparseArray<BundleId, Option<ArchetypeId>>,
}

impl Edges {
    /// The cached outcome of inserting `bundle_id`.
    #[inline]
    pub fn get_archetype_after_bundle_insert(
        &self,
        bundle_id: BundleId,
    ) -> Option<&Arc<ArchetypeAfterBundleInsert>> {
        self.insert_bundle.get(bundle_id)
    }

    pub(crate) fn cache_archetype_after_bundle_insert(
        &mut self,
        bundle_id: BundleId,
        after: ArchetypeAfterBundleInsert,
    ) {
        self.insert_bundle.insert(bundle_id, Arc::new(after));
    }

    /// The cached destination of removing the part of `bundle_id` the archetype has.
    ///
    /// `None` if not cached yet.
    #[inline]
    pub fn get_archetype_after_bundle_remove(&self, bundle_id: BundleId) -> Option<Option<ArchetypeId>> {
        self.remove_bundle.get(bundle_id).copied()
    }

    pub(crate) fn cache_archetype_after_bundle_remove(
        &mut self,
        bundle_id: BundleId,
        archetype_id: Option<ArchetypeId>,
    ) {
        self.remove_bundle.insert(bundle_id, archetype_id);
    }

    /// The cached destination of taking all of `bundle_id`.
    ///
    /// `Some(None)` means the archetype lacks part of the bundle.
    #[inline]
    pub fn get_archetype_after_bundle_take(&self, bundle_id: BundleId) -> Option<Option<ArchetypeId>> {
        self.take_bundle.get(bundle_id).copied()
    }

    pub(crate) fn cache_archetype_after_bundle_take(
        &mut self,
        bundle_id: BundleId,
        archetype_id: Option<ArchetypeId>,
    ) {
        self.take_bundle.insert(bundle_id, archetype_id);
    }
}
