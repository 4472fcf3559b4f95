use std::{
    any::{TypeId, type_name},
    collections::HashMap,
    ops::Index,
};

use indexmap::{IndexMap, map::Entry};
use log::trace;

use crate::{
    archetype::{ArchetypeAfterBundleInsert, ArchetypeId, Archetypes, ComponentStatus},
    bundle::{Bundle, BundleError, BundleId},
    component::{
        ComponentId, Components, ComponentsRegistrator, RequiredComponent, RequiredComponentConstructor,
        StorageType,
    },
    observer::Observers,
    storage::Storages,
};

/// Precomputed layout of one bundle type.
///
/// `contributed_components` holds the explicit components in bundle order followed by every
/// component they transitively require that the bundle does not name itself.
#[derive(Debug)]
pub struct BundleInfo {
    id: BundleId,
    contributed_components: Box<[ComponentId]>,
    required_constructors: Box<[RequiredComponentConstructor]>,
    explicit_components_len: usize,
}

impl BundleInfo {
    /// Build the info for a bundle with the given explicit components.
    ///
    /// Creates the sparse set of every contributed sparse set component.
    fn new(
        bundle_type_name: &str,
        storages: &mut Storages,
        components: &Components,
        component_ids: Vec<ComponentId>,
        id: BundleId,
    ) -> Result<Self, BundleError> {
        let mut sorted = component_ids.clone();
        sorted.sort_unstable();
        let mut duplicates: Vec<ComponentId> = sorted
            .windows(2)
            .filter(|pair| pair[0] == pair[1])
            .map(|pair| pair[0])
            .collect();
        if !duplicates.is_empty() {
            duplicates.dedup();
            return Err(BundleError::DuplicateComponents {
                bundle: bundle_type_name.to_owned(),
                names: duplicates
                    .into_iter()
                    .map(|id| components.display_name(id))
                    .collect(),
            });
        }

        let mut required: IndexMap<ComponentId, RequiredComponent> = IndexMap::new();
        for &explicit in &component_ids {
            let Some(info) = components.get_info(explicit) else {
                continue;
            };
            for (&required_id, required_component) in info.required_components().all() {
                if sorted.binary_search(&required_id).is_ok() {
                    continue;
                }
                match required.entry(required_id) {
                    Entry::Vacant(entry) => {
                        entry.insert(required_component.clone());
                    }
                    Entry::Occupied(mut entry) => {
                        if required_component.inheritance_depth < entry.get().inheritance_depth {
                            *entry.get_mut() = required_component.clone();
                        }
                    }
                }
            }
        }

        let explicit_components_len = component_ids.len();
        let mut contributed_components = component_ids;
        contributed_components.extend(required.keys().copied());
        for &component_id in &contributed_components {
            let info = components
                .get_info(component_id)
                .unwrap_or_else(|| panic!("bundle component {component_id:?} is not registered"));
            if info.storage_type() == StorageType::SparseSet {
                storages.sparse_sets.get_or_insert(info);
            }
        }

        Ok(Self {
            id,
            contributed_components: contributed_components.into(),
            required_constructors: required
                .into_values()
                .map(|required| required.constructor)
                .collect(),
            explicit_components_len,
        })
    }

    /// The bundle's id.
    #[inline]
    pub fn id(&self) -> BundleId {
        self.id
    }

    /// The components the bundle names, in bundle order.
    #[inline]
    pub fn explicit_components(&self) -> &[ComponentId] {
        &self.contributed_components[..self.explicit_components_len]
    }

    /// The components pulled in as requirements, in depth-first order.
    #[inline]
    pub fn required_components(&self) -> &[ComponentId] {
        &self.contributed_components[self.explicit_components_len..]
    }

    /// Explicit then required components.
    #[inline]
    pub fn contributed_components(&self) -> &[ComponentId] {
        &self.contributed_components
    }

    /// Find or create the archetype an entity of `archetype_id` ends up in after this bundle is
    /// inserted, caching the transition on the source archetype.
    pub(crate) fn insert_bundle_into_archetype(
        &self,
        archetypes: &mut Archetypes,
        storages: &mut Storages,
        components: &Components,
        observers: &Observers,
        archetype_id: ArchetypeId,
    ) -> ArchetypeId {
        if let Some(after) = archetypes[archetype_id]
            .edges()
            .get_archetype_after_bundle_insert(self.id)
        {
            return after.archetype_id;
        }

        let current = &archetypes[archetype_id];
        let mut new_table_components = Vec::new();
        let mut new_sparse_set_components = Vec::new();
        let mut bundle_status = Vec::with_capacity(self.explicit_components_len);
        let mut added = Vec::new();
        let mut existing = Vec::new();
        let mut required_components = Vec::new();

        let mut add = |component_id: ComponentId| {
            match components
                .get_info(component_id)
                .map(|info| info.storage_type())
            {
                Some(StorageType::SparseSet) => new_sparse_set_components.push(component_id),
                _ => new_table_components.push(component_id),
            }
        };

        for &component_id in self.explicit_components() {
            if current.contains(component_id) {
                bundle_status.push(ComponentStatus::Existing);
                existing.push(component_id);
            } else {
                bundle_status.push(ComponentStatus::Added);
                added.push(component_id);
                add(component_id);
            }
        }
        for (index, &component_id) in self.required_components().iter().enumerate() {
            if !current.contains(component_id) {
                added.push(component_id);
                required_components.push(self.required_constructors[index].clone());
                add(component_id);
            }
        }

        let new_archetype_id = if new_table_components.is_empty() && new_sparse_set_components.is_empty() {
            archetype_id
        } else {
            let table_id = current.table_id();
            let (table_id, table_components) = if new_table_components.is_empty() {
                (table_id, current.table_components().to_vec())
            } else {
                new_table_components.extend_from_slice(current.table_components());
                new_table_components.sort_unstable();
                let table_id = storages
                    .tables
                    .get_id_or_insert(&new_table_components, components);
                (table_id, new_table_components)
            };
            new_sparse_set_components.extend_from_slice(current.sparse_set_components());
            new_sparse_set_components.sort_unstable();
            archetypes
                .get_id_or_insert(
                    components,
                    observers,
                    table_id,
                    table_components,
                    new_sparse_set_components,
                )
                .0
        };

        archetypes[archetype_id]
            .edges_mut()
            .cache_archetype_after_bundle_insert(
                self.id,
                ArchetypeAfterBundleInsert::new(
                    new_archetype_id,
                    bundle_status,
                    required_components,
                    added,
                    existing,
                ),
            );
        new_archetype_id
    }

    /// Find or create the archetype an entity of `archetype_id` ends up in after this bundle is
    /// removed, caching the transition on the source archetype.
    ///
    /// With `intersection`, components the archetype lacks are skipped. Without it, `None` is
    /// returned when the archetype lacks any bundle component.
    pub(crate) fn remove_bundle_from_archetype(
        &self,
        archetypes: &mut Archetypes,
        storages: &mut Storages,
        components: &Components,
        observers: &Observers,
        archetype_id: ArchetypeId,
        intersection: bool,
    ) -> Option<ArchetypeId> {
        let edges = archetypes[archetype_id].edges();
        let cached = if intersection {
            edges.get_archetype_after_bundle_remove(self.id)
        } else {
            edges.get_archetype_after_bundle_take(self.id)
        };
        if let Some(cached) = cached {
            return cached;
        }

        let current = &archetypes[archetype_id];
        let mut table_components = current.table_components().to_vec();
        let mut sparse_set_components = current.sparse_set_components().to_vec();
        let mut removed_table_component = false;
        let mut missing = false;
        for &component_id in self.explicit_components() {
            match current.get_storage_type(component_id) {
                Some(StorageType::Table) => {
                    table_components.retain(|id| *id != component_id);
                    removed_table_component = true;
                }
                Some(StorageType::SparseSet) => {
                    sparse_set_components.retain(|id| *id != component_id);
                }
                None => missing = true,
            }
        }

        let result = if missing && !intersection {
            None
        } else if table_components.len() + sparse_set_components.len() == current.component_count() {
            Some(archetype_id)
        } else {
            let table_id = if removed_table_component {
                storages.tables.get_id_or_insert(&table_components, components)
            } else {
                current.table_id()
            };
            Some(
                archetypes
                    .get_id_or_insert(
                        components,
                        observers,
                        table_id,
                        table_components,
                        sparse_set_components,
                    )
                    .0,
            )
        };

        let edges = archetypes[archetype_id].edges_mut();
        if intersection {
            edges.cache_archetype_after_bundle_remove(self.id, result);
        } else {
            edges.cache_archetype_after_bundle_take(self.id, result);
        }
        result
    }
}

/// Every registered bundle type.
#[derive(Debug, Default)]
pub struct Bundles {
    bundle_infos: Vec<BundleInfo>,
    bundle_ids: HashMap<TypeId, BundleId>,
}

impl Bundles {
    /// The number of registered bundles.
    #[inline]
    pub fn len(&self) -> usize {
        self.bundle_infos.len()
    }

    /// Returns `true` if no bundle is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bundle_infos.is_empty()
    }

    /// Info of a bundle.
    #[inline]
    pub fn get(&self, id: BundleId) -> Option<&BundleInfo> {
        self.bundle_infos.get(id.index())
    }

    /// The id of bundle type `type_id`, if registered.
    #[inline]
    pub fn get_id(&self, type_id: TypeId) -> Option<BundleId> {
        self.bundle_ids.get(&type_id).copied()
    }

    /// Every registered bundle.
    pub fn iter(&self) -> impl Iterator<Item = &BundleInfo> {
        self.bundle_infos.iter()
    }

    /// Register bundle type `T`, or return its id if already registered.
    ///
    /// A bundle naming a component twice is rejected and not registered.
    pub(crate) fn register_info<T: Bundle>(
        &mut self,
        components: &mut ComponentsRegistrator<'_>,
        storages: &mut Storages,
    ) -> Result<BundleId, BundleError> {
        if let Some(id) = self.bundle_ids.get(&TypeId::of::<T>()) {
            return Ok(*id);
        }
        let mut component_ids = Vec::new();
        T::component_ids(components, &mut |id| component_ids.push(id));
        let id = BundleId::new(self.bundle_infos.len());
        let info = BundleInfo::new(type_name::<T>(), storages, components, component_ids, id)?;
        trace!(
            "registered bundle {} as {id:?} with components {:?}",
            type_name::<T>(),
            info.contributed_components()
        );
        self.bundle_infos.push(info);
        self.bundle_ids.insert(TypeId::of::<T>(), id);
        Ok(id)
    }

    /// Recompute the required components of every bundle that names one of `changed`.
    ///
    /// Callers guarantee no archetype holds a changed component yet, so no insert edge of an
    /// affected bundle is cached.
    pub(crate) fn refresh_required_components(
        &mut self,
        components: &Components,
        storages: &mut Storages,
        changed: &[ComponentId],
    ) {
        for info in &mut self.bundle_infos {
            if !info.explicit_components().iter().any(|id| changed.contains(id)) {
                continue;
            }
            let id = info.id;
            let explicit = info.explicit_components().to_vec();
            *info = BundleInfo::new(&format!("{id:?}"), storages, components, explicit, id)
                .unwrap_or_else(|error| panic!("{error}"));
            trace!(
                "refreshed {id:?}, now contributing {:?}",
                info.contributed_components()
            );
        }
    }
}

impl Index<BundleId> for Bundles {
    type Output = BundleInfo;

    #[inline]
    fn index(&self, index: BundleId) -> &Self::Output {
        &self.bundle_infos[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Mutable, RequiredComponentsRegistrator};

    #[derive(Default)]
    struct A;
    impl Component for A {
        type Mutability = Mutable;
    }

    #[derive(Default)]
    struct B;
    impl Component for B {
        type Mutability = Mutable;
        fn register_required_components(
            _id: ComponentId,
            required: &mut RequiredComponentsRegistrator<'_, '_>,
        ) {
            required.register_required::<A>(A::default);
        }
    }

    #[derive(Default)]
    struct S;
    impl Component for S {
        const STORAGE_TYPE: StorageType = StorageType::SparseSet;
        type Mutability = Mutable;
    }

    fn register<T: Bundle>(
        bundles: &mut Bundles,
        components: &mut Components,
        storages: &mut Storages,
    ) -> Result<BundleId, BundleError> {
        bundles.register_info::<T>(&mut ComponentsRegistrator::new(components), storages)
    }

    #[test]
    fn required_components_follow_explicit_ones() {
        // Given
        let mut bundles = Bundles::default();
        let mut components = Components::new();
        let mut storages = Storages::default();

        // When
        let id = register::<B>(&mut bundles, &mut components, &mut storages).unwrap();

        // Then
        let info = &bundles[id];
        let a = components.component_id::<A>().unwrap();
        let b = components.component_id::<B>().unwrap();
        assert_eq!(info.explicit_components(), &[b]);
        assert_eq!(info.required_components(), &[a]);
    }

    #[test]
    fn explicit_component_is_not_required_again() {
        // Given
        let mut bundles = Bundles::default();
        let mut components = Components::new();
        let mut storages = Storages::default();

        // When
        let id = register::<(B, A)>(&mut bundles, &mut components, &mut storages).unwrap();

        // Then
        assert!(bundles[id].required_components().is_empty());
        assert_eq!(bundles[id].explicit_components().len(), 2);
    }

    #[test]
    fn duplicate_components_are_rejected() {
        // Given
        let mut bundles = Bundles::default();
        let mut components = Components::new();
        let mut storages = Storages::default();

        // When
        let result = register::<(A, B, A)>(&mut bundles, &mut components, &mut storages);

        // Then
        match result {
            Err(BundleError::DuplicateComponents { names, .. }) => {
                assert_eq!(names.len(), 1);
                assert!(names[0].ends_with("A"));
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
        assert!(bundles.is_empty());
    }

    #[test]
    fn registration_is_idempotent() {
        // Given
        let mut bundles = Bundles::default();
        let mut components = Components::new();
        let mut storages = Storages::default();
        let first = register::<(A, S)>(&mut bundles, &mut components, &mut storages).unwrap();

        // When
        let second = register::<(A, S)>(&mut bundles, &mut components, &mut storages).unwrap();

        // Then
        assert_eq!(first, second);
        assert_eq!(bundles.len(), 1);
        let s = components.component_id::<S>().unwrap();
        assert!(storages.sparse_sets.get(s).is_some());
    }

    #[test]
    fn insert_edge_reports_required_as_added() {
        // Given
        let mut bundles = Bundles::default();
        let mut components = Components::new();
        let mut storages = Storages::default();
        let mut archetypes = Archetypes::new();
        let observers = Observers::default();
        let id = register::<B>(&mut bundles, &mut components, &mut storages).unwrap();

        // When
        let new_id = bundles[id].insert_bundle_into_archetype(
            &mut archetypes,
            &mut storages,
            &components,
            &observers,
            ArchetypeId::EMPTY,
        );

        // Then
        let a = components.component_id::<A>().unwrap();
        let b = components.component_id::<B>().unwrap();
        assert!(archetypes[new_id].contains(a));
        assert!(archetypes[new_id].contains(b));
        let after = archetypes
            .empty()
            .edges()
            .get_archetype_after_bundle_insert(id)
            .unwrap();
        assert_eq!(after.status_of(a), Some(ComponentStatus::Added));
        assert_eq!(after.required_components.len(), 1);
    }

    #[test]
    fn take_edge_is_none_when_component_missing() {
        // Given
        let mut bundles = Bundles::default();
        let mut components = Components::new();
        let mut storages = Storages::default();
        let mut archetypes = Archetypes::new();
        let observers = Observers::default();
        let only_a = register::<A>(&mut bundles, &mut components, &mut storages).unwrap();
        let a_and_s = register::<(A, S)>(&mut bundles, &mut components, &mut storages).unwrap();
        let with_a = bundles[only_a].insert_bundle_into_archetype(
            &mut archetypes,
            &mut storages,
            &components,
            &observers,
            ArchetypeId::EMPTY,
        );

        // When
        let take = bundles[a_and_s].remove_bundle_from_archetype(
            &mut archetypes,
            &mut storages,
            &components,
            &observers,
            with_a,
            false,
        );
        let remove = bundles[a_and_s].remove_bundle_from_archetype(
            &mut archetypes,
            &mut storages,
            &components,
            &observers,
            with_a,
            true,
        );

        // Then
        assert_eq!(take, None);
        assert_eq!(remove, Some(ArchetypeId::EMPTY));
    }
}
