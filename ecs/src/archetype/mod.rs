//! Archetypes: groups of entities that share one exact set of components.
//!
//! Every distinct component signature gets exactly one [`Archetype`], created the first time an
//! entity needs it and never destroyed. An archetype records which of its components live in its
//! [`Table`](crate::storage::Table) and which live in sparse sets, the entities it currently
//! holds, and an [`Edges`] cache of where inserting or removing a bundle leads.
//!
//! ```text
//!              insert (A, B)
//!   [EMPTY] ───────────────▶ [A, B] ───insert C──▶ [A, B, C]
//!      ▲                       │                      │
//!      └──────remove (A, B)────┘◀──────remove C───────┘
//! ```

mod edges;
mod registry;

use fixedbitset::FixedBitSet;

use crate::{
    component::{ComponentId, Components, StorageType},
    entity::{Entity, EntityLocation},
    observer::Observers,
    storage::{TableId, TableRow},
};

pub use edges::{
    ArchetypeAfterBundleInsert, BundleComponentStatus, ComponentStatus, Edges, SpawnBundleStatus,
};
pub use registry::{ArchetypeComponents, Archetypes};

/// The identifier of an [`Archetype`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The archetype with no components. Always exists.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    /// The archetype id of an entity that has no storage yet.
    pub const INVALID: ArchetypeId = ArchetypeId(u32::MAX);

    /// Create an id from an index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the index of the id for use in collections.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A row in an archetype's entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeRow(u32);

impl ArchetypeRow {
    /// The row of an entity that has no storage yet.
    pub const INVALID: ArchetypeRow = ArchetypeRow(u32::MAX);

    /// Create a row from an index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the index of the row.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// An entity stored in an archetype along with its row in the archetype's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchetypeEntity {
    entity: Entity,
    table_row: TableRow,
}

impl ArchetypeEntity {
    /// The entity.
    #[inline]
    pub const fn id(&self) -> Entity {
        self.entity
    }

    /// The entity's row in the archetype's table.
    #[inline]
    pub const fn table_row(&self) -> TableRow {
        self.table_row
    }
}

/// The result of removing an entity from an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArchetypeSwapRemoveResult {
    /// The entity moved into the vacated row, if it was not the last row.
    pub(crate) swapped_entity: Option<Entity>,
    /// The table row of the removed entity.
    pub(crate) table_row: TableRow,
}

/// Flags recording which lifecycle hooks and observers apply to an archetype's components.
///
/// Checked before triggering lifecycle events so archetypes without any pay nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArchetypeFlags(u32);

impl ArchetypeFlags {
    pub const ON_ADD_HOOK: ArchetypeFlags = ArchetypeFlags(1 << 0);
    pub const ON_INSERT_HOOK: ArchetypeFlags = ArchetypeFlags(1 << 1);
    pub const ON_REPLACE_HOOK: ArchetypeFlags = ArchetypeFlags(1 << 2);
    pub const ON_REMOVE_HOOK: ArchetypeFlags = ArchetypeFlags(1 << 3);
    pub const ON_DESPAWN_HOOK: ArchetypeFlags = ArchetypeFlags(1 << 4);
    pub const ON_ADD_OBSERVER: ArchetypeFlags = ArchetypeFlags(1 << 5);
    pub const ON_INSERT_OBSERVER: ArchetypeFlags = ArchetypeFlags(1 << 6);
    pub const ON_REPLACE_OBSERVER: ArchetypeFlags = ArchetypeFlags(1 << 7);
    pub const ON_REMOVE_OBSERVER: ArchetypeFlags = ArchetypeFlags(1 << 8);
    pub const ON_DESPAWN_OBSERVER: ArchetypeFlags = ArchetypeFlags(1 << 9);

    /// No flags.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raise every flag of `other`.
    #[inline]
    pub fn insert(&mut self, other: ArchetypeFlags) {
        self.0 |= other.0;
    }

    /// Returns `true` if every flag of `other` is raised.
    #[inline]
    pub const fn contains(self, other: ArchetypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flag is raised.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A collection of entities that have the same set of components.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    table_id: TableId,
    entities: Vec<ArchetypeEntity>,
    table_components: Box<[ComponentId]>,
    sparse_set_components: Box<[ComponentId]>,
    component_set: FixedBitSet,
    edges: Edges,
    flags: ArchetypeFlags,
}

impl Archetype {
    pub(crate) fn new(
        components: &Components,
        observers: &Observers,
        id: ArchetypeId,
        table_id: TableId,
        table_components: Box<[ComponentId]>,
        sparse_set_components: Box<[ComponentId]>,
    ) -> Self {
        let max_id = table_components
            .iter()
            .chain(sparse_set_components.iter())
            .map(|id| id.index() + 1)
            .max()
            .unwrap_or(0);
        let mut component_set = FixedBitSet::with_capacity(max_id);
        let mut flags = ArchetypeFlags::empty();
        for &component_id in table_components.iter().chain(sparse_set_components.iter()) {
            component_set.insert(component_id.index());
            if let Some(info) = components.get_info(component_id) {
                info.update_archetype_flags(&mut flags);
            }
            observers.update_archetype_flags(component_id, &mut flags);
        }
        Self {
            id,
            table_id,
            entities: Vec::new(),
            table_components,
            sparse_set_components,
            component_set,
            edges: Edges::default(),
            flags,
        }
    }

    /// The archetype's id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The table holding this archetype's table components.
    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// The entities in the archetype, in row order.
    #[inline]
    pub fn entities(&self) -> &[ArchetypeEntity] {
        &self.entities
    }

    /// The entity at `row`.
    #[inline]
    pub fn entity(&self, row: ArchetypeRow) -> Option<&ArchetypeEntity> {
        self.entities.get(row.index())
    }

    /// The components stored in the archetype's table, sorted.
    #[inline]
    pub fn table_components(&self) -> &[ComponentId] {
        &self.table_components
    }

    /// The components stored in sparse sets, sorted.
    #[inline]
    pub fn sparse_set_components(&self) -> &[ComponentId] {
        &self.sparse_set_components
    }

    /// Every component of the archetype, table components first.
    #[inline]
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + Clone + '_ {
        self.table_components
            .iter()
            .chain(self.sparse_set_components.iter())
            .copied()
    }

    /// The number of components.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.table_components.len() + self.sparse_set_components.len()
    }

    /// Returns `true` if the archetype has `component_id`.
    #[inline]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        self.component_set.contains(component_id.index())
    }

    /// How `component_id` is stored for this archetype, if it has it.
    pub fn get_storage_type(&self, component_id: ComponentId) -> Option<StorageType> {
        if !self.contains(component_id) {
            None
        } else if self.table_components.binary_search(&component_id).is_ok() {
            Some(StorageType::Table)
        } else {
            Some(StorageType::SparseSet)
        }
    }

    /// The transition cache.
    #[inline]
    pub fn edges(&self) -> &Edges {
        &self.edges
    }

    #[inline]
    pub(crate) fn edges_mut(&mut self) -> &mut Edges {
        &mut self.edges
    }

    /// The hook and observer flags.
    #[inline]
    pub fn flags(&self) -> ArchetypeFlags {
        self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut ArchetypeFlags {
        &mut self.flags
    }

    /// The number of entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Append `entity`, whose table data lives at `table_row`.
    ///
    /// The returned location must be recorded in [`Entities`](crate::entity::Entities).
    pub(crate) fn allocate(&mut self, entity: Entity, table_row: TableRow) -> EntityLocation {
        let archetype_row = ArchetypeRow::new(self.entities.len());
        self.entities.push(ArchetypeEntity { entity, table_row });
        EntityLocation {
            archetype_id: self.id,
            archetype_row,
            table_id: self.table_id,
            table_row,
        }
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
    }

    /// Remove the entity at `row` by swapping in the last one.
    ///
    /// The caller is responsible for fixing the location of the swapped entity.
    pub(crate) fn swap_remove(&mut self, row: ArchetypeRow) -> ArchetypeSwapRemoveResult {
        let is_last = row.index() == self.entities.len() - 1;
        let removed = self.entities.swap_remove(row.index());
        ArchetypeSwapRemoveResult {
            swapped_entity: (!is_last).then(|| self.entities[row.index()].entity),
            table_row: removed.table_row,
        }
    }

    /// Point the entity at `row` to a new table row.
    #[inline]
    pub(crate) fn set_entity_table_row(&mut self, row: ArchetypeRow, table_row: TableRow) {
        self.entities[row.index()].table_row = table_row;
    }

    pub(crate) fn clear_entities(&mut self) {
        self.entities.clear();
    }

    /// Returns `true` if any component has an `on_add` hook.
    #[inline]
    pub fn has_add_hook(&self) -> bool {
        self.flags.contains(ArchetypeFlags::ON_ADD_HOOK)
    }

    /// Returns `true` if any component has an `on_insert` hook.
    #[inline]
    pub fn has_insert_hook(&self) -> bool {
        self.flags.contains(ArchetypeFlags::ON_INSERT_HOOK)
    }

    /// Returns `true` if any component has an `on_replace` hook.
    #[inline]
    pub fn has_replace_hook(&self) -> bool {
        self.flags.contains(ArchetypeFlags::ON_REPLACE_HOOK)
    }

    /// Returns `true` if any component has an `on_remove` hook.
    #[inline]
    pub fn has_remove_hook(&self) -> bool {
        self.flags.contains(ArchetypeFlags::ON_REMOVE_HOOK)
    }

    /// Returns `true` if any component has an `on_despawn` hook.
    #[inline]
    pub fn has_despawn_hook(&self) -> bool {
        self.flags.contains(ArchetypeFlags::ON_DESPAWN_HOOK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentDescriptor, ComponentsRegistrator};

    fn archetype(table: &[ComponentId], sparse: &[ComponentId]) -> Archetype {
        Archetype::new(
            &Components::new(),
            &Observers::default(),
            ArchetypeId::new(1),
            TableId::new(1),
            table.into(),
            sparse.into(),
        )
    }

    #[test]
    fn allocate_returns_location() {
        // Given
        let mut archetype = archetype(&[ComponentId::new(0)], &[]);

        // When
        let first = archetype.allocate(Entity::from_raw(4), TableRow::new(7));
        let second = archetype.allocate(Entity::from_raw(5), TableRow::new(8));

        // Then
        assert_eq!(first.archetype_id, ArchetypeId::new(1));
        assert_eq!(first.archetype_row, ArchetypeRow::new(0));
        assert_eq!(first.table_id, TableId::new(1));
        assert_eq!(first.table_row, TableRow::new(7));
        assert_eq!(second.archetype_row, ArchetypeRow::new(1));
        assert_eq!(archetype.len(), 2);
    }

    #[test]
    fn swap_remove_reports_swapped_entity() {
        // Given
        let mut archetype = archetype(&[], &[]);
        for i in 0..3 {
            archetype.allocate(Entity::from_raw(i), TableRow::new(i as usize));
        }

        // When
        let result = archetype.swap_remove(ArchetypeRow::new(0));

        // Then
        assert_eq!(result.swapped_entity, Some(Entity::from_raw(2)));
        assert_eq!(result.table_row, TableRow::new(0));
        assert_eq!(archetype.entities()[0].id(), Entity::from_raw(2));
        assert_eq!(archetype.entities()[0].table_row(), TableRow::new(2));
    }

    #[test]
    fn swap_remove_last_reports_no_swap() {
        // Given
        let mut archetype = archetype(&[], &[]);
        archetype.allocate(Entity::from_raw(0), TableRow::new(0));
        archetype.allocate(Entity::from_raw(1), TableRow::new(1));

        // When
        let result = archetype.swap_remove(ArchetypeRow::new(1));

        // Then
        assert_eq!(result.swapped_entity, None);
        assert_eq!(archetype.len(), 1);
    }

    #[test]
    fn storage_type_follows_component_split() {
        // Given
        let archetype = archetype(&[ComponentId::new(1)], &[ComponentId::new(3)]);

        // Then
        assert_eq!(archetype.get_storage_type(ComponentId::new(1)), Some(StorageType::Table));
        assert_eq!(
            archetype.get_storage_type(ComponentId::new(3)),
            Some(StorageType::SparseSet)
        );
        assert_eq!(archetype.get_storage_type(ComponentId::new(2)), None);
        assert!(!archetype.contains(ComponentId::new(40)));
    }

    #[test]
    fn hook_flags_come_from_component_info() {
        // Given
        fn noop(_: crate::world::DeferredWorld, _: crate::component::HookContext) {}
        let mut components = Components::new();
        let id = ComponentsRegistrator::new(&mut components).register_component_with_descriptor(
            ComponentDescriptor::new_dynamic::<u8>("hooked", StorageType::Table, true),
        );
        components.get_hooks_mut(id).unwrap().on_remove(noop);

        // When
        let archetype = Archetype::new(
            &components,
            &Observers::default(),
            ArchetypeId::new(1),
            TableId::new(1),
            [id].into(),
            Box::default(),
        );

        // Then
        assert!(archetype.has_remove_hook());
        assert!(!archetype.has_add_hook());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn swap_remove_keeps_rows_packed(count in 1u32..64, pick in 0u32..64) {
                let mut archetype = archetype(&[], &[]);
                for i in 0..count {
                    archetype.allocate(Entity::from_raw(i), TableRow::new(i as usize));
                }
                let row = pick % count;
                let result = archetype.swap_remove(ArchetypeRow::new(row as usize));
                prop_assert_eq!(archetype.len(), (count - 1) as usize);
                if row == count - 1 {
                    prop_assert_eq!(result.swapped_entity, None);
                } else {
                    prop_assert_eq!(result.swapped_entity, Some(Entity::from_raw(count - 1)));
                    prop_assert_eq!(archetype.entities()[row as usize].id(), Entity::from_raw(count - 1));
                }
            }
        }
    }
}
