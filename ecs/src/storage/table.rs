use std::{
    any::Any,
    collections::HashMap,
    ops::{Index, IndexMut},
};

use log::debug;

use crate::{
    change_detection::CheckChangeTicks,
    component::{ComponentId, Components},
    entity::Entity,
    storage::{Column, SparseSet, TableRow},
};

/// The identifier for a table in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(u32);

impl TableId {
    /// The table with no columns. Always exists.
    pub const EMPTY: TableId = TableId(0);

    /// The table id of an entity that has no storage yet.
    pub const INVALID: TableId = TableId(u32::MAX);

    /// Create a new id with the given index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the index for this id.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// The outcome of moving a row from one table to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMoveResult {
    /// The entity that was swapped into the vacated source row, if any.
    pub swapped_entity: Option<Entity>,
    /// The row the moved entity now occupies in the destination table.
    pub new_row: TableRow,
}

/// A table stores entities and their component data in a columnar format.
/// Each column stores all values of a single component for all entities in the table.
///
/// Rows are allocated for an entity first and then filled column by column, so during a single
/// insert some columns are briefly one row short.
///
/// # Invariants
/// - `entities.len()` must equal the length of every column outside of an in-flight insert.
#[derive(Debug)]
pub struct Table {
    columns: SparseSet<ComponentId, Column>,
    entities: Vec<Entity>,
}

impl Table {
    fn new(component_ids: &[ComponentId], components: &Components) -> Self {
        let mut columns = SparseSet::new();
        for &id in component_ids {
            let info = components
                .get_info(id)
                .unwrap_or_else(|| panic!("table column {id:?} is not a registered component"));
            columns.insert(id, Column::new(info.new_values()));
        }
        Self {
            columns,
            entities: Vec::new(),
        }
    }

    /// The entities stored in this table, in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The number of rows.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The ids of the table's columns.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.columns.indices()
    }

    /// Returns `true` if the table has a column for `component_id`.
    #[inline]
    pub fn has_column(&self, component_id: ComponentId) -> bool {
        self.columns.contains(component_id)
    }

    /// The column of a component.
    #[inline]
    pub fn get_column(&self, component_id: ComponentId) -> Option<&Column> {
        self.columns.get(component_id)
    }

    /// The column of a component, mutably.
    #[inline]
    pub(crate) fn get_column_mut(&mut self, component_id: ComponentId) -> Option<&mut Column> {
        self.columns.get_mut(component_id)
    }

    /// Append a row for `entity`. Every column must be initialized for it afterwards.
    pub(crate) fn allocate(&mut self, entity: Entity) -> TableRow {
        let row = TableRow::new(self.entities.len());
        self.entities.push(entity);
        row
    }

    /// Reserve room for `additional` more rows.
    pub(crate) fn reserve(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in self.columns.values_mut() {
            column.reserve(additional);
        }
    }

    fn swap_remove_entity(&mut self, row: TableRow) -> Option<Entity> {
        debug_assert!(row.index() < self.entities.len(), "row index out of bounds");
        let is_last = row.index() == self.entities.len() - 1;
        self.entities.swap_remove(row.index());
        (!is_last).then(|| self.entities[row.index()])
    }

    /// Remove a row by swapping in the last one, dropping every value.
    ///
    /// Returns the entity that moved into `row`, if any, so its location can be fixed up.
    pub(crate) fn swap_remove(&mut self, row: TableRow) -> Option<Entity> {
        for column in self.columns.values_mut() {
            column.swap_remove(row);
        }
        let swapped = self.swap_remove_entity(row);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        swapped
    }

    /// Move a row into `new_table`, dropping the values `new_table` has no column for.
    ///
    /// Columns of `new_table` missing from this table are left one row short and must be
    /// initialized by the caller.
    pub(crate) fn move_to_and_drop_missing(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
    ) -> TableMoveResult {
        self.move_to(row, new_table, |_, column| column.swap_remove(row))
    }

    /// Move a row into `new_table`, returning the values `new_table` has no column for.
    pub(crate) fn move_to_and_take_missing(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
    ) -> (TableMoveResult, Vec<(ComponentId, Box<dyn Any + Send + Sync>)>) {
        let mut taken = Vec::new();
        let result = self.move_to(row, new_table, |id, column| {
            taken.push((id, column.swap_remove_boxed(row)));
        });
        (result, taken)
    }

    /// Move a row into `new_table`, which must have a column for every column of this table.
    pub(crate) fn move_to_superset(&mut self, row: TableRow, new_table: &mut Table) -> TableMoveResult {
        self.move_to(row, new_table, |id, _| {
            panic!("destination table has no column for {id:?}")
        })
    }

    fn move_to(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
        mut missing: impl FnMut(ComponentId, &mut Column),
    ) -> TableMoveResult {
        debug_assert!(row.index() < self.entities.len(), "row index out of bounds");
        let new_row = new_table.allocate(self.entities[row.index()]);
        for (id, column) in self.columns.iter_mut() {
            match new_table.columns.get_mut(*id) {
                Some(new_column) => column.swap_remove_into(row, new_column),
                None => missing(*id, column),
            }
        }
        let swapped_entity = self.swap_remove_entity(row);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        TableMoveResult {
            swapped_entity,
            new_row,
        }
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        for column in self.columns.values_mut() {
            column.check_change_ticks(check);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        for column in self.columns.values_mut() {
            column.clear();
        }
    }

    /// Verify that all columns have the same length as entities.
    ///
    /// # Panics
    /// Panics if any column length doesn't match the entity count.
    #[cfg(debug_assertions)]
    pub fn verify_invariants(&self) {
        let expected_len = self.entities.len();
        for (id, column) in self.columns.iter() {
            assert_eq!(
                column.len(),
                expected_len,
                "Column {:?} length {} doesn't match entity count {}",
                id,
                column.len(),
                expected_len
            );
        }
    }
}

/// Every table of a world, deduplicated by their sorted column ids.
#[derive(Debug)]
pub struct Tables {
    tables: Vec<Table>,
    table_ids: HashMap<Box<[ComponentId]>, TableId>,
}

impl Default for Tables {
    fn default() -> Self {
        let empty = Table {
            columns: SparseSet::new(),
            entities: Vec::new(),
        };
        let mut table_ids = HashMap::new();
        table_ids.insert(Box::default(), TableId::EMPTY);
        Self {
            tables: vec![empty],
            table_ids,
        }
    }
}

impl Tables {
    /// The number of tables, the empty table included.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Always `false`, the empty table exists from the start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The table with id `id`.
    #[inline]
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.index())
    }

    /// The table with id `id`, mutably.
    #[inline]
    pub(crate) fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.index())
    }

    /// Two distinct tables, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either id is out of range.
    pub(crate) fn get_2_mut(&mut self, a: TableId, b: TableId) -> (&mut Table, &mut Table) {
        assert_ne!(a, b, "cannot borrow the same table twice");
        if a.index() < b.index() {
            let (low, high) = self.tables.split_at_mut(b.index());
            (&mut low[a.index()], &mut high[0])
        } else {
            let (low, high) = self.tables.split_at_mut(a.index());
            (&mut high[0], &mut low[b.index()])
        }
    }

    /// The table holding exactly `component_ids`, created on first use.
    ///
    /// `component_ids` must be sorted.
    pub(crate) fn get_id_or_insert(
        &mut self,
        component_ids: &[ComponentId],
        components: &Components,
    ) -> TableId {
        debug_assert!(component_ids.is_sorted(), "table columns must be sorted");
        if let Some(id) = self.table_ids.get(component_ids) {
            return *id;
        }
        let id = TableId::new(self.tables.len());
        self.tables.push(Table::new(component_ids, components));
        self.table_ids.insert(component_ids.into(), id);
        debug!("created table {id:?} with columns {component_ids:?}");
        id
    }

    /// Every table, in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Table> {
        self.tables.iter()
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        for table in &mut self.tables {
            table.check_change_ticks(check);
        }
    }

    pub(crate) fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
    }
}

impl Index<TableId> for Tables {
    type Output = Table;

    #[inline]
    fn index(&self, index: TableId) -> &Self::Output {
        &self.tables[index.index()]
    }
}

impl IndexMut<TableId> for Tables {
    #[inline]
    fn index_mut(&mut self, index: TableId) -> &mut Self::Output {
        &mut self.tables[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        change_detection::Tick,
        component::{ComponentDescriptor, ComponentsRegistrator, StorageType},
    };

    fn register(components: &mut Components, names: &[&'static str]) -> Vec<ComponentId> {
        let mut registrator = ComponentsRegistrator::new(components);
        names
            .iter()
            .map(|name| {
                registrator.register_component_with_descriptor(
                    ComponentDescriptor::new_dynamic::<u32>(*name, StorageType::Table, true),
                )
            })
            .collect()
    }

    fn push(table: &mut Table, entity: Entity, value: u32) -> TableRow {
        let row = table.allocate(entity);
        let ids: Vec<ComponentId> = table.component_ids().collect();
        for id in ids {
            table
                .get_column_mut(id)
                .unwrap()
                .initialize(row, value, Tick::new(0));
        }
        row
    }

    #[test]
    fn tables_are_deduplicated_by_columns() {
        // Given
        let mut components = Components::new();
        let ids = register(&mut components, &["a", "b"]);
        let mut tables = Tables::default();

        // When
        let first = tables.get_id_or_insert(&ids, &components);
        let second = tables.get_id_or_insert(&ids, &components);
        let single = tables.get_id_or_insert(&ids[..1], &components);

        // Then
        assert_eq!(first, second);
        assert_ne!(first, single);
        assert_eq!(tables.get_id_or_insert(&[], &components), TableId::EMPTY);
        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn swap_remove_reports_swapped_entity() {
        // Given
        let mut components = Components::new();
        let ids = register(&mut components, &["a"]);
        let mut tables = Tables::default();
        let id = tables.get_id_or_insert(&ids, &components);
        let table = &mut tables[id];
        let entities: Vec<Entity> = (0..3).map(Entity::from_raw).collect();
        for (i, entity) in entities.iter().enumerate() {
            push(table, *entity, i as u32);
        }

        // When
        let swapped = table.swap_remove(TableRow::new(0));
        let last = table.swap_remove(TableRow::new(1));

        // Then
        assert_eq!(swapped, Some(entities[2]));
        assert_eq!(last, None);
        assert_eq!(table.entities(), &[entities[2]]);
        assert_eq!(table.get_column(ids[0]).unwrap().get::<u32>(TableRow::new(0)), Some(&2));
    }

    #[test]
    fn move_to_and_drop_missing_moves_shared_columns() {
        // Given
        let mut components = Components::new();
        let ids = register(&mut components, &["a", "b"]);
        let mut tables = Tables::default();
        let wide = tables.get_id_or_insert(&ids, &components);
        let narrow = tables.get_id_or_insert(&ids[..1], &components);
        let entity = Entity::from_raw(0);
        push(&mut tables[wide], entity, 5);

        // When
        let (wide_table, narrow_table) = tables.get_2_mut(wide, narrow);
        let result = wide_table.move_to_and_drop_missing(TableRow::new(0), narrow_table);

        // Then
        assert_eq!(result.swapped_entity, None);
        assert_eq!(result.new_row, TableRow::new(0));
        assert!(tables[wide].is_empty());
        let narrow_table = &tables[narrow];
        assert_eq!(narrow_table.entities(), &[entity]);
        assert_eq!(
            narrow_table.get_column(ids[0]).unwrap().get::<u32>(TableRow::new(0)),
            Some(&5)
        );
    }

    #[test]
    fn move_to_and_take_missing_returns_removed_values() {
        // Given
        let mut components = Components::new();
        let ids = register(&mut components, &["a", "b"]);
        let mut tables = Tables::default();
        let wide = tables.get_id_or_insert(&ids, &components);
        let narrow = tables.get_id_or_insert(&ids[..1], &components);
        push(&mut tables[wide], Entity::from_raw(0), 8);

        // When
        let (wide_table, narrow_table) = tables.get_2_mut(wide, narrow);
        let (_, taken) = wide_table.move_to_and_take_missing(TableRow::new(0), narrow_table);

        // Then
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].0, ids[1]);
        assert_eq!(taken[0].1.downcast_ref::<u32>(), Some(&8));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn swap_remove_moves_last_row_into_hole(count in 1usize..64, pick in 0usize..64) {
                let mut components = Components::new();
                let ids = register(&mut components, &["a"]);
                let mut tables = Tables::default();
                let id = tables.get_id_or_insert(&ids, &components);
                let table = &mut tables[id];
                for i in 0..count {
                    push(table, Entity::from_raw(i as u32), i as u32);
                }
                let row = pick % count;
                let swapped = table.swap_remove(TableRow::new(row));
                prop_assert_eq!(table.entity_count(), count - 1);
                if row == count - 1 {
                    prop_assert_eq!(swapped, None);
                } else {
                    let last = Entity::from_raw((count - 1) as u32);
                    prop_assert_eq!(swapped, Some(last));
                    prop_assert_eq!(table.entities()[row], last);
                    let value = table.get_column(ids[0]).unwrap().get::<u32>(TableRow::new(row)).copied();
                    prop_assert_eq!(value, Some((count - 1) as u32));
                }
            }
        }
    }
}
