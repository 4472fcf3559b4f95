use crate::{
    archetype::{BundleComponentStatus, ComponentStatus},
    bundle::{ComponentSink, DynamicBundle, InsertMode},
    change_detection::Tick,
    component::{Component, ComponentId, RequiredComponentConstructor},
    entity::Entity,
    storage::{SparseSets, Table, TableRow},
};

/// Writes component values for one entity into its table row or the matching sparse sets.
///
/// Table components go to the column of the entity's table, every other component to its sparse
/// set, which must already exist.
pub struct ComponentWriter<'a> {
    table: &'a mut Table,
    table_row: TableRow,
    sparse_sets: &'a mut SparseSets,
    entity: Entity,
    change_tick: Tick,
}

impl<'a> ComponentWriter<'a> {
    pub(crate) fn new(
        table: &'a mut Table,
        table_row: TableRow,
        sparse_sets: &'a mut SparseSets,
        entity: Entity,
        change_tick: Tick,
    ) -> Self {
        Self {
            table,
            table_row,
            sparse_sets,
            entity,
            change_tick,
        }
    }

    /// The entity being written.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// Write a value the entity did not have, stamping both ticks.
    pub(crate) fn initialize<C: Send + Sync + 'static>(&mut self, component_id: ComponentId, value: C) {
        match self.table.get_column_mut(component_id) {
            Some(column) => column.initialize(self.table_row, value, self.change_tick),
            None => self
                .sparse_sets
                .get_mut(component_id)
                .unwrap_or_else(|| panic!("no storage for component {component_id:?}"))
                .insert(self.entity, value, self.change_tick),
        }
    }

    /// Overwrite a value the entity has, stamping the changed tick.
    pub(crate) fn replace<C: Send + Sync + 'static>(&mut self, component_id: ComponentId, value: C) {
        match self.table.get_column_mut(component_id) {
            Some(column) => column.replace(self.table_row, value, self.change_tick),
            None => self
                .sparse_sets
                .get_mut(component_id)
                .unwrap_or_else(|| panic!("no storage for component {component_id:?}"))
                .insert(self.entity, value, self.change_tick),
        }
    }
}

/// Feeds bundle components into a [`ComponentWriter`] according to their status.
struct BundleWriter<'w, 'a, 's, S: BundleComponentStatus> {
    writer: &'w mut ComponentWriter<'a>,
    component_ids: &'s [ComponentId],
    status: &'s S,
    mode: InsertMode,
    index: usize,
}

impl<S: BundleComponentStatus> ComponentSink for BundleWriter<'_, '_, '_, S> {
    fn push<C: Component>(&mut self, component: C) {
        let component_id = self.component_ids[self.index];
        let status = self.status.get_status(self.index);
        self.index += 1;
        match (status, self.mode) {
            (ComponentStatus::Added, _) => self.writer.initialize(component_id, component),
            (ComponentStatus::Existing, InsertMode::Replace) => {
                self.writer.replace(component_id, component)
            }
            (ComponentStatus::Existing, InsertMode::Keep) => drop(component),
        }
    }
}

/// Write `bundle` and then build every component in `required`.
///
/// `component_ids` are the bundle's explicit components in bundle order.
pub(crate) fn write_components<T: DynamicBundle, S: BundleComponentStatus>(
    mut writer: ComponentWriter<'_>,
    component_ids: &[ComponentId],
    status: &S,
    mode: InsertMode,
    required: &[RequiredComponentConstructor],
    bundle: T,
) -> T::Effect {
    let mut sink = BundleWriter {
        writer: &mut writer,
        component_ids,
        status,
        mode,
        index: 0,
    };
    let effect = bundle.get_components(&mut sink);
    debug_assert_eq!(
        sink.index,
        component_ids.len(),
        "bundle wrote a different number of components than it declared"
    );
    for constructor in required {
        constructor.initialize(&mut writer);
    }
    effect
}
