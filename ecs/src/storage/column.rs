use std::any::{Any, type_name};

use crate::{
    change_detection::{CheckChangeTicks, ComponentTicks, Tick},
    storage::TableRow,
};

/// A type-erased vector of component values.
///
/// Implemented for `Vec<T>`. Table level operations (moving rows, swap-removes, drops) go
/// through this trait, typed reads and writes downcast back to the concrete `Vec<T>`.
pub trait ValueVec: Any + Send + Sync {
    /// The number of values.
    fn len(&self) -> usize;

    /// Returns `true` if there are no values.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the value at `row` by swapping in the last one, dropping it.
    fn swap_remove_and_drop(&mut self, row: usize);

    /// Remove the value at `row` by swapping in the last one, pushing it onto `other`.
    ///
    /// # Panics
    ///
    /// Panics if `other` holds a different value type.
    fn swap_remove_into(&mut self, row: usize, other: &mut dyn ValueVec);

    /// Remove the value at `row` by swapping in the last one, returning it boxed.
    fn swap_remove_boxed(&mut self, row: usize) -> Box<dyn Any + Send + Sync>;

    /// The value at `row`.
    fn get_any(&self, row: usize) -> Option<&dyn Any>;

    /// The value at `row`, mutably.
    fn get_any_mut(&mut self, row: usize) -> Option<&mut dyn Any>;

    /// Reserve room for `additional` more values.
    fn reserve(&mut self, additional: usize);

    /// Drop every value.
    fn clear(&mut self);

    /// The concrete vector, for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// The concrete vector, mutably, for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + Sync + 'static> ValueVec for Vec<T> {
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }

    #[inline]
    fn swap_remove_and_drop(&mut self, row: usize) {
        self.swap_remove(row);
    }

    fn swap_remove_into(&mut self, row: usize, other: &mut dyn ValueVec) {
        let value = self.swap_remove(row);
        other
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .unwrap_or_else(|| panic!("column type mismatch moving {}", type_name::<T>()))
            .push(value);
    }

    fn swap_remove_boxed(&mut self, row: usize) -> Box<dyn Any + Send + Sync> {
        Box::new(self.swap_remove(row))
    }

    #[inline]
    fn get_any(&self, row: usize) -> Option<&dyn Any> {
        self.get(row).map(|value| value as &dyn Any)
    }

    #[inline]
    fn get_any_mut(&mut self, row: usize) -> Option<&mut dyn Any> {
        self.get_mut(row).map(|value| value as &mut dyn Any)
    }

    #[inline]
    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional);
    }

    #[inline]
    fn clear(&mut self) {
        Vec::clear(self);
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Dense storage of one component: values plus their added and changed ticks.
///
/// # Invariants
/// - `values.len() == added_ticks.len() == changed_ticks.len()`
pub struct Column {
    values: Box<dyn ValueVec>,
    added_ticks: Vec<Tick>,
    changed_ticks: Vec<Tick>,
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column").field("len", &self.len()).finish()
    }
}

impl Column {
    /// Create a column over an empty value vector.
    pub(crate) fn new(values: Box<dyn ValueVec>) -> Self {
        debug_assert!(values.is_empty());
        Self {
            values,
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
        }
    }

    /// The number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.added_ticks.len()
    }

    /// Returns `true` if there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added_ticks.is_empty()
    }

    fn typed<T: 'static>(&self) -> &Vec<T> {
        self.values
            .as_any()
            .downcast_ref::<Vec<T>>()
            .unwrap_or_else(|| panic!("column does not store {}", type_name::<T>()))
    }

    fn typed_mut<T: 'static>(&mut self) -> &mut Vec<T> {
        self.values
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .unwrap_or_else(|| panic!("column does not store {}", type_name::<T>()))
    }

    /// Write the value of a freshly allocated row, stamping added and changed ticks.
    ///
    /// # Panics
    ///
    /// Panics if `row` is not the next row of the column, or `T` is not the column's type.
    pub(crate) fn initialize<T: 'static>(&mut self, row: TableRow, value: T, change_tick: Tick) {
        assert_eq!(
            row.index(),
            self.len(),
            "column rows must be initialized in order"
        );
        self.typed_mut::<T>().push(value);
        self.added_ticks.push(change_tick);
        self.changed_ticks.push(change_tick);
    }

    /// Overwrite the value of an existing row, stamping only the changed tick.
    ///
    /// The previous value is dropped.
    pub(crate) fn replace<T: 'static>(&mut self, row: TableRow, value: T, change_tick: Tick) {
        let slot = self
            .typed_mut::<T>()
            .get_mut(row.index())
            .unwrap_or_else(|| panic!("row {row:?} out of bounds"));
        *slot = value;
        self.changed_ticks[row.index()] = change_tick;
    }

    /// Remove a row by swapping in the last one, dropping its value.
    pub(crate) fn swap_remove(&mut self, row: TableRow) {
        self.values.swap_remove_and_drop(row.index());
        self.added_ticks.swap_remove(row.index());
        self.changed_ticks.swap_remove(row.index());
    }

    /// Remove a row by swapping in the last one, appending value and ticks to `other`.
    pub(crate) fn swap_remove_into(&mut self, row: TableRow, other: &mut Column) {
        self.values.swap_remove_into(row.index(), other.values.as_mut());
        other.added_ticks.push(self.added_ticks.swap_remove(row.index()));
        other
            .changed_ticks
            .push(self.changed_ticks.swap_remove(row.index()));
    }

    /// Remove a row by swapping in the last one, returning its value boxed.
    pub(crate) fn swap_remove_boxed(&mut self, row: TableRow) -> Box<dyn Any + Send + Sync> {
        self.added_ticks.swap_remove(row.index());
        self.changed_ticks.swap_remove(row.index());
        self.values.swap_remove_boxed(row.index())
    }

    /// The value at `row`.
    #[inline]
    pub fn get<T: 'static>(&self, row: TableRow) -> Option<&T> {
        self.typed::<T>().get(row.index())
    }

    /// The value at `row`, type-erased.
    #[inline]
    pub fn get_any(&self, row: TableRow) -> Option<&dyn Any> {
        self.values.get_any(row.index())
    }

    /// The value at `row` with its added and changed ticks.
    #[inline]
    pub fn get_with_ticks<T: 'static>(&self, row: TableRow) -> Option<(&T, &Tick, &Tick)> {
        let value = self.typed::<T>().get(row.index())?;
        Some((
            value,
            &self.added_ticks[row.index()],
            &self.changed_ticks[row.index()],
        ))
    }

    /// The value at `row` with its added and changed ticks, mutably.
    pub(crate) fn get_with_ticks_mut<T: 'static>(
        &mut self,
        row: TableRow,
    ) -> Option<(&mut T, &mut Tick, &mut Tick)> {
        let index = row.index();
        let added = self.added_ticks.get_mut(index)?;
        let changed = self.changed_ticks.get_mut(index)?;
        let value = self
            .values
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .unwrap_or_else(|| panic!("column does not store {}", type_name::<T>()))
            .get_mut(index)?;
        Some((value, added, changed))
    }

    /// The value at `row`, type-erased, with its ticks mutably.
    pub(crate) fn get_any_with_ticks_mut(
        &mut self,
        row: TableRow,
    ) -> Option<(&mut dyn Any, &mut Tick, &mut Tick)> {
        let index = row.index();
        let added = self.added_ticks.get_mut(index)?;
        let changed = self.changed_ticks.get_mut(index)?;
        let value = self.values.get_any_mut(index)?;
        Some((value, added, changed))
    }

    /// The ticks of `row`.
    #[inline]
    pub fn get_ticks(&self, row: TableRow) -> Option<ComponentTicks> {
        Some(ComponentTicks {
            added: *self.added_ticks.get(row.index())?,
            changed: *self.changed_ticks.get(row.index())?,
        })
    }

    /// Every value, in row order.
    #[inline]
    pub fn values<T: 'static>(&self) -> &[T] {
        self.typed::<T>()
    }

    /// Every added tick, in row order.
    #[inline]
    pub fn added_ticks(&self) -> &[Tick] {
        &self.added_ticks
    }

    /// Every changed tick, in row order.
    #[inline]
    pub fn changed_ticks(&self) -> &[Tick] {
        &self.changed_ticks
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
        self.added_ticks.reserve(additional);
        self.changed_ticks.reserve(additional);
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        for tick in self.added_ticks.iter_mut().chain(self.changed_ticks.iter_mut()) {
            tick.check_tick(check);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.added_ticks.clear();
        self.changed_ticks.clear();
    }
}
