//! Sparse-to-dense index maps.
//!
//! A sparse set keeps its values packed in a dense vector and maps each external index to a
//! dense slot through a sparse array:
//!
//! ```text
//! sparse:  [None, Some(1), None, None, Some(0)]
//! dense:   [value for 4, value for 1]
//! indices: [4, 1]
//! ```
//!
//! Removal swaps the last dense slot into the hole, so every operation is O(1) and iteration
//! never visits gaps.

use std::{hash::Hash, marker::PhantomData};

use crate::{
    change_detection::{CheckChangeTicks, ComponentTicks, Tick},
    component::{ComponentId, ComponentInfo},
    entity::Entity,
    storage::{Column, TableRow},
};

/// A type usable as the external index of a sparse set.
pub trait SparseSetIndex: Clone + PartialEq + Eq + Hash {
    /// The index into the sparse array.
    fn sparse_set_index(&self) -> usize;

    /// Rebuild the value from its sparse index.
    fn get_sparse_set_index(value: usize) -> Self;
}

impl SparseSetIndex for usize {
    #[inline]
    fn sparse_set_index(&self) -> usize {
        *self
    }

    #[inline]
    fn get_sparse_set_index(value: usize) -> Self {
        value
    }
}

impl SparseSetIndex for u32 {
    #[inline]
    fn sparse_set_index(&self) -> usize {
        *self as usize
    }

    #[inline]
    fn get_sparse_set_index(value: usize) -> Self {
        value as u32
    }
}

/// A growable array of optional values addressed by a [`SparseSetIndex`].
#[derive(Debug, Clone)]
pub struct SparseArray<I, V = I> {
    values: Vec<Option<V>>,
    marker: PhantomData<I>,
}

impl<I, V> Default for SparseArray<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, V> SparseArray<I, V> {
    /// Create an empty array.
    #[inline]
    pub const fn new() -> Self {
        Self {
            values: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<I: SparseSetIndex, V> SparseArray<I, V> {
    /// Returns `true` if a value is stored at `index`.
    #[inline]
    pub fn contains(&self, index: I) -> bool {
        self.values
            .get(index.sparse_set_index())
            .is_some_and(Option::is_some)
    }

    /// The value at `index`.
    #[inline]
    pub fn get(&self, index: I) -> Option<&V> {
        self.values
            .get(index.sparse_set_index())
            .and_then(Option::as_ref)
    }

    /// The value at `index`, mutably.
    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut V> {
        self.values
            .get_mut(index.sparse_set_index())
            .and_then(Option::as_mut)
    }

    /// Store `value` at `index`, growing the array as needed.
    #[inline]
    pub fn insert(&mut self, index: I, value: V) {
        let index = index.sparse_set_index();
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        self.values[index] = Some(value);
    }

    /// Remove and return the value at `index`.
    #[inline]
    pub fn remove(&mut self, index: I) -> Option<V> {
        self.values
            .get_mut(index.sparse_set_index())
            .and_then(Option::take)
    }

    /// Remove every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// A dense vector of values addressed by a [`SparseSetIndex`].
#[derive(Debug, Clone)]
pub struct SparseSet<I, V> {
    dense: Vec<V>,
    indices: Vec<I>,
    sparse: SparseArray<I, usize>,
}

impl<I, V> Default for SparseSet<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, V> SparseSet<I, V> {
    /// Create an empty set.
    #[inline]
    pub const fn new() -> Self {
        Self {
            dense: Vec::new(),
            indices: Vec::new(),
            sparse: SparseArray::new(),
        }
    }

    /// The number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// The stored indices, in dense order.
    #[inline]
    pub fn indices(&self) -> impl Iterator<Item = I> + Clone + '_
    where
        I: Clone,
    {
        self.indices.iter().cloned()
    }

    /// The stored values, in dense order.
    #[inline]
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.dense.iter()
    }

    /// The stored values, mutably, in dense order.
    #[inline]
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.dense.iter_mut()
    }

    /// Index and value pairs, in dense order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&I, &V)> {
        self.indices.iter().zip(self.dense.iter())
    }

    /// Index and mutable value pairs, in dense order.
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&I, &mut V)> {
        self.indices.iter().zip(self.dense.iter_mut())
    }
}

impl<I: SparseSetIndex, V> SparseSet<I, V> {
    /// Store `value` at `index`, replacing any previous value.
    pub fn insert(&mut self, index: I, value: V) {
        if let Some(dense_index) = self.sparse.get(index.clone()).copied() {
            self.dense[dense_index] = value;
        } else {
            self.sparse.insert(index.clone(), self.dense.len());
            self.indices.push(index);
            self.dense.push(value);
        }
    }

    /// The value at `index`, inserting `func()` first if absent.
    pub fn get_or_insert_with(&mut self, index: I, func: impl FnOnce() -> V) -> &mut V {
        let dense_index = match self.sparse.get(index.clone()) {
            Some(dense_index) => *dense_index,
            None => {
                let dense_index = self.dense.len();
                self.sparse.insert(index.clone(), dense_index);
                self.indices.push(index);
                self.dense.push(func());
                dense_index
            }
        };
        &mut self.dense[dense_index]
    }

    /// Returns `true` if a value is stored at `index`.
    #[inline]
    pub fn contains(&self, index: I) -> bool {
        self.sparse.contains(index)
    }

    /// The value at `index`.
    #[inline]
    pub fn get(&self, index: I) -> Option<&V> {
        self.sparse.get(index).map(|dense_index| &self.dense[*dense_index])
    }

    /// The value at `index`, mutably.
    #[inline]
    pub fn get_mut(&mut self, index: I) -> Option<&mut V> {
        let dense = &mut self.dense;
        self.sparse
            .get(index)
            .map(move |dense_index| &mut dense[*dense_index])
    }

    /// Remove and return the value at `index`.
    ///
    /// The last value is swapped into the freed dense slot.
    pub fn remove(&mut self, index: I) -> Option<V> {
        self.sparse.remove(index).map(|dense_index| {
            let is_last = dense_index == self.dense.len() - 1;
            let value = self.dense.swap_remove(dense_index);
            self.indices.swap_remove(dense_index);
            if !is_last {
                let swapped_index = self.indices[dense_index].clone();
                *self.sparse.get_mut(swapped_index).unwrap_or_else(|| {
                    panic!("swapped sparse set entry has no sparse slot")
                }) = dense_index;
            }
            value
        })
    }

    /// Remove every value.
    pub fn clear(&mut self) {
        self.dense.clear();
        self.indices.clear();
        self.sparse.clear();
    }
}

/// Sparse set storage of one component, keyed by entity index.
///
/// The dense values and ticks live in a [`Column`]. Removal swaps the last entity into the hole
/// so the column stays packed.
#[derive(Debug)]
pub struct ComponentSparseSet {
    dense: Column,
    entities: Vec<Entity>,
    sparse: SparseArray<u32, TableRow>,
}

impl ComponentSparseSet {
    /// Create an empty set for the component described by `info`.
    pub(crate) fn new(info: &ComponentInfo) -> Self {
        Self {
            dense: Column::new(info.new_values()),
            entities: Vec::new(),
            sparse: SparseArray::new(),
        }
    }

    /// The number of entities holding the component.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no entity holds the component.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Returns `true` if `entity` holds the component.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_row(entity).is_some()
    }

    fn dense_row(&self, entity: Entity) -> Option<TableRow> {
        let row = *self.sparse.get(entity.index())?;
        (self.entities[row.index()] == entity).then_some(row)
    }

    /// Insert or overwrite the value of `entity`.
    ///
    /// A new value gets added and changed ticks of `change_tick`, an overwrite only the changed
    /// tick.
    pub(crate) fn insert<T: 'static>(&mut self, entity: Entity, value: T, change_tick: Tick) {
        if let Some(row) = self.dense_row(entity) {
            self.dense.replace(row, value, change_tick);
        } else {
            let row = TableRow::new(self.dense.len());
            self.dense.initialize(row, value, change_tick);
            self.entities.push(entity);
            self.sparse.insert(entity.index(), row);
        }
    }

    /// The value of `entity`, type-erased.
    #[inline]
    pub fn get_any(&self, entity: Entity) -> Option<&dyn std::any::Any> {
        self.dense.get_any(self.dense_row(entity)?)
    }

    /// The value of `entity`.
    #[inline]
    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.dense.get(self.dense_row(entity)?)
    }

    /// The value and ticks of `entity`.
    #[inline]
    pub fn get_with_ticks<T: 'static>(&self, entity: Entity) -> Option<(&T, &Tick, &Tick)> {
        self.dense.get_with_ticks(self.dense_row(entity)?)
    }

    /// The value and ticks of `entity`, mutably.
    #[inline]
    pub(crate) fn get_with_ticks_mut<T: 'static>(
        &mut self,
        entity: Entity,
    ) -> Option<(&mut T, &mut Tick, &mut Tick)> {
        let row = self.dense_row(entity)?;
        self.dense.get_with_ticks_mut(row)
    }

    /// The ticks of `entity`'s value.
    #[inline]
    pub fn get_ticks(&self, entity: Entity) -> Option<ComponentTicks> {
        self.dense.get_ticks(self.dense_row(entity)?)
    }

    fn detach(&mut self, entity: Entity) -> Option<TableRow> {
        let row = self.dense_row(entity)?;
        self.sparse.remove(entity.index());
        let is_last = row.index() == self.entities.len() - 1;
        self.entities.swap_remove(row.index());
        if !is_last {
            let swapped = self.entities[row.index()];
            self.sparse.insert(swapped.index(), row);
        }
        Some(row)
    }

    /// Remove and drop the value of `entity`. Returns `true` if there was one.
    pub(crate) fn remove(&mut self, entity: Entity) -> bool {
        match self.detach(entity) {
            Some(row) => {
                self.dense.swap_remove(row);
                true
            }
            None => false,
        }
    }

    /// Remove the value of `entity` and hand it back boxed.
    pub(crate) fn remove_and_take(
        &mut self,
        entity: Entity,
    ) -> Option<Box<dyn std::any::Any + Send + Sync>> {
        let row = self.detach(entity)?;
        Some(self.dense.swap_remove_boxed(row))
    }

    /// Entities holding the component, in dense order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        self.dense.check_change_ticks(check);
    }

    pub(crate) fn clear(&mut self) {
        self.dense.clear();
        self.entities.clear();
        self.sparse.clear();
    }
}

/// Every component sparse set of a world, keyed by component id.
#[derive(Debug, Default)]
pub struct SparseSets {
    sets: SparseSet<ComponentId, ComponentSparseSet>,
}

impl SparseSets {
    /// The number of component sparse sets.
    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` if no sparse set exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Every sparse set with its component id.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &ComponentSparseSet)> {
        self.sets.iter().map(|(id, set)| (*id, set))
    }

    /// The sparse set of a component.
    #[inline]
    pub fn get(&self, component_id: ComponentId) -> Option<&ComponentSparseSet> {
        self.sets.get(component_id)
    }

    /// The sparse set of a component, mutably.
    #[inline]
    pub(crate) fn get_mut(&mut self, component_id: ComponentId) -> Option<&mut ComponentSparseSet> {
        self.sets.get_mut(component_id)
    }

    /// The sparse set of a component, created on first use.
    pub(crate) fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ComponentSparseSet {
        self.sets
            .get_or_insert_with(info.id(), || ComponentSparseSet::new(info))
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        for set in self.sets.values_mut() {
            set.check_change_ticks(check);
        }
    }

    pub(crate) fn clear_entities(&mut self) {
        for set in self.sets.values_mut() {
            set.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentDescriptor, StorageType};

    fn info() -> ComponentInfo {
        ComponentInfo::new(
            ComponentId::new(0),
            ComponentDescriptor::new_dynamic::<String>("name", StorageType::SparseSet, true),
        )
    }

    #[test]
    fn sparse_set_remove_swaps_last_into_hole() {
        // Given
        let mut set = SparseSet::<usize, &str>::new();
        set.insert(4, "a");
        set.insert(1, "b");
        set.insert(9, "c");

        // When
        let removed = set.remove(4);

        // Then
        assert_eq!(removed, Some("a"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.indices().collect::<Vec<_>>(), vec![9, 1]);
        assert_eq!(set.get(9), Some(&"c"));
        assert_eq!(set.get(1), Some(&"b"));
        assert!(!set.contains(4));
    }

    #[test]
    fn sparse_set_insert_replaces_existing() {
        let mut set = SparseSet::<usize, u8>::new();
        set.insert(2, 1);
        set.insert(2, 5);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(2), Some(&5));
    }

    #[test]
    fn component_sparse_set_tracks_entities() {
        // Given
        let mut set = ComponentSparseSet::new(&info());
        let a = Entity::from_raw(3);
        let b = Entity::from_raw(7);
        set.insert(a, String::from("a"), Tick::new(1));
        set.insert(b, String::from("b"), Tick::new(2));

        // When
        assert!(set.remove(a));

        // Then
        assert_eq!(set.len(), 1);
        assert!(!set.contains(a));
        assert_eq!(set.get::<String>(b).map(String::as_str), Some("b"));
        assert_eq!(set.entities(), &[b]);
        assert!(!set.remove(a));
    }

    #[test]
    fn component_sparse_set_ignores_stale_generation() {
        // Given
        let mut set = ComponentSparseSet::new(&info());
        let entity = Entity::from_raw(3);
        set.insert(entity, String::from("a"), Tick::new(1));

        // When
        let stale = Entity::from_raw_and_generation(3, crate::entity::Generation::from_bits(1));

        // Then
        assert!(!set.contains(stale));
        assert!(set.get::<String>(stale).is_none());
    }

    #[test]
    fn component_sparse_set_overwrite_keeps_added_tick() {
        // Given
        let mut set = ComponentSparseSet::new(&info());
        let entity = Entity::from_raw(0);
        set.insert(entity, String::from("a"), Tick::new(1));

        // When
        set.insert(entity, String::from("b"), Tick::new(5));

        // Then
        let ticks = set.get_ticks(entity).unwrap();
        assert_eq!(ticks.added, Tick::new(1));
        assert_eq!(ticks.changed, Tick::new(5));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_and_take_returns_the_value() {
        let mut set = ComponentSparseSet::new(&info());
        let entity = Entity::from_raw(0);
        set.insert(entity, String::from("kept"), Tick::new(1));
        let taken = set.remove_and_take(entity).unwrap();
        assert_eq!(taken.downcast_ref::<String>().map(String::as_str), Some("kept"));
        assert!(set.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn removal_moves_last_value_into_the_hole(count in 1usize..64, pick in 0usize..64) {
                let mut set = SparseSet::<usize, usize>::new();
                for i in 0..count {
                    set.insert(i * 3, i);
                }
                let removed_row = pick % count;
                let last_key = (count - 1) * 3;
                set.remove(removed_row * 3);
                prop_assert_eq!(set.len(), count - 1);
                if removed_row != count - 1 {
                    prop_assert_eq!(set.indices().nth(removed_row), Some(last_key));
                    prop_assert_eq!(set.get(last_key), Some(&(count - 1)));
                }
            }
        }
    }
}
