use std::{
    collections::HashMap,
    ops::{Index, IndexMut},
};

use log::debug;

use crate::{
    archetype::{Archetype, ArchetypeFlags, ArchetypeId},
    component::{ComponentId, Components},
    observer::Observers,
    storage::TableId,
};

/// The structural identity of an archetype: its sorted table and sparse set components.
///
/// Two archetypes with the same components split differently between table and sparse storage
/// are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeComponents {
    /// Sorted table components.
    pub table_components: Box<[ComponentId]>,
    /// Sorted sparse set components.
    pub sparse_set_components: Box<[ComponentId]>,
}

/// Central registry of archetypes.
#[derive(Debug)]
pub struct Archetypes {
    /// The archetypes stored by their unique identifier.
    archetypes: Vec<Archetype>,

    /// The archetypes indexed by their components.
    by_components: HashMap<ArchetypeComponents, ArchetypeId>,

    /// The archetypes containing each component, in creation order.
    by_component: HashMap<ComponentId, Vec<ArchetypeId>>,
}

impl Default for Archetypes {
    fn default() -> Self {
        Self::new()
    }
}

impl Archetypes {
    /// Create a registry holding only the empty archetype.
    pub fn new() -> Self {
        let empty = Archetype::new(
            &Components::new(),
            &Observers::default(),
            ArchetypeId::EMPTY,
            TableId::EMPTY,
            Box::default(),
            Box::default(),
        );
        let mut by_components = HashMap::new();
        by_components.insert(
            ArchetypeComponents {
                table_components: Box::default(),
                sparse_set_components: Box::default(),
            },
            ArchetypeId::EMPTY,
        );
        Self {
            archetypes: vec![empty],
            by_components,
            by_component: HashMap::new(),
        }
    }

    /// The number of archetypes, the empty one included.
    ///
    /// Archetypes are never removed, so this only grows.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Always `false`, the empty archetype exists from the start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// The archetype without components.
    #[inline]
    pub fn empty(&self) -> &Archetype {
        &self.archetypes[ArchetypeId::EMPTY.index()]
    }

    #[inline]
    pub(crate) fn empty_mut(&mut self) -> &mut Archetype {
        &mut self.archetypes[ArchetypeId::EMPTY.index()]
    }

    /// Get an archetype by id.
    #[inline]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    /// Two distinct archetypes, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `a == b`.
    pub(crate) fn get_2_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "cannot borrow the same archetype twice");
        if a.index() > b.index() {
            let (b_slice, a_slice) = self.archetypes.split_at_mut(a.index());
            (&mut a_slice[0], &mut b_slice[b.index()])
        } else {
            let (a_slice, b_slice) = self.archetypes.split_at_mut(b.index());
            (&mut a_slice[a.index()], &mut b_slice[0])
        }
    }

    /// Every archetype, in id order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// The archetype with exactly these components, if it exists.
    pub fn get_id(&self, components: &ArchetypeComponents) -> Option<ArchetypeId> {
        self.by_components.get(components).copied()
    }

    /// Every archetype containing `component_id`.
    pub fn archetypes_with(&self, component_id: ComponentId) -> &[ArchetypeId] {
        self.by_component
            .get(&component_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get the archetype with the given components or create it.
    ///
    /// `table_components` and `sparse_set_components` must be sorted, and `table_id` must be the
    /// table holding exactly `table_components`. Returns the id and whether it was just created.
    pub(crate) fn get_id_or_insert(
        &mut self,
        components: &Components,
        observers: &Observers,
        table_id: TableId,
        table_components: Vec<ComponentId>,
        sparse_set_components: Vec<ComponentId>,
    ) -> (ArchetypeId, bool) {
        debug_assert!(table_components.is_sorted(), "table components must be sorted");
        debug_assert!(
            sparse_set_components.is_sorted(),
            "sparse set components must be sorted"
        );
        let key = ArchetypeComponents {
            table_components: table_components.into(),
            sparse_set_components: sparse_set_components.into(),
        };
        if let Some(id) = self.by_components.get(&key) {
            return (*id, false);
        }

        let id = ArchetypeId::new(self.archetypes.len());
        for component_id in key
            .table_components
            .iter()
            .chain(key.sparse_set_components.iter())
        {
            self.by_component.entry(*component_id).or_default().push(id);
        }
        self.archetypes.push(Archetype::new(
            components,
            observers,
            id,
            table_id,
            key.table_components.clone(),
            key.sparse_set_components.clone(),
        ));
        debug!(
            "created archetype {id:?} with table {table_id:?}, table components {:?}, sparse components {:?}",
            key.table_components, key.sparse_set_components
        );
        self.by_components.insert(key, id);
        (id, true)
    }

    /// Raise `flag` on every archetype containing `component_id`.
    pub(crate) fn raise_flag(&mut self, component_id: ComponentId, flag: ArchetypeFlags) {
        if let Some(ids) = self.by_component.get(&component_id) {
            for id in ids {
                self.archetypes[id.index()].flags_mut().insert(flag);
            }
        }
    }

    pub(crate) fn clear_entities(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.clear_entities();
        }
    }
}

impl Index<ArchetypeId> for Archetypes {
    type Output = Archetype;

    #[inline]
    fn index(&self, index: ArchetypeId) -> &Self::Output {
        &self.archetypes[index.index()]
    }
}

impl IndexMut<ArchetypeId> for Archetypes {
    #[inline]
    fn index_mut(&mut self, index: ArchetypeId) -> &mut Self::Output {
        &mut self.archetypes[index.index()]
    }
}
