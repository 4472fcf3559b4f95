//! Entity identity management.
//!
//! # Architecture
//!
//! - **[`Entity`]**: a lightweight handle combining a slot index with a [`Generation`]. The
//!   index identifies the slot, the generation counts how many times that slot has been
//!   reused so stale handles can be detected.
//!
//! - **[`Entities`]**: the registry that hands out entities and records where each live
//!   entity's data is stored ([`EntityLocation`]).
//!
//! # Allocation
//!
//! Freed indices are pushed onto a pending list and reused by later allocations with a bumped
//! generation:
//!
//! ```rust,ignore
//! let entity = entities.alloc(); // 0v0
//! entities.free(entity);
//! let reused = entities.alloc(); // 0v1
//! assert!(!entities.contains(entity));
//! ```
//!
//! # Reservation
//!
//! [`Entities::reserve_entity`] only needs `&self`. Reservations decrement a shared atomic
//! cursor into the pending list; once the pending list is exhausted the cursor goes negative
//! and the reservation hands out brand new indices past the end of the metadata. Reserved
//! entities have no location until [`Entities::flush`] materializes them, which must happen
//! before any other allocation.

mod location;

use std::{
    fmt, mem,
    sync::atomic::{AtomicI64, Ordering},
};

use log::warn;

use crate::archetype::ArchetypeId;

pub use location::EntityLocation;

/// The generation of an entity slot.
///
/// Starts at [`Generation::FIRST`] and is bumped every time the slot is freed. The counter wraps
/// around after `u32::MAX` reuses, which can alias very old handles. That is logged, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    /// The first generation of an entity.
    pub const FIRST: Self = Self(0);

    /// The last generation before wrapping back to [`Generation::FIRST`].
    pub const MAX: Self = Self(u32::MAX);

    /// Construct a generation from its raw value.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw generation value.
    #[inline]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// The next generation, wrapping to [`Generation::FIRST`] after [`Generation::MAX`].
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A generational entity handle.
///
/// An entity is only valid while its generation matches the generation recorded by
/// [`Entities`] for its index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    index: u32,
    generation: Generation,
}

impl Entity {
    /// An entity that is never handed out by an allocator. Useful as a placeholder.
    pub const PLACEHOLDER: Self = Self::from_raw(u32::MAX);

    /// Construct an entity for `index` in its first generation.
    ///
    /// Intended for tests and tooling; live entities should come from [`Entities`].
    #[inline]
    pub const fn from_raw(index: u32) -> Self {
        Self::from_raw_and_generation(index, Generation::FIRST)
    }

    /// Construct an entity from an index and a known generation.
    #[inline]
    pub const fn from_raw_and_generation(index: u32, generation: Generation) -> Self {
        Self { index, generation }
    }

    /// The slot index of this entity.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The generation of this entity.
    #[inline]
    pub const fn generation(self) -> Generation {
        self.generation
    }

    /// Pack the entity into a `u64`, generation in the high half and index in the low half.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation.0 as u64) << 32) | self.index as u64
    }

    /// Unpack an entity from [`Entity::to_bits`].
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: Generation((bits >> 32) as u32),
        }
    }
}

impl PartialOrd for Entity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Entities order by index first, then by generation.
impl Ord for Entity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.index.cmp(&other.index) {
            std::cmp::Ordering::Equal => self.generation.cmp(&other.generation),
            ord => ord,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct EntityMeta {
    generation: Generation,
    location: EntityLocation,
}

impl EntityMeta {
    const EMPTY: EntityMeta = EntityMeta {
        generation: Generation::FIRST,
        location: EntityLocation::INVALID,
    };
}

/// The registry of entity generations and locations.
///
/// # Invariants
///
/// - Every index in `pending` refers to a freed slot in `meta`.
/// - `free_cursor` equals `pending.len()` whenever no reservations are outstanding. Below that,
///   `pending[free_cursor..]` has been reserved. A negative value counts the brand new indices
///   reserved past `meta.len()`.
#[derive(Debug, Default)]
pub struct Entities {
    meta: Vec<EntityMeta>,
    pending: Vec<u32>,
    free_cursor: AtomicI64,
    len: u32,
}

impl Entities {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            meta: Vec::new(),
            pending: Vec::new(),
            free_cursor: AtomicI64::new(0),
            len: 0,
        }
    }

    /// Reserve `count` entities without exclusive access.
    ///
    /// The returned entities have no location until [`Entities::flush`] runs.
    pub fn reserve_entities(&self, count: u32) -> ReserveEntitiesIterator<'_> {
        let range_end = self.free_cursor.fetch_sub(count as i64, Ordering::Relaxed);
        let range_start = range_end - count as i64;

        let freelist_range = range_start.max(0) as usize..range_end.max(0) as usize;

        let new_index_range = if range_start >= 0 {
            0..0
        } else {
            // Brand new indices start right after the ones reserved by earlier calls.
            let base = self.meta.len() as i64;
            let start = base - range_end.min(0);
            let end = base - range_start;
            let end = u32::try_from(end).unwrap_or_else(|_| panic!("entity index space exhausted"));
            start as u32..end
        };

        ReserveEntitiesIterator {
            meta: &self.meta,
            freelist_indices: self.pending[freelist_range].iter(),
            new_indices: new_index_range,
        }
    }

    /// Reserve a single entity without exclusive access.
    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            let index = self.pending[(n - 1) as usize];
            Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
        } else {
            let index = self.meta.len() as i64 - n;
            let index =
                u32::try_from(index).unwrap_or_else(|_| panic!("entity index space exhausted"));
            Entity::from_raw(index)
        }
    }

    fn verify_flushed(&self) {
        debug_assert!(
            !self.needs_flush(),
            "flush() needs to be called before this operation is legal"
        );
    }

    /// Allocate an entity, reusing a freed index when one is available.
    pub fn alloc(&mut self) -> Entity {
        self.verify_flushed();
        self.len += 1;
        if let Some(index) = self.pending.pop() {
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
        } else {
            let index = u32::try_from(self.meta.len())
                .unwrap_or_else(|_| panic!("entity index space exhausted"));
            self.meta.push(EntityMeta::EMPTY);
            Entity::from_raw(index)
        }
    }

    /// Allocate a specific entity, overwriting whatever currently owns its index.
    ///
    /// Returns the previous location when the slot was live so the caller can tear its
    /// storage down.
    pub fn alloc_at(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();
        let index = entity.index() as usize;

        let previous = if index >= self.meta.len() {
            self.pending.extend((self.meta.len() as u32)..entity.index());
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            self.meta.resize(index + 1, EntityMeta::EMPTY);
            self.len += 1;
            None
        } else if let Some(position) = self.pending.iter().position(|i| *i == entity.index()) {
            self.pending.swap_remove(position);
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            self.len += 1;
            None
        } else {
            let location = mem::replace(&mut self.meta[index].location, EntityLocation::INVALID);
            location.is_valid().then_some(location)
        };

        self.meta[index].generation = entity.generation();
        previous
    }

    /// Free an entity, returning its last location.
    ///
    /// Returns `None` for stale handles or indices this registry never allocated.
    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();

        let meta = self.meta.get_mut(entity.index() as usize)?;
        if meta.generation != entity.generation() {
            return None;
        }

        if meta.generation == Generation::MAX {
            warn!(
                "Entity({}) generation wrapped on Entities::free, stale handles may alias",
                entity.index()
            );
        }
        meta.generation = meta.generation.next();

        let location = mem::replace(&mut meta.location, EntityLocation::INVALID);

        self.pending.push(entity.index());
        *self.free_cursor.get_mut() = self.pending.len() as i64;
        self.len -= 1;
        Some(location)
    }

    /// Returns `true` if `entity` refers to a live or reserved entity.
    pub fn contains(&self, entity: Entity) -> bool {
        self.resolve_from_index(entity.index())
            .is_some_and(|current| current.generation() == entity.generation())
    }

    /// The current location of `entity`.
    ///
    /// Returns `None` for stale handles and for reserved entities that have not been flushed.
    #[inline]
    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        let meta = self.meta.get(entity.index() as usize)?;
        if meta.generation != entity.generation() || meta.location.archetype_id == ArchetypeId::INVALID
        {
            return None;
        }
        Some(meta.location)
    }

    /// Record a new location for the entity at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` was never allocated.
    #[inline]
    pub(crate) fn set(&mut self, index: u32, location: EntityLocation) {
        self.meta[index as usize].location = location;
    }

    /// The current entity for a slot index, including reserved but unflushed indices.
    pub fn resolve_from_index(&self, index: u32) -> Option<Entity> {
        let idu = index as usize;
        if let Some(meta) = self.meta.get(idu) {
            Some(Entity::from_raw_and_generation(index, meta.generation))
        } else {
            let free_cursor = self.free_cursor.load(Ordering::Relaxed);
            let num_pending = usize::try_from(-free_cursor).ok()?;
            (idu < self.meta.len() + num_pending).then_some(Entity::from_raw(index))
        }
    }

    /// Returns `true` if reservations are waiting for [`Entities::flush`].
    #[inline]
    pub fn needs_flush(&self) -> bool {
        self.free_cursor.load(Ordering::Relaxed) != self.pending.len() as i64
    }

    /// Materialize every outstanding reservation.
    ///
    /// `init` runs once per reserved entity with its location slot so the caller can place the
    /// entity in storage.
    pub fn flush(&mut self, mut init: impl FnMut(Entity, &mut EntityLocation)) {
        let free_cursor = self.free_cursor.get_mut();
        let current_free_cursor = *free_cursor;

        let new_free_cursor = if current_free_cursor >= 0 {
            current_free_cursor as usize
        } else {
            let old_meta_len = self.meta.len();
            let new_meta_len = old_meta_len + (-current_free_cursor) as usize;
            self.meta.resize(new_meta_len, EntityMeta::EMPTY);
            self.len += (-current_free_cursor) as u32;
            for (index, meta) in self.meta.iter_mut().enumerate().skip(old_meta_len) {
                init(
                    Entity::from_raw_and_generation(index as u32, meta.generation),
                    &mut meta.location,
                );
            }

            *free_cursor = 0;
            0
        };

        self.len += (self.pending.len() - new_free_cursor) as u32;
        for index in self.pending.drain(new_free_cursor..) {
            let meta = &mut self.meta[index as usize];
            init(
                Entity::from_raw_and_generation(index, meta.generation),
                &mut meta.location,
            );
        }
    }

    /// Flush reservations without giving them storage. Their location stays invalid.
    pub fn flush_as_invalid(&mut self) {
        self.flush(|_, location| *location = EntityLocation::INVALID);
    }

    /// Forget every entity. Generations restart, so old handles may alias new ones.
    pub fn clear(&mut self) {
        self.meta.clear();
        self.pending.clear();
        *self.free_cursor.get_mut() = 0;
        self.len = 0;
    }

    /// The number of live entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if no entity is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of slots ever allocated, live or free.
    #[inline]
    pub fn total_count(&self) -> usize {
        self.meta.len()
    }
}

/// Iterator over entities handed out by [`Entities::reserve_entities`].
pub struct ReserveEntitiesIterator<'a> {
    meta: &'a [EntityMeta],
    freelist_indices: std::slice::Iter<'a, u32>,
    new_indices: std::ops::Range<u32>,
}

impl Iterator for ReserveEntitiesIterator<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        self.freelist_indices
            .next()
            .map(|&index| {
                Entity::from_raw_and_generation(index, self.meta[index as usize].generation)
            })
            .or_else(|| self.new_indices.next().map(Entity::from_raw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.freelist_indices.len() + self.new_indices.len();
        (len, Some(len))
    }
}

impl ExactSizeIterator for ReserveEntitiesIterator<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        archetype::ArchetypeRow,
        storage::{TableId, TableRow},
    };

    fn placed(row: u32) -> EntityLocation {
        EntityLocation {
            archetype_id: ArchetypeId::EMPTY,
            archetype_row: ArchetypeRow::new(row as usize),
            table_id: TableId::EMPTY,
            table_row: TableRow::new(row as usize),
        }
    }

    #[test]
    fn entity_bits_round_trip() {
        // Given
        let entity = Entity::from_raw_and_generation(7, Generation::from_bits(3));

        // When
        let bits = entity.to_bits();

        // Then
        assert_eq!(bits, (3u64 << 32) | 7);
        assert_eq!(Entity::from_bits(bits), entity);
    }

    #[test]
    fn entities_order_by_index_then_generation() {
        let a = Entity::from_raw_and_generation(1, Generation::from_bits(5));
        let b = Entity::from_raw_and_generation(2, Generation::FIRST);
        let c = Entity::from_raw_and_generation(2, Generation::from_bits(1));
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn alloc_hands_out_sequential_indices() {
        // Given
        let mut entities = Entities::new();

        // When
        let a = entities.alloc();
        let b = entities.alloc();

        // Then
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(entities.len(), 2);
        assert!(entities.contains(a));
        assert!(entities.contains(b));
    }

    #[test]
    fn free_bumps_generation_and_reuses_index() {
        // Given
        let mut entities = Entities::new();
        let entity = entities.alloc();
        entities.set(entity.index(), placed(0));

        // When
        let location = entities.free(entity);
        let reused = entities.alloc();

        // Then
        assert_eq!(location, Some(placed(0)));
        assert_eq!(reused.index(), entity.index());
        assert!(reused.generation() > entity.generation());
        assert!(!entities.contains(entity));
        assert!(entities.contains(reused));
    }

    #[test]
    fn free_of_stale_entity_returns_none() {
        // Given
        let mut entities = Entities::new();
        let entity = entities.alloc();
        entities.free(entity);

        // When
        let second = entities.free(entity);

        // Then
        assert_eq!(second, None);
        assert_eq!(entities.free(Entity::from_raw(99)), None);
    }

    #[test]
    fn get_hides_entities_without_storage() {
        // Given
        let mut entities = Entities::new();
        let entity = entities.alloc();

        // Then
        assert_eq!(entities.get(entity), None);

        // When
        entities.set(entity.index(), placed(3));

        // Then
        assert_eq!(entities.get(entity), Some(placed(3)));
    }

    #[test]
    fn generation_wraps_without_panicking() {
        // Given
        let mut entities = Entities::new();
        let entity = Entity::from_raw_and_generation(0, Generation::MAX);
        entities.alloc_at(entity);

        // When
        entities.free(entity);
        let reused = entities.alloc();

        // Then
        assert_eq!(reused.generation(), Generation::FIRST);
        assert!(!entities.contains(entity));
    }

    #[test]
    fn alloc_at_past_the_end_fills_pending() {
        // Given
        let mut entities = Entities::new();

        // When
        let previous = entities.alloc_at(Entity::from_raw(3));

        // Then
        assert_eq!(previous, None);
        assert_eq!(entities.total_count(), 4);
        assert_eq!(entities.len(), 1);
        let mut reused: Vec<u32> = (0..3).map(|_| entities.alloc().index()).collect();
        reused.sort_unstable();
        assert_eq!(reused, vec![0, 1, 2]);
    }

    #[test]
    fn alloc_at_live_slot_returns_previous_location() {
        // Given
        let mut entities = Entities::new();
        let entity = entities.alloc();
        entities.set(entity.index(), placed(1));

        // When
        let previous =
            entities.alloc_at(Entity::from_raw_and_generation(0, Generation::from_bits(4)));

        // Then
        assert_eq!(previous, Some(placed(1)));
        assert!(!entities.contains(entity));
    }

    #[test]
    fn reserve_uses_freed_slots_then_new_ones() {
        // Given
        let mut entities = Entities::new();
        let a = entities.alloc();
        let _b = entities.alloc();
        entities.free(a);

        // When
        let reserved: Vec<Entity> = entities.reserve_entities(3).collect();

        // Then
        assert_eq!(reserved.len(), 3);
        assert_eq!(reserved[0].index(), a.index());
        assert_eq!(reserved[0].generation(), a.generation().next());
        assert_eq!(reserved[1], Entity::from_raw(2));
        assert_eq!(reserved[2], Entity::from_raw(3));
        assert!(entities.needs_flush());
        assert!(reserved.iter().all(|e| entities.contains(*e)));
    }

    #[test]
    fn consecutive_reservations_do_not_overlap() {
        // Given
        let entities = Entities::new();

        // When
        let first = entities.reserve_entity();
        let batch: Vec<Entity> = entities.reserve_entities(2).collect();
        let last = entities.reserve_entity();

        // Then
        assert_eq!(first.index(), 0);
        assert_eq!(
            batch.iter().map(|e| e.index()).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(last.index(), 3);
    }

    #[test]
    fn flush_materializes_every_reservation_once() {
        // Given
        let mut entities = Entities::new();
        let freed = entities.alloc();
        entities.free(freed);
        let reserved: Vec<Entity> = entities.reserve_entities(3).collect();

        // When
        let mut initialized = Vec::new();
        entities.flush(|entity, location| {
            initialized.push(entity);
            *location = placed(entity.index());
        });

        // Then
        initialized.sort();
        let mut expected = reserved.clone();
        expected.sort();
        assert_eq!(initialized, expected);
        assert!(!entities.needs_flush());
        assert_eq!(entities.len(), 3);
        for entity in reserved {
            assert_eq!(entities.get(entity), Some(placed(entity.index())));
        }
    }

    #[test]
    fn flush_as_invalid_leaves_no_location() {
        // Given
        let mut entities = Entities::new();
        let reserved = entities.reserve_entity();

        // When
        entities.flush_as_invalid();

        // Then
        assert!(entities.contains(reserved));
        assert_eq!(entities.get(reserved), None);
        assert!(!entities.needs_flush());
    }

    #[test]
    #[should_panic(expected = "flush() needs to be called")]
    #[cfg(debug_assertions)]
    fn alloc_before_flush_is_a_logic_error() {
        let mut entities = Entities::new();
        entities.reserve_entity();
        entities.alloc();
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn reused_indices_always_get_newer_generations(
                ops in proptest::collection::vec(any::<bool>(), 1..200)
            ) {
                let mut entities = Entities::new();
                let mut live: Vec<Entity> = Vec::new();
                let mut dead: Vec<Entity> = Vec::new();
                for alloc in ops {
                    if alloc || live.is_empty() {
                        let entity = entities.alloc();
                        for stale in dead.iter().filter(|d| d.index() == entity.index()) {
                            prop_assert!(entity.generation() > stale.generation());
                        }
                        live.push(entity);
                    } else {
                        let entity = live.swap_remove(0);
                        prop_assert!(entities.free(entity).is_some());
                        dead.push(entity);
                    }
                }
                for entity in &dead {
                    prop_assert!(!entities.contains(*entity));
                }
                for entity in &live {
                    prop_assert!(entities.contains(*entity));
                }
                prop_assert_eq!(entities.len() as usize, live.len());
            }
        }
    }
}
