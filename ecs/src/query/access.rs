//! Access descriptions and conflict detection for queries.
//!
//! An [`Access`] records which components and resources something reads or writes. A
//! [`FilteredAccess`] adds the `With`/`Without` filters of a query, and a [`FilteredAccessSet`]
//! collects every query of one system. A scheduler uses these to decide what may run in
//! parallel; nothing here runs anything.
//!
//! # Conflict Detection
//!
//! Two accesses conflict if they cannot be held simultaneously, following Rust's aliasing rules:
//! - Multiple reads of the same component are OK
//! - A write conflicts with any other read or write of the same component
//!
//! ```rust,ignore
//! let mut read_pos = Access::new();
//! read_pos.add_component_read(pos_id);
//! let mut write_pos = Access::new();
//! write_pos.add_component_write(pos_id);
//!
//! assert!(read_pos.is_compatible(&read_pos));
//! assert!(!read_pos.is_compatible(&write_pos));
//! ```
//!
//! # Inverted Sets
//!
//! "Read every component" cannot be listed without knowing every component that will ever
//! exist. Each channel therefore carries an inversion flag: when set, the bitset lists the
//! components that are *not* accessed.
//!
//! | `lhs` writes | `rhs` reads | Compatible when |
//! |--------------|-------------|-----------------|
//! | listed       | listed      | the sets are disjoint |
//! | listed       | inverted    | every `lhs` write is excluded from `rhs` |
//! | inverted     | listed      | every `rhs` read is excluded from `lhs` |
//! | inverted     | inverted    | never |
//!
//! # Filters
//!
//! `Query<&mut A, With<B>>` and `Query<&mut A, Without<B>>` both write `A`, yet no entity can
//! match both. [`FilteredAccess`] keeps its filters in disjunctive normal form, one
//! [`AccessFilters`] per `Or` branch, and treats two accesses as compatible when every pair of
//! branches is ruled out by a `With`/`Without` contradiction.

use std::fmt;

use fixedbitset::FixedBitSet;
use thiserror::Error;

use crate::component::ComponentId;

#[inline]
fn insert(set: &mut FixedBitSet, index: usize) {
    set.grow(index + 1);
    set.insert(index);
}

#[inline]
fn remove(set: &mut FixedBitSet, index: usize) {
    if index < set.len() {
        set.set(index, false);
    }
}

#[inline]
fn is_empty(set: &FixedBitSet) -> bool {
    set.count_ones(..) == 0
}

/// How one component is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentAccessKind {
    /// Only the presence of the component is checked.
    Archetypal(ComponentId),
    /// The component is read.
    Shared(ComponentId),
    /// The component is written.
    Exclusive(ComponentId),
}

impl ComponentAccessKind {
    #[inline]
    pub fn index(&self) -> ComponentId {
        let (Self::Archetypal(id) | Self::Shared(id) | Self::Exclusive(id)) = self;
        *id
    }
}

/// An inverted access cannot be listed one component at a time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error(
    "access is unbounded (writes inverted: {writes_inverted}, reads and writes inverted: {read_and_writes_inverted})"
)]
pub struct UnboundedAccessError {
    /// The write set was inverted.
    pub writes_inverted: bool,
    /// The read-and-write set was inverted.
    pub read_and_writes_inverted: bool,
}

/// The components and resources something reads and writes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Access {
    /// Components read or written. Lists the ones *not* accessed when inverted.
    component_read_and_writes: FixedBitSet,
    /// Components written. Lists the ones *not* written when inverted.
    component_writes: FixedBitSet,
    /// Resources read or written. Lists the ones *not* accessed when inverted.
    resource_read_and_writes: FixedBitSet,
    /// Resources written. Lists the ones *not* written when inverted.
    resource_writes: FixedBitSet,
    component_read_and_writes_inverted: bool,
    component_writes_inverted: bool,
    resource_read_and_writes_inverted: bool,
    resource_writes_inverted: bool,
    /// Components whose presence is checked without reading them.
    archetypal: FixedBitSet,
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |set: &FixedBitSet| set.ones().collect::<Vec<_>>();
        f.debug_struct("Access")
            .field("component_read_and_writes", &ids(&self.component_read_and_writes))
            .field("component_writes", &ids(&self.component_writes))
            .field("resource_read_and_writes", &ids(&self.resource_read_and_writes))
            .field("resource_writes", &ids(&self.resource_writes))
            .field(
                "component_read_and_writes_inverted",
                &self.component_read_and_writes_inverted,
            )
            .field("component_writes_inverted", &self.component_writes_inverted)
            .field(
                "resource_read_and_writes_inverted",
                &self.resource_read_and_writes_inverted,
            )
            .field("resource_writes_inverted", &self.resource_writes_inverted)
            .field("archetypal", &ids(&self.archetypal))
            .finish()
    }
}

impl Access {
    /// An access touching nothing.
    pub const fn new() -> Self {
        Self {
            component_read_and_writes: FixedBitSet::new(),
            component_writes: FixedBitSet::new(),
            resource_read_and_writes: FixedBitSet::new(),
            resource_writes: FixedBitSet::new(),
            component_read_and_writes_inverted: false,
            component_writes_inverted: false,
            resource_read_and_writes_inverted: false,
            resource_writes_inverted: false,
            archetypal: FixedBitSet::new(),
        }
    }

    pub fn add_component_read(&mut self, id: ComponentId) {
        if self.component_read_and_writes_inverted {
            remove(&mut self.component_read_and_writes, id.index());
        } else {
            insert(&mut self.component_read_and_writes, id.index());
        }
    }

    /// Add a write, which implies a read.
    pub fn add_component_write(&mut self, id: ComponentId) {
        self.add_component_read(id);
        if self.component_writes_inverted {
            remove(&mut self.component_writes, id.index());
        } else {
            insert(&mut self.component_writes, id.index());
        }
    }

    pub fn add_resource_read(&mut self, id: ComponentId) {
        if self.resource_read_and_writes_inverted {
            remove(&mut self.resource_read_and_writes, id.index());
        } else {
            insert(&mut self.resource_read_and_writes, id.index());
        }
    }

    /// Add a resource write, which implies a read.
    pub fn add_resource_write(&mut self, id: ComponentId) {
        self.add_resource_read(id);
        if self.resource_writes_inverted {
            remove(&mut self.resource_writes, id.index());
        } else {
            insert(&mut self.resource_writes, id.index());
        }
    }

    /// Record that the presence of `id` is checked.
    ///
    /// Archetypal access never conflicts; it only matters to whoever computes which archetypes
    /// a query can see.
    pub fn add_archetypal(&mut self, id: ComponentId) {
        insert(&mut self.archetypal, id.index());
    }

    /// Drop the read of `id`, and therefore its write.
    pub fn remove_component_read(&mut self, id: ComponentId) {
        if self.component_read_and_writes_inverted {
            insert(&mut self.component_read_and_writes, id.index());
        } else {
            remove(&mut self.component_read_and_writes, id.index());
        }
        self.remove_component_write(id);
    }

    pub fn remove_component_write(&mut self, id: ComponentId) {
        if self.component_writes_inverted {
            insert(&mut self.component_writes, id.index());
        } else {
            remove(&mut self.component_writes, id.index());
        }
    }

    #[inline]
    pub fn has_component_read(&self, id: ComponentId) -> bool {
        self.component_read_and_writes_inverted
            ^ self.component_read_and_writes.contains(id.index())
    }

    #[inline]
    pub fn has_component_write(&self, id: ComponentId) -> bool {
        self.component_writes_inverted ^ self.component_writes.contains(id.index())
    }

    #[inline]
    pub fn has_any_component_read(&self) -> bool {
        self.component_read_and_writes_inverted || !is_empty(&self.component_read_and_writes)
    }

    #[inline]
    pub fn has_any_component_write(&self) -> bool {
        self.component_writes_inverted || !is_empty(&self.component_writes)
    }

    #[inline]
    pub fn has_resource_read(&self, id: ComponentId) -> bool {
        self.resource_read_and_writes_inverted ^ self.resource_read_and_writes.contains(id.index())
    }

    #[inline]
    pub fn has_resource_write(&self, id: ComponentId) -> bool {
        self.resource_writes_inverted ^ self.resource_writes.contains(id.index())
    }

    #[inline]
    pub fn has_any_resource_read(&self) -> bool {
        self.resource_read_and_writes_inverted || !is_empty(&self.resource_read_and_writes)
    }

    #[inline]
    pub fn has_any_resource_write(&self) -> bool {
        self.resource_writes_inverted || !is_empty(&self.resource_writes)
    }

    #[inline]
    pub fn has_archetypal(&self, id: ComponentId) -> bool {
        self.archetypal.contains(id.index())
    }

    /// Read every component.
    pub fn read_all_components(&mut self) {
        self.component_read_and_writes_inverted = true;
        self.component_read_and_writes.clear();
    }

    /// Write every component.
    pub fn write_all_components(&mut self) {
        self.read_all_components();
        self.component_writes_inverted = true;
        self.component_writes.clear();
    }

    /// Read every resource.
    pub fn read_all_resources(&mut self) {
        self.resource_read_and_writes_inverted = true;
        self.resource_read_and_writes.clear();
    }

    /// Write every resource.
    pub fn write_all_resources(&mut self) {
        self.read_all_resources();
        self.resource_writes_inverted = true;
        self.resource_writes.clear();
    }

    /// Read every component and resource.
    pub fn read_all(&mut self) {
        self.read_all_components();
        self.read_all_resources();
    }

    /// Write every component and resource.
    pub fn write_all(&mut self) {
        self.write_all_components();
        self.write_all_resources();
    }

    /// Returns `true` if every component is read, excluding none.
    #[inline]
    pub fn has_read_all_components(&self) -> bool {
        self.component_read_and_writes_inverted && is_empty(&self.component_read_and_writes)
    }

    /// Returns `true` if every component is written, excluding none.
    #[inline]
    pub fn has_write_all_components(&self) -> bool {
        self.component_writes_inverted && is_empty(&self.component_writes)
    }

    #[inline]
    pub fn has_read_all_resources(&self) -> bool {
        self.resource_read_and_writes_inverted && is_empty(&self.resource_read_and_writes)
    }

    #[inline]
    pub fn has_write_all_resources(&self) -> bool {
        self.resource_writes_inverted && is_empty(&self.resource_writes)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Add everything `other` accesses.
    pub fn extend(&mut self, other: &Access) {
        union_channel(
            &mut self.component_read_and_writes,
            &mut self.component_read_and_writes_inverted,
            &other.component_read_and_writes,
            other.component_read_and_writes_inverted,
        );
        union_channel(
            &mut self.component_writes,
            &mut self.component_writes_inverted,
            &other.component_writes,
            other.component_writes_inverted,
        );
        union_channel(
            &mut self.resource_read_and_writes,
            &mut self.resource_read_and_writes_inverted,
            &other.resource_read_and_writes,
            other.resource_read_and_writes_inverted,
        );
        union_channel(
            &mut self.resource_writes,
            &mut self.resource_writes_inverted,
            &other.resource_writes,
            other.resource_writes_inverted,
        );
        self.archetypal.union_with(&other.archetypal);
    }

    /// Returns `true` if the component accesses of both can be held at once.
    pub fn is_components_compatible(&self, other: &Access) -> bool {
        channels_compatible(
            Channel {
                read_and_writes: &self.component_read_and_writes,
                writes: &self.component_writes,
                read_and_writes_inverted: self.component_read_and_writes_inverted,
                writes_inverted: self.component_writes_inverted,
            },
            Channel {
                read_and_writes: &other.component_read_and_writes,
                writes: &other.component_writes,
                read_and_writes_inverted: other.component_read_and_writes_inverted,
                writes_inverted: other.component_writes_inverted,
            },
        )
    }

    /// Returns `true` if the resource accesses of both can be held at once.
    pub fn is_resources_compatible(&self, other: &Access) -> bool {
        channels_compatible(self.resource_channel(), other.resource_channel())
    }

    /// Returns `true` if both can be held at once.
    pub fn is_compatible(&self, other: &Access) -> bool {
        self.is_components_compatible(other) && self.is_resources_compatible(other)
    }

    /// Returns `true` if everything `self` accesses is also accessed by `other`, with at least
    /// the same kind.
    pub fn is_subset(&self, other: &Access) -> bool {
        channel_is_subset(self.component_channel(), other.component_channel())
            && channel_is_subset(self.resource_channel(), other.resource_channel())
    }

    /// What makes the two incompatible.
    pub fn get_conflicts(&self, other: &Access) -> AccessConflicts {
        let mut conflicts = FixedBitSet::new();
        for (lhs, rhs) in [
            (self.component_channel(), other.component_channel()),
            (self.resource_channel(), other.resource_channel()),
        ] {
            if !collect_conflicts(lhs, rhs, &mut conflicts) {
                return AccessConflicts::All;
            }
        }
        AccessConflicts::Individual(conflicts)
    }

    /// Every component accessed, with the kind of access.
    ///
    /// Fails when the access is inverted.
    pub fn try_iter_component_access(
        &self,
    ) -> Result<impl Iterator<Item = ComponentAccessKind> + '_, UnboundedAccessError> {
        if self.component_writes_inverted || self.component_read_and_writes_inverted {
            return Err(UnboundedAccessError {
                writes_inverted: self.component_writes_inverted,
                read_and_writes_inverted: self.component_read_and_writes_inverted,
            });
        }

        let archetypal = self
            .archetypal
            .ones()
            .filter(|&index| !self.component_read_and_writes.contains(index))
            .map(|index| ComponentAccessKind::Archetypal(ComponentId::new(index)));
        let read_and_writes = self.component_read_and_writes.ones().map(|index| {
            let id = ComponentId::new(index);
            if self.component_writes.contains(index) {
                ComponentAccessKind::Exclusive(id)
            } else {
                ComponentAccessKind::Shared(id)
            }
        });
        Ok(archetypal.chain(read_and_writes))
    }

    fn component_channel(&self) -> Channel<'_> {
        Channel {
            read_and_writes: &self.component_read_and_writes,
            writes: &self.component_writes,
            read_and_writes_inverted: self.component_read_and_writes_inverted,
            writes_inverted: self.component_writes_inverted,
        }
    }

    fn resource_channel(&self) -> Channel<'_> {
        Channel {
            read_and_writes: &self.resource_read_and_writes,
            writes: &self.resource_writes,
            read_and_writes_inverted: self.resource_read_and_writes_inverted,
            writes_inverted: self.resource_writes_inverted,
        }
    }
}

/// One of the two access channels, components or resources.
#[derive(Clone, Copy)]
struct Channel<'a> {
    read_and_writes: &'a FixedBitSet,
    writes: &'a FixedBitSet,
    read_and_writes_inverted: bool,
    writes_inverted: bool,
}

fn union_channel(
    set: &mut FixedBitSet,
    inverted: &mut bool,
    other: &FixedBitSet,
    other_inverted: bool,
) {
    match (*inverted, other_inverted) {
        // Both exclusion lists: only what both exclude stays excluded.
        (true, true) => set.intersect_with(other),
        // Our exclusions minus what the other includes.
        (true, false) => set.difference_with(other),
        // The other's exclusions minus what we include.
        (false, true) => {
            let mut excluded = other.clone();
            excluded.difference_with(set);
            *set = excluded;
            *inverted = true;
        }
        (false, false) => set.union_with(other),
    }
}

/// The writes of each side against the reads of the other, in both directions.
fn write_read_pairs<'a>(lhs: Channel<'a>, rhs: Channel<'a>) -> [(Channel<'a>, Channel<'a>); 2] {
    [(lhs, rhs), (rhs, lhs)]
}

fn channels_compatible(lhs: Channel<'_>, rhs: Channel<'_>) -> bool {
    write_read_pairs(lhs, rhs).into_iter().all(|(writer, reader)| {
        match (writer.writes_inverted, reader.read_and_writes_inverted) {
            (true, true) => false,
            (false, true) => writer.writes.is_subset(reader.read_and_writes),
            (true, false) => reader.read_and_writes.is_subset(writer.writes),
            (false, false) => writer.writes.is_disjoint(reader.read_and_writes),
        }
    })
}

/// Adds the conflicting indices to `conflicts`. Returns `false` if everything conflicts.
fn collect_conflicts(lhs: Channel<'_>, rhs: Channel<'_>, conflicts: &mut FixedBitSet) -> bool {
    for (writer, reader) in write_read_pairs(lhs, rhs) {
        match (writer.writes_inverted, reader.read_and_writes_inverted) {
            (true, true) => return false,
            (false, true) => conflicts.extend(writer.writes.difference(reader.read_and_writes)),
            (true, false) => conflicts.extend(reader.read_and_writes.difference(writer.writes)),
            (false, false) => conflicts.extend(writer.writes.intersection(reader.read_and_writes)),
        }
    }
    true
}

fn channel_is_subset(ours: Channel<'_>, theirs: Channel<'_>) -> bool {
    let pairs = [
        (
            ours.read_and_writes,
            ours.read_and_writes_inverted,
            theirs.read_and_writes,
            theirs.read_and_writes_inverted,
        ),
        (
            ours.writes,
            ours.writes_inverted,
            theirs.writes,
            theirs.writes_inverted,
        ),
    ];
    pairs
        .into_iter()
        .all(|(ours, ours_inverted, theirs, theirs_inverted)| {
            match (ours_inverted, theirs_inverted) {
                // Everything but A within everything but B: B must be excluded by us too.
                (true, true) => theirs.is_subset(ours),
                (true, false) => false,
                (false, true) => ours.is_disjoint(theirs),
                (false, false) => ours.is_subset(theirs),
            }
        })
}

/// The result of [`Access::get_conflicts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessConflicts {
    /// Everything conflicts; the two can never run side by side.
    All,
    /// Only these component or resource indices conflict.
    Individual(FixedBitSet),
}

impl AccessConflicts {
    /// No conflicts.
    pub const fn empty() -> Self {
        Self::Individual(FixedBitSet::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::All => false,
            Self::Individual(set) => is_empty(set),
        }
    }

    /// Merge `other` into `self`.
    pub fn add(&mut self, other: &Self) {
        match (self, other) {
            (s, Self::All) => *s = Self::All,
            (Self::Individual(this), Self::Individual(other)) => this.extend(other.ones()),
            _ => {}
        }
    }

    /// The conflicting ids, or `None` for [`AccessConflicts::All`].
    pub fn ids(&self) -> Option<Vec<ComponentId>> {
        match self {
            Self::All => None,
            Self::Individual(set) => Some(set.ones().map(ComponentId::new).collect()),
        }
    }
}

impl From<Vec<ComponentId>> for AccessConflicts {
    fn from(ids: Vec<ComponentId>) -> Self {
        let mut set = FixedBitSet::new();
        for id in ids {
            insert(&mut set, id.index());
        }
        Self::Individual(set)
    }
}

/// One conjunction of filters: components an entity must have, and must not have.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessFilters {
    pub(crate) with: FixedBitSet,
    pub(crate) without: FixedBitSet,
}

impl AccessFilters {
    /// Returns `true` if no entity can pass both `self` and `other`.
    pub fn is_ruled_out_by(&self, other: &Self) -> bool {
        !self.with.is_disjoint(&other.without) || !self.without.is_disjoint(&other.with)
    }

    pub fn with(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.with.ones().map(ComponentId::new)
    }

    pub fn without(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.without.ones().map(ComponentId::new)
    }
}

/// An [`Access`] plus the filters limiting which entities it applies to.
///
/// `filter_sets` is a disjunction: an entity is seen if it passes any of them. An empty list
/// matches nothing, a list with one empty [`AccessFilters`] matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredAccess {
    pub(crate) access: Access,
    pub(crate) required: FixedBitSet,
    pub(crate) filter_sets: Vec<AccessFilters>,
}

impl Default for FilteredAccess {
    fn default() -> Self {
        Self::matches_everything()
    }
}

impl From<FilteredAccess> for FilteredAccessSet {
    fn from(filtered_access: FilteredAccess) -> Self {
        let mut set = FilteredAccessSet::new();
        set.add(filtered_access);
        set
    }
}

impl FilteredAccess {
    /// No access, no filters.
    pub fn matches_everything() -> Self {
        Self {
            access: Access::new(),
            required: FixedBitSet::new(),
            filter_sets: vec![AccessFilters::default()],
        }
    }

    /// No access, and no entity passes.
    pub fn matches_nothing() -> Self {
        Self {
            access: Access::new(),
            required: FixedBitSet::new(),
            filter_sets: Vec::new(),
        }
    }

    #[inline]
    pub fn access(&self) -> &Access {
        &self.access
    }

    #[inline]
    pub fn access_mut(&mut self) -> &mut Access {
        &mut self.access
    }

    /// Components an entity must have to be seen at all.
    pub fn required(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.required.ones().map(ComponentId::new)
    }

    /// The `Or` branches of the filters.
    #[inline]
    pub fn filter_sets(&self) -> &[AccessFilters] {
        &self.filter_sets
    }

    /// Read `id`, which also requires it.
    pub fn add_component_read(&mut self, id: ComponentId) {
        self.access.add_component_read(id);
        self.add_required(id);
        self.and_with(id);
    }

    /// Write `id`, which also requires it.
    pub fn add_component_write(&mut self, id: ComponentId) {
        self.access.add_component_write(id);
        self.add_required(id);
        self.and_with(id);
    }

    pub fn add_resource_read(&mut self, id: ComponentId) {
        self.access.add_resource_read(id);
    }

    pub fn add_resource_write(&mut self, id: ComponentId) {
        self.access.add_resource_write(id);
    }

    pub fn add_required(&mut self, id: ComponentId) {
        insert(&mut self.required, id.index());
    }

    /// Require `id` in every `Or` branch.
    pub fn and_with(&mut self, id: ComponentId) {
        for filter in &mut self.filter_sets {
            insert(&mut filter.with, id.index());
        }
    }

    /// Forbid `id` in every `Or` branch.
    pub fn and_without(&mut self, id: ComponentId) {
        for filter in &mut self.filter_sets {
            insert(&mut filter.without, id.index());
        }
    }

    /// Add the branches of `other` as alternatives.
    pub fn append_or(&mut self, other: &FilteredAccess) {
        self.filter_sets.extend(other.filter_sets.iter().cloned());
    }

    /// Add the access of `other`, leaving filters and requirements alone.
    pub fn extend_access(&mut self, other: &FilteredAccess) {
        self.access.extend(&other.access);
    }

    /// Combine with `other` as a conjunction: accesses and requirements merge, and every pair
    /// of branches becomes one branch.
    pub fn extend(&mut self, other: &FilteredAccess) {
        self.access.extend(&other.access);
        self.required.union_with(&other.required);

        // (A | B) & (C | D) = AC | AD | BC | BD
        let mut filter_sets = Vec::with_capacity(self.filter_sets.len() * other.filter_sets.len());
        for ours in &self.filter_sets {
            for theirs in &other.filter_sets {
                let mut combined = ours.clone();
                combined.with.union_with(&theirs.with);
                combined.without.union_with(&theirs.without);
                filter_sets.push(combined);
            }
        }
        self.filter_sets = filter_sets;
    }

    /// Read every component and resource.
    pub fn read_all(&mut self) {
        self.access.read_all();
    }

    /// Write every component and resource.
    pub fn write_all(&mut self) {
        self.access.write_all();
    }

    /// Read every component.
    pub fn read_all_components(&mut self) {
        self.access.read_all_components();
    }

    /// Write every component.
    pub fn write_all_components(&mut self) {
        self.access.write_all_components();
    }

    /// Returns `true` if both can be held at once, either because their accesses do not
    /// overlap or because their filters prove no entity is seen by both.
    pub fn is_compatible(&self, other: &FilteredAccess) -> bool {
        if !self.access.is_resources_compatible(&other.access) {
            return false;
        }
        if self.access.is_components_compatible(&other.access) {
            return true;
        }
        self.filter_sets.iter().all(|filter| {
            other
                .filter_sets
                .iter()
                .all(|other_filter| filter.is_ruled_out_by(other_filter))
        })
    }

    /// What makes the two incompatible.
    pub fn get_conflicts(&self, other: &FilteredAccess) -> AccessConflicts {
        if self.is_compatible(other) {
            AccessConflicts::empty()
        } else {
            self.access.get_conflicts(&other.access)
        }
    }

    /// Returns `true` if `self` never accesses more than `other`, and is filtered at least as
    /// narrowly.
    pub fn is_subset(&self, other: &FilteredAccess) -> bool {
        self.required.is_superset(&other.required) && self.access.is_subset(&other.access)
    }
}

/// Every access of one system: its queries and its unfiltered resource accesses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteredAccessSet {
    combined_access: Access,
    filtered_accesses: Vec<FilteredAccess>,
}

impl FilteredAccessSet {
    pub const fn new() -> Self {
        Self {
            combined_access: Access::new(),
            filtered_accesses: Vec::new(),
        }
    }

    /// The union of every access in the set, filters ignored.
    #[inline]
    pub fn combined_access(&self) -> &Access {
        &self.combined_access
    }

    #[inline]
    pub fn filtered_accesses(&self) -> &[FilteredAccess] {
        &self.filtered_accesses
    }

    /// Returns `true` if the two sets can be held at once.
    ///
    /// The combined accesses are compared first; only when they clash are the individual
    /// filtered accesses compared pairwise.
    pub fn is_compatible(&self, other: &FilteredAccessSet) -> bool {
        if self.combined_access.is_compatible(&other.combined_access) {
            return true;
        }
        self.filtered_accesses.iter().all(|filtered| {
            other
                .filtered_accesses
                .iter()
                .all(|other_filtered| filtered.is_compatible(other_filtered))
        })
    }

    /// What makes the two sets incompatible.
    pub fn get_conflicts(&self, other: &FilteredAccessSet) -> AccessConflicts {
        let mut conflicts = AccessConflicts::empty();
        if !self.combined_access.is_compatible(&other.combined_access) {
            for filtered in &self.filtered_accesses {
                for other_filtered in &other.filtered_accesses {
                    conflicts.add(&filtered.get_conflicts(other_filtered));
                }
            }
        }
        conflicts
    }

    /// What makes `filtered_access` incompatible with the set.
    pub fn get_conflicts_single(&self, filtered_access: &FilteredAccess) -> AccessConflicts {
        let mut conflicts = AccessConflicts::empty();
        if !self.combined_access.is_compatible(filtered_access.access()) {
            for filtered in &self.filtered_accesses {
                conflicts.add(&filtered.get_conflicts(filtered_access));
            }
        }
        conflicts
    }

    pub fn add(&mut self, filtered_access: FilteredAccess) {
        self.combined_access.extend(&filtered_access.access);
        self.filtered_accesses.push(filtered_access);
    }

    /// Read a resource outside of any query.
    pub fn add_unfiltered_resource_read(&mut self, id: ComponentId) {
        let mut filter = FilteredAccess::default();
        filter.add_resource_read(id);
        self.add(filter);
    }

    /// Write a resource outside of any query.
    pub fn add_unfiltered_resource_write(&mut self, id: ComponentId) {
        let mut filter = FilteredAccess::default();
        filter.add_resource_write(id);
        self.add(filter);
    }

    pub fn extend(&mut self, filtered_access_set: FilteredAccessSet) {
        self.combined_access
            .extend(&filtered_access_set.combined_access);
        self.filtered_accesses
            .extend(filtered_access_set.filtered_accesses);
    }

    /// Access the whole world, shared.
    pub fn read_all(&mut self) {
        let mut filter = FilteredAccess::matches_everything();
        filter.read_all();
        self.add(filter);
    }

    /// Access the whole world, exclusively.
    pub fn write_all(&mut self) {
        let mut filter = FilteredAccess::matches_everything();
        filter.write_all();
        self.add(filter);
    }

    pub fn clear(&mut self) {
        self.combined_access.clear();
        self.filtered_accesses.clear();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn id(index: usize) -> ComponentId {
        ComponentId::new(index)
    }

    fn reads(ids: &[usize]) -> Access {
        let mut access = Access::new();
        for &index in ids {
            access.add_component_read(id(index));
        }
        access
    }

    fn writes(ids: &[usize]) -> Access {
        let mut access = Access::new();
        for &index in ids {
            access.add_component_write(id(index));
        }
        access
    }

    #[test]
    fn reads_are_compatible() {
        // Given
        let lhs = reads(&[0, 1]);
        let rhs = reads(&[1, 2]);

        // Then
        assert!(lhs.is_compatible(&rhs));
        assert!(lhs.get_conflicts(&rhs).is_empty());
    }

    #[test]
    fn write_conflicts_with_read() {
        // Given
        let lhs = writes(&[1]);
        let rhs = reads(&[1, 2]);

        // When
        let conflicts = lhs.get_conflicts(&rhs);

        // Then
        assert!(!lhs.is_compatible(&rhs));
        assert_eq!(conflicts.ids(), Some(vec![id(1)]));
    }

    #[test]
    fn write_implies_read() {
        // Given
        let access = writes(&[3]);

        // Then
        assert!(access.has_component_read(id(3)));
        assert!(access.has_component_write(id(3)));
        assert!(!access.has_component_read(id(2)));
    }

    #[test]
    fn read_all_excludes_removed_reads() {
        // Given
        let mut access = Access::new();
        access.read_all_components();

        // When
        access.remove_component_read(id(4));

        // Then
        assert!(access.has_component_read(id(0)));
        assert!(!access.has_component_read(id(4)));
        assert!(!access.has_read_all_components());
    }

    #[test]
    fn read_all_conflicts_with_any_write() {
        // Given
        let mut everything = Access::new();
        everything.read_all_components();

        // Then
        assert!(!everything.is_compatible(&writes(&[7])));
        assert!(everything.is_compatible(&reads(&[7])));
        assert_eq!(everything.get_conflicts(&writes(&[7])).ids(), Some(vec![id(7)]));
    }

    #[test]
    fn inverted_read_compatible_with_excluded_write() {
        // Given
        let mut all_but_one = Access::new();
        all_but_one.read_all_components();
        all_but_one.remove_component_read(id(2));

        // Then
        assert!(all_but_one.is_compatible(&writes(&[2])));
        assert!(!all_but_one.is_compatible(&writes(&[2, 3])));
    }

    #[test]
    fn two_inverted_writers_conflict_entirely() {
        // Given
        let mut lhs = Access::new();
        lhs.write_all_components();
        let mut rhs = Access::new();
        rhs.read_all_components();

        // Then
        assert!(!lhs.is_compatible(&rhs));
        assert_eq!(lhs.get_conflicts(&rhs), AccessConflicts::All);
    }

    #[test]
    fn resources_are_checked_independently() {
        // Given
        let mut lhs = Access::new();
        lhs.add_resource_write(id(0));
        let mut rhs = Access::new();
        rhs.add_component_write(id(0));

        // Then
        assert!(lhs.is_compatible(&rhs));
        rhs.add_resource_read(id(0));
        assert!(!lhs.is_compatible(&rhs));
    }

    #[test]
    fn iterate_bounded_access() {
        // Given
        let mut access = writes(&[1]);
        access.add_component_read(id(0));
        access.add_archetypal(id(5));

        // When
        let kinds: Vec<_> = access.try_iter_component_access().unwrap().collect();

        // Then
        assert_eq!(
            kinds,
            vec![
                ComponentAccessKind::Archetypal(id(5)),
                ComponentAccessKind::Shared(id(0)),
                ComponentAccessKind::Exclusive(id(1)),
            ]
        );
    }

    #[test]
    fn iterate_inverted_access_fails() {
        // Given
        let mut access = Access::new();
        access.read_all_components();

        // When
        let result = access.try_iter_component_access().map(|kinds| kinds.count());

        // Then
        assert_eq!(
            result,
            Err(UnboundedAccessError {
                writes_inverted: false,
                read_and_writes_inverted: true,
            })
        );
    }

    #[test]
    fn extend_merges_inverted_sets() {
        // Given
        let mut all_but_two = Access::new();
        all_but_two.read_all_components();
        all_but_two.remove_component_read(id(2));
        all_but_two.remove_component_read(id(3));

        // When
        all_but_two.extend(&reads(&[2]));

        // Then
        assert!(all_but_two.has_component_read(id(2)));
        assert!(!all_but_two.has_component_read(id(3)));
    }

    #[test]
    fn subset_checks_kind() {
        // Given
        let read = reads(&[1]);
        let write = writes(&[1]);
        let mut everything = Access::new();
        everything.write_all_components();

        // Then
        assert!(read.is_subset(&write));
        assert!(!write.is_subset(&read));
        assert!(write.is_subset(&everything));
        assert!(!everything.is_subset(&write));
    }

    #[test]
    fn with_and_without_filters_rule_each_other_out() {
        // Given
        let mut with_b = FilteredAccess::default();
        with_b.add_component_write(id(0));
        with_b.and_with(id(1));
        let mut without_b = FilteredAccess::default();
        without_b.add_component_write(id(0));
        without_b.and_without(id(1));

        // Then
        assert!(with_b.is_compatible(&without_b));
        assert!(with_b.get_conflicts(&without_b).is_empty());
    }

    #[test]
    fn unfiltered_writers_conflict() {
        // Given
        let mut lhs = FilteredAccess::default();
        lhs.add_component_write(id(0));
        let mut rhs = FilteredAccess::default();
        rhs.add_component_read(id(0));
        rhs.and_with(id(1));

        // Then
        assert!(!lhs.is_compatible(&rhs));
        assert_eq!(lhs.get_conflicts(&rhs).ids(), Some(vec![id(0)]));
    }

    #[test]
    fn or_branch_without_contradiction_conflicts() {
        // Given
        let mut with_b = FilteredAccess::default();
        with_b.add_component_write(id(0));
        with_b.and_with(id(1));

        let mut either = FilteredAccess::matches_nothing();
        let mut branch_without = FilteredAccess::default();
        branch_without.add_component_write(id(0));
        branch_without.and_without(id(1));
        let mut branch_with_c = FilteredAccess::default();
        branch_with_c.add_component_write(id(0));
        branch_with_c.and_with(id(2));
        either.append_or(&branch_without);
        either.append_or(&branch_with_c);
        either.extend_access(&branch_without);

        // Then
        assert!(!with_b.is_compatible(&either));
    }

    #[test]
    fn extend_takes_cartesian_product_of_branches() {
        // Given
        let mut lhs = FilteredAccess::matches_nothing();
        let mut a = FilteredAccess::default();
        a.and_with(id(0));
        let mut b = FilteredAccess::default();
        b.and_with(id(1));
        lhs.append_or(&a);
        lhs.append_or(&b);
        let mut rhs = FilteredAccess::default();
        rhs.and_without(id(2));

        // When
        lhs.extend(&rhs);

        // Then
        assert_eq!(lhs.filter_sets().len(), 2);
        for filter in lhs.filter_sets() {
            assert_eq!(filter.without().collect::<Vec<_>>(), vec![id(2)]);
        }
    }

    #[test]
    fn access_set_checks_pairs_when_combined_clash() {
        // Given
        let mut with_b = FilteredAccess::default();
        with_b.add_component_write(id(0));
        with_b.and_with(id(1));
        let mut without_b = FilteredAccess::default();
        without_b.add_component_write(id(0));
        without_b.and_without(id(1));
        let lhs = FilteredAccessSet::from(with_b);
        let mut rhs = FilteredAccessSet::from(without_b);

        // Then
        assert!(lhs.is_compatible(&rhs));
        rhs.add_unfiltered_resource_write(id(9));
        assert!(lhs.is_compatible(&rhs));
        rhs.write_all();
        assert!(!lhs.is_compatible(&rhs));
        assert_eq!(lhs.get_conflicts(&rhs).ids(), Some(vec![id(0)]));
    }

    #[test]
    fn single_conflicts_against_set() {
        // Given
        let mut set = FilteredAccessSet::new();
        set.add_unfiltered_resource_write(id(4));
        let mut reader = FilteredAccess::default();
        reader.add_resource_read(id(4));

        // When
        let conflicts = set.get_conflicts_single(&reader);

        // Then
        assert_eq!(conflicts.ids(), Some(vec![id(4)]));
    }

    fn arbitrary_access() -> impl Strategy<Value = Access> {
        (
            prop::collection::vec(0usize..16, 0..6),
            prop::collection::vec(0usize..16, 0..6),
            prop::collection::vec(0usize..16, 0..6),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(read_ids, write_ids, removed, read_all, write_all)| {
                let mut access = Access::new();
                if write_all {
                    access.write_all_components();
                } else if read_all {
                    access.read_all_components();
                }
                for index in read_ids {
                    access.add_component_read(id(index));
                }
                for index in write_ids {
                    access.add_component_write(id(index));
                }
                for index in removed {
                    access.remove_component_write(id(index));
                }
                access
            })
    }

    proptest! {
        #[test]
        fn compatibility_is_symmetric(lhs in arbitrary_access(), rhs in arbitrary_access()) {
            prop_assert_eq!(lhs.is_compatible(&rhs), rhs.is_compatible(&lhs));
        }

        #[test]
        fn conflicts_agree_with_compatibility(lhs in arbitrary_access(), rhs in arbitrary_access()) {
            prop_assert_eq!(lhs.is_compatible(&rhs), lhs.get_conflicts(&rhs).is_empty());
        }
    }
}
