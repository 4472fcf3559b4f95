use crate::{
    archetype::{ArchetypeId, ArchetypeRow},
    storage::{TableId, TableRow},
};

/// The address of an entity's data inside the world.
///
/// An entity lives at one row of one [`Archetype`](crate::archetype::Archetype) and one row of
/// that archetype's [`Table`](crate::storage::Table). Both rows are recorded because several
/// archetypes may share a single table when they only differ in sparse set components.
///
/// The location is owned by [`Entities`](super::Entities) and must be rewritten every time the
/// entity's data moves (swap-removes included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// The archetype the entity belongs to.
    pub archetype_id: ArchetypeId,

    /// The entity's row inside the archetype's entity list.
    pub archetype_row: ArchetypeRow,

    /// The table holding the entity's table stored components.
    pub table_id: TableId,

    /// The entity's row inside that table.
    pub table_row: TableRow,
}

impl EntityLocation {
    /// Location of an entity that is allocated but has no storage yet.
    pub(crate) const INVALID: EntityLocation = EntityLocation {
        archetype_id: ArchetypeId::INVALID,
        archetype_row: ArchetypeRow::INVALID,
        table_id: TableId::INVALID,
        table_row: TableRow::INVALID,
    };

    /// Returns `true` if the location points at real storage.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.archetype_id != ArchetypeId::INVALID
    }
}

impl Default for EntityLocation {
    fn default() -> Self {
        Self::INVALID
    }
}
