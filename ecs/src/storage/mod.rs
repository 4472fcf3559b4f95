//! Columnar and sparse storage for component and resource data.
//!
//! Storage is split by [`StorageType`](crate::component::StorageType):
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  World                                                          │
//! │  - Entities, Components, Archetypes, Bundles                    │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │
//! ┌────────────────────────────▼────────────────────────────────────┐
//! │  Storages (this module)                                         │
//! └────────┬───────────────────┬───────────────────┬────────────────┘
//!          │                   │                   │
//! ┌────────▼────────┐ ┌────────▼────────┐ ┌────────▼───────┐
//! │  Tables         │ │  SparseSets     │ │  Resources     │
//! │  - one per set  │ │  - one per      │ │  - one slot    │
//! │    of table     │ │    sparse       │ │    per         │
//! │    components   │ │    component    │ │    resource    │
//! └───────┬─────────┘ └───────┬─────────┘ └────────────────┘
//!         │                   │
//!         └─────────┬─────────┘
//!          ┌────────▼─────────┐
//!          │  Column          │
//!          │  - Vec<T> values │
//!          │  - added ticks   │
//!          │  - changed ticks │
//!          └──────────────────┘
//! ```
//!
//! ## Tables
//!
//! Table components live in a [`Table`] with one [`Column`] per component. Every column shares
//! the table's row index, so the values of one entity sit at the same [`TableRow`] of every
//! column:
//!
//! ```text
//! Entities:        [E1,          E2,          E3         ]
//! Position Column: [Pos{x:1,y:2}, Pos{x:3,y:4}, Pos{x:5,y:6}]
//! Velocity Column: [Vel{1,0},    Vel{0,1},    Vel{1,1}   ]
//! ```
//!
//! Several archetypes can share one table when they differ only in sparse set components.
//!
//! ## Swap remove
//!
//! Removing a row moves the last row into the hole, keeping every column packed. The entity that
//! moved is returned so its [`EntityLocation`](crate::entity::EntityLocation) can be fixed:
//!
//! ```text
//! Before removing row 1:  [E1, E2, E3]
//! After:                  [E1, E3]      ← E3 moved from row 2 to row 1
//! ```
//!
//! ## Sparse sets
//!
//! Sparse set components are stored per component in a [`ComponentSparseSet`] keyed by entity
//! index. Adding or removing them never moves table data.

mod column;
mod resource;
mod row;
mod sparse_set;
mod table;

pub use column::{Column, ValueVec};
pub use resource::{ResourceData, Resources};
pub use row::TableRow;
pub use sparse_set::{ComponentSparseSet, SparseArray, SparseSet, SparseSetIndex, SparseSets};
pub use table::{Table, TableId, TableMoveResult, Tables};

use std::any::Any;

use crate::{
    change_detection::{CheckChangeTicks, ComponentTicks, Tick},
    component::{ComponentId, StorageType},
    entity::{Entity, EntityLocation},
};

/// All component and resource storage of a world.
#[derive(Debug, Default)]
pub struct Storages {
    /// Dense storage for table components.
    pub tables: Tables,
    /// Storage for sparse set components.
    pub sparse_sets: SparseSets,
    /// Resource slots.
    pub resources: Resources,
}

impl Storages {
    /// The value and ticks of one component of `entity`, wherever it is stored.
    pub(crate) fn get_with_ticks<T: 'static>(
        &self,
        component_id: ComponentId,
        storage_type: StorageType,
        entity: Entity,
        location: EntityLocation,
    ) -> Option<(&T, &Tick, &Tick)> {
        match storage_type {
            StorageType::Table => self
                .tables
                .get(location.table_id)?
                .get_column(component_id)?
                .get_with_ticks(location.table_row),
            StorageType::SparseSet => self.sparse_sets.get(component_id)?.get_with_ticks(entity),
        }
    }

    /// Mutable variant of [`Storages::get_with_ticks`].
    pub(crate) fn get_with_ticks_mut<T: 'static>(
        &mut self,
        component_id: ComponentId,
        storage_type: StorageType,
        entity: Entity,
        location: EntityLocation,
    ) -> Option<(&mut T, &mut Tick, &mut Tick)> {
        match storage_type {
            StorageType::Table => self
                .tables
                .get_mut(location.table_id)?
                .get_column_mut(component_id)?
                .get_with_ticks_mut(location.table_row),
            StorageType::SparseSet => self
                .sparse_sets
                .get_mut(component_id)?
                .get_with_ticks_mut(entity),
        }
    }

    /// The type-erased value and ticks of one component of `entity`.
    pub(crate) fn get_any_with_ticks(
        &self,
        component_id: ComponentId,
        storage_type: StorageType,
        entity: Entity,
        location: EntityLocation,
    ) -> Option<(&dyn Any, ComponentTicks)> {
        match storage_type {
            StorageType::Table => {
                let column = self.tables.get(location.table_id)?.get_column(component_id)?;
                Some((
                    column.get_any(location.table_row)?,
                    column.get_ticks(location.table_row)?,
                ))
            }
            StorageType::SparseSet => {
                let set = self.sparse_sets.get(component_id)?;
                Some((set.get_any(entity)?, set.get_ticks(entity)?))
            }
        }
    }

    /// The ticks of one component of `entity`.
    pub(crate) fn get_ticks(
        &self,
        component_id: ComponentId,
        storage_type: StorageType,
        entity: Entity,
        location: EntityLocation,
    ) -> Option<ComponentTicks> {
        match storage_type {
            StorageType::Table => self
                .tables
                .get(location.table_id)?
                .get_column(component_id)?
                .get_ticks(location.table_row),
            StorageType::SparseSet => self.sparse_sets.get(component_id)?.get_ticks(entity),
        }
    }

    /// Clamp every stored tick older than [`MAX_CHANGE_AGE`](crate::change_detection::MAX_CHANGE_AGE).
    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        self.tables.check_change_ticks(check);
        self.sparse_sets.check_change_ticks(check);
        self.resources.check_change_ticks(check);
    }
}
