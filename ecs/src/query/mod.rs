//! Queries over the entities of a [`World`](crate::world::World).
//!
//! A query is described by two type parameters:
//!
//! - `D: QueryData` is what each matched entity yields: `&T`, `&mut T`, `Ref<T>`, `Entity`,
//!   `EntityRef`, `Option<D>`, `Has<T>` and tuples of these.
//! - `F: QueryFilter` narrows the entities seen: `With<T>`, `Without<T>`, `Added<T>`,
//!   `Changed<T>`, `Or<(..)>` and tuples of these.
//!
//! Both describe the components they touch as a [`FilteredAccess`]. A query whose own data
//! aliases itself (`(&mut A, &A)`) is rejected when its [`QueryState`] is built, and two
//! accesses can be compared with [`FilteredAccess::is_compatible`] to decide whether they may
//! run side by side.
//!
//! ```rust,ignore
//! let mut query = world.query_filtered::<(Entity, &mut Position), Without<Frozen>>();
//! for (entity, mut position) in query.iter_mut(&mut world) {
//!     position.x += 1.0;
//! }
//! ```

mod access;
mod fetch;
mod filter;
mod state;

pub use access::{
    Access, AccessConflicts, AccessFilters, ComponentAccessKind, FilteredAccess,
    FilteredAccessSet, UnboundedAccessError,
};
pub use fetch::{Has, QueryData, ReadOnlyQueryData, UnsafeWorldCell};
pub use filter::{Added, Changed, Or, QueryFilter, With, Without};
pub use state::{QueryIter, QueryState};
