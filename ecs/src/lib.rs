//! Archetype based entity component storage.
//!
//! The crate is split into the same layers the data flows through:
//!
//! - [`entity`]: generational entity ids and their storage locations.
//! - [`component`]: component metadata, id assignment and required components.
//! - [`storage`]: dense tables, sparse sets and resources.
//! - [`archetype`]: component signatures and the transition edge cache.
//! - [`bundle`]: spawning, inserting and removing groups of components.
//! - [`change_detection`]: added/changed ticks and the smart pointers that stamp them.
//! - [`query`]: query data, filters, cached query state and the access model behind them.
//! - [`world`]: the aggregate that owns all of the above.
//!
//! # Example
//!
//! ```rust,ignore
//! use rusty_ecs::prelude::*;
//!
//! #[derive(Component, Default)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! #[require(Position)]
//! struct Player;
//!
//! let mut world = World::new();
//! let player = world.spawn(Player);
//! assert!(world.get::<Position>(player).is_some());
//! ```

extern crate self as rusty_ecs;

#[macro_use]
mod util;

pub mod archetype;
pub mod bundle;
pub mod change_detection;
pub mod component;
pub mod entity;
pub mod observer;
pub mod query;
pub mod resource;
pub mod storage;
pub mod world;

pub use rusty_ecs_macros::{Component, Resource};

/// Most commonly used types.
pub mod prelude {
    pub use crate::bundle::{Bundle, InsertMode};
    pub use crate::change_detection::{DetectChanges, DetectChangesMut, Mut, Ref, Res, ResMut};
    pub use crate::component::{Component, ComponentId, Immutable, Mutable, StorageType};
    pub use crate::entity::Entity;
    pub use crate::observer::LifecycleEvent;
    pub use crate::query::{Added, Changed, Has, Or, QueryState, With, Without};
    pub use crate::resource::Resource;
    pub use crate::world::{DeferredWorld, EntityRef, World};
    pub use rusty_ecs_macros::{Component, Resource};
}
