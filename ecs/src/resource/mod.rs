//! Resources: singleton values stored once per world.
//!
//! # Resource vs Component
//!
//! | Aspect | Resource | Component |
//! |--------|----------|-----------|
//! | Cardinality | One per type per world | Many per type (one per entity) |
//! | Access | Direct by type | Query over matching entities |
//! | Use case | Global state, services | Entity-specific data |
//!
//! # Example
//!
//! ```rust,ignore
//! use rusty_ecs::prelude::*;
//!
//! #[derive(Resource, Default)]
//! struct Score(u32);
//!
//! let mut world = World::new();
//! world.insert_resource(Score(0));
//!
//! world.resource_mut::<Score>().0 += 10;
//! assert!(world.resource_ref::<Score>().is_changed());
//! ```

/// A trait for singleton types in the ECS.
///
/// Types implementing `Resource` can be stored once per world and read through
/// [`Res`](crate::change_detection::Res) and [`ResMut`](crate::change_detection::ResMut), which
/// carry change ticks like component pointers do.
///
/// # Derive Macro
///
/// Use `#[derive(Resource)]` to implement this trait:
///
/// ```rust,ignore
/// #[derive(Resource)]
/// struct GameTime {
///     elapsed: f32,
///     delta: f32,
/// }
/// ```
///
/// # Trait Bounds
///
/// - `'static`: No borrowed data
/// - `Send + Sync`: Safe to share across threads
pub trait Resource: Send + Sync + 'static {}
