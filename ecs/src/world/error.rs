use thiserror::Error;

use crate::{bundle::BundleError, entity::Entity};

/// Failure to find an entity.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EntityError {
    /// The entity was never spawned, or was despawned since.
    #[error("entity {0} does not exist")]
    NoSuchEntity(Entity),
}

/// Failure of a [`World`](super::World) operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Entity(#[from] EntityError),
}
