//! Error types for the entity store.

use thiserror::Error;

use crate::entity::EntityId;

/// Errors returned by [`World`](crate::World) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The entity was never spawned or has already been despawned.
    #[error("entity {0} does not exist")]
    NoSuchEntity(EntityId),
}

/// Convenience alias for store results.
pub type WorldResult<T> = Result<T, WorldError>;
