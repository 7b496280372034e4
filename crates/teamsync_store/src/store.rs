//! Local store trait definition.

use crate::error::StoreResult;
use teamsync_model::EntitySet;

/// The local entity cache read by the dashboard and written by the sync engine.
///
/// # Invariants
///
/// - `bulk_upsert` is all-or-nothing: on error the previous contents remain
///   readable and unchanged
/// - `read_all` never blocks on an in-flight sync; it returns the last
///   committed set
/// - Stores must be `Send + Sync` so reads and the engine's writes can come
///   from different tasks
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait LocalStore: Send + Sync {
    /// Returns every cached entity.
    fn read_all(&self) -> StoreResult<EntitySet>;

    /// Inserts or replaces every record of `entities`, keyed by external id.
    ///
    /// Records absent from `entities` are left untouched.
    fn bulk_upsert(&self, entities: &EntitySet) -> StoreResult<()>;

    /// Removes all cached entities.
    fn clear(&self) -> StoreResult<()>;
}
