//! Base repository trait for database operations.
//!
//! A repository is a data access layer for one Postgres table. It provides
//! methods for creating, reading, updating and soft-deleting entities, plus
//! listing and counting them with per-resource filters. Each repository
//! borrows a `PgConnection` for its lifetime, so callers choose whether the
//! work happens on a pool connection or inside a transaction.

use std::collections::HashMap;

use crate::db::errors::Result;
use crate::types::UserId;

/// Every entity in this system is keyed by UUID.
pub type EntityId = uuid::Uuid;

/// Base repository trait providing common database operations.
///
/// Deletion is always a soft delete: the row is flagged, stamped with the
/// acting user and timestamp, and excluded from every default-scope query
/// from then on. `get_by_id_unscoped` stays available for internal
/// consumers that need to see deleted rows.
#[async_trait::async_trait]
pub trait Repository {
    /// Resource name used for cache keys, policy errors and log fields
    const RESOURCE: &'static str;

    /// The request type for creating entities
    type CreateRequest: Send + Sync;

    /// The request type for updating entities
    type UpdateRequest: Send + Sync;

    /// The response/DTO type returned by operations
    type Response: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    /// Create a new entity
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// Get a non-deleted entity by ID
    async fn get_by_id(&mut self, id: EntityId) -> Result<Option<Self::Response>>;

    /// Get an entity by ID regardless of deletion state
    async fn get_by_id_unscoped(&mut self, id: EntityId) -> Result<Option<Self::Response>>;

    /// Get an entity by slug, for resources that have one. The default
    /// implementation reports no match.
    async fn get_by_slug(&mut self, _slug: &str) -> Result<Option<Self::Response>> {
        Ok(None)
    }

    /// Get lots of non-deleted entities by their IDs, keyed by ID
    async fn get_bulk(&mut self, ids: &[EntityId]) -> Result<HashMap<EntityId, Self::Response>>;

    /// List non-deleted entities with filtering and pagination
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Count non-deleted entities matching the filter (ignoring pagination)
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64>;

    /// Update an entity by ID
    async fn update(&mut self, id: EntityId, request: &Self::UpdateRequest) -> Result<Self::Response>;

    /// Soft-delete an entity, stamping the acting user and timestamp
    /// atomically with the flag flip. Returns false when no live row
    /// matched.
    async fn soft_delete(&mut self, id: EntityId, actor: Option<UserId>) -> Result<bool>;

    /// The creator/owner reference of a record, when the resource has one
    fn owner_of(_response: &Self::Response) -> Option<UserId> {
        None
    }
}
