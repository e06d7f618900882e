//! Ownership-scoped mutations
//!
//! Each operation is a single statement filtered on both id and owner, so the
//! ownership check and the write cannot be separated by a concurrent change.
//! A row owned by someone else is indistinguishable from a missing one.

use super::Session;
use crate::collection::Collection;
use crate::document::Document;
use crate::errors::RepositoryError;
use crate::id_type::IntoObjectId;
use crate::query::{SqlGenerator, UpdateSet};

impl Session {
    pub async fn update_with_ownership(
        &self,
        collection: &Collection,
        id: impl IntoObjectId,
        owner_id: impl IntoObjectId,
        updates: &UpdateSet,
    ) -> Result<Document, RepositoryError> {
        let id = id.into_object_id("id")?;
        let owner_id = owner_id.into_object_id("owner id")?;
        let stmt = SqlGenerator::build_owned_update(collection, id, owner_id, updates)?;
        crate::trace_log!("[UPDATE_OWNED] {}: {}", collection.name(), stmt.sql);

        let updated = execute_on!(self, "update with ownership", |conn| stmt
            .query_as::<Document>()
            .fetch_optional(conn))?;
        updated.ok_or_else(|| RepositoryError::not_found(collection.name()))
    }

    /// Apply numeric deltas atomically; the update set may only hold increments
    pub async fn increment_with_ownership(
        &self,
        collection: &Collection,
        id: impl IntoObjectId,
        owner_id: impl IntoObjectId,
        increments: &UpdateSet,
    ) -> Result<Document, RepositoryError> {
        if !increments.has_only_increments() {
            return Err(RepositoryError::validation(
                "increment_with_ownership accepts increments only",
            ));
        }
        self.update_with_ownership(collection, id, owner_id, increments)
            .await
    }

    pub async fn delete_with_ownership(
        &self,
        collection: &Collection,
        id: impl IntoObjectId,
        owner_id: impl IntoObjectId,
    ) -> Result<(), RepositoryError> {
        let id = id.into_object_id("id")?;
        let owner_id = owner_id.into_object_id("owner id")?;
        let stmt = SqlGenerator::build_owned_delete(collection, id, owner_id);

        let result = execute_on!(self, "delete with ownership", |conn| stmt
            .query()
            .execute(conn))?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found(collection.name()));
        }
        crate::debug_log!("[DELETE_OWNED] {} from {}", id, collection.name());
        Ok(())
    }
}
