use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use super::Session;
use crate::collection::Collection;
use crate::document::{payload_to_object, Document};
use crate::errors::RepositoryError;
use crate::id_type::IntoObjectId;
use crate::index::IndexSpec;
use crate::query::{where_object_id, FindOptions, Query, SqlGenerator, UpdateSet};

impl Session {
    /// Insert one document. An existing id is a conflict.
    pub async fn save<P: Serialize>(
        &self,
        collection: &Collection,
        id: impl IntoObjectId,
        owner_id: impl IntoObjectId,
        created_at: i64,
        updated_at: i64,
        payload: &P,
    ) -> Result<Document, RepositoryError> {
        let document = Document {
            id: id.into_object_id("id")?,
            owner_id: owner_id.into_object_id("owner id")?,
            created_at,
            updated_at,
            data: payload_to_object(payload)?,
        };
        self.insert(collection, &document).await
    }

    /// Insert a prepared document, returning the stored row
    pub async fn insert(
        &self,
        collection: &Collection,
        document: &Document,
    ) -> Result<Document, RepositoryError> {
        let stmt = SqlGenerator::build_insert(collection, std::slice::from_ref(document), true)?;
        crate::trace_log!("[SAVE] {}: {}", collection.name(), stmt.sql);
        execute_on!(self, "save", |conn| stmt
            .query_as::<Document>()
            .fetch_one(conn))
    }

    /// Insert several documents in one statement; all or none are stored
    pub async fn save_many(
        &self,
        collection: &Collection,
        documents: &[Document],
    ) -> Result<u64, RepositoryError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let stmt = SqlGenerator::build_insert(collection, documents, false)?;
        crate::trace_log!("[SAVE_MANY] {}: {} documents", collection.name(), documents.len());
        let result = execute_on!(self, "save many", |conn| stmt.query().execute(conn))?;
        Ok(result.rows_affected())
    }

    pub async fn find(
        &self,
        collection: &Collection,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Vec<Document>, RepositoryError> {
        let stmt = SqlGenerator::build_select(collection, query, options)?;
        crate::trace_log!("[FIND] {}: {}", collection.name(), stmt.sql);
        let rows = execute_on!(self, "find", |conn| stmt
            .query_as::<Document>()
            .fetch_all(conn))?;
        crate::debug_log!("[FIND] {} rows from {}", rows.len(), collection.name());
        Ok(rows)
    }

    pub async fn find_one(
        &self,
        collection: &Collection,
        query: &Query,
    ) -> Result<Option<Document>, RepositoryError> {
        let options = FindOptions::new().limit(1);
        let stmt = SqlGenerator::build_select(collection, query, &options)?;
        execute_on!(self, "find one", |conn| stmt
            .query_as::<Document>()
            .fetch_optional(conn))
    }

    pub async fn find_by_id(
        &self,
        collection: &Collection,
        id: impl IntoObjectId,
    ) -> Result<Document, RepositoryError> {
        let id = id.into_object_id("id")?;
        self.find_one(collection, &where_object_id(id))
            .await?
            .ok_or_else(|| RepositoryError::not_found(collection.name()))
    }

    /// Fetch many documents by id with one array parameter. Results follow
    /// the order of `ids`; unknown ids are skipped.
    pub async fn find_by_ids(
        &self,
        collection: &Collection,
        ids: &[Uuid],
    ) -> Result<Vec<Document>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = SqlGenerator::build_select_by_ids(collection, ids);
        let rows = execute_on!(self, "find by ids", |conn| stmt
            .query_as::<Document>()
            .fetch_all(conn))?;

        let mut by_id: HashMap<Uuid, Document> =
            rows.into_iter().map(|doc| (doc.id, doc)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    pub async fn exists(
        &self,
        collection: &Collection,
        query: &Query,
    ) -> Result<bool, RepositoryError> {
        let stmt = SqlGenerator::build_exists(collection, query)?;
        execute_on!(self, "exists", |conn| stmt
            .query_scalar::<bool>()
            .fetch_one(conn))
    }

    pub async fn count(
        &self,
        collection: &Collection,
        query: &Query,
    ) -> Result<i64, RepositoryError> {
        let stmt = SqlGenerator::build_count(collection, query)?;
        execute_on!(self, "count", |conn| stmt
            .query_scalar::<i64>()
            .fetch_one(conn))
    }

    /// Update the first matching document and return it
    pub async fn update(
        &self,
        collection: &Collection,
        query: &Query,
        updates: &UpdateSet,
    ) -> Result<Document, RepositoryError> {
        let stmt = SqlGenerator::build_update_first(collection, query, updates)?;
        crate::trace_log!("[UPDATE] {}: {}", collection.name(), stmt.sql);
        let updated = execute_on!(self, "update", |conn| stmt
            .query_as::<Document>()
            .fetch_optional(conn))?;
        updated.ok_or_else(|| RepositoryError::not_found(collection.name()))
    }

    pub async fn update_many(
        &self,
        collection: &Collection,
        query: &Query,
        updates: &UpdateSet,
    ) -> Result<u64, RepositoryError> {
        let stmt = SqlGenerator::build_update_many(collection, query, updates)?;
        crate::trace_log!("[UPDATE_MANY] {}: {}", collection.name(), stmt.sql);
        let result = execute_on!(self, "update many", |conn| stmt.query().execute(conn))?;
        crate::debug_log!(
            "[UPDATE_MANY] {} rows in {}",
            result.rows_affected(),
            collection.name()
        );
        Ok(result.rows_affected())
    }

    pub async fn delete_many(
        &self,
        collection: &Collection,
        query: &Query,
    ) -> Result<u64, RepositoryError> {
        let stmt = SqlGenerator::build_delete(collection, query)?;
        crate::trace_log!("[DELETE_MANY] {}: {}", collection.name(), stmt.sql);
        let result = execute_on!(self, "delete many", |conn| stmt.query().execute(conn))?;
        Ok(result.rows_affected())
    }

    /// Create the collection's table and owner index if missing
    pub async fn ensure_collection(&self, collection: &Collection) -> Result<(), RepositoryError> {
        let table = collection.create_table_sql();
        execute_on!(self, "create collection", |conn| sqlx::query(&table).execute(conn))?;
        let owner_index = collection.owner_index_sql();
        execute_on!(self, "create owner index", |conn| sqlx::query(&owner_index)
            .execute(conn))?;
        Ok(())
    }

    /// Create an index, creating the collection first when needed.
    /// Inside a transaction both are undone by rollback.
    pub async fn create_index(
        &self,
        collection: &Collection,
        spec: &IndexSpec,
    ) -> Result<String, RepositoryError> {
        let sql = spec.create_sql(collection)?;
        let name = spec.index_name(collection)?;
        self.ensure_collection(collection).await?;
        execute_on!(self, "create index", |conn| sqlx::query(&sql).execute(conn))?;
        tracing::debug!(collection = collection.name(), index = %name, "index ready");
        Ok(name)
    }

    /// Drop the collection's table
    pub async fn drop_collection(&self, collection: &Collection) -> Result<(), RepositoryError> {
        let sql = collection.drop_table_sql();
        execute_on!(self, "drop collection", |conn| sqlx::query(&sql).execute(conn))?;
        Ok(())
    }
}
