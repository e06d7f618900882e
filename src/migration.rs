//! Collection bootstrap
//!
//! Creates the tables and declared indexes of registered collections. Each
//! bootstrap runs in one transaction, so a failure leaves no partial schema.

use store_core::context::OperationContext;
use store_core::{Collection, Session};

use crate::core::RepoHaus;
use crate::errors::RepoHausError;

async fn create_collection(
    session: &Session,
    collection: &Collection,
    recreate: bool,
) -> Result<(), store_core::RepositoryError> {
    if recreate {
        tracing::info!(collection = collection.name(), "dropping collection");
        session.drop_collection(collection).await?;
    }

    session.ensure_collection(collection).await?;
    for index in collection.indexes() {
        let name = session.create_index(collection, index).await?;
        tracing::debug!(collection = collection.name(), index = %name, "migrated index");
    }
    Ok(())
}

impl RepoHaus {
    /// Create table and indexes for one collection.
    /// If recreate is true, drops the existing table first
    pub async fn migrate_collection(
        &self,
        collection: &Collection,
        recreate: bool,
    ) -> Result<(), RepoHausError> {
        let ctx = OperationContext::background();
        self.repository()
            .run_in_transaction(&ctx, None, |session| async move {
                create_collection(&session, collection, recreate).await
            })
            .await?;
        tracing::info!(collection = collection.name(), "collection ready");
        Ok(())
    }

    /// Create tables and indexes of every registered collection
    pub async fn migrate_all(&self) -> Result<(), RepoHausError> {
        let collections: Vec<Collection> = self.registered().cloned().collect();
        let ctx = OperationContext::background();
        self.repository()
            .run_in_transaction(&ctx, None, |session| {
                let collections = collections.clone();
                async move {
                    for collection in &collections {
                        create_collection(&session, collection, false).await?;
                    }
                    Ok(())
                }
            })
            .await?;
        tracing::info!(count = collections.len(), "collections ready");
        Ok(())
    }

    /// Register a collection and create its table
    pub async fn register_collection_with_migration(
        &mut self,
        collection: Collection,
        recreate: bool,
    ) -> Result<(), RepoHausError> {
        // First, create the table and indexes
        self.migrate_collection(&collection, recreate).await?;

        // Then register the collection
        self.register_collection(collection)
    }
}
