//! Core RepoHaus functionality
//!
//! This module contains the main RepoHaus struct: it owns the connection
//! pool, the transaction defaults and the registry of known collections.

use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

use config::{AppConfig, DatabaseConfig, TransactionSettings};
use store_core::context::OperationContext;
use store_core::retry::RetryPolicy;
use store_core::transaction::{IsolationLevel, TransactionConfig};
use store_core::{Collection, Repository, Session};

use crate::errors::RepoHausError;

/// Main RepoHaus coordinator that manages the database connection and collections
pub struct RepoHaus {
    repository: Repository,
    collections: HashMap<String, Collection>,
}

/// Translate file-level transaction settings into typed defaults
pub fn transaction_defaults(
    settings: &TransactionSettings,
) -> Result<TransactionConfig, RepoHausError> {
    let policy = RetryPolicy::default()
        .with_max_retries(settings.max_retries)
        .with_delays(
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
        .with_backoff_factor(settings.backoff_factor);

    let defaults = TransactionConfig {
        timeout: Duration::from_secs(settings.timeout_seconds),
        read_only: settings.read_only,
        isolation_level: settings.isolation_level.parse::<IsolationLevel>()?,
        retry_policy: Some(policy),
    };
    defaults.validate()?;
    Ok(defaults)
}

impl RepoHaus {
    /// Create new RepoHaus with database connection and default transaction settings
    pub async fn new(config: DatabaseConfig) -> Result<Self, RepoHausError> {
        Self::with_settings(config, &TransactionSettings::default()).await
    }

    /// Create RepoHaus from a loaded application configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self, RepoHausError> {
        config.validate()?;
        Self::with_settings(config.database.clone(), &config.transaction).await
    }

    pub async fn with_settings(
        config: DatabaseConfig,
        settings: &TransactionSettings,
    ) -> Result<Self, RepoHausError> {
        let defaults = transaction_defaults(settings)?;
        let connection_string = config.connection_string();

        let mut pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds));

        // Set max lifetime if specified
        if config.max_lifetime_seconds > 0 {
            pool_options =
                pool_options.max_lifetime(Duration::from_secs(config.max_lifetime_seconds));
        }

        let pool = pool_options.connect(&connection_string).await?;
        tracing::info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "connected to PostgreSQL"
        );

        Self::from_pool(pool, defaults)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, defaults: TransactionConfig) -> Result<Self, RepoHausError> {
        Ok(Self {
            repository: Repository::with_defaults(pool, defaults)?,
            collections: HashMap::new(),
        })
    }

    /// Get database pool reference
    pub fn pool(&self) -> &PgPool {
        self.repository.pool()
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Session on pooled connections, without a deadline
    pub fn session(&self) -> Session {
        self.repository.session()
    }

    /// Register a collection under its table name
    pub fn register_collection(&mut self, collection: Collection) -> Result<(), RepoHausError> {
        let name = collection.name().to_string();
        if self.collections.contains_key(&name) {
            return Err(RepoHausError::CollectionAlreadyRegistered(name));
        }

        self.collections.insert(name, collection);
        Ok(())
    }

    /// Get a registered collection by name
    pub fn collection(&self, name: &str) -> Result<&Collection, RepoHausError> {
        self.collections
            .get(name)
            .ok_or_else(|| RepoHausError::CollectionNotFound(name.to_string()))
    }

    /// List all registered collection names
    pub fn list_collections(&self) -> Vec<&String> {
        self.collections.keys().collect()
    }

    /// Remove a collection from the registry; its table is left alone
    pub fn unregister_collection(&mut self, name: &str) -> Result<Collection, RepoHausError> {
        self.collections
            .remove(name)
            .ok_or_else(|| RepoHausError::CollectionNotFound(name.to_string()))
    }

    pub(crate) fn registered(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Check database connection health
    pub async fn health_check(&self) -> Result<(), RepoHausError> {
        self.repository
            .ping(&OperationContext::with_timeout(Duration::from_secs(5)))
            .await?;
        Ok(())
    }
}
