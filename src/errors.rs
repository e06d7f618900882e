//! Error types for the RepoHaus crate
//!
//! Repository operations fail with [`RepositoryError`]; this enum adds the
//! failures of wiring the layer together.

use store_core::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoHausError {
    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already registered: {0}")]
    CollectionAlreadyRegistered(String),
}
