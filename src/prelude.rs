//! Convenience re-exports for common RepoHaus usage
//!
//! # Example
//!
//! ```rust
//! use repohaus::prelude::*;
//!
//! let posts = Collection::new("posts").unwrap();
//! let query = where_attribute("status", "published");
//! assert_eq!(posts.name(), "posts");
//! assert_eq!(query.conditions.len(), 1);
//! ```

// Core RepoHaus components
pub use crate::core::{RepoHaus, transaction_defaults};
pub use crate::errors::RepoHausError;

// Re-export centralized config
pub use config::{AppConfig, DatabaseConfig, TransactionSettings};

// Repository layer
pub use store_core::prelude::*;
pub use store_core;

// Common external dependencies
pub use serde_json::{Value, json};
pub use chrono::{DateTime, Utc};
pub use sqlx;
pub use tokio;
pub use uuid::Uuid;

// Commonly used sqlx types
pub use sqlx::PgPool;
