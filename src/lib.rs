//! # RepoHaus
//!
//! A transactional repository layer for PostgreSQL. Entities live in
//! collections with a fixed document layout (id, owner, timestamps and a JSONB
//! attribute bag) and are reached through sessions that run either on pooled
//! connections or inside explicit, retryable transactions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use repohaus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::new(
//!         "localhost".to_string(), 5432, "social".to_string(),
//!         "postgres".to_string(), "password".to_string(),
//!         1, 5, 30, 600, 3600,
//!     );
//!
//!     let mut repohaus = RepoHaus::new(config).await?;
//!     let posts = Collection::new("posts")?.with_attributes(["title", "score"]);
//!     repohaus.register_collection_with_migration(posts, false).await?;
//!     let posts = repohaus.collection("posts")?;
//!
//!     let author = Uuid::new_v4();
//!     let post_id = Uuid::new_v4();
//!     let now = now_millis();
//!     let session = repohaus.session();
//!     session
//!         .save(posts, post_id, author, now, now, &json!({"title": "hello", "score": 0}))
//!         .await?;
//!
//!     // only the author may change it
//!     session
//!         .increment_with_ownership(
//!             posts,
//!             post_id,
//!             author,
//!             &UpdateSet::new().increment("score", 1),
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod migration;
pub mod prelude;

// Re-export the main public types for convenience
pub use crate::core::RepoHaus;
pub use crate::errors::RepoHausError;
