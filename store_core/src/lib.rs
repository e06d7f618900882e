//! Store Core - transactional repository layer
//!
//! Documents live in per-collection PostgreSQL tables. Every operation runs
//! through a [`Session`], either on pooled connections or inside an explicit
//! [`Transaction`], and fails with a classified [`RepositoryError`].

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

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod collection;
pub mod context;
pub mod document;
pub mod errors;
pub mod id_type;
pub mod index;
pub mod prelude;
pub mod query;
pub mod repository;
pub mod retry;
pub mod session;
pub mod transaction;
pub mod validation;

pub use collection::Collection;
pub use context::{CancelHandle, OperationContext};
pub use document::Document;
pub use errors::{ErrorCode, RepositoryError};
pub use index::{IndexKey, IndexSpec};
pub use query::{Field, FindOptions, Page, PageRequest, Query, SortKey, SortOrder, UpdateSet};
pub use repository::Repository;
pub use retry::{RetryExecutor, RetryPolicy};
pub use session::{BulkLookup, Session, UnitOfWork};
pub use transaction::{
    IsolationLevel, PartialTransactionConfig, Transaction, TransactionConfig, TransactionMetrics,
    TransactionStatus,
};
pub use validation::{ValidatedFieldName, ValidatedTableName, ValidationError};

use sqlx::PgPool;

pub type DbPool = PgPool;
