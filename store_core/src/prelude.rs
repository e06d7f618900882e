//! Prelude module for convenient imports

pub use crate::collection::Collection;
pub use crate::context::{CancelHandle, OperationContext};
pub use crate::document::{now_millis, Document};
pub use crate::errors::{ErrorCode, RepositoryError};
pub use crate::id_type::IntoObjectId;
pub use crate::index::IndexSpec;
pub use crate::query::{
    search_attribute, where_attribute, where_object_id, where_object_ids, where_owner, Field,
    FieldPath, FindOptions, Page, PageRequest, Query, SortKey, SortOrder, UpdateSet,
};
pub use crate::repository::Repository;
pub use crate::retry::RetryPolicy;
pub use crate::session::{BulkLookup, Session, UnitOfWork};
pub use crate::transaction::{
    IsolationLevel, PartialTransactionConfig, Transaction, TransactionConfig, TransactionMetrics,
    TransactionStatus,
};
