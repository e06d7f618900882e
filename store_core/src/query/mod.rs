//! Query building
//!
//! Filters, ordering, update sets and the SQL they render to.

pub mod field;
pub mod filters;
pub mod options;
pub mod pagination;
pub mod params;
pub mod sql_generation;
pub mod update;

#[cfg(test)]
mod tests;

pub use field::{Field, FieldPath, FieldTarget, Operator, Query};
pub use filters::{
    created_after, created_before, search_attribute, where_attribute, where_object_id,
    where_object_ids, where_owner,
};
pub use options::{FindOptions, SortKey, SortOrder};
pub use pagination::{Cursor, CursorError, Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use params::{SqlParam, Statement};
pub use sql_generation::{KeysetPosition, SqlGenerator, SqlWriter};
pub use update::{UpdateOperation, UpdateSet};
