//! Collection layout
//!
//! Every logical entity lives in one table with a fixed document layout:
//! primary id, owner id, two millisecond timestamps and a JSONB attribute bag.

use std::collections::BTreeSet;

use crate::errors::RepositoryError;
use crate::index::IndexSpec;
use crate::validation::{AttributePath, ValidatedTableName};

pub const ID_COLUMN: &str = "id";
pub const OWNER_COLUMN: &str = "owner_id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const DATA_COLUMN: &str = "data";

/// Column list in row order, used by every SELECT/RETURNING
pub const DOCUMENT_COLUMNS: &str = "id, owner_id, created_at, updated_at, data";

/// SQL type of a first-class column, `None` for unknown names
pub fn column_type(name: &str) -> Option<&'static str> {
    match name {
        ID_COLUMN | OWNER_COLUMN => Some("uuid"),
        CREATED_AT_COLUMN | UPDATED_AT_COLUMN => Some("bigint"),
        DATA_COLUMN => Some("jsonb"),
        _ => None,
    }
}

/// A named collection, optionally restricted to a closed set of attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    table: ValidatedTableName,
    attributes: Option<BTreeSet<String>>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    pub fn new(name: &str) -> Result<Self, RepositoryError> {
        Ok(Self {
            table: ValidatedTableName::new(name)?,
            attributes: None,
            indexes: Vec::new(),
        })
    }

    /// Restrict updates to these top-level attribute names
    pub fn with_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Index created when the collection is bootstrapped
    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn name(&self) -> &str {
        self.table.as_str()
    }

    pub fn attributes(&self) -> Option<&BTreeSet<String>> {
        self.attributes.as_ref()
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Reject attributes outside the closed set, when one is declared
    pub fn check_attribute(&self, path: &AttributePath) -> Result<(), RepositoryError> {
        match &self.attributes {
            Some(allowed) if !allowed.contains(path.root()) => {
                Err(RepositoryError::validation(format!(
                    "attribute '{}' is not permitted in collection '{}'",
                    path,
                    self.name()
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             {} UUID PRIMARY KEY, \
             {} UUID NOT NULL, \
             {} BIGINT NOT NULL, \
             {} BIGINT NOT NULL, \
             {} JSONB NOT NULL DEFAULT '{{}}'::jsonb)",
            self.name(),
            ID_COLUMN,
            OWNER_COLUMN,
            CREATED_AT_COLUMN,
            UPDATED_AT_COLUMN,
            DATA_COLUMN
        )
    }

    /// Owner lookups back every ownership-scoped mutation
    pub fn owner_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {}_owner_id_idx ON {} ({})",
            crate::validation::sanitize_name(&format!("{:.48}", self.name())),
            self.name(),
            OWNER_COLUMN
        )
    }

    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name())
    }
}
