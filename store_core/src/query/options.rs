use serde::{Deserialize, Serialize};

use super::field::{FieldPath, FieldTarget};
use crate::errors::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// `1` ascending, `-1` descending, as sort maps usually spell it
    pub fn from_direction(direction: i32) -> Self {
        if direction < 0 {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: FieldPath,
    pub order: SortOrder,
}

impl SortKey {
    pub fn column(name: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: FieldPath::column(name),
            order,
        }
    }

    pub fn attribute(name: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: FieldPath::attribute(name),
            order,
        }
    }

    pub fn with_cast(mut self, cast: impl Into<String>) -> Self {
        self.field = self.field.with_cast(cast);
        self
    }

    pub fn target(&self) -> Result<FieldTarget, RepositoryError> {
        self.field.resolve()
    }
}

/// Limit, offset and ordering for `find`.
///
/// `sort` is ordered: the first key has the highest precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub sort: Vec<SortKey>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn sort_by(self, column: &str, order: SortOrder) -> Self {
        self.sort(SortKey::column(column, order))
    }

    pub fn sort_by_attribute(self, name: &str, order: SortOrder) -> Self {
        self.sort(SortKey::attribute(name, order))
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if matches!(self.limit, Some(limit) if limit < 0) {
            return Err(RepositoryError::validation("limit cannot be negative"));
        }
        if matches!(self.skip, Some(skip) if skip < 0) {
            return Err(RepositoryError::validation("skip cannot be negative"));
        }
        Ok(())
    }
}
