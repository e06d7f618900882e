//! Keyset pagination
//!
//! Pages are addressed by an opaque cursor holding the last row's sort value
//! and id. A cursor only resumes the ordering it was issued for. Rows without
//! a sort value come last, so a cursor issued there carries no value.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::options::{SortKey, SortOrder};
use super::sql_generation::KeysetPosition;
use crate::collection::CREATED_AT_COLUMN;
use crate::errors::{ErrorCode, RepositoryError};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,
    #[error("cursor payload is malformed")]
    Payload,
    #[error("cursor was issued for ordering '{issued}', not '{requested}'")]
    SortMismatch { issued: String, requested: String },
}

impl From<CursorError> for RepositoryError {
    fn from(error: CursorError) -> Self {
        RepositoryError::with_cause(ErrorCode::Validation, error.to_string(), error)
    }
}

/// Decoded page cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "k")]
    pub sort: String,
    #[serde(rename = "v", default)]
    pub value: Option<String>,
    #[serde(rename = "i")]
    pub id: Uuid,
}

impl Cursor {
    pub fn encode(&self) -> String {
        // strings and a uuid always serialize
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| CursorError::Encoding)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorError::Payload)
    }

    /// Decode and check the cursor belongs to `sort`
    pub fn resume(token: &str, sort: &SortKey) -> Result<KeysetPosition, CursorError> {
        let cursor = Self::decode(token)?;
        let requested = sort_signature(sort);
        if cursor.sort != requested {
            return Err(CursorError::SortMismatch {
                issued: cursor.sort,
                requested,
            });
        }
        Ok(KeysetPosition {
            value: cursor.value,
            id: cursor.id,
        })
    }
}

/// Stable description of an ordering, embedded in its cursors
pub fn sort_signature(sort: &SortKey) -> String {
    let field = &sort.field;
    let mut signature = if field.is_semi_structured {
        format!("data.{}", field.name)
    } else {
        field.name.clone()
    };
    if let Some(cast) = &field.cast {
        signature.push_str("::");
        signature.push_str(cast);
    }
    signature.push(':');
    signature.push_str(match sort.order {
        SortOrder::Asc => "asc",
        SortOrder::Desc => "desc",
    });
    signature
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub limit: u32,
    pub cursor: Option<String>,
    pub sort: SortKey,
    pub include_total: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            cursor: None,
            sort: SortKey::column(CREATED_AT_COLUMN, SortOrder::Desc),
            include_total: false,
        }
    }
}

impl PageRequest {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_total(mut self) -> Self {
        self.include_total = true;
        self
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(RepositoryError::validation(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.limit
            )));
        }
        Ok(())
    }

    /// Keyset position to resume from, if this is not the first page
    pub fn position(&self) -> Result<Option<KeysetPosition>, RepositoryError> {
        match &self.cursor {
            Some(token) => Ok(Some(Cursor::resume(token, &self.sort)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_next: bool,
    pub total: Option<i64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_next: false,
            total: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_next: self.has_next,
            total: self.total,
        }
    }
}
