//! Filter shorthands for the lookups every entity repository needs

use serde_json::Value;
use uuid::Uuid;

use super::field::{Field, Query};
use crate::collection::{CREATED_AT_COLUMN, ID_COLUMN, OWNER_COLUMN};

pub fn where_object_id(id: Uuid) -> Query {
    Query::new().and(Field::eq(ID_COLUMN, id.to_string()))
}

pub fn where_owner(owner_id: Uuid) -> Query {
    Query::new().and(Field::eq(OWNER_COLUMN, owner_id.to_string()))
}

/// Matches any of `ids` with a single array parameter
pub fn where_object_ids(ids: &[Uuid]) -> Query {
    let values = ids.iter().map(|id| Value::String(id.to_string())).collect();
    Query::new().and(Field::any(ID_COLUMN, values))
}

/// Equality on an attribute of the data bag
pub fn where_attribute(name: &str, value: impl Into<Value>) -> Query {
    Query::new().and(Field::eq(name, value).semi_structured())
}

/// Case-insensitive substring match on an attribute; wildcards in `term`
/// are matched literally
pub fn search_attribute(name: &str, term: &str) -> Query {
    let pattern = format!("%{}%", escape_like(term));
    Query::new().and(Field::ilike(name, &pattern).semi_structured())
}

pub fn created_after(millis: i64) -> Query {
    Query::new().and(Field::gt(CREATED_AT_COLUMN, millis))
}

pub fn created_before(millis: i64) -> Query {
    Query::new().and(Field::lt(CREATED_AT_COLUMN, millis))
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
