//! Typed update sets
//!
//! An [`UpdateSet`] is the only way to describe a mutation of the attribute
//! bag. It is validated against the collection's declared attributes before
//! any SQL is rendered.

use std::collections::HashSet;

use serde_json::{Number, Value};

use super::params::SqlParam;
use super::sql_generation::SqlWriter;
use crate::collection::{Collection, DATA_COLUMN, UPDATED_AT_COLUMN};
use crate::document::now_millis;
use crate::errors::RepositoryError;
use crate::validation::AttributePath;

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperation {
    /// Replace the attribute value
    Set(Value),
    /// Add a numeric delta; a missing attribute counts as zero
    Increment(Value),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSet {
    operations: Vec<(String, UpdateOperation)>,
}

fn negate(delta: Value) -> Value {
    match &delta {
        Value::Number(n) => {
            if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                Value::Number(i.into())
            } else if let Some(f) = n.as_f64().and_then(|f| Number::from_f64(-f)) {
                Value::Number(f)
            } else {
                delta
            }
        }
        _ => delta,
    }
}

impl UpdateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.operations
            .push((field.into(), UpdateOperation::Set(value.into())));
        self
    }

    pub fn increment(mut self, field: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.operations
            .push((field.into(), UpdateOperation::Increment(delta.into())));
        self
    }

    pub fn decrement(self, field: impl Into<String>, delta: impl Into<Value>) -> Self {
        let delta = negate(delta.into());
        self.increment(field, delta)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[(String, UpdateOperation)] {
        &self.operations
    }

    pub fn has_only_increments(&self) -> bool {
        self.operations
            .iter()
            .all(|(_, op)| matches!(op, UpdateOperation::Increment(_)))
    }

    /// Check paths, permitted attributes and deltas
    pub fn validate(
        &self,
        collection: &Collection,
    ) -> Result<Vec<(AttributePath, &UpdateOperation)>, RepositoryError> {
        if self.operations.is_empty() {
            return Err(RepositoryError::validation("update set is empty"));
        }

        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(self.operations.len());
        for (field, operation) in &self.operations {
            let path = AttributePath::parse(field)?;
            collection.check_attribute(&path)?;
            if !seen.insert(path.to_string()) {
                return Err(RepositoryError::validation(format!(
                    "attribute '{}' appears more than once in the update set",
                    path
                )));
            }
            if let UpdateOperation::Increment(delta) = operation {
                if !delta.is_number() {
                    return Err(RepositoryError::validation(format!(
                        "increment of '{}' needs a numeric delta, got {}",
                        path, delta
                    )));
                }
            }
            validated.push((path, operation));
        }
        for (outer, _) in &validated {
            if let Some((inner, _)) = validated.iter().find(|(inner, _)| outer.contains(inner)) {
                return Err(RepositoryError::validation(format!(
                    "attribute '{}' is updated together with '{}' inside it",
                    outer, inner
                )));
            }
        }
        Ok(validated)
    }

    /// Render the SET list: the rewritten attribute bag and a fresh `updated_at`
    pub(crate) fn render_assignments(
        &self,
        collection: &Collection,
        writer: &mut SqlWriter,
    ) -> Result<String, RepositoryError> {
        let operations = self.validate(collection)?;
        let mut expr = DATA_COLUMN.to_string();

        // jsonb_set never creates intermediate objects, so every enclosing
        // object of a nested path is put in place first. A parent that is
        // missing or not an object becomes `{}`.
        let mut parents: Vec<AttributePath> = Vec::new();
        for (path, _) in &operations {
            for parent in path.parents() {
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
        }
        parents.sort_by_key(|parent| parent.segments().len());
        for parent in &parents {
            let current = parent.json_accessor(DATA_COLUMN);
            expr = format!(
                "jsonb_set({}, {}, CASE WHEN jsonb_typeof({current}) = 'object' \
                 THEN {current} ELSE '{{}}'::jsonb END, true)",
                expr,
                parent.to_pg_path(),
                current = current,
            );
        }

        for (path, operation) in operations {
            expr = match operation {
                UpdateOperation::Set(value) => {
                    let placeholder = writer.push_param(SqlParam::Json(value.clone()));
                    format!(
                        "jsonb_set({}, {}, {}::jsonb, true)",
                        expr,
                        path.to_pg_path(),
                        placeholder
                    )
                }
                UpdateOperation::Increment(delta) => {
                    let placeholder = writer.push_param(SqlParam::for_type(delta, "numeric")?);
                    format!(
                        "jsonb_set({}, {}, to_jsonb(COALESCE(({})::numeric, 0) + {}), true)",
                        expr,
                        path.to_pg_path(),
                        path.text_accessor(DATA_COLUMN),
                        placeholder
                    )
                }
            };
        }

        let touched = writer.push_param(SqlParam::BigInt(now_millis()));
        Ok(format!(
            "{} = {}, {} = {}",
            DATA_COLUMN, expr, UPDATED_AT_COLUMN, touched
        ))
    }
}
