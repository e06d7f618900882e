//! Predicate model
//!
//! A [`Field`] is one comparison. It names either a first-class column of the
//! document layout or, when `is_semi_structured` is set, a path inside the
//! JSONB attribute bag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection::{column_type, DATA_COLUMN};
use crate::errors::RepositoryError;
use crate::validation::{validate_cast, AttributePath, ValidatedFieldName};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,    // =
    Ne,    // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
    ILike, // ILIKE
    In,    // IN ($1, $2, ...)
    Any,   // = ANY($1)
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::Any => "= ANY",
        }
    }
}

/// Where a field lives, independent of any predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath {
    pub name: String,
    pub is_semi_structured: bool,
    pub cast: Option<String>,
}

impl FieldPath {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_semi_structured: false,
            cast: None,
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_semi_structured: true,
            cast: None,
        }
    }

    pub fn with_cast(mut self, cast: impl Into<String>) -> Self {
        self.cast = Some(cast.into());
        self
    }

    pub fn resolve(&self) -> Result<FieldTarget, RepositoryError> {
        FieldTarget::resolve(&self.name, self.is_semi_structured, self.cast.as_deref())
    }
}

/// A validated, renderable field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    Column(ValidatedFieldName),
    Attribute {
        path: AttributePath,
        cast: Option<String>,
    },
}

impl FieldTarget {
    pub fn resolve(
        name: &str,
        semi_structured: bool,
        cast: Option<&str>,
    ) -> Result<Self, RepositoryError> {
        if semi_structured {
            return Ok(FieldTarget::Attribute {
                path: AttributePath::parse(name)?,
                cast: cast.map(validate_cast).transpose()?,
            });
        }

        if cast.is_some() {
            return Err(RepositoryError::validation(format!(
                "cast on column '{}': casts only apply to semi-structured fields",
                name
            )));
        }
        let column = ValidatedFieldName::new(name)?;
        if column_type(column.as_str()).is_none() {
            return Err(RepositoryError::validation(format!(
                "unknown column '{}'; attributes of the data bag must be marked semi-structured",
                name
            )));
        }
        Ok(FieldTarget::Column(column))
    }

    /// SQL expression: `owner_id`, `data->>'title'` or `(data->>'score')::bigint`
    pub fn render(&self) -> String {
        match self {
            FieldTarget::Column(column) => column.as_str().to_string(),
            FieldTarget::Attribute { path, cast: None } => path.text_accessor(DATA_COLUMN),
            FieldTarget::Attribute {
                path,
                cast: Some(cast),
            } => format!("({})::{}", path.text_accessor(DATA_COLUMN), cast),
        }
    }

    /// SQL type the rendered expression evaluates to
    pub fn sql_type(&self) -> &str {
        match self {
            FieldTarget::Column(column) => column_type(column.as_str()).unwrap_or("text"),
            FieldTarget::Attribute { cast: Some(cast), .. } => cast.as_str(),
            FieldTarget::Attribute { cast: None, .. } => "text",
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, FieldTarget::Attribute { .. })
    }
}

/// One comparison predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
    pub operator: Operator,
    pub is_semi_structured: bool,
    pub cast: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            operator,
            is_semi_structured: false,
            cast: None,
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Eq, value)
    }

    pub fn ne(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Ne, value)
    }

    pub fn gt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Gt, value)
    }

    pub fn gte(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Gte, value)
    }

    pub fn lt(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Lt, value)
    }

    pub fn lte(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(name, Operator::Lte, value)
    }

    /// Case-insensitive pattern match, `%`/`_` wildcards are the caller's
    pub fn ilike(name: impl Into<String>, pattern: &str) -> Self {
        Self::new(name, Operator::ILike, pattern)
    }

    /// `IN` with one placeholder per value
    pub fn in_values(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(name, Operator::In, Value::Array(values))
    }

    /// `= ANY($n)` with the whole set bound as one array parameter
    pub fn any(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(name, Operator::Any, Value::Array(values))
    }

    /// Move the predicate into the JSONB attribute bag
    pub fn semi_structured(mut self) -> Self {
        self.is_semi_structured = true;
        self
    }

    pub fn cast(mut self, cast: impl Into<String>) -> Self {
        self.cast = Some(cast.into());
        self
    }

    pub fn target(&self) -> Result<FieldTarget, RepositoryError> {
        FieldTarget::resolve(&self.name, self.is_semi_structured, self.cast.as_deref())
    }
}

/// Filter: `conditions` AND'd, each of `or_groups` OR'd internally and then
/// AND'd with the rest. The empty query matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Field>,
    pub or_groups: Vec<Vec<Field>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an AND condition
    pub fn and(mut self, field: Field) -> Self {
        self.conditions.push(field);
        self
    }

    /// Add a group whose members are OR'd together
    pub fn or_any(mut self, fields: Vec<Field>) -> Self {
        self.or_groups.push(fields);
        self
    }

    /// Combine two queries with AND
    pub fn merge(mut self, other: Query) -> Self {
        self.conditions.extend(other.conditions);
        self.or_groups.extend(other.or_groups);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.or_groups.iter().all(Vec::is_empty)
    }
}
