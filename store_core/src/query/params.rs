//! Typed statement parameters
//!
//! Predicate values arrive as `serde_json::Value`; they are converted to a
//! concrete SQL type once, against the type of the expression they are
//! compared with, so the bound parameter always matches the placeholder.

use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::Postgres;
use uuid::Uuid;

use crate::errors::RepositoryError;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Uuid(Uuid),
    Json(Value),
    TextArray(Vec<String>),
    BigIntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    UuidArray(Vec<Uuid>),
}

/// Bind a [`SqlParam`] onto any sqlx query type
#[macro_export]
macro_rules! bind_sql_param {
    ($query:expr, $param:expr) => {
        match $param {
            $crate::query::SqlParam::Null => $query.bind(Option::<String>::None),
            $crate::query::SqlParam::Bool(b) => $query.bind(b),
            $crate::query::SqlParam::BigInt(i) => $query.bind(i),
            $crate::query::SqlParam::Double(f) => $query.bind(f),
            $crate::query::SqlParam::Text(s) => $query.bind(s),
            $crate::query::SqlParam::Uuid(u) => $query.bind(u),
            $crate::query::SqlParam::Json(v) => $query.bind(v),
            $crate::query::SqlParam::TextArray(v) => $query.bind(v),
            $crate::query::SqlParam::BigIntArray(v) => $query.bind(v),
            $crate::query::SqlParam::DoubleArray(v) => $query.bind(v),
            $crate::query::SqlParam::UuidArray(v) => $query.bind(v),
        }
    };
}

fn is_integer_type(sql_type: &str) -> bool {
    matches!(sql_type, "bigint" | "int" | "integer" | "smallint")
}

fn is_float_type(sql_type: &str) -> bool {
    matches!(sql_type, "numeric" | "real" | "float8" | "double precision")
}

fn mismatch(value: &Value, sql_type: &str) -> RepositoryError {
    RepositoryError::validation(format!(
        "value {} cannot be compared with a {} expression",
        value, sql_type
    ))
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl SqlParam {
    /// Convert a scalar predicate value for an expression of `sql_type`
    pub fn for_type(value: &Value, sql_type: &str) -> Result<Self, RepositoryError> {
        if value.is_null() {
            return Ok(SqlParam::Null);
        }
        match sql_type {
            "uuid" => match value {
                Value::String(s) => Uuid::parse_str(s.trim())
                    .map(SqlParam::Uuid)
                    .map_err(|_| mismatch(value, sql_type)),
                _ => Err(mismatch(value, sql_type)),
            },
            t if is_integer_type(t) => match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(SqlParam::BigInt)
                    .or_else(|| n.as_f64().map(SqlParam::Double))
                    .ok_or_else(|| mismatch(value, sql_type)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(SqlParam::BigInt)
                    .map_err(|_| mismatch(value, sql_type)),
                _ => Err(mismatch(value, sql_type)),
            },
            t if is_float_type(t) => match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(SqlParam::BigInt)
                    .or_else(|| n.as_f64().map(SqlParam::Double))
                    .ok_or_else(|| mismatch(value, sql_type)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(SqlParam::Double)
                    .map_err(|_| mismatch(value, sql_type)),
                _ => Err(mismatch(value, sql_type)),
            },
            "boolean" | "bool" => match value {
                Value::Bool(b) => Ok(SqlParam::Bool(*b)),
                _ => Err(mismatch(value, sql_type)),
            },
            "jsonb" => Ok(SqlParam::Json(value.clone())),
            // text, and date/time types, which are bound as text and cast in SQL
            _ => match value {
                Value::Array(_) | Value::Object(_) => Err(mismatch(value, sql_type)),
                other => Ok(SqlParam::Text(value_as_text(other))),
            },
        }
    }

    /// Convert a set of values into one array parameter
    pub fn array_for_type(values: &[Value], sql_type: &str) -> Result<Self, RepositoryError> {
        let scalars = values
            .iter()
            .map(|value| SqlParam::for_type(value, sql_type))
            .collect::<Result<Vec<_>, _>>()?;

        let unsupported = || {
            RepositoryError::validation(format!(
                "ANY over a {} expression needs values of a single type",
                sql_type
            ))
        };

        match sql_type {
            "uuid" => scalars
                .into_iter()
                .map(|p| match p {
                    SqlParam::Uuid(u) => Ok(u),
                    _ => Err(unsupported()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SqlParam::UuidArray),
            t if is_integer_type(t) => scalars
                .into_iter()
                .map(|p| match p {
                    SqlParam::BigInt(i) => Ok(i),
                    _ => Err(unsupported()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SqlParam::BigIntArray),
            t if is_float_type(t) => scalars
                .into_iter()
                .map(|p| match p {
                    SqlParam::BigInt(i) => Ok(i as f64),
                    SqlParam::Double(f) => Ok(f),
                    _ => Err(unsupported()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SqlParam::DoubleArray),
            "text" => scalars
                .into_iter()
                .map(|p| match p {
                    SqlParam::Text(s) => Ok(s),
                    _ => Err(unsupported()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(SqlParam::TextArray),
            _ => Err(RepositoryError::validation(format!(
                "ANY is not supported for {} expressions",
                sql_type
            ))),
        }
    }

    /// Whether the placeholder needs an explicit `::type` to compare with
    /// an expression of `sql_type`
    pub fn needs_cast(&self, sql_type: &str) -> bool {
        matches!(self, SqlParam::Text(_)) && sql_type != "text"
    }
}

/// A rendered statement: SQL text plus parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn query(&self) -> sqlx::query::Query<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = bind_sql_param!(query, param.clone());
        }
        query
    }

    pub fn query_as<T>(&self) -> sqlx::query::QueryAs<'_, Postgres, T, PgArguments>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow>,
    {
        let mut query = sqlx::query_as::<_, T>(&self.sql);
        for param in &self.params {
            query = bind_sql_param!(query, param.clone());
        }
        query
    }

    pub fn query_scalar<T>(&self) -> sqlx::query::QueryScalar<'_, Postgres, T, PgArguments>
    where
        (T,): for<'r> sqlx::FromRow<'r, PgRow>,
    {
        let mut query = sqlx::query_scalar::<_, T>(&self.sql);
        for param in &self.params {
            query = bind_sql_param!(query, param.clone());
        }
        query
    }
}
