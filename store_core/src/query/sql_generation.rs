//! SQL rendering
//!
//! Every statement the repository sends is produced here. Identifiers come
//! from validated types; values only ever travel as numbered parameters.

use serde_json::Value;
use uuid::Uuid;

use super::field::{Field, FieldPath, FieldTarget, Operator, Query};
use super::options::{FindOptions, SortKey, SortOrder};
use super::params::{SqlParam, Statement};
use super::update::UpdateSet;
use crate::collection::{
    Collection, CREATED_AT_COLUMN, DATA_COLUMN, DOCUMENT_COLUMNS, ID_COLUMN, OWNER_COLUMN,
    UPDATED_AT_COLUMN,
};
use crate::document::Document;
use crate::errors::RepositoryError;

/// PostgreSQL accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Columns per inserted document
const INSERT_WIDTH: usize = 5;

/// Largest batch `insert` renders into a single statement
pub const MAX_INSERT_BATCH: usize = MAX_BIND_PARAMS / INSERT_WIDTH;

/// Column alias carrying the sort value of each page row
pub const CURSOR_VALUE_ALIAS: &str = "cursor_value";

/// Column alias carrying the total match count of a page
pub const TOTAL_COUNT_ALIAS: &str = "total_count";

/// Collects parameters and hands out sequential `$n` placeholders.
#[derive(Debug, Default)]
pub struct SqlWriter {
    params: Vec<SqlParam>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    /// Push a parameter compared with an expression of `sql_type`
    pub fn push_typed(&mut self, param: SqlParam, sql_type: &str) -> String {
        let cast = param.needs_cast(sql_type);
        let placeholder = self.push_param(param);
        if cast {
            format!("{}::{}", placeholder, sql_type)
        } else {
            placeholder
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

/// Keyset position decoded from a page cursor; `value` is `None` once the
/// page walk has reached rows without a sort value
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetPosition {
    pub value: Option<String>,
    pub id: Uuid,
}

pub struct SqlGenerator;

impl SqlGenerator {
    fn condition_sql(field: &Field, writer: &mut SqlWriter) -> Result<String, RepositoryError> {
        let target = field.target()?;
        let expr = target.render();
        let sql_type = target.sql_type();

        match field.operator {
            Operator::Eq if field.value.is_null() => Ok(format!("{} IS NULL", expr)),
            Operator::Ne if field.value.is_null() => Ok(format!("{} IS NOT NULL", expr)),
            Operator::Eq
            | Operator::Ne
            | Operator::Gt
            | Operator::Lt
            | Operator::Gte
            | Operator::Lte => {
                if field.value.is_null() {
                    return Err(RepositoryError::validation(format!(
                        "'{}' {} NULL: null only compares by equality",
                        field.name,
                        field.operator.as_sql()
                    )));
                }
                let param = SqlParam::for_type(&field.value, sql_type)?;
                let placeholder = writer.push_typed(param, sql_type);
                Ok(format!("{} {} {}", expr, field.operator.as_sql(), placeholder))
            }
            Operator::ILike => {
                let pattern = field.value.as_str().ok_or_else(|| {
                    RepositoryError::validation(format!(
                        "ILIKE on '{}' needs a string pattern",
                        field.name
                    ))
                })?;
                let lhs = if sql_type == "text" {
                    expr
                } else {
                    format!("({})::text", expr)
                };
                let placeholder = writer.push_param(SqlParam::Text(pattern.to_string()));
                Ok(format!("{} ILIKE {}", lhs, placeholder))
            }
            Operator::In => {
                let values = Self::array_value(field)?;
                if values.is_empty() {
                    return Ok("1=0".to_string());
                }
                let placeholders = values
                    .iter()
                    .map(|value| {
                        if value.is_null() {
                            return Err(RepositoryError::validation(format!(
                                "IN list for '{}' contains null",
                                field.name
                            )));
                        }
                        let param = SqlParam::for_type(value, sql_type)?;
                        Ok(writer.push_typed(param, sql_type))
                    })
                    .collect::<Result<Vec<_>, RepositoryError>>()?;
                Ok(format!("{} IN ({})", expr, placeholders.join(", ")))
            }
            Operator::Any => {
                let values = Self::array_value(field)?;
                let param = SqlParam::array_for_type(values, sql_type)?;
                let placeholder = writer.push_param(param);
                Ok(format!("{} = ANY({})", expr, placeholder))
            }
        }
    }

    fn array_value(field: &Field) -> Result<&[Value], RepositoryError> {
        match &field.value {
            Value::Array(values) => Ok(values),
            other => Err(RepositoryError::validation(format!(
                "{} on '{}' needs an array of values, got {}",
                field.operator.as_sql(),
                field.name,
                other
            ))),
        }
    }

    /// Render the filter's predicates, without the WHERE keyword
    pub fn build_conditions(
        query: &Query,
        writer: &mut SqlWriter,
    ) -> Result<Vec<String>, RepositoryError> {
        let mut parts = Vec::new();
        for field in &query.conditions {
            parts.push(Self::condition_sql(field, writer)?);
        }
        for group in query.or_groups.iter().filter(|group| !group.is_empty()) {
            let mut alternatives = group
                .iter()
                .map(|field| Self::condition_sql(field, writer))
                .collect::<Result<Vec<_>, _>>()?;
            if alternatives.len() == 1 {
                parts.append(&mut alternatives);
            } else {
                parts.push(format!("({})", alternatives.join(" OR ")));
            }
        }
        Ok(parts)
    }

    /// ` WHERE ...`, or nothing for the empty filter
    pub fn build_where_clause(
        query: &Query,
        writer: &mut SqlWriter,
    ) -> Result<String, RepositoryError> {
        Ok(Self::where_from_parts(Self::build_conditions(query, writer)?))
    }

    fn where_from_parts(parts: Vec<String>) -> String {
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    /// ` ORDER BY ...`; ties are broken by id so results are deterministic
    pub fn build_order_clause(sort: &[SortKey]) -> Result<String, RepositoryError> {
        if sort.is_empty() {
            return Ok(String::new());
        }

        let mut keys = Vec::with_capacity(sort.len() + 1);
        let mut has_id = false;
        for key in sort {
            let target = key.target()?;
            has_id |= matches!(&target, FieldTarget::Column(c) if c.as_str() == ID_COLUMN);
            keys.push(format!("{} {}", target.render(), key.order.to_sql()));
        }
        if !has_id {
            keys.push(format!("{} ASC", ID_COLUMN));
        }
        Ok(format!(" ORDER BY {}", keys.join(", ")))
    }

    pub fn build_limit_clause(options: &FindOptions) -> String {
        let mut clause = String::new();
        if let Some(limit) = options.limit {
            clause.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(skip) = options.skip {
            clause.push_str(&format!(" OFFSET {}", skip));
        }
        clause
    }

    pub fn build_select(
        collection: &Collection,
        query: &Query,
        options: &FindOptions,
    ) -> Result<Statement, RepositoryError> {
        options.validate()?;
        let mut writer = SqlWriter::new();
        let where_clause = Self::build_where_clause(query, &mut writer)?;
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            DOCUMENT_COLUMNS,
            collection.name(),
            where_clause,
            Self::build_order_clause(&options.sort)?,
            Self::build_limit_clause(options)
        );
        Ok(writer.finish(sql))
    }

    pub fn build_select_by_ids(collection: &Collection, ids: &[Uuid]) -> Statement {
        let mut writer = SqlWriter::new();
        let placeholder = writer.push_param(SqlParam::UuidArray(ids.to_vec()));
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ANY({})",
            DOCUMENT_COLUMNS,
            collection.name(),
            ID_COLUMN,
            placeholder
        );
        writer.finish(sql)
    }

    pub fn build_count(
        collection: &Collection,
        query: &Query,
    ) -> Result<Statement, RepositoryError> {
        let mut writer = SqlWriter::new();
        let where_clause = Self::build_where_clause(query, &mut writer)?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", collection.name(), where_clause);
        Ok(writer.finish(sql))
    }

    pub fn build_exists(
        collection: &Collection,
        query: &Query,
    ) -> Result<Statement, RepositoryError> {
        let mut writer = SqlWriter::new();
        let where_clause = Self::build_where_clause(query, &mut writer)?;
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {}{})",
            collection.name(),
            where_clause
        );
        Ok(writer.finish(sql))
    }

    /// Multi-row INSERT; `returning` adds the stored rows to the result
    pub fn build_insert(
        collection: &Collection,
        documents: &[Document],
        returning: bool,
    ) -> Result<Statement, RepositoryError> {
        if documents.is_empty() {
            return Err(RepositoryError::validation("nothing to insert"));
        }
        if documents.len() > MAX_INSERT_BATCH {
            return Err(RepositoryError::validation(format!(
                "batch of {} documents exceeds the limit of {} per statement",
                documents.len(),
                MAX_INSERT_BATCH
            )));
        }

        let mut writer = SqlWriter::new();
        let rows = documents
            .iter()
            .map(|doc| {
                let values = [
                    writer.push_param(SqlParam::Uuid(doc.id)),
                    writer.push_param(SqlParam::Uuid(doc.owner_id)),
                    writer.push_param(SqlParam::BigInt(doc.created_at)),
                    writer.push_param(SqlParam::BigInt(doc.updated_at)),
                    writer.push_param(SqlParam::Json(doc.data.clone())),
                ];
                format!("({})", values.join(", "))
            })
            .collect::<Vec<_>>();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            collection.name(),
            DOCUMENT_COLUMNS,
            rows.join(", ")
        );
        if returning {
            sql.push_str(&format!(" RETURNING {}", DOCUMENT_COLUMNS));
        }
        Ok(writer.finish(sql))
    }

    /// Update the first matching row (oldest first), returning it
    pub fn build_update_first(
        collection: &Collection,
        query: &Query,
        updates: &UpdateSet,
    ) -> Result<Statement, RepositoryError> {
        let mut writer = SqlWriter::new();
        let assignments = updates.render_assignments(collection, &mut writer)?;
        let where_clause = Self::build_where_clause(query, &mut writer)?;
        let sql = format!(
            "UPDATE {table} SET {} WHERE {id} = (SELECT {id} FROM {table}{} \
             ORDER BY {} ASC, {id} ASC LIMIT 1 FOR UPDATE) RETURNING {}",
            assignments,
            where_clause,
            CREATED_AT_COLUMN,
            DOCUMENT_COLUMNS,
            table = collection.name(),
            id = ID_COLUMN,
        );
        Ok(writer.finish(sql))
    }

    pub fn build_update_many(
        collection: &Collection,
        query: &Query,
        updates: &UpdateSet,
    ) -> Result<Statement, RepositoryError> {
        let mut writer = SqlWriter::new();
        let assignments = updates.render_assignments(collection, &mut writer)?;
        let where_clause = Self::build_where_clause(query, &mut writer)?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            collection.name(),
            assignments,
            where_clause
        );
        Ok(writer.finish(sql))
    }

    pub fn build_delete(
        collection: &Collection,
        query: &Query,
    ) -> Result<Statement, RepositoryError> {
        let mut writer = SqlWriter::new();
        let where_clause = Self::build_where_clause(query, &mut writer)?;
        let sql = format!("DELETE FROM {}{}", collection.name(), where_clause);
        Ok(writer.finish(sql))
    }

    /// Single-statement update scoped to id and owner, returning the row
    pub fn build_owned_update(
        collection: &Collection,
        id: Uuid,
        owner_id: Uuid,
        updates: &UpdateSet,
    ) -> Result<Statement, RepositoryError> {
        let mut writer = SqlWriter::new();
        let assignments = updates.render_assignments(collection, &mut writer)?;
        let id_placeholder = writer.push_param(SqlParam::Uuid(id));
        let owner_placeholder = writer.push_param(SqlParam::Uuid(owner_id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {} AND {} = {} RETURNING {}",
            collection.name(),
            assignments,
            ID_COLUMN,
            id_placeholder,
            OWNER_COLUMN,
            owner_placeholder,
            DOCUMENT_COLUMNS
        );
        Ok(writer.finish(sql))
    }

    pub fn build_owned_delete(collection: &Collection, id: Uuid, owner_id: Uuid) -> Statement {
        let mut writer = SqlWriter::new();
        let id_placeholder = writer.push_param(SqlParam::Uuid(id));
        let owner_placeholder = writer.push_param(SqlParam::Uuid(owner_id));
        let sql = format!(
            "DELETE FROM {} WHERE {} = {} AND {} = {}",
            collection.name(),
            ID_COLUMN,
            id_placeholder,
            OWNER_COLUMN,
            owner_placeholder
        );
        writer.finish(sql)
    }

    /// Resolve a lookup key, which must evaluate to a uuid
    fn uuid_target(field: &FieldPath) -> Result<FieldTarget, RepositoryError> {
        let target = if field.is_semi_structured && field.cast.is_none() {
            field.clone().with_cast("uuid").resolve()?
        } else {
            field.resolve()?
        };
        if target.sql_type() != "uuid" {
            return Err(RepositoryError::validation(format!(
                "lookup key '{}' must be a uuid, not {}",
                field.name,
                target.sql_type()
            )));
        }
        Ok(target)
    }

    /// Which of `ids` the actor has a row for
    pub fn build_lookup_flags(
        collection: &Collection,
        target: &FieldPath,
        actor_field: &FieldPath,
        actor: Uuid,
        ids: &[Uuid],
    ) -> Result<Statement, RepositoryError> {
        let target = Self::uuid_target(target)?.render();
        let actor_expr = Self::uuid_target(actor_field)?.render();

        let mut writer = SqlWriter::new();
        let actor_placeholder = writer.push_param(SqlParam::Uuid(actor));
        let ids_placeholder = writer.push_param(SqlParam::UuidArray(ids.to_vec()));
        let sql = format!(
            "SELECT DISTINCT {target} FROM {} WHERE {} = {} AND {target} = ANY({})",
            collection.name(),
            actor_expr,
            actor_placeholder,
            ids_placeholder,
            target = target,
        );
        Ok(writer.finish(sql))
    }

    /// Latest `value` per id among the actor's rows
    pub fn build_lookup_values(
        collection: &Collection,
        target: &FieldPath,
        actor_field: &FieldPath,
        value: &FieldPath,
        actor: Uuid,
        ids: &[Uuid],
    ) -> Result<Statement, RepositoryError> {
        let target = Self::uuid_target(target)?.render();
        let actor_expr = Self::uuid_target(actor_field)?.render();
        let value_expr = match value.resolve()? {
            FieldTarget::Attribute { path, cast: None } => path.json_accessor(DATA_COLUMN),
            other => format!("to_jsonb({})", other.render()),
        };

        let mut writer = SqlWriter::new();
        let actor_placeholder = writer.push_param(SqlParam::Uuid(actor));
        let ids_placeholder = writer.push_param(SqlParam::UuidArray(ids.to_vec()));
        let sql = format!(
            "SELECT DISTINCT ON ({target}) {target}, {} FROM {} \
             WHERE {} = {} AND {target} = ANY({}) ORDER BY {target}, {} DESC",
            value_expr,
            collection.name(),
            actor_expr,
            actor_placeholder,
            ids_placeholder,
            UPDATED_AT_COLUMN,
            target = target,
        );
        Ok(writer.finish(sql))
    }

    /// Keyset page: `fetch` rows after `position` in `sort` order, with the
    /// sort value as text and, optionally, the unpaged match count.
    /// Rows missing an attribute sort value follow all others, by id.
    pub fn build_page(
        collection: &Collection,
        query: &Query,
        sort: &SortKey,
        position: Option<&KeysetPosition>,
        fetch: i64,
        include_total: bool,
    ) -> Result<Statement, RepositoryError> {
        let target = sort.target()?;
        let expr = target.render();
        let mut writer = SqlWriter::new();

        let total = if include_total {
            let where_clause = Self::build_where_clause(query, &mut writer)?;
            format!(
                ", (SELECT COUNT(*) FROM {}{}) AS {}",
                collection.name(),
                where_clause,
                TOTAL_COUNT_ALIAS
            )
        } else {
            String::new()
        };

        let nullable = target.is_attribute();
        let mut parts = Self::build_conditions(query, &mut writer)?;
        if let Some(position) = position {
            let comparison = match sort.order {
                SortOrder::Asc => ">",
                SortOrder::Desc => "<",
            };
            match &position.value {
                Some(value) => {
                    let value =
                        writer.push_typed(SqlParam::Text(value.clone()), target.sql_type());
                    let id = writer.push_param(SqlParam::Uuid(position.id));
                    let keyset =
                        format!("({}, {}) {} ({}, {})", expr, ID_COLUMN, comparison, value, id);
                    if nullable {
                        parts.push(format!("({} OR {} IS NULL)", keyset, expr));
                    } else {
                        parts.push(keyset);
                    }
                }
                None if nullable => {
                    let id = writer.push_param(SqlParam::Uuid(position.id));
                    parts.push(format!(
                        "{} IS NULL AND {} {} {}",
                        expr, ID_COLUMN, comparison, id
                    ));
                }
                None => {
                    return Err(RepositoryError::validation(format!(
                        "cursor for '{}' carries no sort value",
                        sort.field.name
                    )));
                }
            }
        }

        let direction = sort.order.to_sql();
        let nulls = if nullable { " NULLS LAST" } else { "" };
        let sql = format!(
            "SELECT {}, ({})::text AS {}{} FROM {}{} ORDER BY {} {}{}, {} {} LIMIT {}",
            DOCUMENT_COLUMNS,
            expr,
            CURSOR_VALUE_ALIAS,
            total,
            collection.name(),
            Self::where_from_parts(parts),
            expr,
            direction,
            nulls,
            ID_COLUMN,
            direction,
            fetch
        );
        Ok(writer.finish(sql))
    }
}
