//! Identifier validation
//!
//! Everything interpolated into SQL text (table names, column names, JSONB
//! attribute paths, casts, index names) passes through here first. Values are
//! always bound as parameters.

use std::fmt;

/// PostgreSQL identifier length limit
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Casts accepted for semi-structured attribute predicates
const ALLOWED_CASTS: &[&str] = &[
    "text",
    "int",
    "integer",
    "bigint",
    "smallint",
    "numeric",
    "real",
    "float8",
    "double precision",
    "boolean",
    "bool",
    "uuid",
    "date",
    "timestamptz",
    "timestamp",
    "jsonb",
];

const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANY", "ARRAY", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CASE",
    "CHECK", "COLUMN", "COMMIT", "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC",
    "DISTINCT", "DROP", "ELSE", "END", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FOR", "FOREIGN",
    "FROM", "FULL", "GRANT", "GROUP", "HAVING", "ILIKE", "IN", "INDEX", "INNER", "INSERT",
    "INTERSECT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON",
    "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RETURNING", "RIGHT", "ROLLBACK", "SELECT",
    "SET", "TABLE", "THEN", "TO", "TRUE", "UNION", "UNIQUE", "UPDATE", "USER", "USING", "VALUES",
    "WHEN", "WHERE", "WITH",
];

/// Validation errors for database identifiers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid characters in name '{0}': only alphanumeric characters and underscores are allowed")]
    InvalidCharacters(String),
    #[error("Name '{name}' is too long: {length} characters (max {max_length})")]
    TooLong {
        name: String,
        length: usize,
        max_length: usize,
    },
    #[error("Name cannot be empty")]
    Empty,
    #[error("Name '{0}' must start with a letter or underscore")]
    InvalidStartCharacter(String),
    #[error("Name '{0}' is a reserved SQL keyword")]
    ReservedKeyword(String),
    #[error("Cast '{0}' is not supported for attribute predicates")]
    UnsupportedCast(String),
}

fn validate_identifier(name: &str, reject_keywords: bool) -> Result<(), ValidationError> {
    let first_char = name.chars().next().ok_or(ValidationError::Empty)?;

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            name: name.to_string(),
            length: name.len(),
            max_length: MAX_IDENTIFIER_LENGTH,
        });
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ValidationError::InvalidStartCharacter(name.to_string()));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidCharacters(name.to_string()));
    }

    if reject_keywords && RESERVED_KEYWORDS.contains(&name.to_ascii_uppercase().as_str()) {
        return Err(ValidationError::ReservedKeyword(name.to_string()));
    }

    Ok(())
}

/// A validated table name that is safe to use in SQL queries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedTableName(String);

impl ValidatedTableName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        validate_identifier(name, true)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated column name that is safe to use in SQL queries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedFieldName(String);

impl ValidatedFieldName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        validate_identifier(name, true)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedFieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dotted path into the JSONB attribute bag, e.g. `stats.votes`.
///
/// Segments are rendered inside SQL string literals, so keywords are allowed
/// but quoting characters are not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath(Vec<String>);

impl AttributePath {
    pub fn parse(path: &str) -> Result<Self, ValidationError> {
        if path.is_empty() {
            return Err(ValidationError::Empty);
        }
        let segments = path
            .split('.')
            .map(|segment| validate_identifier(segment, false).map(|_| segment.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment; the permitted-attribute check applies to it
    pub fn root(&self) -> &str {
        &self.0[0]
    }

    pub fn is_nested(&self) -> bool {
        self.0.len() > 1
    }

    /// Enclosing paths, outermost first: `a.b.c` gives `a`, `a.b`
    pub fn parents(&self) -> Vec<AttributePath> {
        (1..self.0.len())
            .map(|len| AttributePath(self.0[..len].to_vec()))
            .collect()
    }

    /// Whether `other` lies strictly inside this path
    pub fn contains(&self, other: &AttributePath) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Postgres text-array literal for `#>`/`jsonb_set`, e.g. `'{stats,votes}'`
    pub fn to_pg_path(&self) -> String {
        format!("'{{{}}}'", self.0.join(","))
    }

    /// Text accessor on a JSONB column: `data->>'a'` or `data#>>'{a,b}'`
    pub fn text_accessor(&self, column: &str) -> String {
        if self.is_nested() {
            format!("{}#>>{}", column, self.to_pg_path())
        } else {
            format!("{}->>'{}'", column, self.0[0])
        }
    }

    /// JSONB accessor: `data->'a'` or `data#>'{a,b}'`
    pub fn json_accessor(&self, column: &str) -> String {
        if self.is_nested() {
            format!("{}#>{}", column, self.to_pg_path())
        } else {
            format!("{}->'{}'", column, self.0[0])
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Normalize and check a cast used on an attribute accessor
pub fn validate_cast(cast: &str) -> Result<String, ValidationError> {
    let normalized = cast.trim().to_ascii_lowercase();
    if ALLOWED_CASTS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(ValidationError::UnsupportedCast(cast.to_string()))
    }
}

/// Sanitize a name by replacing invalid characters with underscores.
/// Used for generated index names; may create naming conflicts.
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let allowed = c.is_ascii_alphanumeric() || c == '_';
            if (i == 0 && (c.is_ascii_alphabetic() || c == '_')) || (i > 0 && allowed) {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    sanitized.truncate(MAX_IDENTIFIER_LENGTH);

    if sanitized.is_empty() {
        sanitized = "unnamed".to_string();
    }

    sanitized
}
