//! Index definitions
//!
//! Indexes may cover first-class columns and attribute expressions alike.

use crate::collection::Collection;
use crate::errors::RepositoryError;
use crate::query::{FieldPath, FieldTarget, SortOrder};
use crate::validation::{sanitize_name, ValidatedFieldName};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub field: FieldPath,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: Option<String>,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, order: SortOrder) -> Self {
        self.keys.push(IndexKey {
            field: FieldPath::column(name),
            order,
        });
        self
    }

    /// Expression key on an attribute, optionally cast (e.g. `bigint`)
    pub fn attribute(mut self, path: &str, cast: Option<&str>, order: SortOrder) -> Self {
        let mut field = FieldPath::attribute(path);
        if let Some(cast) = cast {
            field = field.with_cast(cast);
        }
        self.keys.push(IndexKey { field, order });
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Explicit name, or `<table>_<keys>_idx`
    pub fn index_name(&self, collection: &Collection) -> Result<String, RepositoryError> {
        if let Some(name) = &self.name {
            return Ok(ValidatedFieldName::new(name)?.as_str().to_string());
        }
        let keys = self
            .keys
            .iter()
            .map(|key| key.field.name.replace('.', "_"))
            .collect::<Vec<_>>()
            .join("_");
        Ok(sanitize_name(&format!("{}_{}_idx", collection.name(), keys)))
    }

    pub fn create_sql(&self, collection: &Collection) -> Result<String, RepositoryError> {
        if self.keys.is_empty() {
            return Err(RepositoryError::validation(format!(
                "index on '{}' has no keys",
                collection.name()
            )));
        }

        let keys = self
            .keys
            .iter()
            .map(|key| {
                let target = key.field.resolve()?;
                let expr = match target {
                    FieldTarget::Column(_) => target.render(),
                    // expression keys need their own parentheses
                    FieldTarget::Attribute { .. } => format!("({})", target.render()),
                };
                Ok(format!("{} {}", expr, key.order.to_sql()))
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            self.index_name(collection)?,
            collection.name(),
            keys.join(", ")
        ))
    }
}
