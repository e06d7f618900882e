//! Id Type module
//!
//! Resource and owner identifiers are UUIDs in storage. Callers frequently
//! hold them as strings (path parameters, token claims), so every operation
//! accepts anything implementing [`IntoObjectId`] and rejects malformed input
//! before a statement is built.

use uuid::Uuid;

use crate::errors::RepositoryError;

/// Conversion into a stored identifier.
pub trait IntoObjectId {
    /// `role` names the argument in the validation error ("id", "owner id", ...)
    fn into_object_id(self, role: &str) -> Result<Uuid, RepositoryError>;
}

impl IntoObjectId for Uuid {
    fn into_object_id(self, _role: &str) -> Result<Uuid, RepositoryError> {
        Ok(self)
    }
}

impl IntoObjectId for &Uuid {
    fn into_object_id(self, _role: &str) -> Result<Uuid, RepositoryError> {
        Ok(*self)
    }
}

impl IntoObjectId for &str {
    fn into_object_id(self, role: &str) -> Result<Uuid, RepositoryError> {
        Uuid::parse_str(self.trim()).map_err(|_| {
            RepositoryError::validation(format!("invalid {} format: '{}'", role, self))
        })
    }
}

impl IntoObjectId for String {
    fn into_object_id(self, role: &str) -> Result<Uuid, RepositoryError> {
        self.as_str().into_object_id(role)
    }
}

impl IntoObjectId for &String {
    fn into_object_id(self, role: &str) -> Result<Uuid, RepositoryError> {
        self.as_str().into_object_id(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn test_uuid_passthrough() {
        let id = Uuid::new_v4();
        assert_eq!(id.into_object_id("id").unwrap(), id);
        assert_eq!((&id).into_object_id("id").unwrap(), id);
    }

    #[test]
    fn test_string_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(id.to_string().into_object_id("id").unwrap(), id);
        assert_eq!(format!(" {} ", id).as_str().into_object_id("id").unwrap(), id);
    }

    #[test]
    fn test_malformed_owner_is_validation_error() {
        let err = "not-a-user".into_object_id("owner id").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        assert!(err.message().contains("owner id"));
    }
}
