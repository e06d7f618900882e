use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::id_type::IntoObjectId;

/// Current time in unix milliseconds, the unit of `created_at`/`updated_at`
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One stored row of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub data: Value,
}

impl Document {
    /// Build a document stamped with the current time
    pub fn new<P: Serialize>(
        id: impl IntoObjectId,
        owner_id: impl IntoObjectId,
        payload: &P,
    ) -> Result<Self, RepositoryError> {
        let now = now_millis();
        Ok(Self {
            id: id.into_object_id("id")?,
            owner_id: owner_id.into_object_id("owner id")?,
            created_at: now,
            updated_at: now,
            data: payload_to_object(payload)?,
        })
    }

    /// Deserialize the attribute bag into a domain type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RepositoryError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Look up a dotted attribute path
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(&self.data, |value, key| value.get(key))
    }
}

/// Payloads are stored as JSON objects; anything else is rejected.
pub(crate) fn payload_to_object<P: Serialize>(payload: &P) -> Result<Value, RepositoryError> {
    match serde_json::to_value(payload)? {
        value @ Value::Object(_) => Ok(value),
        other => Err(RepositoryError::validation(format!(
            "payload must serialize to a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
