//! Bulk per-actor lookups
//!
//! Answer "which of these N items has this actor touched" with one round
//! trip, whatever N is.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use super::Session;
use crate::collection::{Collection, OWNER_COLUMN};
use crate::errors::RepositoryError;
use crate::id_type::IntoObjectId;
use crate::query::{FieldPath, SqlGenerator};

/// Attribute of a vote document naming the comment voted on
pub const VOTE_TARGET_ATTRIBUTE: &str = "comment_id";

/// Rows of one actor, keyed by the item they reference
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLookup {
    /// Field holding the referenced item id
    pub target: FieldPath,
    /// Field identifying the actor, `owner_id` unless overridden
    pub actor_field: FieldPath,
    pub actor: Uuid,
    pub ids: Vec<Uuid>,
}

impl BulkLookup {
    pub fn new(target: FieldPath, actor: Uuid, ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            target,
            actor_field: FieldPath::column(OWNER_COLUMN),
            actor,
            ids: ids.into_iter().collect(),
        }
    }

    pub fn actor_field(mut self, field: FieldPath) -> Self {
        self.actor_field = field;
        self
    }

    /// Requested ids without duplicates, first occurrence wins
    fn distinct_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::with_capacity(self.ids.len());
        self.ids.iter().copied().filter(|id| seen.insert(*id)).collect()
    }
}

impl Session {
    /// Map every requested id to whether the actor has a row referencing it
    pub async fn lookup_flags(
        &self,
        collection: &Collection,
        lookup: &BulkLookup,
    ) -> Result<HashMap<Uuid, bool>, RepositoryError> {
        let ids = lookup.distinct_ids();
        let mut flags: HashMap<Uuid, bool> = ids.iter().map(|id| (*id, false)).collect();
        if ids.is_empty() {
            return Ok(flags);
        }

        let stmt = SqlGenerator::build_lookup_flags(
            collection,
            &lookup.target,
            &lookup.actor_field,
            lookup.actor,
            &ids,
        )?;
        crate::trace_log!("[LOOKUP] {}: {}", collection.name(), stmt.sql);
        let found = execute_on!(self, "bulk lookup", |conn| stmt
            .query_scalar::<Uuid>()
            .fetch_all(conn))?;

        for id in found {
            flags.insert(id, true);
        }
        Ok(flags)
    }

    /// Latest `value` of the actor's row per requested id; ids without a
    /// row are absent from the result
    pub async fn lookup_values(
        &self,
        collection: &Collection,
        lookup: &BulkLookup,
        value: &FieldPath,
    ) -> Result<HashMap<Uuid, Value>, RepositoryError> {
        let ids = lookup.distinct_ids();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let stmt = SqlGenerator::build_lookup_values(
            collection,
            &lookup.target,
            &lookup.actor_field,
            value,
            lookup.actor,
            &ids,
        )?;
        let rows = execute_on!(self, "bulk value lookup", |conn| stmt
            .query_as::<(Uuid, Option<Value>)>()
            .fetch_all(conn))?;

        Ok(rows
            .into_iter()
            .map(|(id, value)| (id, value.unwrap_or(Value::Null)))
            .collect())
    }

    /// Which of `comment_ids` the user has voted on. Every requested id is
    /// present in the result.
    pub async fn get_user_votes_for_comments(
        &self,
        votes: &Collection,
        comment_ids: &[Uuid],
        user_id: impl IntoObjectId,
    ) -> Result<HashMap<Uuid, bool>, RepositoryError> {
        let user_id = user_id.into_object_id("user id")?;
        let lookup = BulkLookup::new(
            FieldPath::attribute(VOTE_TARGET_ATTRIBUTE),
            user_id,
            comment_ids.iter().copied(),
        );
        self.lookup_flags(votes, &lookup).await
    }
}
