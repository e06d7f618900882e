use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::config::IsolationLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TransactionStatus::Active => 0,
            TransactionStatus::Committed => 1,
            TransactionStatus::RolledBack => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionStatus::Active,
            1 => TransactionStatus::Committed,
            _ => TransactionStatus::RolledBack,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled back",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a transaction's activity.
///
/// Once the transaction has ended the snapshot no longer changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionMetrics {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub isolation_level: IsolationLevel,
    pub read_only: bool,
    pub started_at: DateTime<Utc>,
    /// Wall time from begin until commit/rollback, or until now while active
    pub duration: Duration,
    pub operations_count: u64,
    /// Time spent inside statements
    pub busy_time: Duration,
}
