use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RepositoryError;
use crate::retry::RetryPolicy;

/// Longest timeout a transaction may be configured with
pub const MAX_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(600);

pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Whatever the server's `default_transaction_isolation` is
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Clause for `SET TRANSACTION ISOLATION LEVEL`, `None` for the server default
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            IsolationLevel::Default => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }

    /// Guarantees actually provided by PostgreSQL: read uncommitted behaves as
    /// read committed, which is also the stock server default.
    pub fn strength(&self) -> u8 {
        match self {
            IsolationLevel::Default
            | IsolationLevel::ReadUncommitted
            | IsolationLevel::ReadCommitted => 1,
            IsolationLevel::RepeatableRead => 2,
            IsolationLevel::Serializable => 3,
        }
    }

    /// Whether a transaction at this level can host work that asked for `requested`
    pub fn satisfies(&self, requested: IsolationLevel) -> bool {
        self.strength() >= requested.strength()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::Default => "default",
            IsolationLevel::ReadUncommitted => "read_uncommitted",
            IsolationLevel::ReadCommitted => "read_committed",
            IsolationLevel::RepeatableRead => "repeatable_read",
            IsolationLevel::Serializable => "serializable",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "default" | "" => Ok(IsolationLevel::Default),
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(RepositoryError::validation(format!(
                "unknown isolation level '{}'",
                s
            ))),
        }
    }
}

/// Fully resolved transaction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionConfig {
    pub timeout: Duration,
    pub read_only: bool,
    pub isolation_level: IsolationLevel,
    /// `None` disables retries for `run_in_transaction`
    pub retry_policy: Option<RetryPolicy>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TRANSACTION_TIMEOUT,
            read_only: false,
            isolation_level: IsolationLevel::ReadCommitted,
            retry_policy: Some(RetryPolicy::default()),
        }
    }
}

impl TransactionConfig {
    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.timeout.is_zero() {
            return Err(RepositoryError::validation(
                "transaction timeout must be positive",
            ));
        }
        if self.timeout > MAX_TRANSACTION_TIMEOUT {
            return Err(RepositoryError::validation(format!(
                "transaction timeout {:?} exceeds the maximum of {:?}",
                self.timeout, MAX_TRANSACTION_TIMEOUT
            )));
        }
        if let Some(policy) = &self.retry_policy {
            policy.validate()?;
        }
        Ok(())
    }

    /// Fill the unset fields of `partial` from `self`
    pub fn merge(&self, partial: Option<&PartialTransactionConfig>) -> TransactionConfig {
        let Some(partial) = partial else {
            return self.clone();
        };
        TransactionConfig {
            timeout: partial.timeout.unwrap_or(self.timeout),
            read_only: partial.read_only.unwrap_or(self.read_only),
            isolation_level: partial.isolation_level.unwrap_or(self.isolation_level),
            retry_policy: partial
                .retry_policy
                .clone()
                .unwrap_or_else(|| self.retry_policy.clone()),
        }
    }
}

pub fn default_transaction_config() -> TransactionConfig {
    TransactionConfig::default()
}

/// Merge caller settings over the library defaults
pub fn merge_transaction_config(partial: Option<&PartialTransactionConfig>) -> TransactionConfig {
    TransactionConfig::default().merge(partial)
}

/// Caller-supplied settings; unset fields take the defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialTransactionConfig {
    pub timeout: Option<Duration>,
    pub read_only: Option<bool>,
    pub isolation_level: Option<IsolationLevel>,
    /// `Some(None)` explicitly disables retries
    pub retry_policy: Option<Option<RetryPolicy>>,
}

impl PartialTransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(Some(policy));
        self
    }

    pub fn without_retries(mut self) -> Self {
        self.retry_policy = Some(None);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn test_merge_without_overrides_is_default() {
        assert_eq!(merge_transaction_config(None), default_transaction_config());
        assert_eq!(
            merge_transaction_config(Some(&PartialTransactionConfig::new())),
            TransactionConfig::default()
        );
    }

    #[test]
    fn test_merge_preserves_explicit_fields() {
        let partial = PartialTransactionConfig::new()
            .isolation_level(IsolationLevel::Serializable)
            .timeout(Duration::from_secs(5))
            .without_retries();
        let merged = merge_transaction_config(Some(&partial));
        assert_eq!(merged.isolation_level, IsolationLevel::Serializable);
        assert_eq!(merged.timeout, Duration::from_secs(5));
        assert!(!merged.read_only);
        assert_eq!(merged.retry_policy, None);
    }

    #[test]
    fn test_timeout_bounds() {
        let zero = TransactionConfig {
            timeout: Duration::ZERO,
            ..TransactionConfig::default()
        };
        assert_eq!(zero.validate().unwrap_err().code(), ErrorCode::Validation);

        let long = TransactionConfig {
            timeout: MAX_TRANSACTION_TIMEOUT + Duration::from_secs(1),
            ..TransactionConfig::default()
        };
        assert!(long.validate().is_err());

        let max = TransactionConfig {
            timeout: MAX_TRANSACTION_TIMEOUT,
            ..TransactionConfig::default()
        };
        assert!(max.validate().is_ok());
    }

    #[test]
    fn test_invalid_retry_policy_rejected() {
        let config = merge_transaction_config(Some(
            &PartialTransactionConfig::new().retry_policy(RetryPolicy::default().with_jitter(-0.1)),
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_isolation_parsing_and_strength() {
        assert_eq!(
            "read_committed".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "REPEATABLE READ".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!("serializable".parse::<IsolationLevel>().unwrap(), IsolationLevel::Serializable);
        assert!("snapshot".parse::<IsolationLevel>().is_err());

        assert!(IsolationLevel::Serializable.satisfies(IsolationLevel::ReadCommitted));
        assert!(IsolationLevel::ReadCommitted.satisfies(IsolationLevel::ReadUncommitted));
        assert!(!IsolationLevel::ReadCommitted.satisfies(IsolationLevel::RepeatableRead));
        assert_eq!(IsolationLevel::Default.as_sql(), None);
        assert_eq!(IsolationLevel::Serializable.as_sql(), Some("SERIALIZABLE"));
    }
}
