//! Transaction configuration, lifecycle and metrics

pub mod config;
pub mod lifecycle;
pub mod metrics;

pub use config::{
    default_transaction_config, merge_transaction_config, IsolationLevel,
    PartialTransactionConfig, TransactionConfig, DEFAULT_TRANSACTION_TIMEOUT,
    MAX_TRANSACTION_TIMEOUT,
};
pub use lifecycle::Transaction;
pub use metrics::{TransactionMetrics, TransactionStatus};
