//! Explicit transactions
//!
//! A [`Transaction`] owns one pooled connection from begin until commit or
//! rollback. Clones share the same underlying transaction; statements issued
//! through clones are serialized on its connection.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use super::config::TransactionConfig;
use super::metrics::{TransactionMetrics, TransactionStatus};
use crate::context::OperationContext;
use crate::errors::RepositoryError;
use crate::session::Session;

type PgTransaction = sqlx::Transaction<'static, Postgres>;

struct TransactionInner {
    id: Uuid,
    config: TransactionConfig,
    pool: PgPool,
    started_at: DateTime<Utc>,
    started: Instant,
    deadline: Instant,
    status: AtomicU8,
    finished_after: OnceLock<Duration>,
    operations: AtomicU64,
    busy_nanos: AtomicU64,
    connection: Mutex<Option<PgTransaction>>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let status = TransactionStatus::from_u8(self.status.load(Ordering::SeqCst));
        if status == TransactionStatus::Active {
            // sqlx queues the rollback when the connection goes back to the pool
            tracing::warn!(
                transaction_id = %self.id,
                operations = self.operations.load(Ordering::SeqCst),
                "transaction dropped while active, rolling back"
            );
        }
    }
}

#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .field("isolation_level", &self.inner.config.isolation_level)
            .field("read_only", &self.inner.config.read_only)
            .finish()
    }
}

/// Exclusive use of the transaction's connection for one statement
pub(crate) struct ConnectionGuard<'a> {
    guard: MutexGuard<'a, Option<PgTransaction>>,
}

impl ConnectionGuard<'_> {
    pub(crate) fn connection(&mut self) -> Result<&mut PgConnection, RepositoryError> {
        self.guard
            .as_mut()
            .map(|tx| &mut **tx)
            .ok_or_else(|| RepositoryError::transaction_inactive("use", "finished"))
    }
}

/// Statements that pin the transaction's mode and bound each statement
fn setup_statements(config: &TransactionConfig) -> Vec<String> {
    let mut modes = Vec::new();
    if let Some(level) = config.isolation_level.as_sql() {
        modes.push(format!("ISOLATION LEVEL {}", level));
    }
    if config.read_only {
        modes.push("READ ONLY".to_string());
    }

    let mut statements = Vec::new();
    if !modes.is_empty() {
        statements.push(format!("SET TRANSACTION {}", modes.join(", ")));
    }
    statements.push(format!(
        "SET LOCAL statement_timeout = {}",
        config.timeout.as_millis()
    ));
    statements
}

impl Transaction {
    /// Open a transaction on a fresh pooled connection.
    ///
    /// The transaction's deadline is the earlier of `ctx`'s deadline and
    /// `config.timeout` from now.
    pub async fn begin(
        pool: &PgPool,
        config: TransactionConfig,
        ctx: &OperationContext,
    ) -> Result<Self, RepositoryError> {
        config.validate()?;

        let started = Instant::now();
        let bounded = ctx.bounded_by(started + config.timeout);
        let deadline = bounded.deadline().unwrap_or(started + config.timeout);

        let connection = bounded
            .run("begin transaction", async {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| RepositoryError::from_sqlx("begin transaction", e))?;
                for statement in setup_statements(&config) {
                    sqlx::query(&statement)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| RepositoryError::from_sqlx("configure transaction", e))?;
                }
                Ok::<_, RepositoryError>(tx)
            })
            .await?;

        let id = Uuid::new_v4();
        tracing::debug!(
            transaction_id = %id,
            isolation_level = %config.isolation_level,
            read_only = config.read_only,
            timeout_ms = config.timeout.as_millis() as u64,
            "transaction started"
        );

        Ok(Self {
            inner: Arc::new(TransactionInner {
                id,
                config,
                pool: pool.clone(),
                started_at: Utc::now(),
                started,
                deadline,
                status: AtomicU8::new(TransactionStatus::Active.to_u8()),
                finished_after: OnceLock::new(),
                operations: AtomicU64::new(0),
                busy_nanos: AtomicU64::new(0),
                connection: Mutex::new(Some(connection)),
            }),
        })
    }

    pub fn transaction_id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.inner.config
    }

    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_u8(self.inner.status.load(Ordering::SeqCst))
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Session whose operations run inside this transaction
    pub fn session(&self) -> Session {
        Session::for_transaction(self.clone(), OperationContext::background())
    }

    pub fn session_with_context(&self, ctx: OperationContext) -> Session {
        Session::for_transaction(self.clone(), ctx)
    }

    fn ensure_active(&self, action: &str) -> Result<(), RepositoryError> {
        match self.status() {
            TransactionStatus::Active => Ok(()),
            status => Err(RepositoryError::transaction_inactive(action, status)),
        }
    }

    fn ensure_within_deadline(&self) -> Result<(), RepositoryError> {
        if Instant::now() >= self.inner.deadline {
            return Err(RepositoryError::timeout(format!(
                "transaction {} exceeded its timeout of {:?}",
                self.inner.id, self.inner.config.timeout
            )));
        }
        Ok(())
    }

    /// Context for a statement: the caller's, capped by the transaction deadline
    pub(crate) fn statement_context(&self, ctx: &OperationContext) -> OperationContext {
        ctx.bounded_by(self.inner.deadline)
    }

    /// Wait for the connection and count the operation
    pub(crate) async fn acquire(
        &self,
        operation: &str,
    ) -> Result<ConnectionGuard<'_>, RepositoryError> {
        self.ensure_active(operation)?;
        self.ensure_within_deadline()?;

        let guard = tokio::time::timeout_at(self.inner.deadline, self.inner.connection.lock())
            .await
            .map_err(|_| {
                RepositoryError::timeout(format!(
                    "transaction {} timed out waiting for its connection",
                    self.inner.id
                ))
            })?;
        if guard.is_none() {
            return Err(RepositoryError::transaction_inactive(operation, self.status()));
        }

        self.inner.operations.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionGuard { guard })
    }

    pub(crate) fn record_operation(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.inner.busy_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    fn finish(&self, status: TransactionStatus) {
        self.inner.status.store(status.to_u8(), Ordering::SeqCst);
        let _ = self.inner.finished_after.set(self.inner.started.elapsed());
    }

    /// Commit. A transaction past its deadline is left open for the caller
    /// to roll back; a failed commit leaves it rolled back.
    pub async fn commit(&self) -> Result<TransactionMetrics, RepositoryError> {
        let mut guard = self.inner.connection.lock().await;
        self.ensure_active("commit")?;
        self.ensure_within_deadline()?;

        let tx = guard
            .take()
            .ok_or_else(|| RepositoryError::transaction_inactive("commit", self.status()))?;
        let result = tx.commit().await;
        match result {
            Ok(()) => {
                self.finish(TransactionStatus::Committed);
                drop(guard);
                let metrics = self.metrics();
                tracing::debug!(
                    transaction_id = %self.inner.id,
                    operations = metrics.operations_count,
                    duration_ms = metrics.duration.as_millis() as u64,
                    "transaction committed"
                );
                Ok(metrics)
            }
            Err(error) => {
                self.finish(TransactionStatus::RolledBack);
                tracing::warn!(transaction_id = %self.inner.id, %error, "commit failed");
                Err(RepositoryError::from_sqlx("commit transaction", error))
            }
        }
    }

    pub async fn rollback(&self) -> Result<TransactionMetrics, RepositoryError> {
        let mut guard = self.inner.connection.lock().await;
        self.ensure_active("roll back")?;

        let tx = guard
            .take()
            .ok_or_else(|| RepositoryError::transaction_inactive("roll back", self.status()))?;
        let result = tx.rollback().await;
        self.finish(TransactionStatus::RolledBack);
        drop(guard);

        match result {
            Ok(()) => {
                tracing::debug!(transaction_id = %self.inner.id, "transaction rolled back");
                Ok(self.metrics())
            }
            // the server discards the transaction with the connection either way
            Err(error) => Err(RepositoryError::from_sqlx("roll back transaction", error)),
        }
    }

    pub fn metrics(&self) -> TransactionMetrics {
        let inner = &self.inner;
        TransactionMetrics {
            transaction_id: inner.id,
            status: self.status(),
            isolation_level: inner.config.isolation_level,
            read_only: inner.config.read_only,
            started_at: inner.started_at,
            duration: inner
                .finished_after
                .get()
                .copied()
                .unwrap_or_else(|| inner.started.elapsed()),
            operations_count: inner.operations.load(Ordering::SeqCst),
            busy_time: Duration::from_nanos(inner.busy_nanos.load(Ordering::SeqCst)),
        }
    }
}
