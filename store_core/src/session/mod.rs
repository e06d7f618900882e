//! Sessions
//!
//! A [`Session`] is the handle every repository operation runs through. It is
//! either bound to a [`Transaction`], in which case all statements share that
//! transaction's connection, or it runs each statement on its own pooled
//! connection.

use std::fmt;

use sqlx::PgPool;

use crate::context::OperationContext;
use crate::errors::RepositoryError;
use crate::transaction::{
    PartialTransactionConfig, Transaction, TransactionConfig, TransactionMetrics,
};

/// Run one statement on the session's executor: the bound transaction's
/// connection, or the pool. The statement is bounded by the session context
/// and, inside a transaction, by the transaction deadline.
macro_rules! execute_on {
    ($session:expr, $operation:expr, |$conn:ident| $statement:expr) => {{
        let session: &$crate::session::Session = $session;
        let operation: &str = $operation;
        match session.transaction() {
            None => {
                let $conn = session.pool();
                session.context().run_sqlx(operation, $statement).await
            }
            Some(transaction) => {
                let mut guard = transaction.acquire(operation).await?;
                let ctx = transaction.statement_context(session.context());
                let started = std::time::Instant::now();
                let result = match guard.connection() {
                    Ok($conn) => ctx.run_sqlx(operation, $statement).await,
                    Err(error) => Err(error),
                };
                transaction.record_operation(started.elapsed());
                result
            }
        }
    }};
}

mod bulk;
mod crud;
mod ownership;
mod paging;

pub use bulk::{BulkLookup, VOTE_TARGET_ATTRIBUTE};

#[derive(Clone)]
pub struct Session {
    pool: PgPool,
    transaction: Option<Transaction>,
    context: OperationContext,
    defaults: TransactionConfig,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("transaction", &self.transaction)
            .field("context", &self.context)
            .finish()
    }
}

impl Session {
    pub(crate) fn for_pool(
        pool: PgPool,
        defaults: TransactionConfig,
        context: OperationContext,
    ) -> Self {
        Self {
            pool,
            transaction: None,
            context,
            defaults,
        }
    }

    pub(crate) fn for_transaction(transaction: Transaction, context: OperationContext) -> Self {
        Self {
            pool: transaction.pool().clone(),
            defaults: transaction.config().clone(),
            transaction: Some(transaction),
            context,
        }
    }

    /// Same executor, different deadline/cancellation
    pub fn with_context(&self, context: OperationContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Whether operations run inside a live transaction
    pub fn in_transaction(&self) -> bool {
        self.transaction.as_ref().is_some_and(Transaction::is_active)
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a unit of work with the session defaults
    pub async fn begin(&self) -> Result<UnitOfWork, RepositoryError> {
        self.begin_with_config(None).await
    }

    /// Begin a unit of work.
    ///
    /// Inside an active transaction the unit joins it instead of nesting; the
    /// requested settings must then be satisfiable by the running
    /// transaction.
    pub async fn begin_with_config(
        &self,
        config: Option<&PartialTransactionConfig>,
    ) -> Result<UnitOfWork, RepositoryError> {
        let requested = self.defaults.merge(config);
        requested.validate()?;

        match &self.transaction {
            Some(transaction) if transaction.is_active() => {
                let running = transaction.config();
                if !running.isolation_level.satisfies(requested.isolation_level) {
                    return Err(RepositoryError::validation(format!(
                        "cannot join a {} transaction with {} isolation",
                        running.isolation_level, requested.isolation_level
                    )));
                }
                if running.read_only && !requested.read_only {
                    return Err(RepositoryError::validation(
                        "cannot join a read-only transaction for writing",
                    ));
                }
                crate::debug_log!(
                    "[BEGIN] joining transaction {}",
                    transaction.transaction_id()
                );
                Ok(UnitOfWork {
                    transaction: transaction.clone(),
                    session: self.clone(),
                    joined: true,
                })
            }
            Some(transaction) => Err(RepositoryError::transaction_inactive(
                "join",
                transaction.status(),
            )),
            None => {
                let transaction = Transaction::begin(&self.pool, requested, &self.context).await?;
                Ok(UnitOfWork {
                    session: transaction.session_with_context(self.context.clone()),
                    transaction,
                    joined: false,
                })
            }
        }
    }
}

/// A transaction scope obtained from [`Session::begin`].
///
/// A unit that joined an enclosing transaction does not commit it; its
/// rollback does roll the shared transaction back.
#[derive(Debug)]
pub struct UnitOfWork {
    transaction: Transaction,
    session: Session,
    joined: bool,
}

impl UnitOfWork {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Commit, or defer to the owner for a joined unit (`Ok(None)`)
    pub async fn commit(self) -> Result<Option<TransactionMetrics>, RepositoryError> {
        if self.joined {
            if !self.transaction.is_active() {
                return Err(RepositoryError::transaction_inactive(
                    "commit",
                    self.transaction.status(),
                ));
            }
            return Ok(None);
        }
        self.transaction.commit().await.map(Some)
    }

    pub async fn rollback(self) -> Result<TransactionMetrics, RepositoryError> {
        self.transaction.rollback().await
    }
}
