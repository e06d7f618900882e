//! Repository entry point
//!
//! Owns the pool and the transaction defaults, hands out sessions and runs
//! closures inside retried transactions.

use std::future::Future;

use sqlx::PgPool;

use crate::context::OperationContext;
use crate::errors::RepositoryError;
use crate::retry::RetryExecutor;
use crate::session::Session;
use crate::transaction::{PartialTransactionConfig, Transaction, TransactionConfig};

#[derive(Debug, Clone)]
pub struct Repository {
    pool: PgPool,
    defaults: TransactionConfig,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            defaults: TransactionConfig::default(),
        }
    }

    pub fn with_defaults(
        pool: PgPool,
        defaults: TransactionConfig,
    ) -> Result<Self, RepositoryError> {
        defaults.validate()?;
        Ok(Self { pool, defaults })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn defaults(&self) -> &TransactionConfig {
        &self.defaults
    }

    /// Session without a transaction and without a deadline
    pub fn session(&self) -> Session {
        self.session_with_context(OperationContext::background())
    }

    pub fn session_with_context(&self, ctx: OperationContext) -> Session {
        Session::for_pool(self.pool.clone(), self.defaults.clone(), ctx)
    }

    pub async fn begin(&self, ctx: &OperationContext) -> Result<Transaction, RepositoryError> {
        self.begin_with_config(ctx, None).await
    }

    pub async fn begin_with_config(
        &self,
        ctx: &OperationContext,
        config: Option<&PartialTransactionConfig>,
    ) -> Result<Transaction, RepositoryError> {
        Transaction::begin(&self.pool, self.defaults.merge(config), ctx).await
    }

    /// Run `operation` in a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// Retryable failures (by the merged retry policy) re-run the whole
    /// transaction, so `operation` may be called more than once.
    pub async fn run_in_transaction<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        config: Option<&PartialTransactionConfig>,
        mut operation: F,
    ) -> Result<T, RepositoryError>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let config = self.defaults.merge(config);
        config.validate()?;
        let retry = RetryExecutor::new(config.retry_policy.clone());

        let mut attempt = 0;
        loop {
            match self.run_once(ctx, &config, &mut operation).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    retry.wait_before_retry(ctx, attempt, error).await?;
                    attempt += 1;
                }
            }
        }
    }

    async fn run_once<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        config: &TransactionConfig,
        operation: &mut F,
    ) -> Result<T, RepositoryError>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let transaction = Transaction::begin(&self.pool, config.clone(), ctx).await?;
        match operation(transaction.session_with_context(ctx.clone())).await {
            Ok(value) => match transaction.commit().await {
                Ok(_) => Ok(value),
                Err(error) => {
                    Self::abandon(&transaction).await;
                    Err(error)
                }
            },
            Err(error) => {
                Self::abandon(&transaction).await;
                Err(error)
            }
        }
    }

    /// Roll back a transaction whose work already failed; the original
    /// error is what the caller sees
    async fn abandon(transaction: &Transaction) {
        if !transaction.is_active() {
            return;
        }
        if let Err(error) = transaction.rollback().await {
            tracing::warn!(
                transaction_id = %transaction.transaction_id(),
                %error,
                "rollback after failed operation also failed"
            );
        }
    }

    /// Round trip to the database
    pub async fn ping(&self, ctx: &OperationContext) -> Result<(), RepositoryError> {
        ctx.run_sqlx("ping", sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map(|_| ())
    }
}
