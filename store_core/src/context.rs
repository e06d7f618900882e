//! Per-call deadline and cancellation
//!
//! Every repository call takes an [`OperationContext`]. A context with
//! neither deadline nor cancellation never interrupts anything.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::errors::RepositoryError;

#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
    cancellation: Option<watch::Receiver<bool>>,
}

/// Cancels every context cloned from the one it was created with
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

async fn cancelled(receiver: Option<watch::Receiver<bool>>) {
    let Some(mut receiver) = receiver else {
        return std::future::pending().await;
    };
    loop {
        if *receiver.borrow_and_update() {
            return;
        }
        if receiver.changed().await.is_err() {
            // handle dropped without cancelling
            return std::future::pending().await;
        }
    }
}

impl OperationContext {
    /// No deadline, no cancellation
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancellation: None,
        }
    }

    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancellation = Some(receiver);
        (self, CancelHandle { sender })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Same cancellation, deadline no later than `deadline`
    pub fn bounded_by(&self, deadline: Instant) -> Self {
        Self {
            deadline: Some(self.deadline.map_or(deadline, |own| own.min(deadline))),
            cancellation: self.cancellation.clone(),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail fast if the context is already done
    pub fn check(&self, operation: &str) -> Result<(), RepositoryError> {
        if self.is_cancelled() {
            return Err(RepositoryError::cancelled(format!(
                "{} was cancelled",
                operation
            )));
        }
        if self.is_expired() {
            return Err(RepositoryError::timeout(format!(
                "{} exceeded its deadline",
                operation
            )));
        }
        Ok(())
    }

    /// Drive `fut` until it finishes, the deadline passes or the context is
    /// cancelled, whichever comes first.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        self.check(operation)?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(RepositoryError::timeout(format!(
                        "{} exceeded its deadline",
                        operation
                    ))),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = cancelled(self.cancellation.clone()) => Err(RepositoryError::cancelled(format!(
                "{} was cancelled",
                operation
            ))),
        }
    }

    /// [`run`](Self::run) for driver futures, classifying their errors
    pub async fn run_sqlx<T, F>(&self, operation: &str, fut: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        self.run(operation, async move {
            fut.await
                .map_err(|error| RepositoryError::from_sqlx(operation, error))
        })
        .await
    }

    /// Sleep for `delay`, cut short by the deadline or cancellation
    pub async fn sleep(&self, delay: Duration) -> Result<(), RepositoryError> {
        self.check("backoff")?;

        let wake = Instant::now() + delay;
        let (until, expires) = match self.deadline {
            Some(deadline) if deadline < wake => (deadline, true),
            _ => (wake, false),
        };

        tokio::select! {
            _ = tokio::time::sleep_until(until) => {}
            _ = cancelled(self.cancellation.clone()) => {
                return Err(RepositoryError::cancelled("backoff was cancelled"));
            }
        }

        if expires {
            Err(RepositoryError::timeout(
                "deadline reached while waiting to retry",
            ))
        } else {
            Ok(())
        }
    }
}
