use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{DomainError, ErrorKind};

/// Begins, commits and rolls back physical transactions
#[async_trait]
pub trait TransactionDriver: Send + Sync {
    type Tx: Send + 'static;

    async fn begin(&self) -> Result<Self::Tx, DomainError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), DomainError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), DomainError>;
}

/// Shared reference to the one open transaction of a call tree.
///
/// Nested callers borrow the transaction through [`TransactionHandle::lock`];
/// only the outermost [`UnitOfWork::run`] ever takes it out to finish it.
pub struct TransactionHandle<T> {
    id: Uuid,
    inner: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for TransactionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl<T> TransactionHandle<T> {
    fn new(tx: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Exclusive access to the open transaction for one statement or batch.
    ///
    /// The guard owns its share of the handle, so it can be held across an
    /// await inside a `Send` future.
    pub async fn lock(&self) -> Result<OwnedMappedMutexGuard<Option<T>, T>, DomainError> {
        let guard = self.inner.clone().lock_owned().await;
        OwnedMutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| {
            DomainError::with_message(ErrorKind::TransactionError, "transaction is already finished")
        })
    }

    async fn take(&self) -> Option<T> {
        self.inner.lock().await.take()
    }
}

/// Request-scoped context threaded through persistence calls
pub struct TxContext<T> {
    tx: Option<TransactionHandle<T>>,
    deadline: Option<Instant>,
}

impl<T> Clone for TxContext<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            deadline: self.deadline,
        }
    }
}

impl<T> Default for TxContext<T> {
    fn default() -> Self {
        Self {
            tx: None,
            deadline: None,
        }
    }
}

impl<T> TxContext<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn transaction(&self) -> Option<&TransactionHandle<T>> {
        self.tx.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn with_transaction(&self, handle: TransactionHandle<T>) -> Self {
        Self {
            tx: Some(handle),
            deadline: self.deadline,
        }
    }
}

enum Outcome<R> {
    Finished(Result<R, DomainError>),
    Panicked(String),
    TimedOut,
}

pub struct UnitOfWork<D: TransactionDriver> {
    driver: D,
}

impl<D: TransactionDriver> UnitOfWork<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// Run `work` inside a transaction.
    ///
    /// If `ctx` already carries a transaction the work joins it and nothing is
    /// begun or finished here. Otherwise one transaction is begun, bound into a
    /// child context, and committed on success or rolled back on error, panic
    /// or deadline. Every failure of the outermost call is a TransactionError
    /// whose cause chain holds the original error.
    pub async fn run<R, F, Fut>(&self, ctx: &TxContext<D::Tx>, work: F) -> Result<R, DomainError>
    where
        F: FnOnce(TxContext<D::Tx>) -> Fut + Send,
        Fut: Future<Output = Result<R, DomainError>> + Send,
        R: Send,
    {
        if ctx.in_transaction() {
            return work(ctx.clone()).await;
        }

        let tx = bounded(ctx.deadline, "begin", self.driver.begin())
            .await
            .map_err(|e| DomainError::caused_by(ErrorKind::TransactionError, "failed to begin transaction", e))?;

        let handle = TransactionHandle::new(tx);
        let child = ctx.with_transaction(handle.clone());
        tracing::debug!(tx = %handle.id(), "Transaction started");

        let guarded = AssertUnwindSafe(work(child)).catch_unwind();
        let outcome = match ctx.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, guarded).await {
                Ok(result) => unwind_outcome(result),
                Err(_) => Outcome::TimedOut,
            },
            None => unwind_outcome(guarded.await),
        };

        let tx = handle.take().await.ok_or_else(|| {
            DomainError::with_message(ErrorKind::TransactionError, "transaction was finished by a nested caller")
        })?;

        match outcome {
            Outcome::Finished(Ok(value)) => {
                bounded(ctx.deadline, "commit", self.driver.commit(tx))
                    .await
                    .map_err(|e| {
                        DomainError::caused_by(ErrorKind::TransactionError, "failed to commit transaction", e)
                    })?;
                tracing::debug!(tx = %handle.id(), "Transaction committed");
                Ok(value)
            }
            Outcome::Finished(Err(err)) => match self.driver.rollback(tx).await {
                Ok(()) => {
                    tracing::debug!(tx = %handle.id(), "Transaction rolled back: {}", err);
                    Err(DomainError::caused_by(ErrorKind::TransactionError, "transaction rolled back", err))
                }
                Err(rollback_err) => {
                    tracing::warn!(tx = %handle.id(), "Rollback failed after error: {}", err);
                    Err(DomainError::caused_by(
                        ErrorKind::TransactionError,
                        "failed to roll back transaction",
                        rollback_err,
                    ))
                }
            },
            Outcome::Panicked(message) => {
                if let Err(rollback_err) = self.driver.rollback(tx).await {
                    tracing::error!(tx = %handle.id(), "Rollback after panic failed: {}", rollback_err);
                }
                Err(DomainError::with_message(
                    ErrorKind::TransactionError,
                    format!("transaction aborted by panic: {}", message),
                ))
            }
            Outcome::TimedOut => {
                if let Err(rollback_err) = self.driver.rollback(tx).await {
                    tracing::error!(tx = %handle.id(), "Rollback after deadline failed: {}", rollback_err);
                }
                Err(DomainError::with_message(
                    ErrorKind::TransactionError,
                    "transaction aborted: deadline exceeded",
                ))
            }
        }
    }
}

fn unwind_outcome<R>(result: Result<Result<R, DomainError>, Box<dyn Any + Send>>) -> Outcome<R> {
    match result {
        Ok(finished) => Outcome::Finished(finished),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn bounded<O>(
    deadline: Option<Instant>,
    step: &'static str,
    fut: impl Future<Output = Result<O, DomainError>>,
) -> Result<O, DomainError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.unwrap_or_else(|_| {
            Err(DomainError::with_message(
                ErrorKind::TransactionError,
                format!("deadline exceeded during {}", step),
            ))
        }),
        None => fut.await,
    }
}
