//! Explicit transactions.
//!
//! A [`Transaction`] holds a dedicated pooled connection from `begin` until it
//! is committed or rolled back. It is exclusively owned by the unit of work
//! that began it and reaches a terminal state exactly once.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Postgres};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Move an open transaction to `target`, or report the state that forbids it.
    fn finish(self, target: TransactionState) -> Result<TransactionState, TransactionState> {
        match self {
            TransactionState::Open if target != TransactionState::Open => Ok(target),
            other => Err(other),
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TransactionState::Open
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(sqlx::Transaction<'static, MySql>),
    Postgres(sqlx::Transaction<'static, Postgres>),
}

impl DbTransaction {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbTransaction::MySql(_) => DatabaseType::MySQL,
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
        }
    }

    async fn commit(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    async fn rollback(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }
}

/// Counts one open transaction against its gateway until dropped.
#[derive(Debug)]
pub(crate) struct OpenSlot(Arc<AtomicUsize>);

impl OpenSlot {
    pub(crate) fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An explicit transaction bound to one pooled connection.
pub struct Transaction {
    id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    state: TransactionState,
    inner: Option<DbTransaction>,
    slot: Option<OpenSlot>,
}

impl Transaction {
    pub(crate) fn new(inner: DbTransaction, slot: OpenSlot) -> Self {
        let tx = Self {
            id: format!("tx_{}", uuid::Uuid::new_v4().simple()),
            started_at: Utc::now(),
            started: Instant::now(),
            state: TransactionState::Open,
            inner: Some(inner),
            slot: Some(slot),
        };
        debug!(transaction_id = %tx.id, db_type = %tx.db_type_name(), "Transaction started");
        tx
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    fn db_type_name(&self) -> &'static str {
        self.inner
            .as_ref()
            .map(|t| t.db_type().display_name())
            .unwrap_or("none")
    }

    /// Borrow the underlying connection for a statement.
    pub(crate) fn connection(&mut self, operation: &'static str) -> DbResult<&mut DbTransaction> {
        match (self.state, self.inner.as_mut()) {
            (TransactionState::Open, Some(inner)) => Ok(inner),
            (state, _) => Err(DbError::transaction_state(&self.id, state, operation)),
        }
    }

    /// Leave the open state and hand back the connection for the driver call.
    ///
    /// The state becomes `RolledBack` until the driver confirms otherwise:
    /// a transaction whose terminal call fails or never completes is rolled
    /// back by sqlx when dropped.
    fn release(&mut self, operation: &'static str) -> DbResult<Option<DbTransaction>> {
        self.state = self
            .state
            .finish(TransactionState::RolledBack)
            .map_err(|state| DbError::transaction_state(&self.id, state, operation))?;
        self.slot.take();
        Ok(self.inner.take())
    }

    /// Record the driver's verdict on a terminal call.
    fn settle(
        &mut self,
        target: TransactionState,
        outcome: DbResult<()>,
        operation: &'static str,
    ) -> DbResult<()> {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => {
                self.state = target;
                info!(transaction_id = %self.id, duration_ms, "Transaction {}", target);
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::RolledBack;
                warn!(
                    transaction_id = %self.id,
                    duration_ms,
                    error = %e,
                    "Transaction {} failed, work discarded",
                    operation
                );
                Err(e)
            }
        }
    }

    async fn terminate(
        &mut self,
        target: TransactionState,
        operation: &'static str,
    ) -> DbResult<()> {
        let outcome = match self.release(operation)? {
            Some(inner) if target == TransactionState::Committed => inner.commit().await,
            Some(inner) => inner.rollback().await,
            None => Err(DbError::internal(format!(
                "Transaction {} has no connection",
                self.id
            ))),
        };
        self.settle(target, outcome, operation)
    }

    /// Commit the transaction, making its work durable.
    ///
    /// If the driver fails to commit, the work is discarded and the
    /// transaction ends rolled back.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.terminate(TransactionState::Committed, "commit").await
    }

    /// Roll the transaction back, discarding its work.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.terminate(TransactionState::RolledBack, "rollback").await
    }

    #[cfg(test)]
    pub(crate) fn detached(state: TransactionState, counter: &Arc<AtomicUsize>) -> Self {
        Self {
            id: "tx_test".to_string(),
            started_at: Utc::now(),
            started: Instant::now(),
            state,
            inner: None,
            slot: (state == TransactionState::Open).then(|| OpenSlot::acquire(counter)),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // sqlx rolls back the underlying transaction when it is dropped
        if self.state == TransactionState::Open && self.inner.is_some() {
            warn!(
                transaction_id = %self.id,
                duration_ms = self.started.elapsed().as_millis() as u64,
                "Transaction dropped while open, rolling back"
            );
        }
    }
}
