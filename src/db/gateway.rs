//! The connection gateway.
//!
//! # Design Decisions
//!
//! - **`OnceCell` behind an `RwLock`**: single-flight pool creation; concurrent
//!   first callers wait on one initialization and share its pool. A failed
//!   initialization leaves the cell empty so the next call retries.
//! - **Swap on close**: closing replaces the cell with a fresh one under the
//!   write lock, so no caller can observe a half-closed pool.
//! - **`AtomicUsize` open-transaction count**: close is refused while any
//!   transaction begun through the gateway is still open.
//! - **Process-wide instance in a `OnceLock`**: installed once at startup.

use crate::config::Config;
use crate::db::pool::{DbPool, PoolConnector, SqlxConnector};
use crate::db::routine::DeclaredParam;
use crate::db::transaction::{DbTransaction, OpenSlot, Transaction};
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

static GLOBAL: OnceLock<ConnectionGateway> = OnceLock::new();

/// Declared routine parameters, cached per routine for the pool's lifetime.
pub(crate) type SignatureCache = RwLock<HashMap<String, Arc<[DeclaredParam]>>>;

/// Owns the process's single connection pool.
pub struct ConnectionGateway<C: PoolConnector = SqlxConnector> {
    config: Config,
    connector: C,
    pool: RwLock<Arc<OnceCell<DbPool>>>,
    open_transactions: Arc<AtomicUsize>,
    pub(crate) signatures: SignatureCache,
}

impl ConnectionGateway<SqlxConnector> {
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, SqlxConnector)
    }

    /// Install the process-wide gateway. Fails if one is already installed.
    pub fn install(config: Config) -> DbResult<&'static ConnectionGateway> {
        GLOBAL
            .set(Self::new(config))
            .map_err(|_| DbError::configuration("The connection gateway is already installed"))?;
        Self::global()
    }

    /// The process-wide gateway.
    pub fn global() -> DbResult<&'static ConnectionGateway> {
        GLOBAL.get().ok_or_else(|| {
            DbError::configuration("The connection gateway has not been installed")
        })
    }
}

impl<C: PoolConnector> ConnectionGateway<C> {
    pub fn with_connector(config: Config, connector: C) -> Self {
        Self {
            config,
            connector,
            pool: RwLock::new(Arc::new(OnceCell::new())),
            open_transactions: Arc::new(AtomicUsize::new(0)),
            signatures: RwLock::new(HashMap::new()),
        }
    }

    async fn connect(&self) -> DbResult<DbPool> {
        let descriptor = self.config.descriptor().map_err(DbError::configuration)?;
        info!(
            db_type = %descriptor.db_type,
            database = %descriptor.database,
            url = %descriptor.masked_connection_string(),
            "Creating connection pool"
        );
        let pool = self.connector.connect(&descriptor).await?;
        info!(db_type = %pool.db_type(), "Connection pool ready");
        Ok(pool)
    }

    /// The live pool, created on first use.
    pub async fn get_connection(&self) -> DbResult<DbPool> {
        let cell = self.pool.read().await;
        let pool = cell.get_or_try_init(|| self.connect()).await?;
        Ok(pool.clone())
    }

    /// Close the pool and return to the uninitialized state.
    ///
    /// Refused while transactions begun through this gateway are open.
    pub async fn close_connection(&self) -> DbResult<()> {
        let previous = {
            let mut cell = self.pool.write().await;
            let open = self.open_transactions();
            if open > 0 {
                warn!(open_transactions = open, "Refusing to close pool with open transactions");
                return Err(DbError::OpenTransactions { open });
            }
            std::mem::replace(&mut *cell, Arc::new(OnceCell::new()))
        };

        self.signatures.write().await.clear();
        match previous.get() {
            Some(pool) => {
                pool.close().await;
                info!("Connection pool closed");
            }
            None => debug!("Connection pool was not initialized"),
        }
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.pool.read().await.initialized()
    }

    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::Acquire)
    }

    /// Begin a transaction on a connection from the current pool.
    pub async fn begin(&self) -> DbResult<Transaction> {
        let (pool, slot) = {
            let cell = self.pool.read().await;
            let pool = cell.get_or_try_init(|| self.connect()).await?.clone();
            // Counted before the lock is released so a concurrent close sees it
            (pool, OpenSlot::acquire(&self.open_transactions))
        };

        let inner = match pool {
            DbPool::MySql(pool) => DbTransaction::MySql(pool.begin().await?),
            DbPool::Postgres(pool) => DbTransaction::Postgres(pool.begin().await?),
        };
        Ok(Transaction::new(inner, slot))
    }
}
