//! Database access layer.
//!
//! This module provides:
//! - The connection gateway owning the process's pool
//! - Explicit transactions bound to one pooled connection
//! - Routine name validation and call statement building
//! - Routine execution with multi-result-set collection
//! - Column decoding into JSON

pub mod executor;
pub mod gateway;
pub mod params;
pub mod pool;
pub mod routine;
pub mod transaction;
pub mod types;

pub use crate::models::DatabaseType;
pub use executor::RoutineExecutor;
pub use gateway::ConnectionGateway;
pub use pool::{DbPool, PoolConnector, SqlxConnector};
pub use routine::RoutineName;
pub use transaction::{Transaction, TransactionState};
