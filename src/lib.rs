//! Routine Gateway Library
//!
//! Executes named stored routines over a pooled, lazily created connection
//! (PostgreSQL, MySQL) with caller-declared result shaping and explicit
//! transactions, and validates heterogeneous request input into typed
//! parameters ready to pass to those routines.

pub mod adapter;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod models;

pub use adapter::{
    Credential, CredentialResolver, CrudOperation, RequestAdapter, RequestInput, Schema,
    SecurityRule, TypedSchema, ValidatedRequest, ValidationError,
};
pub use config::Config;
pub use db::{ConnectionGateway, Transaction};
pub use envelope::Envelope;
pub use error::{DbError, DbResult};
pub use models::{ExpectedReturn, ParamValue, ParameterBag, RoutineOutput};
