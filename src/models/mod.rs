//! Data models for the routine gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod params;
pub mod routine;

pub use connection::{ConnectionDescriptor, DatabaseType};
pub use params::{ParamValue, ParameterBag};
pub use routine::{ExpectedReturn, RawResult, RawResultBuilder, ResultSet, Row, RoutineOutput};
