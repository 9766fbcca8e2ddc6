//! # Meridian Data Source Crate
//!
//! The capability contract the calculation executor requires from the remote
//! relational store, plus its two implementations.
//!
//! ## Architectural Principles
//!
//! - **Capability Contract:** The executor only needs three operations from
//!   the store: a scoped row count, a scoped single-column numeric fetch, and
//!   a scoped two-column timestamp fetch. Nulls are preserved as first-class
//!   absent values, distinct from 0/false.
//! - **Tenancy Is Not Optional:** Every scoped request carries an
//!   organization id, and every implementation applies it as a top-level
//!   equality predicate. There is no way to construct a request without it.
//! - **Asynchronous & Pooled:** The PostgreSQL implementation is fully
//!   asynchronous over a shared connection pool.
//!
//! ## Public API
//!
//! - `DataSource`: the object-safe async contract.
//! - `PostgresDataSource` / `connect`: the production implementation.
//! - `MemoryDataSource`: an in-memory implementation for tests and offline
//!   demo runs, with per-table call counting.
//! - `DataSourceError`: the specific error types that can be returned.

pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod source;

pub use connection::connect;
pub use error::DataSourceError;
pub use memory::MemoryDataSource;
pub use postgres::PostgresDataSource;
pub use source::{DataSource, RowScope, TimeWindow};
