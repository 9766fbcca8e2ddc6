//! # Meridian Metric Registry
//!
//! The immutable, validated catalog of business metrics: metric id to
//! definition, with composite expressions parsed once at load time.
//!
//! ## Architectural Principles
//!
//! - **Explicit Construction:** The registry is built once at process start
//!   from a static definition list and passed by reference to the engine.
//!   There is no ambient global catalog, so tests can substitute a minimal
//!   registry.
//! - **Load-Time Validation:** Duplicate ids and malformed composite
//!   expressions are rejected at construction; `validate()` reports declared
//!   dependencies that are not themselves registered. A failing validation
//!   should halt process boot, not surface per query.
//!
//! ## Public API
//!
//! - `MetricRegistry`: the catalog plus lookup and validation methods.
//! - `standard_catalog`: the built-in metric definitions.
//! - `RegistryError` / `ValidationReport`: load and validation outcomes.

pub mod catalog;
pub mod error;
pub mod registry;

pub use catalog::standard_catalog;
pub use error::{RegistryError, ValidationReport};
pub use registry::MetricRegistry;
