//! # Meridian Time Range Resolver
//!
//! Converts symbolic time ranges (presets like `last_30_days`, or explicit
//! custom bounds) into concrete start/end instants, and subdivides resolved
//! ranges into ordered buckets for time-series evaluation.
//!
//! ## Architectural Principles
//!
//! - **Pure Resolution:** Every function here is a pure function of its
//!   inputs. "Now" is always an explicit parameter — nothing in this crate
//!   reads the system clock, so tests can pin any instant they like.
//! - **Inclusive Bounds:** A resolved range is `[start, end]` inclusive, with
//!   day ends at 23:59:59.999. `last_N_days` includes today, giving exactly
//!   N calendar days.

pub mod buckets;
pub mod error;
pub mod resolver;

pub use buckets::{bucket_ranges, bucket_starts, default_granularity};
pub use error::TimeRangeError;
pub use resolver::{ResolvedRange, render_time_range, resolve};
