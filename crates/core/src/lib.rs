//! Shared domain model for the piiwatch client.
//!
//! Holds the types every other crate agrees on: identifier and timestamp
//! aliases, the [`snapshot::JobSnapshot`] view of a tracked job, and the
//! engine-wide error taxonomy.

pub mod error;
pub mod snapshot;
pub mod types;
