//! Core data models for the media migration job.
//!
//! Records come from the catalog database via `sqlx::FromRow`; outcomes and
//! the final report serialize as JSON via `serde`.

pub mod asset;
pub mod outcome;
pub mod report;
