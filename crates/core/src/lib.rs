//! Histsync Core - Incremental time-series synchronization engine.
//!
//! This crate contains the engine's domain logic: interval arithmetic,
//! coverage tracking, gap computation, merge planning and rate-limited
//! execution. It is storage-agnostic; the [`coverage::SyncStore`] trait is
//! implemented by the `storage-sqlite` crate, and provider adapters plug in
//! through [`provider::ProviderAdapter`].
//!
//! The typical entry point is [`sync::SyncService`], which turns one
//! [`sync::SyncRequest`] into fetch tasks and a [`sync::SyncReport`].

pub mod config;
pub mod constants;
pub mod coverage;
pub mod errors;
pub mod executor;
pub mod intervals;
pub mod planner;
pub mod provider;
pub mod sink;
pub mod sync;
pub mod types;

// Re-export error types
pub use errors::Error;
pub use errors::Result;

// Re-export the identifiers and interval types nearly every caller needs.
pub use intervals::{Interval, IntervalSet};
pub use types::{EntityId, ProviderId, SeriesRecord};
