//! Coverage tracking: which (provider, entity, interval) triples have
//! already been fetched.
//!
//! Coverage is the engine's memory. Every successful fetch commits
//! [`CoverageClaim`]s alongside its records, and the next request for an
//! overlapping window only fetches what the claims do not already cover.
//! A claim asserts "this range was fetched", not "this range had data":
//! a confirmed-empty range is covered too, so the engine never re-asks a
//! provider about a quiet weekend.

pub mod gaps;
pub mod memory;
pub mod store;

pub use gaps::GapSet;
pub use memory::MemorySyncStore;
pub use store::{CommitReceipt, SyncStore};

use serde::{Deserialize, Serialize};

use crate::intervals::Interval;
use crate::types::EntityId;

/// An (entity, interval) pair a successful fetch asserts as covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageClaim {
    pub entity: EntityId,
    pub interval: Interval,
}

impl CoverageClaim {
    pub fn new(entity: EntityId, interval: Interval) -> Self {
        Self { entity, interval }
    }
}
