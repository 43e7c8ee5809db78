//! SQLite-backed sync store.

pub mod model;
pub mod repository;

pub use repository::SqliteSyncStore;
