//! SQLite storage implementation for histsync.
//!
//! This crate provides all database-related functionality using Diesel ORM
//! with SQLite. It implements the [`histsync_core::coverage::SyncStore`]
//! trait and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - The coverage and series-record store
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies
//! exist. `core` is database-agnostic and works with traits.
//!
//! ```text
//!     core (engine)
//!          │
//!          ▼
//!  storage-sqlite (this crate)
//!          │
//!          ▼
//!      SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod store;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, run_migrations, spawn_writer, DbConnection,
    DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export the store implementation
pub use store::SqliteSyncStore;

// Re-export from histsync-core for convenience
pub use histsync_core::errors::{Error, PersistenceError, Result};
