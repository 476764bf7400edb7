//! SQLite-backed implementation of `orchestrator_core::store::Store`.
//!
//! Provides connection pooling, WAL journaling for file-backed
//! databases, versioned schema migrations, and cascading-unblock /
//! cycle-check transactions for the dependency graph.
//!
//! # Usage
//!
//! ```rust,no_run
//! use orchestrator_database::SqliteStore;
//! use orchestrator_core::store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::new(":memory:").await?;
//!     store.migrate().await?;
//!     store.health_check().await?;
//!     Ok(())
//! }
//! ```

mod common;
mod sqlite;

pub use sqlite::SqliteStore;

pub use orchestrator_core::{
    error::{EngineError, Result},
    store::{Store, StoreStats},
};
