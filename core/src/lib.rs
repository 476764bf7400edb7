//! Orchestrator Core
//!
//! Domain models, error taxonomy, validation, the [`Store`] trait, and
//! the pure algorithms (dependency resolution, success-criteria
//! expression evaluation) shared by every other crate in this
//! workspace. This crate performs no I/O: persistence lives in
//! `database`, and everything that touches the filesystem or spawns a
//! process lives in `engine`.
//!
//! # Architecture
//!
//! - [`models`] - domain entities (Task, Dependency, Notification, ...)
//! - [`error`] - the `EngineError` taxonomy and `Result` alias
//! - [`store`] - the `Store` trait every persistence backend implements
//! - [`resolver`] - pure dependency-graph algorithms (cycle check, cascading unblock)
//! - [`criteria`] - the success-criteria boolean expression evaluator
//! - [`template`] - template variable-requirement validation
//! - [`validation`] - field-level input validation
//!
//! # Example
//!
//! ```rust
//! use orchestrator_core::{models::NewTask, validation::Validator};
//!
//! let new_task = NewTask {
//!     title: "Design the schema".to_string(),
//!     description: "Draft the initial store schema".to_string(),
//!     ..Default::default()
//! };
//!
//! Validator::validate_new_task(&new_task).unwrap();
//! ```

pub mod criteria;
pub mod error;
pub mod models;
pub mod resolver;
pub mod store;
pub mod template;
pub mod validation;

pub use error::{EngineError, Result};
pub use models::{
    AgentId, ContextEntry, ContextKind, Criterion, Dependency, NewTask, Notification,
    NotificationKind, Participant, Priority, PrivateNote, Task, TaskFilter, TaskId, TaskStatus,
    TemplateSpec, UpdateTask,
};
pub use resolver::Resolver;
pub use store::{Store, StoreStats};
pub use validation::Validator;

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
