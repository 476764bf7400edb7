//! Orchestrator Engine
//!
//! Everything in this workspace that touches a filesystem, an OS
//! process, or the system clock lives here: workspace resolution,
//! cross-process locking, hook subprocess execution, channel files,
//! telemetry, configuration loading, and the [`Engine`] facade that
//! ties them to `orchestrator_core`'s pure domain logic and
//! `orchestrator_database`'s store implementation.
//!
//! # Architecture
//!
//! - [`workspace`] - on-disk layout resolution (`.task-orchestrator/`)
//! - [`lock`] - the cross-process advisory file lock
//! - [`identity`] - agent identity resolution
//! - [`config`] - layered `EngineConfig` loading
//! - [`enforcement`] - the policy Gate
//! - [`hooks`] - the subprocess Hook Pipeline
//! - [`channels`] - private note / shared context / broadcast log files
//! - [`templates`] - template instantiation (handlebars substitution)
//! - [`telemetry`] - structured logging + the NDJSON telemetry log
//! - [`migrator`] - backup-before-migrate orchestration
//! - [`archives`] - completed-task `tar.gz` export bundles
//! - [`metrics`] - the `metrics` operation's aggregate report
//! - [`engine`] - the [`Engine`] facade implementing every external operation

pub mod archives;
pub mod channels;
pub mod config;
pub mod engine;
pub mod enforcement;
pub mod hooks;
pub mod identity;
pub mod lock;
pub mod metrics;
pub mod migrator;
pub mod telemetry;
pub mod templates;
pub mod workspace;

pub use config::{EngineConfig, EnforcementMode};
pub use engine::{CompleteOptions, Engine};
pub use enforcement::{Violation, ViolationReport};
pub use metrics::{MetricsReport, TimeWindow};
pub use workspace::Workspace;

/// Current version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
