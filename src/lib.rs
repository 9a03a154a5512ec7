// blauncher - build library core for a desktop application launcher
//
// This is the library crate: version queries, build matching, the local
// build library and the background task queue.
// The binary crate (main.rs) provides a command line front end.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod query;
pub mod queue;
pub mod services;
pub mod tasks;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{BasicBuildInfo, BuildInfo, BuildVersion, LauncherSettings, QueueConfig};
pub use query::{BuildMatcher, QueryError, VersionSearchQuery};
pub use queue::{QueueError, QueueEvent, TaskOutcome, TaskQueue, WorkerId};
pub use tasks::{Task, TaskContext, TaskError, TaskId, TaskInfo, TaskOutput};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
