//! Data models for the launcher core.
//!
//! - [`BuildInfo`]: a build discovered in the local library (`.blinfo` record)
//! - [`BasicBuildInfo`]: the comparable projection used for matching and sorting
//! - [`BuildVersion`]: `major.minor.patch` with a total order
//! - [`LauncherSettings`]: user settings loaded from `Launcher Settings.yaml`
//! - [`QueueConfig`]: construction parameters for the task queue

pub mod build_info;
pub mod config;

pub use build_info::{BasicBuildInfo, BuildInfo, BuildVersion, VersionParseError, latest};
pub use config::{LauncherSettings, QueueConfig, SettingsFile};
