use crate::query::VersionSearchQuery;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings file wrapper for `Launcher Settings.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(rename = "Launcher_Settings", default)]
    pub launcher: LauncherSettings,
}

/// User settings read by the launcher core.
///
/// Every key is optional in the YAML file; missing keys take the defaults
/// below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(rename = "Library Folder", default)]
    pub library_folder: String,

    #[serde(rename = "Worker Count", default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(rename = "Max Queue Length", default)]
    pub max_queue_length: Option<usize>,

    #[serde(rename = "Respawn On Crash", default = "default_true")]
    pub respawn_on_crash: bool,

    #[serde(rename = "Poll Interval Ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(rename = "Event Capacity", default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(rename = "Download Timeout", default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(rename = "Download Retry Timeout", default = "default_download_retry_timeout")]
    pub download_retry_timeout_secs: u64,

    #[serde(rename = "Default Query", default)]
    pub default_query: Option<VersionSearchQuery>,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            library_folder: String::new(),
            worker_count: default_worker_count(),
            max_queue_length: None,
            respawn_on_crash: true,
            poll_interval_ms: default_poll_interval_ms(),
            event_capacity: default_event_capacity(),
            download_timeout_secs: default_download_timeout(),
            download_retry_timeout_secs: default_download_retry_timeout(),
            default_query: None,
            debug_mode: false,
        }
    }
}

fn default_worker_count() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    256
}

fn default_download_timeout() -> u64 {
    30
}

fn default_download_retry_timeout() -> u64 {
    120
}

impl LauncherSettings {
    /// Library folder as a path, `None` when not configured
    pub fn library_path(&self) -> Option<Utf8PathBuf> {
        if self.library_folder.is_empty() {
            None
        } else {
            Some(Utf8PathBuf::from(&self.library_folder))
        }
    }

    /// Build the task queue configuration from these settings
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            worker_count: self.worker_count.max(1),
            max_length: self.max_queue_length,
            respawn_on_crash: self.respawn_on_crash,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            event_capacity: self.event_capacity.max(1),
        }
    }

    pub fn download_timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.download_timeout_secs),
            Duration::from_secs(self.download_retry_timeout_secs),
        )
    }
}

/// Construction parameters for [`TaskQueue`](crate::queue::TaskQueue)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Initial pool size, at least 1
    pub worker_count: usize,

    /// Bound on pending tasks; `None` is unbounded
    pub max_length: Option<usize>,

    /// Replace a worker whose thread died from a panic
    pub respawn_on_crash: bool,

    /// Upper bound on how long an idle worker sleeps before re-checking
    pub poll_interval: Duration,

    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        LauncherSettings::default().queue_config()
    }
}
