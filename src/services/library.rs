//! Local build library discovery.
//!
//! The library is laid out as `<root>/<branch>/<build folder>/`, where each
//! installed build folder carries a `.blinfo` JSON record describing it:
//!
//! ```text
//! {"file_version": "1.0", "blinfo": [{"version": "4.2.0", "branch": "stable", ...}]}
//! ```
//!
//! Folders without a record are ignored; a damaged record is logged and
//! skipped so one bad build does not hide the rest of the library.

use crate::models::BuildInfo;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// Name of the per-build record file
pub const BUILD_INFO_FILE: &str = ".blinfo";

const FILE_VERSION: &str = "1.0";

/// Errors raised while reading or writing the library
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed build info {path}: {source}")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No build info in {0}")]
    MissingBuildInfo(Utf8PathBuf),
}

#[derive(Debug, Serialize, Deserialize)]
struct BuildInfoFile {
    file_version: String,
    blinfo: Vec<BuildInfo>,
}

/// Read the `.blinfo` record of one build folder
pub fn read_build_info(folder: &Utf8Path) -> Result<BuildInfo, LibraryError> {
    let path = folder.join(BUILD_INFO_FILE);
    if !path.exists() {
        return Err(LibraryError::MissingBuildInfo(folder.to_path_buf()));
    }

    let contents = fs::read_to_string(&path).map_err(|source| LibraryError::Io {
        path: path.clone(),
        source,
    })?;
    let file: BuildInfoFile = serde_json::from_str(&contents).map_err(|source| {
        LibraryError::Json {
            path: path.clone(),
            source,
        }
    })?;

    let mut info = file
        .blinfo
        .into_iter()
        .next()
        .ok_or_else(|| LibraryError::MissingBuildInfo(folder.to_path_buf()))?;
    info.folder = folder.to_path_buf();
    Ok(info)
}

/// Write the `.blinfo` record for `info` into `folder`, returning its path
pub fn write_build_info(folder: &Utf8Path, info: &BuildInfo) -> Result<Utf8PathBuf, LibraryError> {
    let path = folder.join(BUILD_INFO_FILE);
    let file = BuildInfoFile {
        file_version: FILE_VERSION.to_string(),
        blinfo: vec![info.clone()],
    };

    let json = serde_json::to_string_pretty(&file).map_err(|source| LibraryError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| LibraryError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::debug!("Wrote build info {}", path);
    Ok(path)
}

/// Discover every build under `root`, sorted by folder
pub fn scan_library(root: &Utf8Path) -> Result<Vec<BuildInfo>, LibraryError> {
    let mut builds = Vec::new();

    for branch_dir in subdirectories(root)? {
        for build_dir in subdirectories(&branch_dir)? {
            match read_build_info(&build_dir) {
                Ok(info) => builds.push(info),
                Err(LibraryError::MissingBuildInfo(_)) => {
                    tracing::debug!("Skipping folder without build info: {}", build_dir);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable build: {}", e);
                }
            }
        }
    }

    builds.sort_by(|a, b| a.folder.cmp(&b.folder));
    tracing::info!("Found {} builds in {}", builds.len(), root);
    Ok(builds)
}

fn subdirectories(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, LibraryError> {
    let io_err = |source| LibraryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in dir.read_dir_utf8().map_err(io_err)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir, e);
                continue;
            }
        };
        if entry.file_type().map_err(io_err)?.is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildVersion;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_info(folder: &Utf8Path, version: BuildVersion, branch: &str) -> BuildInfo {
        BuildInfo {
            folder: folder.to_path_buf(),
            version,
            branch: branch.to_string(),
            build_hash: Some("cafebabe".to_string()),
            commit_time: Utc.with_ymd_and_hms(2024, 5, 2, 10, 30, 0).unwrap(),
            custom_name: String::new(),
            is_favorite: false,
        }
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let folder = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let info = sample_info(&folder, BuildVersion::new(4, 1, 1), "stable");

        let path = write_build_info(&folder, &info).unwrap();
        assert!(path.ends_with(BUILD_INFO_FILE));
        assert_eq!(read_build_info(&folder).unwrap(), info);
    }

    #[test]
    fn test_missing_build_info() {
        let temp_dir = TempDir::new().unwrap();
        let folder = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        assert!(matches!(
            read_build_info(&folder),
            Err(LibraryError::MissingBuildInfo(_))
        ));
    }

    #[test]
    fn test_malformed_build_info() {
        let temp_dir = TempDir::new().unwrap();
        let folder = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(folder.join(BUILD_INFO_FILE), "{not json").unwrap();

        assert!(matches!(read_build_info(&folder), Err(LibraryError::Json { .. })));
    }
}
