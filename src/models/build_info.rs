use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a build version string is not `major.minor[.patch]`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid build version: {0:?}")]
pub struct VersionParseError(pub String);

/// Release version of a build (`major.minor.patch`).
///
/// Ordering is lexicographic over the three components, which is the
/// total order the matcher and [`BasicBuildInfo`] rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl BuildVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for BuildVersion {
    type Err = VersionParseError;

    /// Accepts `a.b.c` and `a.b` (patch defaults to 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError(s.to_string());
        let mut parts = s.trim().split('.');

        let major = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let minor = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| err())?,
            None => 0,
        };

        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<String> for BuildVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BuildVersion> for String {
    fn from(value: BuildVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A build discovered in the local library.
///
/// Persisted as the `.blinfo` JSON file inside the build folder. The folder
/// itself is not serialized; it is filled in by whoever reads the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    #[serde(skip)]
    pub folder: Utf8PathBuf,

    pub version: BuildVersion,

    pub branch: String,

    #[serde(default)]
    pub build_hash: Option<String>,

    pub commit_time: DateTime<Utc>,

    #[serde(default)]
    pub custom_name: String,

    #[serde(default)]
    pub is_favorite: bool,
}

impl BuildInfo {
    /// Name shown to users: the custom name if set, otherwise `version (branch)`
    pub fn display_name(&self) -> String {
        if self.custom_name.is_empty() {
            format!("{} ({})", self.version, self.branch)
        } else {
            self.custom_name.clone()
        }
    }
}

/// Normalized projection of a build used only for matching and sorting.
///
/// Field declaration order drives the derived `Ord`: version first, then
/// commit time, so a later commit wins a version tie. Branch and hash only
/// keep the order consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BasicBuildInfo {
    pub version: BuildVersion,
    pub commit_time: DateTime<Utc>,
    pub branch: String,
    pub build_hash: Option<String>,
}

impl BasicBuildInfo {
    pub fn new(version: BuildVersion, branch: impl Into<String>, commit_time: DateTime<Utc>) -> Self {
        Self {
            version,
            commit_time,
            branch: branch.into(),
            build_hash: None,
        }
    }

    pub fn with_build_hash(mut self, hash: impl Into<String>) -> Self {
        self.build_hash = Some(hash.into());
        self
    }
}

impl From<&BuildInfo> for BasicBuildInfo {
    fn from(info: &BuildInfo) -> Self {
        Self {
            version: info.version,
            commit_time: info.commit_time,
            branch: info.branch.clone(),
            build_hash: info.build_hash.clone(),
        }
    }
}

/// The most preferred build: highest version, latest commit on a tie.
pub fn latest(builds: &[BasicBuildInfo]) -> Option<&BasicBuildInfo> {
    builds.iter().max()
}
