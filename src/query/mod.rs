//! Version search queries.
//!
//! A query constrains the fields of a build with either a literal value or one
//! of three symbols:
//!
//! | symbol | meaning |
//! |--------|---------|
//! | `^`    | keep the builds holding the maximum value of the field |
//! | `*`    | no constraint |
//! | `-`    | keep the builds holding the minimum value of the field |
//!
//! The textual form covers the version triple only, e.g. `^.^.*`, `4.2`,
//! `*.*.14`. Branch, build hash and commit time are attached with the
//! `with_*` derivations, which return a new query.
//!
//! ```ignore
//! let query = VersionSearchQuery::parse("4.^")?.with_branch("daily");
//! let matches = BuildMatcher::new(builds).match_query(&query);
//! ```

pub mod matcher;

pub use matcher::{BuildMatcher, select_builds};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static QUERY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\^\-\*]|\d+)\.([\^\-\*]|\d+)(\.([\^\-\*]|\d+))?$")
        .expect("Invalid version query regex")
});

/// Errors raised while building a [`VersionSearchQuery`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid version query {0:?}: expected <major>.<minor>[.<patch>] made of digits or ^ * -")]
    Parse(String),

    #[error("Invalid {field} value {value:?}: expected one of ^ * -")]
    Construction { field: &'static str, value: String },
}

/// One of the three symbolic wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuerySymbol {
    /// `^`
    Max,
    /// `*`
    Any,
    /// `-`
    Min,
}

impl QuerySymbol {
    pub const fn as_char(self) -> char {
        match self {
            Self::Max => '^',
            Self::Any => '*',
            Self::Min => '-',
        }
    }

    fn from_text(s: &str) -> Option<Self> {
        match s {
            "^" => Some(Self::Max),
            "*" => Some(Self::Any),
            "-" => Some(Self::Min),
            _ => None,
        }
    }
}

impl FromStr for QuerySymbol {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s).ok_or_else(|| QueryError::Construction {
            field: "symbol",
            value: s.to_string(),
        })
    }
}

impl fmt::Display for QuerySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Constraint on a single build field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldQuery<T> {
    Max,
    Any,
    Min,
    Exact(T),
}

impl<T> FieldQuery<T> {
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl<T> From<QuerySymbol> for FieldQuery<T> {
    fn from(symbol: QuerySymbol) -> Self {
        match symbol {
            QuerySymbol::Max => Self::Max,
            QuerySymbol::Any => Self::Any,
            QuerySymbol::Min => Self::Min,
        }
    }
}

impl<T: fmt::Display> fmt::Display for FieldQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => write!(f, "^"),
            Self::Any => write!(f, "*"),
            Self::Min => write!(f, "-"),
            Self::Exact(value) => write!(f, "{}", value),
        }
    }
}

/// Structured search over (major, minor, patch, branch, build hash, commit time).
///
/// Immutable: the `with_*` methods return a new query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSearchQuery {
    major: FieldQuery<u64>,
    minor: FieldQuery<u64>,
    patch: FieldQuery<u64>,
    branch: FieldQuery<String>,
    build_hash: Option<String>,
    commit_time: Option<QuerySymbol>,
}

impl VersionSearchQuery {
    pub fn new(major: FieldQuery<u64>, minor: FieldQuery<u64>, patch: FieldQuery<u64>) -> Self {
        Self {
            major,
            minor,
            patch,
            branch: FieldQuery::Any,
            build_hash: None,
            commit_time: None,
        }
    }

    /// Literal `major.minor.patch`
    pub fn exact(major: u64, minor: u64, patch: u64) -> Self {
        Self::new(
            FieldQuery::Exact(major),
            FieldQuery::Exact(minor),
            FieldQuery::Exact(patch),
        )
    }

    /// `*.*.*`
    pub fn any() -> Self {
        Self::new(FieldQuery::Any, FieldQuery::Any, FieldQuery::Any)
    }

    /// `^.^.^`
    pub fn latest() -> Self {
        Self::new(FieldQuery::Max, FieldQuery::Max, FieldQuery::Max)
    }

    /// Parse `<comp>.<comp>[.<comp>]` where each component is `^`, `*`, `-`
    /// or a non-negative integer. A missing patch means `*`.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let caps = QUERY_PATTERN
            .captures(text)
            .ok_or_else(|| QueryError::Parse(text.to_string()))?;

        let component = |idx: usize| -> Result<FieldQuery<u64>, QueryError> {
            match caps.get(idx) {
                Some(m) => parse_component(m.as_str(), text),
                None => Ok(FieldQuery::Any),
            }
        };

        Ok(Self::new(component(1)?, component(2)?, component(4)?))
    }

    pub fn major(&self) -> &FieldQuery<u64> {
        &self.major
    }

    pub fn minor(&self) -> &FieldQuery<u64> {
        &self.minor
    }

    pub fn patch(&self) -> &FieldQuery<u64> {
        &self.patch
    }

    pub fn branch(&self) -> &FieldQuery<String> {
        &self.branch
    }

    pub fn build_hash(&self) -> Option<&str> {
        self.build_hash.as_deref()
    }

    pub fn commit_time(&self) -> Option<QuerySymbol> {
        self.commit_time
    }

    /// Constrain the branch. `*` clears the constraint, `^`/`-` select the
    /// lexicographically greatest/smallest branch, anything else is literal.
    pub fn with_branch(&self, branch: &str) -> Self {
        let branch = match QuerySymbol::from_text(branch) {
            Some(symbol) => symbol.into(),
            None => FieldQuery::Exact(branch.to_string()),
        };
        self.with_branch_query(branch)
    }

    pub fn with_branch_query(&self, branch: FieldQuery<String>) -> Self {
        Self {
            branch,
            ..self.clone()
        }
    }

    /// Require a literal build hash; `*` or an empty string clears it
    pub fn with_build_hash(&self, hash: &str) -> Self {
        let build_hash = match hash {
            "" | "*" => None,
            other => Some(other.to_string()),
        };
        Self {
            build_hash,
            ..self.clone()
        }
    }

    /// Constrain the commit time with a symbol given as text.
    ///
    /// Only `^`, `*` and `-` are accepted.
    pub fn with_commit_time(&self, symbol: &str) -> Result<Self, QueryError> {
        let symbol = QuerySymbol::from_text(symbol).ok_or_else(|| QueryError::Construction {
            field: "commit_time",
            value: symbol.to_string(),
        })?;
        Ok(self.with_commit_symbol(symbol))
    }

    pub fn with_commit_symbol(&self, symbol: QuerySymbol) -> Self {
        Self {
            commit_time: Some(symbol),
            ..self.clone()
        }
    }
}

fn parse_component(component: &str, text: &str) -> Result<FieldQuery<u64>, QueryError> {
    if let Some(symbol) = QuerySymbol::from_text(component) {
        return Ok(symbol.into());
    }
    // \d also admits non-ASCII digits and values past u64; both fail here
    component
        .parse()
        .map(FieldQuery::Exact)
        .map_err(|_| QueryError::Parse(text.to_string()))
}

impl FromStr for VersionSearchQuery {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionSearchQuery {
    type Error = QueryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionSearchQuery> for String {
    fn from(value: VersionSearchQuery) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionSearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
