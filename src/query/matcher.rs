use super::{FieldQuery, VersionSearchQuery};
use crate::models::{BasicBuildInfo, BuildInfo};
use chrono::{DateTime, Utc};

/// Applies a [`VersionSearchQuery`] to a fixed set of builds.
///
/// Fields are refined one at a time in priority order: major, minor, patch,
/// branch, build hash, commit time. `^`/`-` are resolved against the builds
/// that survived the previous fields, not the whole set. As soon as a single
/// build survives, the remaining fields are not consulted at all, even if the
/// query constrains them.
#[derive(Debug, Clone, Default)]
pub struct BuildMatcher {
    builds: Vec<BasicBuildInfo>,
}

impl BuildMatcher {
    pub fn new(builds: impl IntoIterator<Item = BasicBuildInfo>) -> Self {
        Self {
            builds: builds.into_iter().collect(),
        }
    }

    pub fn builds(&self) -> &[BasicBuildInfo] {
        &self.builds
    }

    /// Builds matching `query`, in construction order
    pub fn match_query(&self, query: &VersionSearchQuery) -> Vec<BasicBuildInfo> {
        self.match_indices(query)
            .into_iter()
            .map(|i| self.builds[i].clone())
            .collect()
    }

    /// Indices (into construction order) of the builds matching `query`
    pub fn match_indices(&self, query: &VersionSearchQuery) -> Vec<usize> {
        let builds = &self.builds;
        let mut current: Vec<usize> = (0..builds.len()).collect();

        let commit_time: FieldQuery<DateTime<Utc>> =
            query.commit_time().map_or(FieldQuery::Any, Into::into);

        let build_hash = |current: Vec<usize>| match query.build_hash() {
            Some(hash) => current
                .into_iter()
                .filter(|&i| builds[i].build_hash.as_deref() == Some(hash))
                .collect(),
            None => current,
        };

        let steps: [&dyn Fn(Vec<usize>) -> Vec<usize>; 6] = [
            &|c: Vec<usize>| refine(builds, c, query.major(), |b| &b.version.major),
            &|c: Vec<usize>| refine(builds, c, query.minor(), |b| &b.version.minor),
            &|c: Vec<usize>| refine(builds, c, query.patch(), |b| &b.version.patch),
            &|c: Vec<usize>| refine(builds, c, query.branch(), |b| &b.branch),
            &build_hash,
            &|c: Vec<usize>| refine(builds, c, &commit_time, |b| &b.commit_time),
        ];

        for step in steps {
            current = step(current);

            // Empty never grows back and a singleton is final
            if current.len() <= 1 {
                break;
            }
        }

        tracing::trace!(
            "Query {} matched {} of {} builds",
            query,
            current.len(),
            builds.len()
        );

        current
    }
}

/// Keep the candidates whose field satisfies `query`
fn refine<T, F>(
    builds: &[BasicBuildInfo],
    current: Vec<usize>,
    query: &FieldQuery<T>,
    key: F,
) -> Vec<usize>
where
    T: Ord,
    F: Fn(&BasicBuildInfo) -> &T,
{
    let target = match query {
        FieldQuery::Any => return current,
        FieldQuery::Max => current.iter().map(|&i| key(&builds[i])).max(),
        FieldQuery::Min => current.iter().map(|&i| key(&builds[i])).min(),
        FieldQuery::Exact(value) => Some(value),
    };

    match target {
        Some(target) => current
            .into_iter()
            .filter(|&i| key(&builds[i]) == target)
            .collect(),
        None => Vec::new(),
    }
}

/// Match `query` against full build records and return the matching records
pub fn select_builds<'a>(builds: &'a [BuildInfo], query: &VersionSearchQuery) -> Vec<&'a BuildInfo> {
    let matcher = BuildMatcher::new(builds.iter().map(BasicBuildInfo::from));
    matcher
        .match_indices(query)
        .into_iter()
        .map(|i| &builds[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BuildVersion;
    use crate::query::QuerySymbol;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn build(major: u64, minor: u64, patch: u64, branch: &str, day: u32) -> BasicBuildInfo {
        BasicBuildInfo::new(BuildVersion::new(major, minor, patch), branch, at(day))
    }

    fn query(text: &str) -> VersionSearchQuery {
        VersionSearchQuery::parse(text).unwrap()
    }

    fn sample() -> Vec<BasicBuildInfo> {
        vec![
            build(1, 2, 3, "stable", 1),
            build(1, 2, 4, "stable", 2),
            build(1, 2, 2, "stable", 3),
        ]
    }

    #[test]
    fn test_max_everywhere() {
        let matcher = BuildMatcher::new(sample());
        assert_eq!(matcher.match_query(&query("^.^.^")), vec![build(1, 2, 4, "stable", 2)]);
    }

    #[test]
    fn test_any_returns_all_in_construction_order() {
        let matcher = BuildMatcher::new(sample());
        assert_eq!(matcher.match_query(&query("*.*.*")), sample());
    }

    #[test]
    fn test_min_chain() {
        let matcher = BuildMatcher::new(sample());
        // Same major everywhere, so minor and patch decide; patch is unconstrained
        assert_eq!(matcher.match_query(&query("-.*.*")), sample());
        assert_eq!(matcher.match_query(&query("-.-.-")), vec![build(1, 2, 2, "stable", 3)]);
    }

    #[test]
    fn test_literal_fields() {
        let matcher = BuildMatcher::new(sample());
        assert_eq!(matcher.match_query(&query("1.2.3")), vec![build(1, 2, 3, "stable", 1)]);
        assert!(matcher.match_query(&query("2.*.*")).is_empty());
    }

    #[test]
    fn test_max_is_relative_to_survivors() {
        let builds = vec![
            build(3, 6, 9, "lts", 1),
            build(4, 1, 0, "stable", 2),
            build(4, 2, 1, "stable", 3),
            build(4, 2, 0, "stable", 4),
        ];
        let matcher = BuildMatcher::new(builds);
        // ^ on patch is the max among 4.2.x, not the global max patch (9)
        assert_eq!(matcher.match_query(&query("4.2.^")), vec![build(4, 2, 1, "stable", 3)]);
        assert_eq!(matcher.match_query(&query("-.^")), vec![build(3, 6, 9, "lts", 1)]);
    }

    #[test]
    fn test_singleton_short_circuits_lower_fields() {
        let builds = vec![
            build(4, 2, 0, "stable", 1),
            build(3, 6, 0, "lts", 2),
            build(3, 6, 0, "daily", 3),
        ];
        let matcher = BuildMatcher::new(builds);

        // Major alone narrows to one build, the branch constraint is never checked
        let q = query("4.*.*").with_branch("daily");
        assert_eq!(matcher.match_query(&q), vec![build(4, 2, 0, "stable", 1)]);

        // With several survivors the branch does apply
        let q = query("3.*.*").with_branch("daily");
        assert_eq!(matcher.match_query(&q), vec![build(3, 6, 0, "daily", 3)]);
    }

    #[test]
    fn test_branch_and_commit_time_tie_break() {
        let builds = vec![
            build(4, 3, 0, "daily", 1),
            build(4, 3, 0, "daily", 5),
            build(4, 3, 0, "experimental", 7),
        ];
        let matcher = BuildMatcher::new(builds);

        let q = query("^.^.^").with_branch("daily").with_commit_symbol(QuerySymbol::Max);
        assert_eq!(matcher.match_query(&q), vec![build(4, 3, 0, "daily", 5)]);

        let q = query("^.^.^").with_commit_time("-").unwrap();
        assert_eq!(matcher.match_query(&q), vec![build(4, 3, 0, "daily", 1)]);

        let q = query("*.*.*").with_branch("^");
        assert_eq!(matcher.match_query(&q), vec![build(4, 3, 0, "experimental", 7)]);
    }

    #[test]
    fn test_build_hash_filter() {
        let builds = vec![
            build(4, 3, 0, "daily", 1).with_build_hash("aaaa"),
            build(4, 3, 0, "daily", 2).with_build_hash("bbbb"),
        ];
        let matcher = BuildMatcher::new(builds);

        let found = matcher.match_query(&query("*.*.*").with_build_hash("bbbb"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].build_hash.as_deref(), Some("bbbb"));
        assert!(matcher.match_query(&query("*.*.*").with_build_hash("cccc")).is_empty());
    }

    #[test]
    fn test_several_survivors_without_tie_break() {
        let builds = vec![build(4, 2, 0, "stable", 1), build(4, 2, 0, "lts", 1)];
        let matcher = BuildMatcher::new(builds.clone());
        assert_eq!(matcher.match_query(&query("^.^.^")), builds);
    }

    #[test]
    fn test_empty_candidates() {
        let matcher = BuildMatcher::new(Vec::new());
        assert!(matcher.match_query(&query("^.-.^")).is_empty());
        assert!(matcher.match_indices(&VersionSearchQuery::any()).is_empty());
    }

    #[test]
    fn test_single_candidate_still_checked() {
        let matcher = BuildMatcher::new(vec![build(4, 2, 0, "stable", 1)]);
        assert!(matcher.match_query(&query("3.*.*")).is_empty());
        assert_eq!(matcher.match_query(&query("4.*.*")).len(), 1);
    }

    #[test]
    fn test_match_indices_map_back() {
        let matcher = BuildMatcher::new(sample());
        assert_eq!(matcher.match_indices(&query("1.2.-")), vec![2]);
    }
}
