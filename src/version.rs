//! Version arithmetic for fix-version selection.
//!
//! Fix versions arrive from the scanner in mathematical interval notation:
//!
//! ```text
//! 1.0         --> 1.0 ≤ x
//! (,1.0]      --> x ≤ 1.0
//! (,1.0)      --> x < 1.0
//! [1.0]       --> x == 1.0
//! (1.0,)      --> 1.0 < x
//! (1.0, 2.0)  --> 1.0 < x < 2.0
//! [1.0, 2.0]  --> 1.0 ≤ x ≤ 2.0
//! ```
//!
//! Only intervals with a closed (or implicit) lower bound are usable: the
//! lower-bound endpoint is the upgrade target. Everything in this module is a
//! pure function over its inputs.

use std::cmp::Ordering;

/// Compares two loosely formatted version strings segment by segment.
///
/// Segments are split on `.`, `-` and `+`. Two numeric segments compare
/// numerically, anything else compares lexically, and a missing segment
/// counts as `0` (so `1.0` equals `1.0.0`). This intentionally accepts
/// version strings that are not valid semver, which are common in Maven and
/// NuGet ecosystems.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<&str> = split_segments(a);
    let right: Vec<&str> = split_segments(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or("0");
        let r = right.get(i).copied().unwrap_or("0");
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l_num), Ok(r_num)) => l_num.cmp(&r_num),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn split_segments(version: &str) -> Vec<&str> {
    version
        .split(['.', '-', '+'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Extracts the upgrade target from one interval-notation fix version.
///
/// Returns the lower-bound endpoint with enclosing brackets stripped, or
/// `None` for open-lower-bound intervals (which carry no usable target) and
/// for empty input.
pub fn parse_fix_version_candidate(fix_version: &str) -> Option<&str> {
    let lower_bound = fix_version.split(',').next().unwrap_or("").trim();
    if lower_bound.starts_with('(') {
        return None;
    }
    let target = lower_bound
        .trim_matches(|c| c == '[' || c == ']')
        .trim();
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

/// Selects the minimal safe upgrade for `current_version` out of
/// `candidate_fix_versions`.
///
/// The candidate list is pre-sorted ascending by the scanner, so the first
/// candidate whose extracted target is strictly greater than the current
/// version is the minimal safe upgrade. A leading `v` on the current version
/// (Go modules) is stripped before comparison. Returns `None` when no
/// candidate qualifies.
pub fn select_minimal_fix_version(
    current_version: &str,
    candidate_fix_versions: &[String],
) -> Option<String> {
    let current = current_version.strip_prefix('v').unwrap_or(current_version);
    for candidate in candidate_fix_versions {
        let Some(target) = parse_fix_version_candidate(candidate) else {
            continue;
        };
        if compare_versions(target, current) == Ordering::Greater {
            return Some(target.to_string());
        }
    }
    None
}

/// Whether upgrading from `current_version` to `target_version` crosses a
/// major-version boundary.
pub fn is_major_version_bump(current_version: &str, target_version: &str) -> bool {
    major_component(target_version) > major_component(current_version)
}

fn major_component(version: &str) -> u64 {
    let version = version.strip_prefix('v').unwrap_or(version);
    split_segments(version)
        .first()
        .and_then(|segment| segment.parse::<u64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_handles_uneven_segment_counts() {
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.6.22", "1.6.2"), Ordering::Greater);
        assert_eq!(compare_versions("1.6.2", "1.7"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "10.0.0"), Ordering::Less);
    }

    #[test]
    fn interval_lower_bounds_are_extracted() {
        assert_eq!(parse_fix_version_candidate("1.0"), Some("1.0"));
        assert_eq!(parse_fix_version_candidate("[1.0]"), Some("1.0"));
        assert_eq!(parse_fix_version_candidate("[1.0,2.0]"), Some("1.0"));
        assert_eq!(parse_fix_version_candidate("[1.0, 2.0]"), Some("1.0"));
    }

    #[test]
    fn open_lower_bound_intervals_are_unsupported() {
        assert_eq!(parse_fix_version_candidate("(,1.0]"), None);
        assert_eq!(parse_fix_version_candidate("(,1.0)"), None);
        assert_eq!(parse_fix_version_candidate("(1.0,)"), None);
        assert_eq!(parse_fix_version_candidate("(1.0,2.0)"), None);
        assert_eq!(parse_fix_version_candidate(""), None);
    }

    #[test]
    fn first_ascending_candidate_above_current_wins() {
        let candidates: Vec<String> = ["1.5.3", "1.6.1", "1.6.22", "1.7.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            select_minimal_fix_version("1.6.2", &candidates),
            Some("1.6.22".to_string())
        );
    }

    #[test]
    fn no_candidate_above_current_yields_none() {
        let candidates: Vec<String> = ["1.5.3", "1.6.1", "1.6.22", "1.7.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(select_minimal_fix_version("1.7.1", &candidates), None);
    }

    #[test]
    fn go_style_v_prefix_is_stripped() {
        let candidates = vec!["3.0.0".to_string()];
        assert_eq!(
            select_minimal_fix_version("v2.4.0", &candidates),
            Some("3.0.0".to_string())
        );
    }

    #[test]
    fn unsupported_candidates_are_skipped_not_fatal() {
        let candidates = vec!["(2.0.0,)".to_string(), "[2.1.0]".to_string()];
        assert_eq!(
            select_minimal_fix_version("2.0.0", &candidates),
            Some("2.1.0".to_string())
        );
    }

    #[test]
    fn major_bump_detection() {
        assert!(is_major_version_bump("1.9.4", "2.0.0"));
        assert!(!is_major_version_bump("1.2.0", "1.9.9"));
        assert!(is_major_version_bump("v1.2.0", "2.0.0"));
        assert!(!is_major_version_bump("2.0.0", "2.0.1"));
    }
}
