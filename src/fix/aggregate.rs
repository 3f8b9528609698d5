//! Deduplication of scanner findings into one fix candidate per package.
//!
//! Several findings commonly hit the same impacted package. The map built here
//! keeps a single [`FixCandidate`] per package name, selecting the minimal
//! safe fix version per finding and the maximum of those minimums across
//! findings, so the chosen upgrade remediates every advisory at once.

use thiserror::Error;
use tracing::debug;

use crate::model::{FixCandidate, FixVersionsMap, ImpactPathNode, VulnerabilityFinding};
use crate::version::{is_major_version_bump, select_minimal_fix_version};

#[derive(Error, Debug)]
pub enum AggregationError {
    /// The scanner contract guarantees at least one impact path per finding;
    /// its absence means the scan output is corrupt.
    #[error("finding for '{package}' carries no impact path")]
    EmptyImpactPath { package: String },
}

/// Folds scanner findings into a per-package fix map.
///
/// Findings without any fix version are skipped. When
/// `allow_major_version_bumps` is false, candidates that would cross a
/// major-version boundary are treated as unavailable before selection, which
/// preserves the minimal-version choice among the remaining candidates.
pub fn build_fix_versions_map(
    findings: &[VulnerabilityFinding],
    allow_major_version_bumps: bool,
) -> Result<FixVersionsMap, AggregationError> {
    let mut map = FixVersionsMap::new();
    for finding in findings {
        if finding.fix_versions.is_empty() {
            debug!(
                package = %finding.impacted_package_name,
                issue = %finding.issue_id,
                "no fix version available, skipping finding"
            );
            continue;
        }
        let candidates = eligible_fix_versions(finding, allow_major_version_bumps);
        let Some(fix_version) =
            select_minimal_fix_version(&finding.impacted_package_version, &candidates)
        else {
            debug!(
                package = %finding.impacted_package_name,
                current = %finding.impacted_package_version,
                "no eligible fix version above the current one, skipping finding"
            );
            continue;
        };

        match map.get_mut(&finding.impacted_package_name) {
            Some(existing) => {
                existing.update_fix_version_if_max(&fix_version);
                existing.accumulate_cves(&finding.cves);
            }
            None => {
                let direct = is_direct_dependency(&finding.impact_paths).ok_or_else(|| {
                    AggregationError::EmptyImpactPath {
                        package: finding.impacted_package_name.clone(),
                    }
                })?;
                map.insert(
                    finding.impacted_package_name.clone(),
                    FixCandidate::new(finding.clone(), fix_version, direct),
                );
            }
        }
    }
    Ok(map)
}

fn eligible_fix_versions(
    finding: &VulnerabilityFinding,
    allow_major_version_bumps: bool,
) -> Vec<String> {
    if allow_major_version_bumps {
        return finding.fix_versions.clone();
    }
    finding
        .fix_versions
        .iter()
        .filter(|candidate| {
            match crate::version::parse_fix_version_candidate(candidate) {
                Some(target) => {
                    !is_major_version_bump(&finding.impacted_package_version, target)
                }
                // Unparseable candidates are skipped during selection anyway.
                None => true,
            }
        })
        .cloned()
        .collect()
}

/// A package is direct when the shortest path from the scanned root has fewer
/// than three nodes (root → package). `None` when the paths are missing, which
/// violates the scanner contract.
pub fn is_direct_dependency(impact_paths: &[Vec<ImpactPathNode>]) -> Option<bool> {
    let first = impact_paths.first()?;
    if first.is_empty() {
        return None;
    }
    Some(first.len() < 3)
}
