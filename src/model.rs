//! Scanner-facing data model.
//!
//! [`VulnerabilityFinding`] is the immutable record produced by the external
//! dependency scanner. [`FixCandidate`] is the mutable per-package remediation
//! choice derived from one or more findings by the aggregation map.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::version::compare_versions;

/// Package ecosystems the bot knows how to remediate.
///
/// Unrecognized ecosystem tags round-trip through [`Technology::Other`] so a
/// scanner can report technologies the bot has no handler for; those packages
/// end up in the unsupported handler rather than being dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Technology {
    Go,
    Npm,
    Yarn,
    Nuget,
    Pip,
    Maven,
    Other(String),
}

impl Technology {
    /// Canonical lowercase tag, as reported by scanners.
    pub fn as_str(&self) -> &str {
        match self {
            Technology::Go => "go",
            Technology::Npm => "npm",
            Technology::Yarn => "yarn",
            Technology::Nuget => "nuget",
            Technology::Pip => "pip",
            Technology::Maven => "maven",
            Technology::Other(tag) => tag,
        }
    }

    /// Full argv for the ecosystem's `install <pkg>@<version>` style upgrade
    /// command, or `None` for ecosystems fixed through file rewriting.
    pub fn install_command(&self, package: &str, fix_version: &str) -> Option<Vec<String>> {
        let argv: Vec<String> = match self {
            Technology::Go => vec![
                "go".into(),
                "get".into(),
                format!("{package}@v{fix_version}"),
            ],
            Technology::Npm => vec![
                "npm".into(),
                "install".into(),
                format!("{package}@{fix_version}"),
            ],
            Technology::Yarn => vec![
                "yarn".into(),
                "up".into(),
                format!("{package}@{fix_version}"),
            ],
            Technology::Nuget => vec![
                "dotnet".into(),
                "add".into(),
                "package".into(),
                package.into(),
                "--version".into(),
                fix_version.into(),
            ],
            _ => return None,
        };
        Some(argv)
    }

    /// Whether the ecosystem can safely bump a transitive dependency.
    ///
    /// In Go every dependency can be addressed as if it were direct; the other
    /// ecosystems only support fixing packages declared in the descriptor.
    pub fn supports_transitive_fix(&self) -> bool {
        matches!(self, Technology::Go)
    }

    /// Build-tool dependencies that are not declared in any descriptor file
    /// and therefore cannot be fixed through a pull request.
    pub fn build_tools_dependencies(&self) -> &'static [&'static str] {
        match self {
            Technology::Go => &["github.com/golang/go"],
            Technology::Pip => &["pip", "setuptools", "wheel"],
            _ => &[],
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Technology {
    fn from(tag: String) -> Self {
        match tag.to_lowercase().as_str() {
            "go" | "golang" => Technology::Go,
            "npm" => Technology::Npm,
            "yarn" => Technology::Yarn,
            "nuget" | "dotnet" => Technology::Nuget,
            "pip" | "python" => Technology::Pip,
            "maven" => Technology::Maven,
            _ => Technology::Other(tag),
        }
    }
}

impl From<Technology> for String {
    fn from(technology: Technology) -> Self {
        technology.as_str().to_string()
    }
}

/// Severity reported by the scanner, ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Unknown => "Unknown",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(name)
    }
}

/// One hop in the dependency chain from the scanned root to the impacted
/// package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactPathNode {
    pub name: String,
    pub version: String,
}

/// A single vulnerability reported by the external scanner.
///
/// Immutable once produced. `fix_versions` is sorted ascending by the scanner
/// and each entry uses mathematical interval notation (see
/// [`crate::version::parse_fix_version_candidate`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    /// Impacted package name, e.g. `gopkg.in/yaml.v3` or `org.slf4j:slf4j-api`.
    pub impacted_package_name: String,
    /// Version of the impacted package currently in use.
    pub impacted_package_version: String,
    /// Candidate fix versions, ascending, interval notation.
    pub fix_versions: Vec<String>,
    pub severity: Severity,
    /// CVE identifiers attached to this finding.
    pub cves: Vec<String>,
    pub technology: Technology,
    /// One entry per dependency chain leading to the impacted package. The
    /// scanner guarantees at least one path with at least one node.
    pub impact_paths: Vec<Vec<ImpactPathNode>>,
    /// Scanner-internal issue identifier, unique per advisory.
    pub issue_id: String,
    /// Short human-readable description of the vulnerability.
    pub summary: Option<String>,
    /// Optional remediation guidance from the research team.
    pub remediation: Option<String>,
}

/// A package chosen for remediation with one selected target version.
///
/// Created on the first finding for a package and updated in place by later
/// findings; the aggregation map in [`crate::fix::aggregate`] is the single
/// writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixCandidate {
    /// The originating finding, kept for report rendering.
    pub finding: VulnerabilityFinding,
    /// The selected fix version, always strictly greater than the impacted
    /// version.
    pub suggested_fixed_version: String,
    pub is_direct_dependency: bool,
    pub technology: Technology,
    /// CVE identifiers accumulated across every finding on this package.
    pub cves: BTreeSet<String>,
}

impl FixCandidate {
    pub fn new(
        finding: VulnerabilityFinding,
        suggested_fixed_version: String,
        is_direct_dependency: bool,
    ) -> Self {
        let technology = finding.technology.clone();
        let cves = finding.cves.iter().cloned().collect();
        Self {
            finding,
            suggested_fixed_version,
            is_direct_dependency,
            technology,
            cves,
        }
    }

    /// Raises the suggested fix version to `fix_version` if it is strictly
    /// greater than the current suggestion. Ties keep the existing value.
    ///
    /// Several findings can hit the same impacted package; among the
    /// per-finding minimal fix versions the maximum is required to remediate
    /// all of them.
    pub fn update_fix_version_if_max(&mut self, fix_version: &str) {
        if self.suggested_fixed_version.is_empty()
            || compare_versions(fix_version, &self.suggested_fixed_version)
                == std::cmp::Ordering::Greater
        {
            self.suggested_fixed_version = fix_version.to_string();
        }
    }

    pub fn accumulate_cves<'a, I: IntoIterator<Item = &'a String>>(&mut self, cves: I) {
        self.cves.extend(cves.into_iter().cloned());
    }

    /// Stable identity string used by the aggregated-scan checksum.
    pub fn unique_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.finding.impacted_package_name,
            self.finding.impacted_package_version,
            self.finding.issue_id,
            !self.finding.fix_versions.is_empty()
        )
    }
}

/// Deduplicated impacted-package-name → fix-candidate mapping for one scanned
/// working directory. `BTreeMap` keeps iteration deterministic so branch names
/// and pull-request bodies are reproducible across runs.
pub type FixVersionsMap = BTreeMap<String, FixCandidate>;

/// Pull-request creation payload handed to the VCS client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub body: String,
}

/// An open pull request as read back from the VCS provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub id: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub body: String,
}

/// Repository metadata from the VCS provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub clone_url: String,
    pub default_branch: String,
}
