//! Handler for ecosystems with a `pkg==version` pinned descriptor file
//! (pip requirements style).
//!
//! The rewrite locates the exact pinned occurrence through a line-anchored,
//! case-insensitive pattern that also matches the comparison operator and the
//! version token, then performs a single textual substitution. Zero matches
//! is a failure, never a silent no-op.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::FixCandidate;

use super::{HandlerError, PackageHandler, UnsupportedReason};

pub struct PinnedManifestHandler {
    descriptor: PathBuf,
}

impl PinnedManifestHandler {
    pub fn new(descriptor: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: descriptor.into(),
        }
    }

    fn pinned_version_pattern(package: &str) -> Result<Regex, HandlerError> {
        // Matches e.g. `Requests == 2.25.1`, `requests>=2.25`, case-insensitive.
        // Anchored at line start so `requests` never matches the tail of a
        // line pinning `my-requests`.
        let pattern = format!(
            r"(?im)^([ \t]*){}\s*(?:==|===|~=|>=|<=|!=|>|<)\s*[0-9][A-Za-z0-9._+\-\*]*",
            regex::escape(package)
        );
        Ok(Regex::new(&pattern)?)
    }
}

#[async_trait]
impl PackageHandler for PinnedManifestHandler {
    fn name(&self) -> &str {
        "pip"
    }

    async fn update_dependency(&self, fix: &FixCandidate) -> Result<(), HandlerError> {
        if !fix.is_direct_dependency {
            return Err(HandlerError::unsupported(
                fix,
                UnsupportedReason::IndirectDependency,
            ));
        }

        let package = &fix.finding.impacted_package_name;
        let content = tokio::fs::read_to_string(&self.descriptor).await?;
        let pattern = Self::pinned_version_pattern(package)?;
        if !pattern.is_match(&content) {
            return Err(HandlerError::PatternNotFound {
                package: package.clone(),
                file: self.descriptor.clone(),
            });
        }

        let fix_version = &fix.suggested_fixed_version;
        let updated = pattern.replace(&content, |captures: &regex::Captures<'_>| {
            format!("{}{package}=={fix_version}", &captures[1])
        });
        debug!(
            package = %package,
            fix_version = %fix.suggested_fixed_version,
            file = %self.descriptor.display(),
            "rewriting pinned descriptor"
        );
        tokio::fs::write(&self.descriptor, updated.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImpactPathNode, Severity, Technology, VulnerabilityFinding};
    use std::io::Write;

    fn fix(package: &str, fix_version: &str, direct: bool) -> FixCandidate {
        let finding = VulnerabilityFinding {
            impacted_package_name: package.to_string(),
            impacted_package_version: "0.0.1".to_string(),
            fix_versions: vec![fix_version.to_string()],
            severity: Severity::High,
            cves: vec![],
            technology: Technology::Pip,
            impact_paths: vec![vec![ImpactPathNode {
                name: "root".to_string(),
                version: "0.0.0".to_string(),
            }]],
            issue_id: "XRAY-1".to_string(),
            summary: None,
            remediation: None,
        };
        FixCandidate::new(finding, fix_version.to_string(), direct)
    }

    fn descriptor_with(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn rewrites_pinned_version_in_place() {
        let (_dir, path) = descriptor_with("flask==1.1.1\nrequests == 2.25.1\nnumpy>=1.19\n");
        let handler = PinnedManifestHandler::new(&path);
        handler
            .update_dependency(&fix("requests", "2.31.0", true))
            .await
            .unwrap();
        let updated = std::fs::read_to_string(&path).unwrap();
        assert!(updated.contains("requests==2.31.0"));
        // Neighbors stay untouched.
        assert!(updated.contains("flask==1.1.1"));
        assert!(updated.contains("numpy>=1.19"));
    }

    #[tokio::test]
    async fn similarly_named_packages_are_left_alone() {
        let (_dir, path) = descriptor_with("my-requests==1.0.0\n  requests==2.25.1\n");
        let handler = PinnedManifestHandler::new(&path);
        handler
            .update_dependency(&fix("requests", "2.31.0", true))
            .await
            .unwrap();
        let updated = std::fs::read_to_string(&path).unwrap();
        // The longer name never matches, and indentation survives the rewrite.
        assert_eq!(updated, "my-requests==1.0.0\n  requests==2.31.0\n");
    }

    #[tokio::test]
    async fn match_is_case_insensitive() {
        let (_dir, path) = descriptor_with("Requests==2.25.1\n");
        let handler = PinnedManifestHandler::new(&path);
        handler
            .update_dependency(&fix("requests", "2.31.0", true))
            .await
            .unwrap();
        let updated = std::fs::read_to_string(&path).unwrap();
        assert_eq!(updated.trim(), "requests==2.31.0");
    }

    #[tokio::test]
    async fn only_the_first_occurrence_is_replaced() {
        let (_dir, path) = descriptor_with("pyyaml==5.3\npyyaml==5.3\n");
        let handler = PinnedManifestHandler::new(&path);
        handler
            .update_dependency(&fix("pyyaml", "5.4", true))
            .await
            .unwrap();
        let updated = std::fs::read_to_string(&path).unwrap();
        assert_eq!(updated, "pyyaml==5.4\npyyaml==5.3\n");
    }

    #[tokio::test]
    async fn missing_occurrence_is_an_error_not_a_noop() {
        let (_dir, path) = descriptor_with("flask==1.1.1\n");
        let original = std::fs::read_to_string(&path).unwrap();
        let handler = PinnedManifestHandler::new(&path);
        let error = handler
            .update_dependency(&fix("requests", "2.31.0", true))
            .await
            .unwrap_err();
        assert!(matches!(error, HandlerError::PatternNotFound { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn indirect_dependency_is_unsupported() {
        let (_dir, path) = descriptor_with("requests==2.25.1\n");
        let handler = PinnedManifestHandler::new(&path);
        let error = handler
            .update_dependency(&fix("requests", "2.31.0", false))
            .await
            .unwrap_err();
        assert!(error.is_unsupported_fix());
    }
}
