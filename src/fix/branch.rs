//! Deterministic branch naming, commit/PR templates and the aggregated-scan
//! checksum.
//!
//! Branch names are content-addressed: an MD5 hash over the naming inputs
//! makes re-runs against unchanged findings reproduce the same ref, which is
//! what the idempotence short-circuits in the lifecycle manager key off.
//! Everything here is a pure function over explicit inputs.

use md5::{Digest, Md5};
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::{FixCandidate, Technology};
use crate::output::markdown_comment;

/// Placeholder tokens accepted by the custom naming templates.
pub const PACKAGE_PLACEHOLDER: &str = "{IMPACTED_PACKAGE}";
pub const FIX_VERSION_PLACEHOLDER: &str = "{FIX_VERSION}";
pub const BRANCH_HASH_PLACEHOLDER: &str = "{BRANCH_NAME_HASH}";

const BRANCH_NAME_TEMPLATE: &str = "fixbot-{IMPACTED_PACKAGE}-{BRANCH_NAME_HASH}";
const AGGREGATED_BRANCH_NAME_TEMPLATE: &str = "fixbot-update-{BRANCH_NAME_HASH}-dependencies";
const COMMIT_MESSAGE_TEMPLATE: &str = "Upgrade {IMPACTED_PACKAGE} to {FIX_VERSION}";
const PULL_REQUEST_TITLE_TEMPLATE: &str =
    "[fixbot] Update version of {IMPACTED_PACKAGE} to {FIX_VERSION}";
const AGGREGATED_PULL_REQUEST_TITLE_PREFIX: &str = "[fixbot] Update";

/// Textual marker preceding the embedded scan checksum in a PR body.
pub const CHECKSUM_MARKER: &str = "Checksum: ";

const BRANCH_NAME_MAX_LENGTH: usize = 255;
// Characters git refuses in ref names, plus backslash.
const BRANCH_INVALID_CHARS_PATTERN: &str = r"[~^:?\\\[\]@{}*]";
// Seed prepended to every hash so fixbot refs never collide with refs hashed
// by other tooling over the same inputs.
const HASH_SEED: &str = "fixbot";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BranchTemplateError {
    #[error("branch template cannot contain the following chars: ~, ^, :, ?, *, [, ], @, {{, }}")]
    InvalidChars,
    #[error("branch template cannot start with '-'")]
    InvalidPrefix,
    #[error("branch template length exceeds {BRANCH_NAME_MAX_LENGTH} chars")]
    TooLong,
    #[error("branch template must contain the {BRANCH_HASH_PLACEHOLDER} placeholder")]
    MissingHashPlaceholder,
}

/// Derives branch names, commit messages and pull-request titles for one base
/// branch, honoring optional custom templates.
#[derive(Debug, Clone, Copy)]
pub struct FixBranchNamer<'a> {
    pub base_branch: &'a str,
    pub branch_name_template: Option<&'a str>,
    pub commit_message_template: Option<&'a str>,
    pub pull_request_title_template: Option<&'a str>,
}

impl<'a> FixBranchNamer<'a> {
    pub fn new(base_branch: &'a str) -> Self {
        Self {
            base_branch,
            branch_name_template: None,
            commit_message_template: None,
            pull_request_title_template: None,
        }
    }

    /// Branch name for a single-package fix, stable across runs for the same
    /// (base branch, package, fix version) triple.
    pub fn fix_branch_name(&self, package: &str, fix_version: &str) -> String {
        let hash = md5_hex([HASH_SEED, self.base_branch, package, fix_version]);
        // Maven package names usually carry colons, which git refuses in refs.
        let ref_safe_package = package.replace(':', "_");
        let template = self.branch_name_template.unwrap_or(BRANCH_NAME_TEMPLATE);
        format_with_placeholders(template, &ref_safe_package, fix_version, &hash, false)
    }

    /// Branch name for the aggregated fix, derived from the base branch and
    /// the set of ecosystems touched.
    pub fn aggregated_fix_branch_name(&self, technologies: &BTreeSet<Technology>) -> String {
        let mut parts: Vec<&str> = vec![HASH_SEED, self.base_branch];
        for technology in technologies {
            parts.push(technology.as_str());
        }
        let hash = md5_hex(parts);
        let template = self
            .branch_name_template
            .unwrap_or(AGGREGATED_BRANCH_NAME_TEMPLATE);
        format_with_placeholders(template, "", "", &hash, false)
    }

    pub fn commit_message(&self, package: &str, fix_version: &str) -> String {
        let template = self
            .commit_message_template
            .unwrap_or(COMMIT_MESSAGE_TEMPLATE);
        format_with_placeholders(template, package, fix_version, "", true)
    }

    pub fn aggregated_commit_message(&self, technologies: &BTreeSet<Technology>) -> String {
        match self.commit_message_template {
            Some(template) => format_with_placeholders(template, "", "", "", true),
            None => self.aggregated_pull_request_title(technologies),
        }
    }

    pub fn pull_request_title(&self, package: &str, fix_version: &str) -> String {
        let template = self
            .pull_request_title_template
            .unwrap_or(PULL_REQUEST_TITLE_TEMPLATE);
        format_with_placeholders(template, package, fix_version, "", true)
    }

    pub fn aggregated_pull_request_title(&self, technologies: &BTreeSet<Technology>) -> String {
        if technologies.is_empty() {
            return format!("{AGGREGATED_PULL_REQUEST_TITLE_PREFIX} dependencies");
        }
        let tags: Vec<&str> = technologies.iter().map(Technology::as_str).collect();
        format!(
            "{AGGREGATED_PULL_REQUEST_TITLE_PREFIX} {} dependencies",
            tags.join(",")
        )
    }
}

/// Validates a custom branch-name template against git ref restrictions.
pub fn validate_branch_name_template(template: &str) -> Result<(), BranchTemplateError> {
    // Empty means "use the default template".
    if template.is_empty() {
        return Ok(());
    }
    let without_placeholders = format_with_placeholders(template, "", "", "", true);
    let invalid_chars =
        Regex::new(BRANCH_INVALID_CHARS_PATTERN).expect("invalid chars pattern is well-formed");
    if invalid_chars.is_match(&without_placeholders) {
        return Err(BranchTemplateError::InvalidChars);
    }
    if template.starts_with('-') {
        return Err(BranchTemplateError::InvalidPrefix);
    }
    if template.len() > BRANCH_NAME_MAX_LENGTH {
        return Err(BranchTemplateError::TooLong);
    }
    if !template.contains(BRANCH_HASH_PLACEHOLDER) {
        return Err(BranchTemplateError::MissingHashPlaceholder);
    }
    Ok(())
}

/// MD5 digest over the sorted unique keys of a fixed-finding set.
///
/// Map iteration order must not influence the digest, so keys are sorted
/// before hashing. Two runs producing the same fix set therefore embed the
/// same checksum, which is how the aggregated-PR "in sync" short-circuit
/// detects that nothing changed.
pub fn scan_checksum<'a, I>(fixed: I) -> String
where
    I: IntoIterator<Item = &'a FixCandidate>,
{
    let mut keys: Vec<String> = fixed.into_iter().map(FixCandidate::unique_key).collect();
    keys.sort();
    let mut hasher = Md5::new();
    for key in &keys {
        hasher.update(key.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Appends the checksum to a PR body as a hidden markdown comment.
pub fn embed_checksum(body: &str, checksum: &str) -> String {
    format!(
        "{body}{}",
        markdown_comment(&format!("{CHECKSUM_MARKER}{checksum}"))
    )
}

/// Reads back the checksum embedded by [`embed_checksum`]. First match wins;
/// `None` when the body carries no checksum (e.g. a PR predating the marker),
/// in which case callers treat the remote as out of date.
pub fn extract_checksum(body: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"{CHECKSUM_MARKER}(\w+)"))
        .expect("checksum pattern is well-formed");
    pattern
        .captures(body)
        .map(|captures| captures[1].to_string())
}

fn md5_hex<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn format_with_placeholders(
    template: &str,
    package: &str,
    fix_version: &str,
    hash: &str,
    allow_spaces: bool,
) -> String {
    let mut formatted = template
        .replacen(PACKAGE_PLACEHOLDER, package, 1)
        .replacen(FIX_VERSION_PLACEHOLDER, fix_version, 1)
        .replacen(BRANCH_HASH_PLACEHOLDER, hash, 1);
    if !allow_spaces {
        formatted = formatted.replace(' ', "_");
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImpactPathNode, Severity, VulnerabilityFinding};

    fn candidate(name: &str, version: &str, issue: &str) -> FixCandidate {
        let finding = VulnerabilityFinding {
            impacted_package_name: name.to_string(),
            impacted_package_version: version.to_string(),
            fix_versions: vec!["9.9.9".to_string()],
            severity: Severity::High,
            cves: vec![],
            technology: Technology::Go,
            impact_paths: vec![vec![ImpactPathNode {
                name: "root".to_string(),
                version: "0.0.0".to_string(),
            }]],
            issue_id: issue.to_string(),
            summary: None,
            remediation: None,
        };
        FixCandidate::new(finding, "9.9.9".to_string(), true)
    }

    #[test]
    fn fix_branch_name_is_deterministic_and_ref_safe() {
        let namer = FixBranchNamer::new("dev");
        let first = namer.fix_branch_name("gopkg.in/yaml.v3", "3.0.0");
        let second = namer.fix_branch_name("gopkg.in/yaml.v3", "3.0.0");
        assert_eq!(first, second);
        assert!(!first.contains(':'));
        assert!(!first.contains(' '));

        // Maven coordinates lose their colon.
        let maven = namer.fix_branch_name("org.slf4j:slf4j-api", "2.0.9");
        assert!(!maven.contains(':'));
        assert!(maven.contains("org.slf4j_slf4j-api"));
    }

    #[test]
    fn different_inputs_give_different_branch_names() {
        let namer = FixBranchNamer::new("dev");
        let a = namer.fix_branch_name("pkg", "1.0.0");
        let b = namer.fix_branch_name("pkg", "1.0.1");
        assert_ne!(a, b);

        let other_base = FixBranchNamer::new("main");
        assert_ne!(a, other_base.fix_branch_name("pkg", "1.0.0"));
    }

    #[test]
    fn aggregated_branch_name_depends_on_technology_set() {
        let namer = FixBranchNamer::new("main");
        let go_only: BTreeSet<Technology> = [Technology::Go].into_iter().collect();
        let go_npm: BTreeSet<Technology> =
            [Technology::Go, Technology::Npm].into_iter().collect();
        assert_ne!(
            namer.aggregated_fix_branch_name(&go_only),
            namer.aggregated_fix_branch_name(&go_npm)
        );
        assert_eq!(
            namer.aggregated_fix_branch_name(&go_npm),
            namer.aggregated_fix_branch_name(&go_npm)
        );
    }

    #[test]
    fn custom_templates_are_honored() {
        let namer = FixBranchNamer {
            base_branch: "main",
            branch_name_template: Some("deps/{IMPACTED_PACKAGE}/{BRANCH_NAME_HASH}"),
            commit_message_template: Some("chore: bump {IMPACTED_PACKAGE} to {FIX_VERSION}"),
            pull_request_title_template: Some("Bump {IMPACTED_PACKAGE}"),
        };
        let branch = namer.fix_branch_name("lodash", "4.17.21");
        assert!(branch.starts_with("deps/lodash/"));
        assert_eq!(
            namer.commit_message("lodash", "4.17.21"),
            "chore: bump lodash to 4.17.21"
        );
        assert_eq!(namer.pull_request_title("lodash", "4.17.21"), "Bump lodash");
    }

    #[test]
    fn aggregated_title_lists_sorted_technologies() {
        let namer = FixBranchNamer::new("main");
        let technologies: BTreeSet<Technology> =
            [Technology::Npm, Technology::Go].into_iter().collect();
        assert_eq!(
            namer.aggregated_pull_request_title(&technologies),
            "[fixbot] Update go,npm dependencies"
        );
        assert_eq!(
            namer.aggregated_pull_request_title(&BTreeSet::new()),
            "[fixbot] Update dependencies"
        );
    }

    #[test]
    fn template_validation_rejects_bad_refs() {
        assert_eq!(validate_branch_name_template(""), Ok(()));
        assert_eq!(
            validate_branch_name_template("fix-{IMPACTED_PACKAGE}-{BRANCH_NAME_HASH}"),
            Ok(())
        );
        assert_eq!(
            validate_branch_name_template("fix:{BRANCH_NAME_HASH}"),
            Err(BranchTemplateError::InvalidChars)
        );
        assert_eq!(
            validate_branch_name_template("-fix-{BRANCH_NAME_HASH}"),
            Err(BranchTemplateError::InvalidPrefix)
        );
        assert_eq!(
            validate_branch_name_template("fix-static-name"),
            Err(BranchTemplateError::MissingHashPlaceholder)
        );
        let long = format!("{}{}", "x".repeat(300), BRANCH_HASH_PLACEHOLDER);
        assert_eq!(
            validate_branch_name_template(&long),
            Err(BranchTemplateError::TooLong)
        );
    }

    #[test]
    fn checksum_ignores_iteration_order() {
        let a = candidate("pkg-a", "1.0.0", "XRAY-1");
        let b = candidate("pkg-b", "2.0.0", "XRAY-2");
        let forward = scan_checksum([&a, &b]);
        let reverse = scan_checksum([&b, &a]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 32);
        assert!(forward.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn checksum_round_trips_through_pr_body() {
        let a = candidate("pkg-a", "1.0.0", "XRAY-1");
        let checksum = scan_checksum([a].iter());
        let body = embed_checksum("## Vulnerable dependencies\n\nfixed things", &checksum);
        assert_eq!(extract_checksum(&body), Some(checksum));
    }

    #[test]
    fn missing_checksum_reads_as_none() {
        assert_eq!(extract_checksum("no marker here"), None);
    }
}
