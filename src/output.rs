//! Markdown rendering for pull-request bodies.
//!
//! Pure string builders over the fixed candidate set. The hidden checksum
//! comment for aggregated pull requests is appended by
//! [`crate::fix::branch::embed_checksum`]; this module only knows how to
//! format content and hide a comment inside markdown.

use crate::model::FixCandidate;

const VULNERABLE_DEPENDENCIES_TITLE: &str = "## Vulnerable Dependencies";
const GENERATED_BY_FOOTER: &str = "_This pull request was generated automatically by fixbot._";

/// Wraps `text` in a markdown construct that renders as nothing, so machine
/// metadata can ride along inside a human-facing PR body.
pub fn markdown_comment(text: &str) -> String {
    format!("\n\n[comment]: <> ({text})")
}

/// Renders the full PR body for a set of fixed packages.
pub fn render_pull_request_body(fixed: &[&FixCandidate]) -> String {
    let mut body = String::new();
    body.push_str(VULNERABLE_DEPENDENCIES_TITLE);
    body.push('\n');
    for candidate in fixed {
        body.push('\n');
        body.push_str(&render_candidate_section(candidate));
    }
    body.push('\n');
    body.push_str(GENERATED_BY_FOOTER);
    body.push('\n');
    body
}

fn render_candidate_section(candidate: &FixCandidate) -> String {
    let finding = &candidate.finding;
    let mut section = format!(
        "### {} `{}` → `{}`\n\n",
        finding.impacted_package_name,
        finding.impacted_package_version,
        candidate.suggested_fixed_version
    );
    section.push_str(&format!("- **Severity**: {}\n", finding.severity));
    section.push_str(&format!(
        "- **Dependency type**: {}\n",
        if candidate.is_direct_dependency {
            "direct"
        } else {
            "transitive"
        }
    ));
    section.push_str(&format!("- **Ecosystem**: {}\n", candidate.technology));
    if !candidate.cves.is_empty() {
        let cves: Vec<&str> = candidate.cves.iter().map(String::as_str).collect();
        section.push_str(&format!("- **CVEs**: {}\n", cves.join(", ")));
    }
    if let Some(summary) = &finding.summary {
        section.push_str(&format!("\n{summary}\n"));
    }
    if let Some(remediation) = &finding.remediation {
        section.push_str(&format!("\n**Remediation**: {remediation}\n"));
    }
    section
}
