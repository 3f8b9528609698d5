//! Handler for the Maven-style properties-indirection ecosystem.
//!
//! A dependency's version in a `pom.xml` is either a literal
//! `<version>1.2.3</version>` or a reference to a named build property
//! (`<version>${commons.version}</version>`) defined elsewhere, possibly in a
//! parent manifest. Fixing the second shape requires knowing which properties
//! reference the impacted package, so construction builds a reverse index
//! package → property names by parsing every manifest once. The orchestrator
//! memoizes the handler per project to amortize that cost across packages.

use async_trait::async_trait;
use regex::{NoExpand, Regex};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::model::FixCandidate;

use super::{HandlerError, PackageHandler, UnsupportedReason};

const MANIFEST_FILE_NAME: &str = "pom.xml";

pub struct PropertiesHandler {
    manifests: Vec<PathBuf>,
    /// package name (`group:artifact`) → build properties referencing it.
    property_index: HashMap<String, BTreeSet<String>>,
}

impl PropertiesHandler {
    /// Scans `project_root` for manifests and builds the property-reference
    /// index. One-time cost per project.
    pub fn new(project_root: &Path) -> Result<Self, HandlerError> {
        let mut manifests = Vec::new();
        for entry in WalkDir::new(project_root).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE_NAME {
                manifests.push(entry.into_path());
            }
        }
        manifests.sort();

        let mut property_index: HashMap<String, BTreeSet<String>> = HashMap::new();
        let dependency_block = dependency_block_pattern()?;
        for manifest in &manifests {
            let content = std::fs::read_to_string(manifest)?;
            for captures in dependency_block.captures_iter(&content) {
                let package = format!("{}:{}", captures[1].trim(), captures[2].trim());
                let version = captures[3].trim();
                if let Some(property) = property_reference(version) {
                    property_index
                        .entry(package)
                        .or_default()
                        .insert(property.to_string());
                }
            }
        }
        debug!(
            manifests = manifests.len(),
            indexed_packages = property_index.len(),
            "built property-reference index"
        );
        Ok(Self {
            manifests,
            property_index,
        })
    }

    fn rewrite_manifest(
        &self,
        content: &str,
        package: &str,
        fix_version: &str,
    ) -> Result<Option<String>, HandlerError> {
        let mut updated = content.to_string();
        let mut changed = false;

        if let Some(properties) = self.property_index.get(package) {
            for property in properties {
                let pattern = Regex::new(&format!(
                    r"<{0}>\s*[^<]*\s*</{0}>",
                    regex::escape(property)
                ))?;
                if pattern.is_match(&updated) {
                    let replacement = format!("<{property}>{fix_version}</{property}>");
                    updated = pattern
                        .replace_all(&updated, NoExpand(&replacement))
                        .into_owned();
                    changed = true;
                }
            }
        }

        if let Some(rewritten) = replace_literal_version(&updated, package, fix_version)? {
            updated = rewritten;
            changed = true;
        }

        Ok(changed.then_some(updated))
    }
}

#[async_trait]
impl PackageHandler for PropertiesHandler {
    fn name(&self) -> &str {
        "maven"
    }

    async fn update_dependency(&self, fix: &FixCandidate) -> Result<(), HandlerError> {
        if !fix.is_direct_dependency {
            return Err(HandlerError::unsupported(
                fix,
                UnsupportedReason::IndirectDependency,
            ));
        }

        let package = &fix.finding.impacted_package_name;
        let mut any_changed = false;
        for manifest in &self.manifests {
            let content = tokio::fs::read_to_string(manifest).await?;
            if let Some(updated) =
                self.rewrite_manifest(&content, package, &fix.suggested_fixed_version)?
            {
                tokio::fs::write(manifest, updated.as_bytes()).await?;
                any_changed = true;
            }
        }
        if !any_changed {
            return Err(HandlerError::PatternNotFound {
                package: package.clone(),
                file: self
                    .manifests
                    .first()
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(MANIFEST_FILE_NAME)),
            });
        }
        Ok(())
    }
}

fn dependency_block_pattern() -> Result<Regex, HandlerError> {
    Ok(Regex::new(
        r"(?s)<groupId>\s*([^<]+?)\s*</groupId>\s*<artifactId>\s*([^<]+?)\s*</artifactId>.{0,200}?<version>\s*([^<]+?)\s*</version>",
    )?)
}

/// `${commons.version}` → `commons.version`.
fn property_reference(version: &str) -> Option<&str> {
    version.strip_prefix("${")?.strip_suffix('}')
}

/// Replaces the first literal (non-property) version declared for `package`.
fn replace_literal_version(
    content: &str,
    package: &str,
    fix_version: &str,
) -> Result<Option<String>, HandlerError> {
    let (group, artifact) = match package.split_once(':') {
        Some(coordinates) => coordinates,
        None => return Ok(None),
    };
    let pattern = Regex::new(&format!(
        r"(?s)<groupId>\s*{}\s*</groupId>\s*<artifactId>\s*{}\s*</artifactId>.{{0,200}}?<version>\s*([^<]+?)\s*</version>",
        regex::escape(group),
        regex::escape(artifact)
    ))?;
    let Some(captures) = pattern.captures(content) else {
        return Ok(None);
    };
    let version = captures.get(1).expect("pattern has one capture group");
    if property_reference(version.as_str()).is_some() {
        // Property references were already rewritten through the index.
        return Ok(None);
    }
    let mut updated = String::with_capacity(content.len());
    updated.push_str(&content[..version.start()]);
    updated.push_str(fix_version);
    updated.push_str(&content[version.end()..]);
    Ok(Some(updated))
}
