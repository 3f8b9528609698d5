//! Per-ecosystem package handlers.
//!
//! A [`PackageHandler`] applies one version bump to the working tree: it
//! either mutates descriptor/lock files so a subsequent diff shows the
//! upgrade, or returns an error. Handlers never touch git or the VCS
//! provider.
//!
//! [`handler_for`] is the closed dispatch table mapping a [`Technology`] to
//! its handler; the orchestrator memoizes the returned handlers per project
//! because some of them (Maven) pay a one-time indexing cost at construction.

pub mod generic;
pub mod pinned;
pub mod properties;
pub mod unsupported;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::BotConfig;
use crate::model::{FixCandidate, Technology};

pub use generic::GenericCommandHandler;
pub use pinned::PinnedManifestHandler;
pub use properties::PropertiesHandler;
pub use unsupported::UnsupportedPackageHandler;

/// Why a package cannot be auto-fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// The ecosystem only supports fixing dependencies declared in the
    /// descriptor file; bumping a transitive dependency could conflict with
    /// whatever depends on the previous version.
    IndirectDependency,
    /// The package is part of the build toolchain and is not declared in any
    /// descriptor file.
    BuildToolDependency,
    /// No handler exists for the ecosystem.
    UnknownEcosystem,
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            UnsupportedReason::IndirectDependency => {
                "indirect dependencies are not updated in this ecosystem"
            }
            UnsupportedReason::BuildToolDependency => {
                "build-tool dependencies are not declared in the package descriptor"
            }
            UnsupportedReason::UnknownEcosystem => "no handler exists for this ecosystem",
        };
        f.write_str(reason)
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    /// Typed, always-recoverable skip: the orchestrator downgrades this to a
    /// debug log instead of reporting a failure.
    #[error("skipping {package}: cannot update to {fix_version}: {reason}")]
    UnsupportedFix {
        package: String,
        fix_version: String,
        reason: UnsupportedReason,
    },
    #[error("command `{command}` exited with status {status}:\n{output}")]
    CommandFailed {
        command: String,
        status: i32,
        output: String,
    },
    #[error("no pinned occurrence of `{package}` found in {}", file.display())]
    PatternNotFound { package: String, file: PathBuf },
    #[error("invalid dependency pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HandlerError {
    /// True for the typed unsupported-fix skip, false for real failures.
    pub fn is_unsupported_fix(&self) -> bool {
        matches!(self, HandlerError::UnsupportedFix { .. })
    }

    pub(crate) fn unsupported(fix: &FixCandidate, reason: UnsupportedReason) -> Self {
        HandlerError::UnsupportedFix {
            package: fix.finding.impacted_package_name.clone(),
            fix_version: fix.suggested_fixed_version.clone(),
            reason,
        }
    }
}

/// Applies a version bump for one ecosystem.
#[async_trait]
pub trait PackageHandler: Send + Sync {
    /// Human-readable handler name, used for logging.
    fn name(&self) -> &str;

    /// Mutates the working tree so the impacted package resolves to the
    /// suggested fix version.
    async fn update_dependency(&self, fix: &FixCandidate) -> Result<(), HandlerError>;
}

/// Rejects packages that belong to the ecosystem's build toolchain rather
/// than the dependency descriptor. Checked before dispatch so even supported
/// ecosystems skip these.
pub fn check_build_tool_dependency(fix: &FixCandidate) -> Result<(), HandlerError> {
    if fix
        .technology
        .build_tools_dependencies()
        .contains(&fix.finding.impacted_package_name.as_str())
    {
        return Err(HandlerError::unsupported(
            fix,
            UnsupportedReason::BuildToolDependency,
        ));
    }
    Ok(())
}

/// Builds the handler for `technology`, rooted at `project_root`.
///
/// Maven handler construction scans the project's manifests to build its
/// property-reference index, which is why this returns a `Result`; callers
/// memoize the handler per technology+project so the cost is paid once.
pub fn handler_for(
    technology: &Technology,
    project_root: &Path,
    config: &BotConfig,
) -> Result<Arc<dyn PackageHandler>, HandlerError> {
    let handler: Arc<dyn PackageHandler> = match technology {
        Technology::Go | Technology::Npm | Technology::Yarn | Technology::Nuget => {
            Arc::new(GenericCommandHandler::new(technology.clone(), project_root))
        }
        Technology::Pip => Arc::new(PinnedManifestHandler::new(
            project_root.join(&config.requirements_file),
        )),
        Technology::Maven => Arc::new(PropertiesHandler::new(project_root)?),
        Technology::Other(_) => Arc::new(UnsupportedPackageHandler::new(technology.clone())),
    };
    Ok(handler)
}
