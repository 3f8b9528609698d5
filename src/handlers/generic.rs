//! Handler for ecosystems whose package manager supports an
//! `install <pkg>@<version>` style upgrade command (go, npm, yarn, nuget).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::model::{FixCandidate, Technology};

use super::{HandlerError, PackageHandler, UnsupportedReason};

pub struct GenericCommandHandler {
    technology: Technology,
    project_root: PathBuf,
}

impl GenericCommandHandler {
    pub fn new(technology: Technology, project_root: &Path) -> Self {
        Self {
            technology,
            project_root: project_root.to_path_buf(),
        }
    }
}

#[async_trait]
impl PackageHandler for GenericCommandHandler {
    fn name(&self) -> &str {
        self.technology.as_str()
    }

    async fn update_dependency(&self, fix: &FixCandidate) -> Result<(), HandlerError> {
        if !fix.is_direct_dependency && !self.technology.supports_transitive_fix() {
            return Err(HandlerError::unsupported(
                fix,
                UnsupportedReason::IndirectDependency,
            ));
        }

        let argv = self
            .technology
            .install_command(
                &fix.finding.impacted_package_name,
                &fix.suggested_fixed_version,
            )
            .ok_or_else(|| HandlerError::unsupported(fix, UnsupportedReason::UnknownEcosystem))?;
        run_install_command(&argv, &self.project_root).await
    }
}

/// Runs one package-manager invocation, capturing combined output. A non-zero
/// exit status is a handler-level failure carrying that output.
async fn run_install_command(argv: &[String], cwd: &Path) -> Result<(), HandlerError> {
    let rendered = argv.join(" ");
    debug!(command = %rendered, "running package manager upgrade");
    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .current_dir(cwd)
        .output()
        .await?;
    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(HandlerError::CommandFailed {
            command: rendered,
            status: output.status.code().unwrap_or(-1),
            output: combined,
        });
    }
    Ok(())
}
