//! Top-level fix orchestration.
//!
//! Sequences one run end to end: scan a working directory, deduplicate the
//! findings into a fix map, then deliver fixes either as one pull request per
//! package or as a single aggregated pull request. Every await is sequential;
//! the engine drives exactly one git working tree and never interleaves fixes.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::fix::aggregate::{build_fix_versions_map, AggregationError};
use crate::fix::lifecycle::{BranchLifecycle, LifecycleError};
use crate::handlers::{check_build_tool_dependency, handler_for, HandlerError, PackageHandler};
use crate::model::{FixCandidate, FixVersionsMap, Technology};
use crate::traits::{GitError, GitOps, ScanError, Scanner, VcsClient};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Vcs(#[from] crate::traits::VcsError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    /// Some packages could not be fixed while others went through. The run
    /// keeps going past individual failures and reports them together at the
    /// end.
    #[error("{} fix attempts failed: {}", failures.len(), failures.join("; "))]
    PartialFailure { failures: Vec<String> },
}

pub struct FixOrchestrator<'a> {
    scanner: &'a dyn Scanner,
    git: &'a dyn GitOps,
    vcs: &'a dyn VcsClient,
    config: &'a BotConfig,
    /// Handlers memoized per (technology, project); Maven handler construction
    /// indexes every manifest in the project.
    handlers: Mutex<HashMap<(Technology, PathBuf), Arc<dyn PackageHandler>>>,
}

impl<'a> FixOrchestrator<'a> {
    pub fn new(
        scanner: &'a dyn Scanner,
        git: &'a dyn GitOps,
        vcs: &'a dyn VcsClient,
        config: &'a BotConfig,
    ) -> Self {
        Self {
            scanner,
            git,
            vcs,
            config,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the full scan-and-fix cycle over every configured working
    /// directory under `repo_root`. Failures in one directory never stop the
    /// others; they are reported together at the end.
    ///
    /// Per-package mode runs one independent cycle per working directory.
    /// Aggregated mode runs one cycle spanning all of them: the aggregated
    /// branch name depends only on the base branch and the ecosystems
    /// touched, so per-directory cycles would fight over the same branch and
    /// pull request.
    pub async fn run(&self, repo_root: &Path) -> Result<(), OrchestratorError> {
        let working_dirs: Vec<PathBuf> = self
            .config
            .projects
            .iter()
            .flat_map(|project| &project.working_dirs)
            .map(|working_dir| repo_root.join(working_dir))
            .collect();
        if self.config.aggregate_fixes {
            return self.scan_and_fix_aggregated(&working_dirs).await;
        }
        let mut failures = Vec::new();
        for working_dir in &working_dirs {
            info!(working_dir = %working_dir.display(), "scanning project");
            if let Err(error) = self.scan_and_fix_project(working_dir).await {
                match error {
                    OrchestratorError::PartialFailure {
                        failures: mut inner,
                    } => failures.append(&mut inner),
                    other => failures
                        .push(format!("{}: {other}", working_dir.display())),
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::PartialFailure { failures })
        }
    }

    /// Clones the repository's base branch into `destination` and runs the
    /// full cycle there. Falls back to the provider's default branch when no
    /// base branch is configured.
    pub async fn run_in_fresh_clone(&self, destination: &Path) -> Result<(), OrchestratorError> {
        let branch = if self.config.base_branch.is_empty() {
            self.vcs.get_repository_info().await?.default_branch
        } else {
            self.config.base_branch.clone()
        };
        info!(branch = %branch, destination = %destination.display(), "cloning repository");
        self.git.clone_repository(destination, &branch).await?;
        self.run(destination).await
    }

    /// Dry run: scans a downloaded snapshot of the base branch and returns
    /// the fix map without touching git or opening pull requests.
    pub async fn preview_fixes(
        &self,
        destination: &Path,
    ) -> Result<FixVersionsMap, OrchestratorError> {
        self.vcs
            .download_repository(&self.config.base_branch, destination)
            .await?;
        let findings = self.scanner.scan(destination).await?;
        Ok(build_fix_versions_map(
            &findings,
            self.config.allow_major_version_bumps,
        )?)
    }

    pub async fn scan_and_fix_project(
        &self,
        working_dir: &Path,
    ) -> Result<(), OrchestratorError> {
        if self.config.aggregate_fixes {
            let working_dirs = [working_dir.to_path_buf()];
            return self.scan_and_fix_aggregated(&working_dirs).await;
        }
        let findings = self.scanner.scan(working_dir).await?;
        let map = build_fix_versions_map(&findings, self.config.allow_major_version_bumps)?;
        if map.is_empty() {
            info!("no fixable vulnerabilities found");
            return Ok(());
        }
        info!(packages = map.len(), "found packages with an available fix");
        self.fix_issues_separate_prs(working_dir, &map).await
    }

    /// One branch and one pull request per fixable package. A failure on one
    /// package is recorded and the loop moves on; the base branch is restored
    /// between packages so each fix starts from a pristine tree.
    async fn fix_issues_separate_prs(
        &self,
        working_dir: &Path,
        map: &FixVersionsMap,
    ) -> Result<(), OrchestratorError> {
        let lifecycle = BranchLifecycle::new(self.git, self.vcs, self.config);
        let mut failures = Vec::new();
        for (package, fix) in map {
            if let Err(error) = self.fix_single_package(working_dir, fix, &lifecycle).await {
                warn!(package = %package, error = %error, "failed to fix package");
                failures.push(format!(
                    "{package}@{}: {error}",
                    fix.suggested_fixed_version
                ));
            }
            // Restore the base branch so the next package starts clean. A
            // failed checkout leaves the tree in an unknown state and aborts
            // the whole project; failures collected so far are still
            // reported alongside it.
            if let Err(error) = self.git.checkout(&self.config.base_branch).await {
                failures.push(format!(
                    "checkout {}: {error}",
                    self.config.base_branch
                ));
                return Err(OrchestratorError::PartialFailure { failures });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::PartialFailure { failures })
        }
    }

    async fn fix_single_package(
        &self,
        working_dir: &Path,
        fix: &FixCandidate,
        lifecycle: &BranchLifecycle<'_>,
    ) -> Result<(), OrchestratorError> {
        let namer = lifecycle.namer();
        let branch = namer.fix_branch_name(
            &fix.finding.impacted_package_name,
            &fix.suggested_fixed_version,
        );
        // The branch name is content-addressed, so its presence in the remote
        // means this exact fix was already delivered.
        if lifecycle.branch_exists_in_remote(&branch).await? {
            info!(branch = %branch, "fix branch already exists in remote, skipping");
            return Ok(());
        }
        lifecycle.create_fix_branch(&branch).await?;
        match self.update_package_to_fixed_version(working_dir, fix).await {
            Ok(()) => {}
            Err(error) if error.is_unsupported_fix() => {
                debug!(error = %error, "skipping unsupported fix");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }
        lifecycle.open_fixing_pull_request(&branch, fix).await?;
        Ok(())
    }

    /// All fixes across every working directory on one stable branch,
    /// delivered through a single pull request.
    ///
    /// The aggregated branch name depends only on the base branch and the
    /// ecosystems touched, so there is exactly one aggregate-and-deliver
    /// cycle per run: every directory is scanned up front, the fixes for all
    /// of them land on the same branch, and the checksum covers the union.
    /// Handler failures exclude the package from the delivered set but do not
    /// abort the attempt; git and VCS failures do. When the existing pull
    /// request already carries the checksum of the current fix set the run is
    /// a no-op.
    async fn scan_and_fix_aggregated(
        &self,
        working_dirs: &[PathBuf],
    ) -> Result<(), OrchestratorError> {
        let lifecycle = BranchLifecycle::new(self.git, self.vcs, self.config);
        let mut failures = Vec::new();
        let mut maps: Vec<(&Path, FixVersionsMap)> = Vec::new();
        for working_dir in working_dirs {
            info!(working_dir = %working_dir.display(), "scanning project");
            let findings = match self.scanner.scan(working_dir).await {
                Ok(findings) => findings,
                Err(error) => {
                    warn!(working_dir = %working_dir.display(), error = %error, "scan failed");
                    failures.push(format!("{}: {error}", working_dir.display()));
                    continue;
                }
            };
            match build_fix_versions_map(&findings, self.config.allow_major_version_bumps) {
                Ok(map) if !map.is_empty() => maps.push((working_dir.as_path(), map)),
                Ok(_) => {}
                Err(error) => {
                    failures.push(format!("{}: {error}", working_dir.display()));
                }
            }
        }
        if maps.is_empty() {
            info!("no fixable vulnerabilities found");
            return if failures.is_empty() {
                Ok(())
            } else {
                Err(OrchestratorError::PartialFailure { failures })
            };
        }

        let technologies: BTreeSet<Technology> = maps
            .iter()
            .flat_map(|(_, map)| map.values())
            .map(|fix| fix.technology.clone())
            .collect();
        let branch = lifecycle.namer().aggregated_fix_branch_name(&technologies);
        lifecycle.create_fix_branch(&branch).await?;

        let mut fixed: Vec<&FixCandidate> = Vec::new();
        for (working_dir, map) in &maps {
            for (package, fix) in map {
                match self.update_package_to_fixed_version(working_dir, fix).await {
                    Ok(()) => fixed.push(fix),
                    Err(error) if error.is_unsupported_fix() => {
                        debug!(error = %error, "skipping unsupported fix");
                    }
                    Err(error) => {
                        warn!(package = %package, error = %error, "failed to fix package");
                        failures.push(format!(
                            "{package}@{}: {error}",
                            fix.suggested_fixed_version
                        ));
                    }
                }
            }
        }

        if let Err(error) = self
            .deliver_aggregated(&lifecycle, &branch, &fixed, &technologies)
            .await
        {
            failures.push(format!("aggregated delivery: {error}"));
        }
        // Base branch restoration happens regardless of the delivery outcome.
        if let Err(error) = self.git.checkout(&self.config.base_branch).await {
            failures.push(format!(
                "checkout {}: {error}",
                self.config.base_branch
            ));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::PartialFailure { failures })
        }
    }

    async fn deliver_aggregated(
        &self,
        lifecycle: &BranchLifecycle<'_>,
        branch: &str,
        fixed: &[&FixCandidate],
        technologies: &BTreeSet<Technology>,
    ) -> Result<(), OrchestratorError> {
        if fixed.is_empty() || self.git.is_clean().await? {
            info!("no applied fixes to deliver");
            return Ok(());
        }
        let existing = lifecycle
            .find_open_pull_request_by_source_branch(branch)
            .await?;
        if !BranchLifecycle::is_update_required(existing.as_ref(), fixed) {
            info!(branch, "aggregated pull request is in sync with the scan, nothing to do");
            return Ok(());
        }
        lifecycle
            .open_or_update_aggregated_pull_request(branch, fixed, technologies, existing.as_ref())
            .await?;
        Ok(())
    }

    /// Applies the version bump through the ecosystem handler, with the
    /// working directory scoped to the project for the duration of the call.
    async fn update_package_to_fixed_version(
        &self,
        working_dir: &Path,
        fix: &FixCandidate,
    ) -> Result<(), HandlerError> {
        check_build_tool_dependency(fix)?;
        let handler = self.cached_handler(&fix.technology, working_dir)?;
        debug!(
            handler = handler.name(),
            package = %fix.finding.impacted_package_name,
            fix_version = %fix.suggested_fixed_version,
            "applying fix"
        );
        let _guard = WorkdirGuard::enter(working_dir).await?;
        handler.update_dependency(fix).await
    }

    fn cached_handler(
        &self,
        technology: &Technology,
        working_dir: &Path,
    ) -> Result<Arc<dyn PackageHandler>, HandlerError> {
        let key = (technology.clone(), working_dir.to_path_buf());
        // The lock is never held across an await.
        let mut handlers = self.handlers.lock().expect("handler cache poisoned");
        if let Some(handler) = handlers.get(&key) {
            return Ok(Arc::clone(handler));
        }
        let handler = handler_for(technology, working_dir, self.config)?;
        handlers.insert(key, Arc::clone(&handler));
        Ok(handler)
    }
}

// The working directory is process-global state; this lock serializes every
// scoped change so concurrent guards (e.g. under a parallel test harness)
// cannot restore each other's directory.
static CWD_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Changes the process working directory for a scope and restores it on drop.
///
/// Holds [`CWD_LOCK`] for the whole scope, so at most one guard is active per
/// process. Do not nest guards within one task; the second acquisition would
/// wait on the first forever.
struct WorkdirGuard {
    original: PathBuf,
    _permit: tokio::sync::MutexGuard<'static, ()>,
}

impl WorkdirGuard {
    async fn enter(target: &Path) -> std::io::Result<Self> {
        let permit = CWD_LOCK.lock().await;
        let original = std::env::current_dir()?;
        std::env::set_current_dir(target)?;
        Ok(Self {
            original,
            _permit: permit,
        })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        // Runs before `_permit` is released, so the restore is still covered
        // by the lock.
        if let Err(error) = std::env::set_current_dir(&self.original) {
            eprintln!(
                "failed to restore working directory to {}: {error}",
                self.original.display()
            );
        }
    }
}
