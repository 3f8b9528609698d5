//! Branch and pull-request lifecycle for fix delivery.
//!
//! Sits between the orchestrator and the [`GitOps`]/[`VcsClient`] boundaries:
//! creates fix branches, commits with the configured author identity, pushes,
//! and opens or updates pull requests. Idempotence decisions (skip on existing
//! remote branch, aggregated checksum in-sync no-op) are made here so the
//! orchestrator only sequences them.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::fix::branch::{embed_checksum, extract_checksum, scan_checksum, FixBranchNamer};
use crate::model::{FixCandidate, NewPullRequest, PullRequestInfo, Technology};
use crate::output::render_pull_request_body;
use crate::traits::{GitError, GitOps, VcsClient, VcsError};
use std::collections::BTreeSet;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    /// The handler reported success but left the working tree untouched, so
    /// there is nothing to deliver.
    #[error("no file changes to commit for '{package}'")]
    NoChangesToCommit { package: String },
}

pub struct BranchLifecycle<'a> {
    git: &'a dyn GitOps,
    vcs: &'a dyn VcsClient,
    config: &'a BotConfig,
}

impl<'a> BranchLifecycle<'a> {
    pub fn new(git: &'a dyn GitOps, vcs: &'a dyn VcsClient, config: &'a BotConfig) -> Self {
        Self { git, vcs, config }
    }

    pub fn namer(&self) -> FixBranchNamer<'_> {
        FixBranchNamer {
            base_branch: &self.config.base_branch,
            branch_name_template: self.config.branch_name_template.as_deref(),
            commit_message_template: self.config.commit_message_template.as_deref(),
            pull_request_title_template: self.config.pull_request_title_template.as_deref(),
        }
    }

    pub async fn branch_exists_in_remote(&self, branch: &str) -> Result<bool, LifecycleError> {
        Ok(self.git.branch_exists_in_remote(branch).await?)
    }

    /// Creates the fix branch off the current HEAD. A dirty working tree is
    /// carried onto the new branch instead of being discarded, so leftovers
    /// from an earlier fix in the same run survive.
    pub async fn create_fix_branch(&self, branch: &str) -> Result<(), LifecycleError> {
        if self.git.is_clean().await? {
            self.git.create_branch_and_checkout(branch).await?;
        } else {
            debug!(branch, "carrying uncommitted changes onto the fix branch");
            self.git.create_branch_and_checkout_with_diff(branch).await?;
        }
        Ok(())
    }

    /// Commits the applied fix, pushes the branch and opens a pull request
    /// against the base branch.
    pub async fn open_fixing_pull_request(
        &self,
        branch: &str,
        fix: &FixCandidate,
    ) -> Result<(), LifecycleError> {
        if self.git.is_clean().await? {
            return Err(LifecycleError::NoChangesToCommit {
                package: fix.finding.impacted_package_name.clone(),
            });
        }
        let namer = self.namer();
        let package = &fix.finding.impacted_package_name;
        let fix_version = &fix.suggested_fixed_version;
        self.git
            .add_all_and_commit(
                &namer.commit_message(package, fix_version),
                &self.config.git_author_name,
                &self.config.git_author_email,
            )
            .await?;
        self.git.push(false, branch).await?;

        let pull_request = NewPullRequest {
            source_branch: branch.to_string(),
            target_branch: self.config.base_branch.clone(),
            title: namer.pull_request_title(package, fix_version),
            body: render_pull_request_body(&[fix]),
        };
        info!(branch, package = %package, "opening fix pull request");
        self.vcs.create_pull_request(&pull_request).await?;
        Ok(())
    }

    pub async fn find_open_pull_request_by_source_branch(
        &self,
        branch: &str,
    ) -> Result<Option<PullRequestInfo>, LifecycleError> {
        let open = self.vcs.list_open_pull_requests_with_body().await?;
        Ok(open
            .into_iter()
            .find(|pull_request| pull_request.source_branch == branch))
    }

    /// Whether the aggregated pull request needs (re)delivery.
    ///
    /// A missing PR, or a PR whose embedded checksum differs from the current
    /// scan, requires an update. A body without any checksum is treated as out
    /// of date.
    pub fn is_update_required(
        existing: Option<&PullRequestInfo>,
        fixed: &[&FixCandidate],
    ) -> bool {
        let Some(pull_request) = existing else {
            return true;
        };
        match extract_checksum(&pull_request.body) {
            Some(remote) => remote != scan_checksum(fixed.iter().copied()),
            None => true,
        }
    }

    /// Commits and force-pushes the aggregated branch, then creates the
    /// aggregated pull request or updates the existing one in place.
    pub async fn open_or_update_aggregated_pull_request(
        &self,
        branch: &str,
        fixed: &[&FixCandidate],
        technologies: &BTreeSet<Technology>,
        existing: Option<&PullRequestInfo>,
    ) -> Result<(), LifecycleError> {
        let namer = self.namer();
        self.git
            .add_all_and_commit(
                &namer.aggregated_commit_message(technologies),
                &self.config.git_author_name,
                &self.config.git_author_email,
            )
            .await?;
        // The aggregated branch name is stable while its content changes per
        // scan, so delivery always force-pushes.
        self.git.push(true, branch).await?;

        let checksum = scan_checksum(fixed.iter().copied());
        let body = embed_checksum(&render_pull_request_body(fixed), &checksum);
        let title = namer.aggregated_pull_request_title(technologies);
        match existing {
            Some(pull_request) => {
                info!(branch, id = pull_request.id, "updating aggregated pull request");
                self.vcs
                    .update_pull_request(pull_request.id, &title, &body, &self.config.base_branch)
                    .await?;
                self.vcs
                    .add_pull_request_comment(
                        pull_request.id,
                        "This pull request was refreshed with the latest scan results.",
                    )
                    .await?;
            }
            None => {
                info!(branch, "opening aggregated pull request");
                self.vcs
                    .create_pull_request(&NewPullRequest {
                        source_branch: branch.to_string(),
                        target_branch: self.config.base_branch.clone(),
                        title,
                        body,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
