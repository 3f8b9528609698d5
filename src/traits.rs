//! External collaborator boundaries.
//!
//! The fix-orchestration engine does not scan dependencies, speak HTTP to a
//! VCS provider, or run git plumbing itself. Those capabilities are consumed
//! through the traits defined here; production wiring supplies real clients,
//! tests supply recording mocks.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::model::{NewPullRequest, PullRequestInfo, RepositoryInfo, VulnerabilityFinding};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scanner execution failed: {0}")]
    Execution(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("VCS request failed: {0}")]
    Request(String),
    #[error("unexpected VCS response: {0}")]
    Response(String),
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("'git {operation}' failed: {message}")]
    Operation { operation: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        GitError::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Produces vulnerability findings for one working directory.
///
/// A scan failure is a hard error that aborts the current project.
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, working_dir: &Path) -> Result<Vec<VulnerabilityFinding>, ScanError>;
}

/// REST client for the git hosting provider.
///
/// Calls are synchronous HTTP from the engine's point of view: the caller
/// awaits each one and errors propagate as-is.
#[async_trait]
pub trait VcsClient: Send + Sync {
    async fn create_pull_request(&self, pull_request: &NewPullRequest) -> Result<(), VcsError>;

    async fn update_pull_request(
        &self,
        id: u64,
        title: &str,
        body: &str,
        target_branch: &str,
    ) -> Result<(), VcsError>;

    /// Lists open pull requests including their body text, which carries the
    /// embedded scan checksum for aggregated fixes.
    async fn list_open_pull_requests_with_body(&self) -> Result<Vec<PullRequestInfo>, VcsError>;

    async fn add_pull_request_comment(&self, id: u64, comment: &str) -> Result<(), VcsError>;

    /// Downloads an archive of `branch` into `destination`.
    async fn download_repository(&self, branch: &str, destination: &Path) -> Result<(), VcsError>;

    async fn get_repository_info(&self) -> Result<RepositoryInfo, VcsError>;
}

/// Low-level git operations on the single working tree.
///
/// Implementations are expected to operate on one checkout directory; the
/// orchestrator serializes every call (see the crate-level concurrency notes),
/// so no interior locking is required.
#[async_trait]
pub trait GitOps: Send + Sync {
    async fn clone_repository(&self, destination: &Path, branch: &str) -> Result<(), GitError>;

    async fn checkout(&self, branch: &str) -> Result<(), GitError>;

    /// Creates `branch` from the current HEAD and checks it out.
    async fn create_branch_and_checkout(&self, branch: &str) -> Result<(), GitError>;

    /// Creates `branch` and carries the uncommitted working-tree diff onto it
    /// instead of discarding it. Used when a previous fix in the same run left
    /// in-progress edits behind.
    async fn create_branch_and_checkout_with_diff(&self, branch: &str) -> Result<(), GitError>;

    /// Stages every change including deletions and commits with the given
    /// author identity.
    async fn add_all_and_commit(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<(), GitError>;

    /// True when the working tree has no uncommitted changes.
    async fn is_clean(&self) -> Result<bool, GitError>;

    async fn push(&self, force: bool, branch: &str) -> Result<(), GitError>;

    async fn branch_exists_in_remote(&self, branch: &str) -> Result<bool, GitError>;
}
