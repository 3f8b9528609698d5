//! Bot configuration with environment-variable binding.
//!
//! A [`BotConfig`] can be deserialized from a JSON config file or assembled
//! from `FIXBOT_*` environment variables; either way custom naming templates
//! are validated against git ref restrictions before the engine starts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::fix::branch::{validate_branch_name_template, BranchTemplateError};

// Environment variable names.
pub const GIT_OWNER_ENV: &str = "FIXBOT_GIT_OWNER";
pub const GIT_REPO_ENV: &str = "FIXBOT_GIT_REPO";
pub const GIT_BASE_BRANCH_ENV: &str = "FIXBOT_GIT_BASE_BRANCH";
pub const GIT_AGGREGATE_FIXES_ENV: &str = "FIXBOT_GIT_AGGREGATE_FIXES";
pub const ALLOW_MAJOR_VERSION_BUMPS_ENV: &str = "FIXBOT_ALLOW_MAJOR_VERSION_BUMPS";
pub const BRANCH_NAME_TEMPLATE_ENV: &str = "FIXBOT_BRANCH_NAME_TEMPLATE";
pub const COMMIT_MESSAGE_TEMPLATE_ENV: &str = "FIXBOT_COMMIT_MESSAGE_TEMPLATE";
pub const PULL_REQUEST_TITLE_TEMPLATE_ENV: &str = "FIXBOT_PULL_REQUEST_TITLE_TEMPLATE";
pub const GIT_EMAIL_AUTHOR_ENV: &str = "FIXBOT_GIT_EMAIL_AUTHOR";
pub const REQUIREMENTS_FILE_ENV: &str = "FIXBOT_REQUIREMENTS_FILE";
pub const WORKING_DIRS_ENV: &str = "FIXBOT_WORKING_DIRS";

const DEFAULT_BASE_BRANCH: &str = "main";
const DEFAULT_GIT_AUTHOR_NAME: &str = "fixbot";
const DEFAULT_GIT_AUTHOR_EMAIL: &str = "fixbot[bot]@users.noreply.github.com";
const DEFAULT_REQUIREMENTS_FILE: &str = "requirements.txt";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'{0}' environment variable is missing")]
    MissingEnv(String),
    #[error("'{name}' has invalid value '{value}': expected true or false")]
    InvalidBool { name: String, value: String },
    #[error("invalid branch name template: {0}")]
    BranchTemplate(#[from] BranchTemplateError),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One project inside the scanned repository. Each working directory is
/// scanned and fixed independently; `.` means the repository root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub working_dirs: Vec<PathBuf>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            working_dirs: vec![PathBuf::from(".")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub repo_owner: String,
    pub repo_name: String,
    /// Branch the fixes are based on and targeted at.
    pub base_branch: String,
    /// One aggregated pull request for all fixes instead of one per package.
    pub aggregate_fixes: bool,
    /// When false, fix versions crossing a major-version boundary are treated
    /// as unavailable.
    pub allow_major_version_bumps: bool,
    pub branch_name_template: Option<String>,
    pub commit_message_template: Option<String>,
    pub pull_request_title_template: Option<String>,
    /// Author identity for the fix commits.
    pub git_author_name: String,
    pub git_author_email: String,
    /// Pinned descriptor file rewritten by the pip handler.
    pub requirements_file: String,
    pub projects: Vec<ProjectConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            repo_owner: String::new(),
            repo_name: String::new(),
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            aggregate_fixes: false,
            allow_major_version_bumps: true,
            branch_name_template: None,
            commit_message_template: None,
            pull_request_title_template: None,
            git_author_name: DEFAULT_GIT_AUTHOR_NAME.to_string(),
            git_author_email: DEFAULT_GIT_AUTHOR_EMAIL.to_string(),
            requirements_file: DEFAULT_REQUIREMENTS_FILE.to_string(),
            projects: vec![ProjectConfig::default()],
        }
    }
}

impl BotConfig {
    /// Parses a JSON config document and validates it.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from `FIXBOT_*` environment variables. Repository
    /// owner and name are mandatory; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = BotConfig {
            repo_owner: require_env(GIT_OWNER_ENV)?,
            repo_name: require_env(GIT_REPO_ENV)?,
            ..BotConfig::default()
        };
        if let Some(branch) = optional_env(GIT_BASE_BRANCH_ENV) {
            config.base_branch = branch;
        }
        if let Some(raw) = optional_env(GIT_AGGREGATE_FIXES_ENV) {
            config.aggregate_fixes = parse_bool(GIT_AGGREGATE_FIXES_ENV, &raw)?;
        }
        if let Some(raw) = optional_env(ALLOW_MAJOR_VERSION_BUMPS_ENV) {
            config.allow_major_version_bumps = parse_bool(ALLOW_MAJOR_VERSION_BUMPS_ENV, &raw)?;
        }
        config.branch_name_template = optional_env(BRANCH_NAME_TEMPLATE_ENV);
        config.commit_message_template = optional_env(COMMIT_MESSAGE_TEMPLATE_ENV);
        config.pull_request_title_template = optional_env(PULL_REQUEST_TITLE_TEMPLATE_ENV);
        if let Some(email) = optional_env(GIT_EMAIL_AUTHOR_ENV) {
            config.git_author_email = email;
        }
        if let Some(file) = optional_env(REQUIREMENTS_FILE_ENV) {
            config.requirements_file = file;
        }
        if let Some(raw) = optional_env(WORKING_DIRS_ENV) {
            let working_dirs: Vec<PathBuf> = raw
                .split(',')
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect();
            if !working_dirs.is_empty() {
                config.projects = vec![ProjectConfig { working_dirs }];
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(template) = &self.branch_name_template {
            validate_branch_name_template(template)?;
        }
        Ok(())
    }
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}
