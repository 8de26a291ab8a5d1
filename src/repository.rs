use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::TempDir;
use tokio::process::Command;
use url::Url;

use crate::error::{AnalyzerError, Result};

static SCP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^git@[A-Za-z0-9.-]+:[A-Za-z0-9._~/-]*[A-Za-z0-9._~-]/?$").expect("valid scp URL pattern"));

/// Name used for reports: last URL path segment without a trailing `/` or `.git`
pub fn repo_name_from_url(repo_url: &str) -> String {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        "repository".to_string()
    } else {
        name.to_string()
    }
}

/// Accepts `http(s)://host/owner/repo` URLs and scp-like `git@host:owner/repo`
pub fn validate_repo_url(repo_url: &str) -> Result<()> {
    let repo_url = repo_url.trim();
    if repo_url.is_empty() {
        return Err(AnalyzerError::Validation("Repository URL is required".into()));
    }

    if repo_url.starts_with("git@") {
        if SCP_URL.is_match(repo_url) {
            return Ok(());
        }
        return Err(AnalyzerError::Validation(format!("Invalid repository URL: {}", repo_url)));
    }

    let url = Url::parse(repo_url)
        .map_err(|e| AnalyzerError::Validation(format!("Invalid repository URL '{}': {}", repo_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AnalyzerError::Validation(format!(
            "Unsupported URL scheme '{}', expected http or https",
            url.scheme()
        )));
    }
    let has_path = url
        .path_segments()
        .map_or(false, |mut segments| segments.any(|s| !s.is_empty()));
    if url.host_str().is_none() || !has_path {
        return Err(AnalyzerError::Validation(format!(
            "Repository URL must name a repository: {}",
            repo_url
        )));
    }
    Ok(())
}

/// A checked-out source tree
///
/// Cloned trees live in a temporary directory that is removed on drop.
#[derive(Debug)]
pub struct FetchedRepository {
    root: PathBuf,
    _checkout: Option<TempDir>,
}

impl FetchedRepository {
    /// Wraps an existing directory without taking ownership of it
    pub fn existing(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), _checkout: None }
    }

    fn cloned(checkout: TempDir) -> Self {
        Self { root: checkout.path().to_path_buf(), _checkout: Some(checkout) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Produces a local source tree for a repository URL
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    async fn fetch(&self, repo_url: &str) -> Result<FetchedRepository>;
}

/// Shallow `git clone` into a temporary directory
#[derive(Debug, Clone)]
pub struct GitFetcher {
    program: PathBuf,
}

impl GitFetcher {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Uses a specific git executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    async fn fetch(&self, repo_url: &str) -> Result<FetchedRepository> {
        validate_repo_url(repo_url)?;
        let repo_url = repo_url.trim();
        let checkout = TempDir::new()?;

        info!("Cloning {} into {}", repo_url, checkout.path().display());
        let output = Command::new(&self.program)
            .args(["clone", "--depth", "1", "--quiet", repo_url])
            .arg(checkout.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AnalyzerError::Clone(format!("Failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalyzerError::Clone(format!(
                "Failed to clone repository {}: {}",
                repo_url,
                stderr.trim()
            )));
        }

        debug!("Clone of {} finished", repo_url);
        Ok(FetchedRepository::cloned(checkout))
    }
}
