use crate::error::{AnalyzerError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const REPO_URL_PATTERN: &str = r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?P<host>[^/?#]*)/(?P<prefix>(?:[^/?#]+/)*)(?P<owner>[^/?#]+)/(?P<repo>[^/?#]+?)(?P<suffix>\.git)?/?$";

/// Hosts whose repositories can be checked for existence.
const SUPPORTED_HOSTS: &[&str] = &["github.com", "www.github.com"];

fn repo_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REPO_URL_PATTERN).expect("repo url pattern is valid"))
}

/// A repository identifier of the form `scheme://host/<owner>/<repo>`.
///
/// Only `file://` urls may carry leading path segments before the owner.
/// Variants of one repo (`.git` suffix, trailing slash, host case) share a
/// single [`canonical`](RepoUrl::canonical) form, which is what repos are
/// stored and looked up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    canonical: String,
    scheme: String,
    host: String,
    prefix: String,
    owner: String,
    repo: String,
}

impl RepoUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let caps = repo_url_regex()
            .captures(input)
            .ok_or_else(|| AnalyzerError::InvalidRepoUrl(input.to_string()))?;
        let scheme = caps["scheme"].to_ascii_lowercase();
        let host = caps["host"].to_ascii_lowercase();
        let prefix = caps["prefix"].to_string();
        let local = scheme == "file";
        if !local && (host.is_empty() || !prefix.is_empty()) {
            return Err(AnalyzerError::InvalidRepoUrl(input.to_string()));
        }
        let owner = caps["owner"].to_string();
        let repo = caps["repo"].to_string();
        // A local `.git` suffix names a real directory, so it is kept.
        let suffix = match caps.name("suffix") {
            Some(m) if local => m.as_str(),
            _ => "",
        };
        Ok(Self {
            canonical: format!("{scheme}://{host}/{prefix}{owner}/{repo}{suffix}"),
            scheme,
            host,
            prefix,
            owner,
            repo,
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn is_local(&self) -> bool {
        self.scheme == "file"
    }

    /// Filesystem path of a `file://` repository.
    pub fn local_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        let rest = self
            .canonical
            .strip_prefix("file://")
            .unwrap_or(&self.canonical);
        let path = rest.strip_prefix(self.host.as_str()).unwrap_or(rest);
        Some(PathBuf::from(path))
    }

    /// Relative workspace directory, `<owner>/<repo>`.
    pub fn checkout_dir(&self) -> PathBuf {
        Path::new(&self.owner).join(&self.repo)
    }
}

/// Existence check against the service hosting a repository.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// `Ok(false)` when the repository does not exist; network faults are
    /// [`AnalyzerError::Unreachable`].
    async fn exists_remotely(&self, url: &RepoUrl) -> Result<bool>;
}

/// GitHub REST API for hosted repositories, the filesystem for `file://` ones.
pub struct HostingService {
    http: reqwest::Client,
    api_base: String,
}

impl HostingService {
    pub fn new(api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("repo-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into(),
        })
    }
}

#[async_trait]
impl RepoHost for HostingService {
    async fn exists_remotely(&self, url: &RepoUrl) -> Result<bool> {
        if let Some(path) = url.local_path() {
            return Ok(path.join(".git").is_dir() || path.join("HEAD").is_file());
        }
        if !SUPPORTED_HOSTS.contains(&url.host()) {
            return Err(AnalyzerError::InvalidRepoUrl(format!(
                "{} is not hosted on GitHub",
                url.canonical()
            )));
        }

        let endpoint = format!(
            "{}/repos/{}/{}",
            self.api_base.trim_end_matches('/'),
            url.owner(),
            url.repo()
        );
        let resp = self
            .http
            .get(&endpoint)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AnalyzerError::Unreachable(format!("{endpoint}: {e}")))?;

        let status = resp.status();
        let found = existence_from_status(status, url);
        if found.is_err() {
            let body = resp.text().await.unwrap_or_default();
            log::error!("Unable to determine if {} exists: {status} {body}", url.canonical());
        }
        found
    }
}

/// 404 means the repository does not exist. Any other failure, including
/// rate limiting and server errors, is a provider fault worth retrying.
fn existence_from_status(status: StatusCode, url: &RepoUrl) -> Result<bool> {
    match status {
        s if s.is_success() => Ok(true),
        StatusCode::NOT_FOUND => Ok(false),
        status => Err(AnalyzerError::Unreachable(format!(
            "Unable to determine if {} exists ({status})",
            url.canonical()
        ))),
    }
}
