use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BLAME_CONCURRENCY: usize = 16;
pub const DEFAULT_COMMIT_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Runtime settings for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub checkout_root: PathBuf,
    /// Maximum simultaneous blame operations, `0` for no limit.
    pub blame_concurrency: usize,
    pub commit_window: Duration,
    pub github_api: String,
}

impl Settings {
    pub fn default_db_path() -> PathBuf {
        PathBuf::from(".repo-analyzer").join("analysis.db")
    }

    pub fn default_checkout_root() -> PathBuf {
        std::env::temp_dir().join("repo-analyzer")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: Self::default_db_path(),
            checkout_root: Self::default_checkout_root(),
            blame_concurrency: DEFAULT_BLAME_CONCURRENCY,
            commit_window: DEFAULT_COMMIT_WINDOW,
            github_api: DEFAULT_GITHUB_API.to_string(),
        }
    }
}
