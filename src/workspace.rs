use crate::error::{AnalyzerError, Result};
use crate::git::{CheckoutKind, RepoUrl, VcsProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Owns the directory tree local checkouts are placed under.
///
/// Only the single worker touches it, so a checkout found on disk is assumed
/// to be left over from an earlier run of the same repo. Its content is not
/// verified and may be stale if the remote history was rewritten.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    vcs: Arc<dyn VcsProvider>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, vcs: Arc<dyn VcsProvider>) -> Self {
        Self {
            root: root.into(),
            vcs,
        }
    }

    pub fn checkout_path(&self, url: &RepoUrl) -> PathBuf {
        self.root.join(url.checkout_dir())
    }

    /// Clones `url` unless a working copy is already present.
    ///
    /// The returned [`Checkout`] removes the directory when dropped, so every
    /// exit path of an analysis run releases it.
    pub async fn ensure_checkout(&self, url: &RepoUrl) -> Result<Checkout> {
        let path = self.checkout_path(url);
        let vcs = self.vcs.clone();
        let repo_url = url.canonical().to_string();
        let target = path.clone();
        let outcome = tokio::task::spawn_blocking(move || vcs.clone_or_open(&repo_url, &target)).await;

        let checkout = Checkout {
            path,
            vcs: self.vcs.clone(),
            discarded: false,
        };
        match outcome {
            Ok(Ok(CheckoutKind::Cloned)) => {
                log::info!("Checked out {} to {}", url.canonical(), checkout.path.display());
                Ok(checkout)
            }
            Ok(Ok(CheckoutKind::Reused)) => {
                log::warn!(
                    "Reusing existing checkout of {} at {}, content is not re-verified",
                    url.canonical(),
                    checkout.path.display()
                );
                Ok(checkout)
            }
            Ok(Err(e)) => Err(match e {
                AnalyzerError::CommandFailed(_) => e,
                other => AnalyzerError::CommandFailed(other.to_string()),
            }),
            Err(join) => Err(AnalyzerError::CommandFailed(format!("clone task failed: {join}"))),
        }
    }
}

/// A local working copy exclusively held by one analysis run.
pub struct Checkout {
    path: PathBuf,
    vcs: Arc<dyn VcsProvider>,
    discarded: bool,
}

impl Checkout {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list_tracked_files(&self) -> Result<Vec<String>> {
        let vcs = self.vcs.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || vcs.list_tracked_files(&path)).await?
    }

    /// Removes the working copy. A directory that is already gone is not an error.
    pub fn discard(mut self) -> Result<()> {
        self.discarded = true;
        remove_dir(&self.path)
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if self.discarded {
            return;
        }
        if let Err(e) = remove_dir(&self.path) {
            log::error!("Failed to remove checkout {}: {e}", self.path.display());
        }
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            log::debug!("Deleted {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
