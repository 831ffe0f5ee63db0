use crate::config::Settings;
use crate::error::Result;
use crate::frequency::{CommitFrequencyAnalyzer, FrequencyOutcome};
use crate::git::{RepoUrl, VcsProvider};
use crate::loc::LocAggregator;
use crate::model::{Repo, Status};
use crate::status::StatusTracker;
use crate::store::Store;
use crate::workspace::Workspace;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Both fact passes were already started or finished by an earlier run.
    Skipped,
    /// Checkout failed; the started passes were marked failed.
    CheckoutFailed { message: String },
    Completed {
        ran_loc: bool,
        ran_commit_freq: bool,
        committers: usize,
        frequency: Option<FrequencyOutcome>,
        /// Passes that aborted with an unexpected error. Each pass runs
        /// regardless of how the other one ended.
        errors: Vec<String>,
    },
}

/// Drives one analysis run of a repo: claim the sub-analyses that still need
/// to run, check out, run them, and release the checkout.
pub struct Analyzer {
    store: Arc<dyn Store>,
    tracker: StatusTracker,
    workspace: Workspace,
    loc: LocAggregator,
    frequency: CommitFrequencyAnalyzer,
}

impl Analyzer {
    pub fn new(store: Arc<dyn Store>, vcs: Arc<dyn VcsProvider>, settings: &Settings) -> Self {
        let tracker = StatusTracker::new(store.clone());
        Self {
            workspace: Workspace::new(settings.checkout_root.clone(), vcs.clone()),
            loc: LocAggregator::new(
                store.clone(),
                vcs.clone(),
                tracker.clone(),
                settings.blame_concurrency,
            ),
            frequency: CommitFrequencyAnalyzer::new(
                store.clone(),
                vcs,
                tracker.clone(),
                settings.commit_window,
            ),
            tracker,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn analyze(&self, repo_url: &str) -> Result<AnalysisOutcome> {
        let url = RepoUrl::parse(repo_url)?;
        let repo = self.store.upsert_repo(url.canonical())?;

        let run_loc = self.tracker.transition_loc(repo.id, Status::InProgress)?;
        let run_freq = self
            .tracker
            .transition_commit_freq(repo.id, Status::InProgress)?;
        if !run_loc && !run_freq {
            log::info!("{}: analysis already started or finished, skipping", repo.repo_url);
            return Ok(AnalysisOutcome::Skipped);
        }

        let checkout = match self.workspace.ensure_checkout(&url).await {
            Ok(checkout) => checkout,
            Err(e) => {
                log::error!("{}: checkout failed: {e}", repo.repo_url);
                self.fail_started(&repo, run_loc, run_freq)?;
                return Ok(AnalysisOutcome::CheckoutFailed {
                    message: e.to_string(),
                });
            }
        };

        let files = checkout.list_tracked_files().await?;
        log::info!("{}: {} files to analyze", repo.repo_url, files.len());

        let mut errors = Vec::new();
        let mut committers = 0;
        if run_loc {
            match self.loc.aggregate(&repo, checkout.path(), &files).await {
                Ok(ownership) => committers = ownership.len(),
                Err(e) => {
                    log::error!("{}: line ownership pass aborted: {e}", repo.repo_url);
                    errors.push(format!("line ownership: {e}"));
                }
            }
        }
        let mut frequency = None;
        if run_freq {
            match self.frequency.analyze(&repo, checkout.path()).await {
                Ok(outcome) => {
                    if let Some(loss) = outcome.data_loss() {
                        log::error!("{}: commit frequency pass failed: {loss}", repo.repo_url);
                    }
                    frequency = Some(outcome);
                }
                Err(e) => {
                    log::error!("{}: commit frequency pass aborted: {e}", repo.repo_url);
                    errors.push(format!("commit frequency: {e}"));
                }
            }
        }

        checkout.discard()?;
        Ok(AnalysisOutcome::Completed {
            ran_loc: run_loc,
            ran_commit_freq: run_freq,
            committers,
            frequency,
            errors,
        })
    }

    fn fail_started(&self, repo: &Repo, run_loc: bool, run_freq: bool) -> Result<()> {
        if run_loc {
            self.tracker.transition_loc(repo.id, Status::Failed)?;
        }
        if run_freq {
            self.tracker.transition_commit_freq(repo.id, Status::Failed)?;
        }
        Ok(())
    }
}

impl AnalysisOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            AnalysisOutcome::CheckoutFailed { .. } => true,
            AnalysisOutcome::Completed {
                frequency, errors, ..
            } => {
                !errors.is_empty()
                    || frequency
                        .as_ref()
                        .and_then(FrequencyOutcome::data_loss)
                        .is_some()
            }
            AnalysisOutcome::Skipped => false,
        }
    }
}
