use crate::error::{AnalyzerError, Result};
use crate::git::VcsProvider;
use crate::model::{CommitFact, CommitRecord, Committer, NewCommitFact, Repo, Status};
use crate::status::StatusTracker;
use crate::store::Store;
use crate::util::hours_between;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum FrequencyOutcome {
    Done {
        commits: u64,
        scores: BTreeMap<String, f64>,
    },
    /// Fewer than half of the observed commits could be recorded.
    FailedInserts { expected: u64, recorded: u64 },
    /// Fewer than half of the inter-commit gaps could be stored.
    FailedGapUpdates { expected: u64, actual: u64 },
}

impl FrequencyOutcome {
    /// The shortfall behind a failed pass, `None` when the pass completed.
    pub fn data_loss(&self) -> Option<AnalyzerError> {
        match *self {
            FrequencyOutcome::Done { .. } => None,
            FrequencyOutcome::FailedInserts { expected, recorded } => {
                Some(AnalyzerError::PartialDataLoss {
                    expected,
                    actual: recorded,
                })
            }
            FrequencyOutcome::FailedGapUpdates { expected, actual } => {
                Some(AnalyzerError::PartialDataLoss { expected, actual })
            }
        }
    }
}

/// Records per-commit facts for known committers and derives a consistency
/// score from the gaps between their commits.
pub struct CommitFrequencyAnalyzer {
    store: Arc<dyn Store>,
    vcs: Arc<dyn VcsProvider>,
    tracker: StatusTracker,
    window: Duration,
}

impl CommitFrequencyAnalyzer {
    pub fn new(
        store: Arc<dyn Store>,
        vcs: Arc<dyn VcsProvider>,
        tracker: StatusTracker,
        window: Duration,
    ) -> Self {
        Self {
            store,
            vcs,
            tracker,
            window,
        }
    }

    pub async fn analyze(&self, repo: &Repo, local_path: &Path) -> Result<FrequencyOutcome> {
        let window = chrono::Duration::from_std(self.window)
            .map_err(|e| AnalyzerError::InvalidDate(format!("commit window: {e}")))?;
        let since = Utc::now() - window;

        let vcs = self.vcs.clone();
        let path = local_path.to_path_buf();
        let commits = tokio::task::spawn_blocking(move || vcs.commits_since(&path, since)).await??;
        self.analyze_commits(repo, &commits, since)
    }

    /// Runs the insert, gap and scoring passes over already collected commits.
    pub fn analyze_commits(
        &self,
        repo: &Repo,
        commits: &[CommitRecord],
        since: DateTime<Utc>,
    ) -> Result<FrequencyOutcome> {
        let committers = self.store.committers_for_repo(repo.id)?;
        let known: HashMap<&str, i64> = committers
            .iter()
            .map(|c| (c.email.as_str(), c.id))
            .collect();

        let (expected, recorded) = self.record_commits(repo, &known, commits, since);
        if recorded < expected {
            log::error!(
                "{}: expected {expected} commit facts, recorded {recorded}",
                repo.repo_url
            );
        }
        if below_half(recorded, expected) {
            self.tracker.transition_commit_freq(repo.id, Status::Failed)?;
            return Ok(FrequencyOutcome::FailedInserts { expected, recorded });
        }

        let (expected_updates, actual_updates) = self.fill_gaps(repo, &committers)?;
        log::debug!(
            "{}: expected gap updates={expected_updates} actual={actual_updates}",
            repo.repo_url
        );
        if below_half(actual_updates, expected_updates) {
            log::error!(
                "{}: only {actual_updates} of {expected_updates} commit gaps stored",
                repo.repo_url
            );
            self.tracker.transition_commit_freq(repo.id, Status::Failed)?;
            return Ok(FrequencyOutcome::FailedGapUpdates {
                expected: expected_updates,
                actual: actual_updates,
            });
        }

        let scores = self.score(repo, &committers)?;
        self.tracker.transition_commit_freq(repo.id, Status::Done)?;
        log::info!(
            "{}: commit frequency recorded for {} committers over {expected} commits",
            repo.repo_url,
            scores.len()
        );
        Ok(FrequencyOutcome::Done {
            commits: expected,
            scores,
        })
    }

    /// Inserts one fact per qualifying commit. Returns how many commits
    /// qualified and how many are now on record, counting duplicates.
    fn record_commits(
        &self,
        repo: &Repo,
        known: &HashMap<&str, i64>,
        commits: &[CommitRecord],
        since: DateTime<Utc>,
    ) -> (u64, u64) {
        let mut expected = 0u64;
        let mut recorded = 0u64;
        for commit in commits.iter().filter(|c| c.timestamp >= since) {
            let Some(&committer_id) = known.get(commit.author_email.as_str()) else {
                continue;
            };
            expected += 1;
            let fact = NewCommitFact {
                repo_id: repo.id,
                committer_id,
                commit_id: commit.id.clone(),
                commit_date: commit.timestamp,
                commit_size: commit.size,
            };
            match self.store.insert_commit_fact(&fact) {
                Ok(()) => recorded += 1,
                Err(AnalyzerError::DuplicateKey(_)) => {
                    log::info!(
                        "{}: commit {} by {} already recorded",
                        repo.repo_url,
                        commit.id,
                        commit.author_email
                    );
                    recorded += 1;
                }
                Err(e) => log::error!(
                    "{}: insert failed for commit {} by {} at {}: {e}",
                    repo.repo_url,
                    commit.id,
                    commit.author_email,
                    commit.timestamp
                ),
            }
        }
        (expected, recorded)
    }

    /// Stores the hours since the previous commit on every commit except
    /// each committer's oldest. Returns expected and successful update counts
    /// summed over the repo.
    fn fill_gaps(&self, repo: &Repo, committers: &[Committer]) -> Result<(u64, u64)> {
        let mut expected = 0u64;
        let mut actual = 0u64;
        for committer in committers {
            let facts = self.store.commit_facts_desc(repo.id, committer.id)?;
            for (later, earlier) in gaps(&facts) {
                expected += 1;
                let hours = hours_between(&earlier.commit_date, &later.commit_date);
                match self
                    .store
                    .update_commit_fact_gap(repo.id, committer.id, &later.commit_id, hours)
                {
                    Ok(true) => actual += 1,
                    Ok(false) => log::error!(
                        "{}: commit {} vanished before its gap could be stored",
                        repo.repo_url,
                        later.commit_id
                    ),
                    Err(e) => log::error!(
                        "{}: couldn't store hours_since_last_commit={hours} for {}: {e}",
                        repo.repo_url,
                        later.commit_id
                    ),
                }
            }
        }
        Ok((expected, actual))
    }

    fn score(&self, repo: &Repo, committers: &[Committer]) -> Result<BTreeMap<String, f64>> {
        let mut scores = BTreeMap::new();
        for committer in committers {
            let facts = self.store.commit_facts_desc(repo.id, committer.id)?;
            let score = consistency_score(&facts);
            match self.store.update_consistency_score(repo.id, committer.id, score) {
                Ok(true) => {}
                Ok(false) => log::warn!(
                    "{}: no stats row for {} to hold its consistency score",
                    repo.repo_url,
                    committer.email
                ),
                Err(e) => log::error!(
                    "{}: failed to save consistency score for {}: {e}",
                    repo.repo_url,
                    committer.email
                ),
            }
            scores.insert(committer.email.clone(), score);
        }
        Ok(scores)
    }
}

fn below_half(actual: u64, expected: u64) -> bool {
    (actual as f64) < expected as f64 / 2.0
}

/// Adjacent (later, earlier) pairs of facts ordered newest first.
fn gaps(facts: &[CommitFact]) -> impl Iterator<Item = (&CommitFact, &CommitFact)> {
    facts.windows(2).map(|pair| (&pair[0], &pair[1]))
}

/// Sum of reciprocal hour gaps over commits with a positive gap.
pub fn consistency_score(facts: &[CommitFact]) -> f64 {
    facts
        .iter()
        .filter_map(|f| f.hours_since_last_commit)
        .filter(|&h| h > 0)
        .map(|h| 1.0 / h as f64)
        .sum()
}
