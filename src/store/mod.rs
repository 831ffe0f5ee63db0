//! Durable storage for repos, committers, per-repo stats and commit facts.
//!
//! The analysis core only talks to the [`Store`] trait; every write is a
//! single-row upsert or update scoped by key.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::model::{Committer, CommitFact, CommitterStats, FactKind, NewCommitFact, Repo, Status};
use std::collections::BTreeMap;

pub trait Store: Send + Sync {
    /// Creates the repo row if it does not exist yet and returns it.
    fn upsert_repo(&self, repo_url: &str) -> Result<Repo>;
    fn repo_by_url(&self, repo_url: &str) -> Result<Option<Repo>>;
    fn repo_by_id(&self, repo_id: i64) -> Result<Option<Repo>>;
    fn repo_by_request_id(&self, request_id: &str) -> Result<Option<Repo>>;
    /// Records the request -> repo correlation. Saving the same id twice is a no-op.
    fn save_request(&self, request_id: &str, repo_id: i64) -> Result<()>;

    fn upsert_committer(&self, email: &str) -> Result<Committer>;
    fn committer(&self, email: &str) -> Result<Option<Committer>>;
    /// Committers that have a stats row in the given repo.
    fn committers_for_repo(&self, repo_id: i64) -> Result<Vec<Committer>>;

    fn update_sub_status(&self, repo_id: i64, kind: FactKind, status: Status) -> Result<()>;
    fn update_repo_status(&self, repo_id: i64, status: Status) -> Result<()>;

    fn upsert_stats(
        &self,
        repo_id: i64,
        committer_id: i64,
        loc: u64,
        loc_percentile: f64,
        loc_percentage: f64,
    ) -> Result<()>;
    /// Returns whether a stats row was updated.
    fn update_consistency_score(&self, repo_id: i64, committer_id: i64, score: f64) -> Result<bool>;

    /// Fails with [`AnalyzerError::DuplicateKey`](crate::error::AnalyzerError::DuplicateKey)
    /// when the fact is already recorded.
    fn insert_commit_fact(&self, fact: &NewCommitFact) -> Result<()>;
    /// Returns whether a commit fact was updated.
    fn update_commit_fact_gap(
        &self,
        repo_id: i64,
        committer_id: i64,
        commit_id: &str,
        hours: i64,
    ) -> Result<bool>;
    fn commit_facts_desc(&self, repo_id: i64, committer_id: i64) -> Result<Vec<CommitFact>>;

    /// Stats rows for a repo, highest percentile first.
    fn stats_for_repo(&self, repo_id: i64) -> Result<Vec<CommitterStats>>;
    fn consistency_for_repo(&self, repo_id: i64) -> Result<BTreeMap<String, f64>>;
}
