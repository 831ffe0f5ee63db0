use crate::error::{AnalyzerError, Result};
use crate::model::CommitRecord;
use chrono::{DateTime, Utc};
use gix::{ObjectId, Repository};
use std::collections::{HashSet, VecDeque};
use std::path::Path;

/// Read-only view of a local working copy.
pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = gix::open(path.as_ref())?;
        Ok(Self { repo })
    }

    /// Paths recorded in the index, which for a fresh checkout mirrors HEAD.
    pub fn tracked_files(&self) -> Result<Vec<String>> {
        let index = self.repo.index_or_empty()?;
        let files = index
            .entries()
            .iter()
            .map(|entry| entry.path(&index).to_string())
            .collect();
        Ok(files)
    }

    /// Commits reachable from HEAD whose committer time is at or after `since`.
    ///
    /// `CommitRecord::timestamp` is the committer time as well, not the author
    /// date, so rebased or amended commits count from when they were
    /// rewritten. History below the cut-off is not descended into.
    pub fn commits_since(&self, since: DateTime<Utc>) -> Result<Vec<CommitRecord>> {
        let mut head = self.repo.head()?;
        let head_commit = head.peel_to_commit_in_place()?;

        let mut commits = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut stack: VecDeque<ObjectId> = VecDeque::from([head_commit.id]);

        while let Some(commit_id) = stack.pop_back() {
            if !seen.insert(commit_id) {
                continue;
            }

            let commit = self.repo.find_commit(commit_id)?;
            let secs = commit.time()?.seconds;
            let timestamp = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| AnalyzerError::InvalidDate(format!("Invalid timestamp: {secs}")))?;

            if timestamp < since {
                continue;
            }

            let author = commit.author()?;
            commits.push(CommitRecord {
                id: commit_id.to_string(),
                author_email: author.email.to_string(),
                timestamp,
                size: commit.data.len() as u64,
            });

            for pid in commit.parent_ids() {
                stack.push_back(pid.into());
            }
        }

        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(commits)
    }
}
