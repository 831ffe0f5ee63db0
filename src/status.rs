use crate::error::{AnalyzerError, Result};
use crate::model::{FactKind, Repo, Status};
use crate::store::Store;
use std::sync::Arc;

impl Status {
    /// Legal sub-status edges. Self-transitions and anything leaving a
    /// terminal state are rejected.
    pub fn can_transition_to(&self, target: Status) -> bool {
        matches!(
            (self, target),
            (Status::Todo, Status::InProgress)
                | (Status::Todo, Status::Done)
                | (Status::Todo, Status::Failed)
                | (Status::InProgress, Status::Done)
                | (Status::InProgress, Status::Failed)
        )
    }
}

/// Aggregate repo status for a pair of sub-statuses, first matching rule wins.
///
/// Returns `None` when no rule applies (one side `todo`, the other terminal);
/// the stored aggregate is then left as it is.
pub fn derive_status(loc: Status, commit_freq: Status) -> Option<Status> {
    if loc == Status::Todo && commit_freq == Status::Todo {
        return Some(Status::Todo);
    }
    if loc == Status::InProgress || commit_freq == Status::InProgress {
        return Some(Status::InProgress);
    }
    if loc == Status::Done && commit_freq == Status::Done {
        return Some(Status::Done);
    }
    if loc == Status::Failed || commit_freq == Status::Failed {
        return Some(Status::Failed);
    }
    None
}

/// Applies sub-status transitions and keeps the aggregate status in sync.
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn Store>,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Moves one sub-status of `repo_id` to `target`.
    ///
    /// Returns `false` without touching the store when the edge is not legal,
    /// which callers use to decide whether a sub-analysis still needs to run.
    pub fn transition(&self, repo_id: i64, kind: FactKind, target: Status) -> Result<bool> {
        let repo = self.load(repo_id)?;
        let current = repo.sub_status(kind);
        if !current.can_transition_to(target) {
            log::debug!(
                "{}: {kind} status {current} -> {target} rejected",
                repo.repo_url
            );
            return Ok(false);
        }

        self.store.update_sub_status(repo_id, kind, target)?;
        let (loc, commit_freq) = match kind {
            FactKind::Loc => (target, repo.commit_freq_facts_status),
            FactKind::CommitFreq => (repo.loc_facts_status, target),
        };
        match derive_status(loc, commit_freq) {
            Some(status) => self.store.update_repo_status(repo_id, status)?,
            None => log::warn!(
                "{}: no aggregate rule for loc={loc} commit_freq={commit_freq}, keeping {}",
                repo.repo_url,
                repo.status
            ),
        }
        log::debug!("{}: {kind} status {current} -> {target}", repo.repo_url);
        Ok(true)
    }

    pub fn transition_loc(&self, repo_id: i64, target: Status) -> Result<bool> {
        self.transition(repo_id, FactKind::Loc, target)
    }

    pub fn transition_commit_freq(&self, repo_id: i64, target: Status) -> Result<bool> {
        self.transition(repo_id, FactKind::CommitFreq, target)
    }

    fn load(&self, repo_id: i64) -> Result<Repo> {
        self.store
            .repo_by_id(repo_id)?
            .ok_or_else(|| AnalyzerError::Other(format!("Repo {repo_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use Status::*;

    #[test]
    fn aggregate_follows_priority_table() {
        let expected = [
            ((Todo, Todo), Some(Todo)),
            ((Todo, InProgress), Some(InProgress)),
            ((Todo, Done), None),
            ((Todo, Failed), Some(Failed)),
            ((InProgress, Todo), Some(InProgress)),
            ((InProgress, InProgress), Some(InProgress)),
            ((InProgress, Done), Some(InProgress)),
            ((InProgress, Failed), Some(InProgress)),
            ((Done, Todo), None),
            ((Done, InProgress), Some(InProgress)),
            ((Done, Done), Some(Done)),
            ((Done, Failed), Some(Failed)),
            ((Failed, Todo), Some(Failed)),
            ((Failed, InProgress), Some(InProgress)),
            ((Failed, Done), Some(Failed)),
            ((Failed, Failed), Some(Failed)),
        ];
        for ((loc, freq), want) in expected {
            assert_eq!(derive_status(loc, freq), want, "loc={loc} freq={freq}");
        }
    }

    #[test]
    fn terminal_states_never_move() {
        for from in [Done, Failed] {
            for to in Status::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
        for status in Status::ALL {
            assert!(!status.can_transition_to(status));
        }
        assert!(!InProgress.can_transition_to(Todo));
    }

    #[test]
    fn transition_updates_aggregate() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let repo = store.upsert_repo("https://github.com/owner/repo").unwrap();
        let tracker = StatusTracker::new(store.clone());

        assert!(tracker.transition_loc(repo.id, InProgress).unwrap());
        assert_eq!(store.repo_by_id(repo.id).unwrap().unwrap().status, InProgress);

        assert!(tracker.transition_loc(repo.id, Done).unwrap());
        assert!(!tracker.transition_loc(repo.id, InProgress).unwrap());
        // (done, todo) matches no rule, aggregate stays where it was
        assert_eq!(store.repo_by_id(repo.id).unwrap().unwrap().status, InProgress);

        assert!(tracker.transition_commit_freq(repo.id, Failed).unwrap());
        let repo = store.repo_by_id(repo.id).unwrap().unwrap();
        assert_eq!(repo.loc_facts_status, Done);
        assert_eq!(repo.commit_freq_facts_status, Failed);
        assert_eq!(repo.status, Failed);
    }
}
