use crate::error::Result;
use crate::git::VcsProvider;
use crate::model::{CommitterLoc, Repo, Status};
use crate::status::StatusTracker;
use crate::store::Store;
use crate::util::round2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub type Histogram = HashMap<String, u64>;

/// Blames every tracked file and turns the merged line counts into
/// per-committer ownership stats.
pub struct LocAggregator {
    store: Arc<dyn Store>,
    vcs: Arc<dyn VcsProvider>,
    tracker: StatusTracker,
    concurrency: usize,
}

impl LocAggregator {
    pub fn new(
        store: Arc<dyn Store>,
        vcs: Arc<dyn VcsProvider>,
        tracker: StatusTracker,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            vcs,
            tracker,
            concurrency,
        }
    }

    /// Runs the blame fan-out, persists the stats and marks the LOC facts done.
    pub async fn aggregate(&self, repo: &Repo, local_path: &Path, files: &[String]) -> Result<Vec<CommitterLoc>> {
        log::info!("{}: blaming {} files", repo.repo_url, files.len());
        let histogram = self.blame_all(local_path, files).await;
        let ownership = ownership(&histogram);
        self.persist(repo, &ownership);
        self.tracker.transition_loc(repo.id, Status::Done)?;
        log::info!(
            "{}: line ownership recorded for {} committers",
            repo.repo_url,
            ownership.len()
        );
        Ok(ownership)
    }

    /// Blames all files concurrently and reduces the per-file partial maps
    /// once every task has finished.
    pub async fn blame_all(&self, local_path: &Path, files: &[String]) -> Histogram {
        let limit = if self.concurrency == 0 {
            Semaphore::MAX_PERMITS
        } else {
            self.concurrency
        };
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for file in files {
            let vcs = self.vcs.clone();
            let permits = permits.clone();
            let path: PathBuf = local_path.to_path_buf();
            let file = file.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Histogram::new();
                };
                let name = file.clone();
                match tokio::task::spawn_blocking(move || vcs.blame(&path, &file)).await {
                    Ok(Ok(contributions)) => {
                        let mut partial = Histogram::new();
                        for c in contributions {
                            *partial.entry(c.author_email).or_insert(0) += c.lines;
                        }
                        partial
                    }
                    Ok(Err(e)) => {
                        log::error!("Error while blaming {name}: {e}");
                        Histogram::new()
                    }
                    Err(e) => {
                        log::error!("Blame task for {name} failed: {e}");
                        Histogram::new()
                    }
                }
            });
        }

        let mut histogram = Histogram::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(partial) => merge(&mut histogram, partial),
                Err(e) => log::error!("Blame task failed: {e}"),
            }
        }
        histogram
    }

    fn persist(&self, repo: &Repo, ownership: &[CommitterLoc]) {
        for entry in ownership {
            let saved = self.store.upsert_committer(&entry.email).and_then(|committer| {
                self.store.upsert_stats(
                    repo.id,
                    committer.id,
                    entry.loc,
                    entry.loc_percentile,
                    entry.loc_percentage,
                )
            });
            if let Err(e) = saved {
                log::error!(
                    "{}: failed to save line ownership for {}: {e}",
                    repo.repo_url,
                    entry.email
                );
            }
        }
    }
}

pub fn merge(histogram: &mut Histogram, partial: Histogram) {
    for (email, lines) in partial {
        *histogram.entry(email).or_insert(0) += lines;
    }
}

/// Percentile against the largest contributor and percentage of the total,
/// both rounded to two decimals, largest contributor first.
///
/// An empty histogram yields no entries.
pub fn ownership(histogram: &Histogram) -> Vec<CommitterLoc> {
    let max_loc = histogram.values().copied().max().unwrap_or(0);
    let total_loc: u64 = histogram.values().sum();
    if max_loc == 0 || total_loc == 0 {
        return Vec::new();
    }

    let mut entries: Vec<CommitterLoc> = histogram
        .iter()
        .map(|(email, &loc)| CommitterLoc {
            email: email.clone(),
            loc,
            loc_percentile: round2(loc as f64 / max_loc as f64),
            loc_percentage: round2(loc as f64 / total_loc as f64),
        })
        .collect();
    entries.sort_by(|a, b| b.loc.cmp(&a.loc).then_with(|| a.email.cmp(&b.email)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ownership_rounds_to_two_decimals() {
        let histogram = Histogram::from([("a".to_string(), 70), ("b".to_string(), 30)]);
        assert_eq!(
            ownership(&histogram),
            vec![
                CommitterLoc {
                    email: "a".to_string(),
                    loc: 70,
                    loc_percentile: 1.0,
                    loc_percentage: 0.7,
                },
                CommitterLoc {
                    email: "b".to_string(),
                    loc: 30,
                    loc_percentile: 0.43,
                    loc_percentage: 0.3,
                },
            ]
        );
    }

    #[test]
    fn empty_histogram_has_no_ownership() {
        assert!(ownership(&Histogram::new()).is_empty());
        let zero = Histogram::from([("a".to_string(), 0)]);
        assert!(ownership(&zero).is_empty());
    }

    #[test]
    fn partial_maps_merge_by_author() {
        let mut histogram = Histogram::from([("a".to_string(), 3)]);
        merge(&mut histogram, Histogram::from([("a".to_string(), 2), ("b".to_string(), 1)]));
        assert_eq!(histogram["a"], 5);
        assert_eq!(histogram["b"], 1);
    }
}
