use crate::error::{AnalyzerError, Result};
use crate::git::{RepoHost, RepoUrl};
use crate::model::{AnalysisReport, AnalysisRequest, CommitterLoc, Repo, RequestId, Status};
use crate::queue::RequestQueue;
use crate::store::Store;
use std::sync::Arc;

/// Caller-facing operations: submit a repo for analysis and poll for results.
pub struct AnalysisService {
    store: Arc<dyn Store>,
    host: Arc<dyn RepoHost>,
    queue: RequestQueue,
    reports: Reports,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn Store>, host: Arc<dyn RepoHost>, queue: RequestQueue) -> Self {
        Self {
            reports: Reports::new(store.clone()),
            store,
            host,
            queue,
        }
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }

    /// Queues an analysis of `repo_url` and returns the request id to poll with.
    ///
    /// Nothing is stored for a repo the hosting service does not know.
    pub async fn submit(&self, repo_url: &str) -> Result<RequestId> {
        let url = self.existing(repo_url).await?;
        let repo = self.store.upsert_repo(url.canonical())?;
        let request = AnalysisRequest::new(url.canonical());
        self.store.save_request(&request.id, repo.id)?;
        let id = request.id.clone();
        self.queue.submit(request)?;
        log::debug!("request_id={id} repo_url={}", url.canonical());
        Ok(id)
    }

    pub fn analysis_by_request_id(&self, request_id: &str) -> Result<Option<AnalysisReport>> {
        self.reports.by_request_id(request_id)
    }

    pub fn analysis_by_repo_url(&self, repo_url: &str) -> Result<Option<AnalysisReport>> {
        self.reports.by_repo_url(repo_url)
    }

    /// Single-call polling: returns the current report and queues an analysis
    /// when none has been started for the repo yet.
    pub async fn poll_or_submit(&self, repo_url: &str) -> Result<AnalysisReport> {
        let url = self.existing(repo_url).await?;
        let repo = self.store.upsert_repo(url.canonical())?;
        log::info!(
            "{}: status={} loc={} commit_freq={}",
            repo.repo_url,
            repo.status,
            repo.loc_facts_status,
            repo.commit_freq_facts_status
        );
        if repo.status == Status::Todo {
            let request = AnalysisRequest::new(url.canonical());
            self.store.save_request(&request.id, repo.id)?;
            self.queue.submit(request)?;
        }
        self.reports.report(&repo)
    }

    async fn existing(&self, repo_url: &str) -> Result<RepoUrl> {
        let url = RepoUrl::parse(repo_url)?;
        if !self.host.exists_remotely(&url).await? {
            return Err(AnalyzerError::NotFound(format!(
                "Couldn't find {} on {}",
                url.canonical(),
                if url.is_local() { "disk" } else { url.host() }
            )));
        }
        Ok(url)
    }
}

/// Read-only view of persisted analysis results.
#[derive(Clone)]
pub struct Reports {
    store: Arc<dyn Store>,
}

impl Reports {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn by_request_id(&self, request_id: &str) -> Result<Option<AnalysisReport>> {
        match self.store.repo_by_request_id(request_id)? {
            Some(repo) => self.report(&repo).map(Some),
            None => Ok(None),
        }
    }

    pub fn by_repo_url(&self, repo_url: &str) -> Result<Option<AnalysisReport>> {
        let url = RepoUrl::parse(repo_url)?;
        match self.store.repo_by_url(url.canonical())? {
            Some(repo) => self.report(&repo).map(Some),
            None => Ok(None),
        }
    }

    /// Whatever is persisted right now. Consistency scores are only reported
    /// once the commit frequency pass is done.
    pub fn report(&self, repo: &Repo) -> Result<AnalysisReport> {
        let mut report = AnalysisReport::empty(repo);
        for stats in self.store.stats_for_repo(repo.id)? {
            report.loc_analysis.insert(
                stats.email.clone(),
                CommitterLoc {
                    email: stats.email,
                    loc: stats.loc,
                    loc_percentile: stats.loc_percentile,
                    loc_percentage: stats.loc_percentage,
                },
            );
        }
        if repo.commit_freq_facts_status == Status::Done {
            report.commit_freq_analysis = self.store.consistency_for_repo(repo.id)?;
        }
        Ok(report)
    }
}
