use crate::error::{AnalyzerError, Result};
use crate::git::RepoUrl;
use crate::model::AnalysisRequest;
use crate::orchestrator::{AnalysisOutcome, Analyzer};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Producer side of the analysis queue. Cheap to clone.
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<AnalysisRequest>,
}

impl RequestQueue {
    /// Appends a request and returns immediately.
    pub fn submit(&self, request: AnalysisRequest) -> Result<()> {
        log::debug!("Enqueued {} for {}", request.id, request.repo_url);
        self.tx
            .send(request)
            .map_err(|e| AnalyzerError::Other(format!("analysis worker stopped, dropped {}", e.0.id)))
    }
}

/// The single consumer of the queue. Requests are analyzed one at a time in
/// submission order.
pub struct Worker {
    rx: mpsc::UnboundedReceiver<AnalysisRequest>,
    analyzer: Arc<Analyzer>,
}

pub fn channel(analyzer: Arc<Analyzer>) -> (RequestQueue, Worker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestQueue { tx }, Worker { rx, analyzer })
}

impl Worker {
    /// Drains the queue until every [`RequestQueue`] handle is dropped.
    /// Returns the number of requests processed.
    pub async fn run(mut self) -> usize {
        log::debug!("Analysis worker started");
        let mut processed = 0;
        while let Some(request) = self.rx.recv().await {
            log::debug!("Picked up {} for {}", request.id, request.repo_url);
            match self.process(&request).await {
                Ok(AnalysisOutcome::Skipped) => {}
                Ok(outcome) if outcome.is_failure() => {
                    log::warn!("{}: analysis finished with failures: {outcome:?}", request.repo_url)
                }
                Ok(outcome) => log::info!("{}: analysis finished: {outcome:?}", request.repo_url),
                Err(e) => log::error!(
                    "{}: analysis of request {} aborted: {e}",
                    request.repo_url,
                    request.id
                ),
            }
            processed += 1;
        }
        log::debug!("Analysis worker stopped after {processed} requests");
        processed
    }

    async fn process(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let url = RepoUrl::parse(&request.repo_url)?;
        let store = self.analyzer.store();
        let repo = store.upsert_repo(url.canonical())?;
        store.save_request(&request.id, repo.id)?;
        self.analyzer.analyze(&request.repo_url).await
    }
}
