use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const SCHEMA_VERSION: u32 = 1;

/// Progress of a repo analysis or of one of its fact-extraction passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    Done,
    Failed,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Todo, Status::InProgress, Status::Done, Status::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Status::Todo),
            "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            "failed" => Ok(Status::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Selects one of the two independently tracked sub-statuses of a repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Loc,
    CommitFreq,
}

impl FactKind {
    pub fn column(&self) -> &'static str {
        match self {
            FactKind::Loc => "loc_facts_status",
            FactKind::CommitFreq => "commit_freq_facts_status",
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactKind::Loc => f.write_str("loc"),
            FactKind::CommitFreq => f.write_str("commit_freq"),
        }
    }
}

pub type RequestId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub id: RequestId,
    pub repo_url: String,
}

impl AnalysisRequest {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repo_url: repo_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub repo_url: String,
    pub status: Status,
    pub loc_facts_status: Status,
    pub commit_freq_facts_status: Status,
}

impl Repo {
    pub fn sub_status(&self, kind: FactKind) -> Status {
        match kind {
            FactKind::Loc => self.loc_facts_status,
            FactKind::CommitFreq => self.commit_freq_facts_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitterStats {
    pub committer_id: i64,
    pub email: String,
    pub loc: u64,
    pub loc_percentile: f64,
    pub loc_percentage: f64,
    pub consistency_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommitFact {
    pub repo_id: i64,
    pub committer_id: i64,
    pub commit_id: String,
    pub commit_date: DateTime<Utc>,
    pub commit_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFact {
    pub commit_id: String,
    pub commit_date: DateTime<Utc>,
    pub hours_since_last_commit: Option<i64>,
    pub commit_size: u64,
}

/// A commit as reported by the VCS provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

/// Lines attributed to one author within one blamed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameContribution {
    pub author_email: String,
    pub lines: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitterLoc {
    pub email: String,
    pub loc: u64,
    pub loc_percentile: f64,
    pub loc_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub version: u32,
    pub repo_url: String,
    pub status: Status,
    pub loc_facts_status: Status,
    pub commit_freq_facts_status: Status,
    pub loc_analysis: BTreeMap<String, CommitterLoc>,
    pub commit_freq_analysis: BTreeMap<String, f64>,
}

impl AnalysisReport {
    pub fn empty(repo: &Repo) -> Self {
        Self {
            version: SCHEMA_VERSION,
            repo_url: repo.repo_url.clone(),
            status: repo.status,
            loc_facts_status: repo.loc_facts_status,
            commit_freq_facts_status: repo.commit_freq_facts_status,
            loc_analysis: BTreeMap::new(),
            commit_freq_analysis: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_form_is_exhaustive() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("pending".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
