use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Repository not found: {0}")]
    NotFound(String),
    #[error("Hosting service unreachable: {0}")]
    Unreachable(String),
    #[error("Git command failed: {0}")]
    CommandFailed(String),
    #[error("Partial data loss: expected {expected}, recorded {actual}")]
    PartialDataLoss { expected: u64, actual: u64 },
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Invalid repository url: {0}")]
    InvalidRepoUrl(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Other: {0}")]
    Other(String),
    #[error("Repository open error: {0}")]
    GitOpen(#[from] Box<gix::open::Error>),
    #[error("Commit error: {0}")]
    Commit(#[from] Box<gix::object::commit::Error>),
    #[error("Reference find error: {0}")]
    RefFind(#[from] Box<gix::reference::find::existing::Error>),
    #[error("Object find with conversion error: {0}")]
    ObjectFindConv(#[from] Box<gix::object::find::existing::with_conversion::Error>),
    #[error("Head peel error: {0}")]
    HeadPeel(#[from] Box<gix::head::peel::to_commit::Error>),
    #[error("Object decode error: {0}")]
    ObjectDecode(#[from] Box<gix::objs::decode::Error>),
    #[error("Index open error: {0}")]
    IndexOpen(#[from] Box<gix::worktree::open_index::Error>),
}

impl AnalyzerError {
    /// Errors a caller should retry rather than report as permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyzerError::Unreachable(_) | AnalyzerError::Http(_))
    }
}

// Manual From implementations for unboxed to boxed conversions
impl From<gix::open::Error> for AnalyzerError {
    fn from(err: gix::open::Error) -> Self {
        AnalyzerError::GitOpen(Box::new(err))
    }
}

impl From<gix::object::commit::Error> for AnalyzerError {
    fn from(err: gix::object::commit::Error) -> Self {
        AnalyzerError::Commit(Box::new(err))
    }
}

impl From<gix::reference::find::existing::Error> for AnalyzerError {
    fn from(err: gix::reference::find::existing::Error) -> Self {
        AnalyzerError::RefFind(Box::new(err))
    }
}

impl From<gix::object::find::existing::with_conversion::Error> for AnalyzerError {
    fn from(err: gix::object::find::existing::with_conversion::Error) -> Self {
        AnalyzerError::ObjectFindConv(Box::new(err))
    }
}

impl From<gix::head::peel::to_commit::Error> for AnalyzerError {
    fn from(err: gix::head::peel::to_commit::Error) -> Self {
        AnalyzerError::HeadPeel(Box::new(err))
    }
}

impl From<gix::objs::decode::Error> for AnalyzerError {
    fn from(err: gix::objs::decode::Error) -> Self {
        AnalyzerError::ObjectDecode(Box::new(err))
    }
}

impl From<gix::worktree::open_index::Error> for AnalyzerError {
    fn from(err: gix::worktree::open_index::Error) -> Self {
        AnalyzerError::IndexOpen(Box::new(err))
    }
}
