use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunlenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid task id (expected {expected}, actual {actual})")]
    InvalidTaskId { expected: usize, actual: usize },
    #[error("worker failed: {0}")]
    WorkerPanicked(String),
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
    #[error("encoding aborted before all chunks were emitted")]
    Aborted,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RunlenError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RunlenError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
