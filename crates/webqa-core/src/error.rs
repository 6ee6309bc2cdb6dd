use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("{service} unavailable: {reason}")]
    CollaboratorUnavailable {
        service: &'static str,
        reason: String,
    },

    #[error("{service} timed out after {secs}s")]
    CollaboratorTimeout { service: &'static str, secs: u64 },

    #[error("corrupt cache shard {path}: {reason}")]
    CacheCorrupt { path: String, reason: String },

    #[error("answer {0:?} not found in retokenized context")]
    AnswerNotLocatable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QaError {
    /// Collaborator failures are recovered locally; everything else is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorUnavailable { .. } | Self::CollaboratorTimeout { .. }
        )
    }
}

pub type QaResult<T> = Result<T, QaError>;
