use thiserror::Error;

pub type PulseResult<T> = Result<T, PulseError>;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Notification dispatch error: {0}")]
    Dispatch(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
