use thiserror::Error;

#[derive(Debug, Error)]
pub enum MkanbanError {
    #[error("not initialized: run 'mkanban init'")]
    NotInitialized,

    #[error("invalid action: {0}")]
    Validation(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("action already exists: {0}")]
    ActionExists(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("board not found: {0}")]
    BoardNotFound(String),

    #[error("executor failed: {0}")]
    Executor(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("action store error: {0}")]
    Store(String),

    #[error("collaborator error: {0}")]
    Port(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MkanbanError>;
