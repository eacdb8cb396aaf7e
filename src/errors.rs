// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::{ActionId, TaskId, UpdateId, WorkerId};

#[derive(Error, Debug)]
pub enum TaskgridError {
    /// Attempt to link an action behind a predecessor that already finished.
    #[error("Dependency violation: {0}")]
    DependencyViolation(String),

    /// No worker in the pool satisfies any implementation of the task.
    #[error("No capable worker for task {0}")]
    NoCapableWorker(TaskId),

    #[error("Job dispatch failure: {0}")]
    JobDispatchFailure(String),

    #[error("Resource update {0} was not applied within the allotted time")]
    ResourceUpdateTimeout(UpdateId),

    #[error("Shutdown in progress; request rejected")]
    ShutdownInProgress,

    /// The waiter was released without an answer (e.g. the dispatcher went
    /// away). Callers may retry.
    #[error("Interrupted while waiting: {0}")]
    Interrupted(String),

    #[error("Invalid task {0}: {1}")]
    InvalidTask(TaskId, String),

    #[error("Unknown worker: {0}")]
    UnknownWorker(WorkerId),

    #[error("Unknown action: {0}")]
    UnknownAction(ActionId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskgridError {
    /// Whether the caller may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskgridError::Interrupted(_)
                | TaskgridError::NoCapableWorker(_)
                | TaskgridError::JobDispatchFailure(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskgridError>;
