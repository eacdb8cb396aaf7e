// src/exec/job.rs

//! What crosses the transport seam: jobs out, results back.

use crate::resources::worker::Worker;
use crate::task::{Implementation, Parameter};
use crate::types::{ActionId, AppId, DataType, JobId, TaskId};

/// One execution of an action on a chosen worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub action: ActionId,
    pub task: TaskId,
    pub task_name: String,
    pub app_id: AppId,
    pub worker: Worker,
    pub implementation: Implementation,
    /// Direction-tagged, typed parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// 1 for the first attempt.
    pub attempt: usize,
}

/// Result envelope of a finished job: parallel lists of parameter types and
/// out-values (`None` for parameters the job did not produce).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub job_id: JobId,
    pub param_types: Vec<DataType>,
    pub values: Vec<Option<String>>,
}

impl JobResult {
    pub fn empty(job_id: JobId) -> Self {
        Self {
            job_id,
            param_types: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Typed out-values, skipping parameters without one.
    pub fn outputs(&self) -> impl Iterator<Item = (DataType, &str)> {
        self.param_types
            .iter()
            .zip(&self.values)
            .filter_map(|(t, v)| v.as_deref().map(|v| (*t, v)))
    }
}
