// src/task/mod.rs

//! Task descriptors handed in by the application front end.
//!
//! A [`TaskDescription`] is immutable once submitted. The dispatcher turns
//! each one into an action in the dependency graph; [`analyser`] derives the
//! data dependencies from its parameters.

pub mod analyser;

use crate::errors::{Result, TaskgridError};
use crate::resources::description::Constraints;
use crate::types::{AppId, DataType, Direction, ImplId, TaskId};

pub use analyser::DataAnalyser;

/// One way of running a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    pub id: ImplId,
    pub name: String,
    pub constraints: Constraints,
    /// Shell command for the local-process job adaptor. Remote transports
    /// identify the implementation by `name` instead.
    pub command: Option<String>,
}

impl Implementation {
    pub fn new(id: ImplId, name: impl Into<String>, constraints: Constraints) -> Self {
        Self {
            id,
            name: name.into(),
            constraints,
            command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Data identifier. Two parameters naming the same datum are the same
    /// data for dependency purposes.
    pub name: String,
    pub direction: Direction,
    pub data_type: DataType,
    pub stream: bool,
    pub prefix: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, direction: Direction, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            direction,
            data_type,
            stream: false,
            prefix: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescription {
    pub id: TaskId,
    pub name: String,
    pub app_id: AppId,
    pub priority: bool,
    pub implementations: Vec<Implementation>,
    pub parameters: Vec<Parameter>,
    /// Explicit ordering on top of data dependencies.
    pub after: Vec<TaskId>,
}

impl TaskDescription {
    pub fn new(id: TaskId, name: impl Into<String>, app_id: AppId) -> Self {
        Self {
            id,
            name: name.into(),
            app_id,
            priority: false,
            implementations: Vec::new(),
            parameters: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Action priority derived from the priority flag.
    pub fn action_priority(&self) -> i64 {
        if self.priority { 1 } else { 0 }
    }

    pub fn implementation(&self, id: ImplId) -> Option<&Implementation> {
        self.implementations.iter().find(|i| i.id == id)
    }

    /// Key under which executions of `implementation` are profiled,
    /// `"<task>.<implementation>"`.
    pub fn signature(&self, implementation: &Implementation) -> String {
        format!("{}.{}", self.name, implementation.name)
    }

    /// Reject descriptors that can never be scheduled.
    pub fn validate(&self) -> Result<()> {
        if self.implementations.is_empty() {
            return Err(TaskgridError::InvalidTask(
                self.id,
                "task declares no implementation".to_string(),
            ));
        }
        if self.after.contains(&self.id) {
            return Err(TaskgridError::InvalidTask(
                self.id,
                "task cannot run after itself".to_string(),
            ));
        }
        Ok(())
    }
}
