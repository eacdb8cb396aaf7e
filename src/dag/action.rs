// src/dag/action.rs

use std::collections::BTreeSet;
use std::fmt;

use crate::types::{ActionId, AppId, ImplId, JobId, TaskId, WorkerId};

/// Lifecycle of one scheduling attempt.
///
/// `Registered -> Blocked -> Ready -> Running -> {Completed | Failed | Cancelled}`.
/// An action with no pending predecessors skips `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionState {
    Registered,
    Blocked,
    /// Executable: every predecessor finished; waiting for a worker.
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionState::Completed | ActionState::Failed | ActionState::Cancelled
        )
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionState::Registered => "registered",
            ActionState::Blocked => "blocked",
            ActionState::Ready => "ready",
            ActionState::Running => "running",
            ActionState::Completed => "completed",
            ActionState::Failed => "failed",
            ActionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A schedulable unit of work, stored in [`ActionGraph`](super::ActionGraph).
///
/// Edges are kept as id sets on both ends; the graph keeps them symmetric.
#[derive(Debug, Clone)]
pub struct Action {
    pub id: ActionId,
    pub task: TaskId,
    pub app_id: AppId,
    pub priority: i64,
    pub state: ActionState,
    pub(crate) predecessors: BTreeSet<ActionId>,
    pub(crate) successors: BTreeSet<ActionId>,
    /// Chosen placement, once assigned.
    pub assignment: Option<(WorkerId, ImplId)>,
    /// Workers this action has already been dispatched to, oldest first.
    pub executing_resources: Vec<WorkerId>,
    pub job: Option<JobId>,
    pub cancel_requested: bool,
}

impl Action {
    pub(crate) fn new(id: ActionId, task: TaskId, app_id: AppId, priority: i64) -> Self {
        Self {
            id,
            task,
            app_id,
            priority,
            state: ActionState::Registered,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
            assignment: None,
            executing_resources: Vec::new(),
            job: None,
            cancel_requested: false,
        }
    }

    pub fn predecessors(&self) -> &BTreeSet<ActionId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<ActionId> {
        &self.successors
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Number of dispatch attempts made so far.
    pub fn attempts(&self) -> usize {
        self.executing_resources.len()
    }

    pub fn has_run_on(&self, worker: WorkerId) -> bool {
        self.executing_resources.contains(&worker)
    }
}
