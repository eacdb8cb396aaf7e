// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::dag::action::{Action, ActionState};
use crate::errors::{Result, TaskgridError};
use crate::types::{ActionId, AppId, TaskId};

/// Arena of actions keyed by id, holding the dependency edges.
///
/// Both ends of every edge are stored (`predecessors` on the successor,
/// `successors` on the predecessor) and every mutation below updates both,
/// so the relation stays symmetric. [`ActionGraph::check_symmetry`] verifies
/// that.
///
/// Edges to a `Failed` action are kept: its dependents stay blocked and are
/// reported, never silently released.
#[derive(Debug, Default)]
pub struct ActionGraph {
    actions: BTreeMap<ActionId, Action>,
    next_id: u64,
}

impl ActionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a `Registered` action. Ids grow in registration order.
    pub fn register(&mut self, task: TaskId, app_id: AppId, priority: i64) -> ActionId {
        self.next_id += 1;
        let id = ActionId(self.next_id);
        self.actions.insert(id, Action::new(id, task, app_id, priority));
        debug!(action = %id, %task, "action registered");
        id
    }

    pub fn get(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(&id)
    }

    pub fn get_mut(&mut self, id: ActionId) -> Option<&mut Action> {
        self.actions.get_mut(&id)
    }

    fn action(&self, id: ActionId) -> Result<&Action> {
        self.actions.get(&id).ok_or(TaskgridError::UnknownAction(id))
    }

    fn action_mut(&mut self, id: ActionId) -> Result<&mut Action> {
        self.actions
            .get_mut(&id)
            .ok_or(TaskgridError::UnknownAction(id))
    }

    pub fn state(&self, id: ActionId) -> Option<ActionState> {
        self.actions.get(&id).map(|a| a.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count_in_state(&self, state: ActionState) -> usize {
        self.actions.values().filter(|a| a.state == state).count()
    }

    /// Link `pred` as required before `succ`.
    ///
    /// Returns `Ok(false)` without touching the graph when `pred` already
    /// completed or was cancelled (or has been collected), or when the edge
    /// already exists. `succ` moves to `Blocked` when an edge is created.
    pub fn add_predecessor(&mut self, pred: ActionId, succ: ActionId) -> Result<bool> {
        let succ_state = self.action(succ)?.state;
        if succ_state.is_terminal() || succ_state == ActionState::Running {
            return Err(TaskgridError::DependencyViolation(format!(
                "{succ} is {succ_state} and cannot gain predecessors"
            )));
        }

        if pred == succ {
            warn!(action = %succ, "ignoring self dependency");
            return Ok(false);
        }

        let pred_state = match self.actions.get(&pred) {
            Some(a) => a.state,
            None => {
                debug!(%pred, %succ, "predecessor already collected; no edge needed");
                return Ok(false);
            }
        };
        if matches!(pred_state, ActionState::Completed | ActionState::Cancelled) {
            let violation = TaskgridError::DependencyViolation(format!(
                "{pred} is already {pred_state}; not linking {succ} behind it"
            ));
            debug!(error = %violation, "link ignored");
            return Ok(false);
        }

        let created = self.action_mut(pred)?.successors.insert(succ);
        let succ_action = self.action_mut(succ)?;
        succ_action.predecessors.insert(pred);
        if matches!(succ_action.state, ActionState::Registered | ActionState::Ready) {
            succ_action.state = ActionState::Blocked;
        }
        Ok(created)
    }

    /// Mirror of [`ActionGraph::add_predecessor`].
    pub fn add_successor(&mut self, succ: ActionId, pred: ActionId) -> Result<bool> {
        self.add_predecessor(pred, succ)
    }

    /// Whether the action may run: nothing pending before it and not terminal.
    pub fn is_executable(&self, id: ActionId) -> bool {
        self.actions
            .get(&id)
            .is_some_and(|a| a.predecessors.is_empty() && !a.is_terminal())
    }

    /// Detach `id` from the graph.
    ///
    /// Every successor loses `id` as predecessor and is linked instead to each
    /// of `id`'s own predecessors it is not already waiting on. Successors left
    /// with no predecessors become `Ready` and are returned in id order. The
    /// action's own edge sets are cleared; its state is left to the caller.
    pub fn unschedule(&mut self, id: ActionId) -> Result<Vec<ActionId>> {
        let (preds, succs) = {
            let action = self.action_mut(id)?;
            (
                std::mem::take(&mut action.predecessors),
                std::mem::take(&mut action.successors),
            )
        };

        for p in &preds {
            if let Some(pa) = self.actions.get_mut(p) {
                pa.successors.remove(&id);
            }
        }

        let mut freed = Vec::new();
        for s in &succs {
            let Some(sa) = self.actions.get_mut(s) else {
                continue;
            };
            sa.predecessors.remove(&id);
            for p in &preds {
                if p != s {
                    sa.predecessors.insert(*p);
                }
            }
            let now_free = sa.predecessors.is_empty() && !sa.is_terminal();
            if now_free {
                sa.state = ActionState::Ready;
                freed.push(*s);
            }
            for p in &preds {
                if p != s
                    && let Some(pa) = self.actions.get_mut(p)
                {
                    pa.successors.insert(*s);
                }
            }
        }

        debug!(action = %id, relinked = succs.len(), freed = freed.len(), "action unscheduled");
        Ok(freed)
    }

    /// Move a `Registered`/`Blocked` action with no pending predecessors to
    /// `Ready`. Returns whether it is now ready.
    pub fn mark_ready(&mut self, id: ActionId) -> Result<bool> {
        let action = self.action_mut(id)?;
        match action.state {
            ActionState::Ready => Ok(true),
            ActionState::Registered | ActionState::Blocked if action.predecessors.is_empty() => {
                action.state = ActionState::Ready;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn mark_running(&mut self, id: ActionId) -> Result<()> {
        let action = self.action_mut(id)?;
        if action.state != ActionState::Ready {
            return Err(TaskgridError::DependencyViolation(format!(
                "{id} cannot start from state {}",
                action.state
            )));
        }
        action.state = ActionState::Running;
        Ok(())
    }

    /// Put a running action back to `Ready` for another attempt.
    pub fn requeue(&mut self, id: ActionId) -> Result<()> {
        let action = self.action_mut(id)?;
        if action.state == ActionState::Running {
            action.state = ActionState::Ready;
            action.assignment = None;
            action.job = None;
        }
        Ok(())
    }

    /// Finish `id` successfully. Returns the successors it released.
    pub fn complete(&mut self, id: ActionId) -> Result<Vec<ActionId>> {
        let succs = {
            let action = self.action_mut(id)?;
            if action.is_terminal() {
                return Ok(Vec::new());
            }
            action.state = ActionState::Completed;
            action.job = None;
            std::mem::take(&mut action.successors)
        };

        let mut freed = Vec::new();
        for s in succs {
            if let Some(sa) = self.actions.get_mut(&s) {
                sa.predecessors.remove(&id);
                if sa.predecessors.is_empty() && sa.state == ActionState::Blocked {
                    sa.state = ActionState::Ready;
                    freed.push(s);
                }
            }
        }
        Ok(freed)
    }

    /// Terminal failure. Dependents keep their edge and stay blocked.
    pub fn fail(&mut self, id: ActionId) -> Result<()> {
        let action = self.action_mut(id)?;
        if !action.is_terminal() {
            action.state = ActionState::Failed;
            action.job = None;
        }
        Ok(())
    }

    /// Cancel an action that is not running. Its successors are re-linked as
    /// in [`ActionGraph::unschedule`] and those freed are returned.
    pub fn cancel(&mut self, id: ActionId) -> Result<Vec<ActionId>> {
        let state = self.action(id)?.state;
        if state.is_terminal() {
            return Ok(Vec::new());
        }
        if state == ActionState::Running {
            return Err(TaskgridError::DependencyViolation(format!(
                "{id} is running; cancellation must go through the worker"
            )));
        }
        let freed = self.unschedule(id)?;
        self.action_mut(id)?.state = ActionState::Cancelled;
        Ok(freed)
    }

    /// Drop a terminal action that no longer has edges.
    pub fn remove_terminal(&mut self, id: ActionId) -> bool {
        let removable = self.actions.get(&id).is_some_and(|a| {
            a.is_terminal() && a.successors.is_empty() && a.predecessors.is_empty()
        });
        if removable {
            self.actions.remove(&id);
        }
        removable
    }

    /// Actions transitively waiting on `id`.
    pub fn dependents_closure(&self, id: ActionId) -> BTreeSet<ActionId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(a) = self.actions.get(&cur) {
                for s in &a.successors {
                    if seen.insert(*s) {
                        stack.push(*s);
                    }
                }
            }
        }
        seen
    }

    /// Verify that every edge is recorded on both ends.
    pub fn check_symmetry(&self) -> Result<()> {
        for a in self.actions.values() {
            for s in &a.successors {
                let ok = self
                    .actions
                    .get(s)
                    .is_some_and(|sa| sa.predecessors.contains(&a.id));
                if !ok {
                    return Err(TaskgridError::DependencyViolation(format!(
                        "{} lists {s} as successor but not vice versa",
                        a.id
                    )));
                }
            }
            for p in &a.predecessors {
                let ok = self
                    .actions
                    .get(p)
                    .is_some_and(|pa| pa.successors.contains(&a.id));
                if !ok {
                    return Err(TaskgridError::DependencyViolation(format!(
                        "{} lists {p} as predecessor but not vice versa",
                        a.id
                    )));
                }
            }
        }
        Ok(())
    }
}
