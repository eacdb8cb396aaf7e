// src/scheduler/resource_scheduler.rs

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use tracing::{debug, trace};

use crate::dag::ActionGraph;
use crate::errors::Result;
use crate::resources::description::{Constraints, ResourceDescription};
use crate::resources::worker::Worker;
use crate::scheduler::profile::Profile;
use crate::scheduler::score::{CANNOT_RUN_NOW, Score};
use crate::types::{ActionId, AppId, ImplId, UpdateId};

/// An action placed on this worker with the implementation it will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub action: ActionId,
    pub implementation: ImplId,
    pub constraints: Constraints,
    pub score: Score,
}

/// Where [`ResourceScheduler::schedule_action`] put an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queued {
    /// Capacity reserved; ready to be launched.
    Ready,
    /// Waiting for capacity.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingReduction {
    update: UpdateId,
    modification: ResourceDescription,
}

/// Per-worker bookkeeping: capacity counters and the actions hosted here.
///
/// Capacity for an action is reserved when it enters `ready` and returned
/// when it leaves `ready`/`running` for any reason. Reductions of the
/// worker's capacity are queued and only taken out of free capacity; until
/// they apply, the capacity they claim is withheld from new actions.
#[derive(Debug)]
pub struct ResourceScheduler {
    worker: Worker,
    app_id: Option<AppId>,
    available: ResourceDescription,
    blocked: BTreeMap<(Reverse<Score>, ActionId), Placement>,
    blocked_index: BTreeMap<ActionId, Score>,
    ready: BTreeMap<ActionId, Placement>,
    running: BTreeMap<ActionId, Placement>,
    pending_reductions: VecDeque<PendingReduction>,
    profiles: BTreeMap<String, Profile>,
}

impl ResourceScheduler {
    pub fn new(worker: Worker, app_id: Option<AppId>, profiles: BTreeMap<String, Profile>) -> Self {
        let available = worker.description;
        Self {
            worker,
            app_id,
            available,
            blocked: BTreeMap::new(),
            blocked_index: BTreeMap::new(),
            ready: BTreeMap::new(),
            running: BTreeMap::new(),
            pending_reductions: VecDeque::new(),
            profiles,
        }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn accepts_app(&self, app_id: AppId) -> bool {
        self.app_id.is_none_or(|owner| owner == app_id) && self.worker.accepts_app(app_id)
    }

    pub fn total(&self) -> &ResourceDescription {
        &self.worker.description
    }

    pub fn available(&self) -> &ResourceDescription {
        &self.available
    }

    /// Could this worker ever run an implementation with these constraints?
    pub fn can_run(&self, constraints: &Constraints) -> bool {
        self.worker.can_run(constraints)
    }

    /// Is there free capacity for it right now?
    pub fn can_run_now(&self, constraints: &Constraints) -> bool {
        self.can_run(constraints) && self.launchable().contains(&constraints.slots)
    }

    /// Free capacity minus what queued reductions have claimed.
    pub fn launchable(&self) -> ResourceDescription {
        let mut remaining = self.worker.description;
        let mut claimed = ResourceDescription::default();
        for reduction in &self.pending_reductions {
            let effective = clip(&reduction.modification, &remaining);
            remaining.reduce(&effective);
            claimed.increase(&effective);
        }
        let mut launchable = self.available;
        launchable.reduce(&claimed);
        launchable
    }

    // ---------------------------------------------------------------------
    // Scores
    // ---------------------------------------------------------------------

    /// Score for an action that would have to wait in this worker's queue.
    pub fn generate_blocked_score(&self, action_score: Score) -> Score {
        action_score.with_resource(-(self.blocked.len() as i64))
    }

    /// Resource component for placing an action here.
    ///
    /// Workers that cannot start any of the candidate implementations now are
    /// pushed below every worker that can.
    pub fn generate_resource_score<'a>(
        &self,
        action_score: Score,
        candidates: impl IntoIterator<Item = &'a Constraints>,
    ) -> Score {
        let blocked = self.generate_blocked_score(action_score);
        let runnable_now = candidates.into_iter().any(|c| self.can_run_now(c));
        if runnable_now {
            blocked
        } else {
            blocked.with_resource(blocked.resource + CANNOT_RUN_NOW)
        }
    }

    /// Implementation component: faster implementations rank higher, and
    /// implementations that would have to wait rank below those that would
    /// not.
    pub fn generate_implementation_score(
        &self,
        resource_score: Score,
        signature: &str,
        constraints: &Constraints,
    ) -> Score {
        let average_ms = self
            .profiles
            .get(signature)
            .map(|p| p.average().as_millis())
            .unwrap_or(0);
        let mut implementation = -(i64::try_from(average_ms).unwrap_or(i64::MAX));
        if !self.can_run_now(constraints) {
            implementation = implementation.saturating_add(CANNOT_RUN_NOW);
        }
        resource_score.with_implementation(implementation)
    }

    pub fn profiled_execution(&mut self, signature: &str, elapsed: Duration) {
        self.profiles
            .entry(signature.to_string())
            .or_default()
            .record(elapsed);
    }

    pub fn profile(&self, signature: &str) -> Option<&Profile> {
        self.profiles.get(signature)
    }

    pub fn profiles(&self) -> &BTreeMap<String, Profile> {
        &self.profiles
    }

    // ---------------------------------------------------------------------
    // Queue transitions
    // ---------------------------------------------------------------------

    /// Host an action here. It goes to `ready` if capacity is left once the
    /// better-scored waiting actions have been served.
    pub fn schedule_action(&mut self, placement: Placement) -> Queued {
        let id = placement.action;
        self.insert_blocked(placement);
        let promoted = self.try_to_launch_blocked();
        if promoted.contains(&id) {
            Queued::Ready
        } else {
            trace!(worker = %self.worker.name, action = %id, "action waits for capacity");
            Queued::Blocked
        }
    }

    fn insert_blocked(&mut self, placement: Placement) {
        self.blocked_index.insert(placement.action, placement.score);
        self.blocked
            .insert((Reverse(placement.score), placement.action), placement);
    }

    fn remove_blocked(&mut self, action: ActionId) -> Option<Placement> {
        let score = self.blocked_index.remove(&action)?;
        self.blocked.remove(&(Reverse(score), action))
    }

    /// Promote blocked actions to `ready`, in score order, while capacity
    /// allows. The first action that does not fit stops the walk: nothing
    /// behind it overtakes it.
    pub fn try_to_launch_blocked(&mut self) -> Vec<ActionId> {
        let mut promoted = Vec::new();
        let mut launchable = self.launchable();

        while let Some(entry) = self.blocked.first_entry() {
            let slots = entry.get().constraints.slots;
            if !launchable.contains(&slots) {
                break;
            }
            let p = entry.remove();
            self.blocked_index.remove(&p.action);
            self.available.reduce(&slots);
            launchable.reduce(&slots);
            promoted.push(p.action);
            self.ready.insert(p.action, p);
        }

        if !promoted.is_empty() {
            debug!(worker = %self.worker.name, ?promoted, free = %self.available, "blocked actions promoted");
        }
        promoted
    }

    /// `ready` -> `running`.
    pub fn launch(&mut self, action: ActionId) -> Option<&Placement> {
        let p = self.ready.remove(&action)?;
        self.running.insert(action, p);
        self.running.get(&action)
    }

    /// Whether the action sits in any of this worker's queues.
    pub fn is_hosting(&self, action: ActionId) -> bool {
        self.blocked_index.contains_key(&action)
            || self.ready.contains_key(&action)
            || self.running.contains_key(&action)
    }

    /// Number of actions hosted in any queue.
    pub fn hosted_actions(&self) -> usize {
        self.blocked.len() + self.ready.len() + self.running.len()
    }

    /// An action left `running` (completion or failure): give its slots back.
    pub fn release(&mut self, action: ActionId) -> Option<Placement> {
        let p = self
            .running
            .remove(&action)
            .or_else(|| self.ready.remove(&action))?;
        self.available.increase(&p.constraints.slots);
        Some(p)
    }

    /// Withdraw an action that has not started running.
    pub fn cancel_action(&mut self, action: ActionId) -> Option<Placement> {
        if let Some(p) = self.remove_blocked(action) {
            return Some(p);
        }
        let p = self.ready.remove(&action)?;
        self.available.increase(&p.constraints.slots);
        Some(p)
    }

    /// Remove the action from this worker's queues and detach it from the
    /// dependency graph. Returns the actions this frees.
    pub fn unschedule_action(&mut self, graph: &mut ActionGraph, action: ActionId) -> Result<Vec<ActionId>> {
        if self.cancel_action(action).is_none() {
            self.release(action);
        }
        graph.unschedule(action)
    }

    /// Blocked actions this worker can no longer run after shrinking.
    pub fn evict_unfit(&mut self) -> Vec<Placement> {
        let unfit: Vec<ActionId> = self
            .blocked
            .values()
            .filter(|p| !self.worker.can_run(&p.constraints))
            .map(|p| p.action)
            .collect();
        unfit
            .into_iter()
            .filter_map(|a| self.remove_blocked(a))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Capacity changes
    // ---------------------------------------------------------------------

    pub fn increase(&mut self, delta: &ResourceDescription) {
        self.worker.description.increase(delta);
        self.available.increase(delta);
    }

    /// Queue a reduction. It is applied by
    /// [`ResourceScheduler::apply_pending_reductions`] once enough capacity
    /// is free.
    pub fn pending_modification(&mut self, update: UpdateId, modification: ResourceDescription) {
        self.pending_reductions.push_back(PendingReduction {
            update,
            modification,
        });
    }

    /// Drop a queued reduction (its requester gave up).
    pub fn drop_pending_reduction(&mut self, update: UpdateId) -> bool {
        let before = self.pending_reductions.len();
        self.pending_reductions.retain(|r| r.update != update);
        before != self.pending_reductions.len()
    }

    /// Apply queued reductions in arrival order while free capacity covers
    /// them. Returns the updates that were applied.
    pub fn apply_pending_reductions(&mut self) -> Vec<UpdateId> {
        let mut applied = Vec::new();
        while let Some(front) = self.pending_reductions.front() {
            let effective = clip(&front.modification, &self.worker.description);
            if !self.available.contains(&effective) {
                break;
            }
            self.available.reduce(&effective);
            self.worker.description.reduce(&effective);
            if let Some(done) = self.pending_reductions.pop_front() {
                applied.push(done.update);
            }
        }
        if !applied.is_empty() {
            debug!(worker = %self.worker.name, capacity = %self.worker.description, ?applied, "reductions applied");
        }
        applied
    }

    /// Elastic worker with nothing left to offer and nothing hosted.
    pub fn can_be_stopped(&self) -> bool {
        self.worker.should_be_stopped() && self.hosted_actions() == 0
    }

    /// Empty every queue, returning the actions that were hosted here.
    pub fn drain(&mut self) -> Vec<ActionId> {
        let mut hosted: Vec<ActionId> = self
            .blocked
            .values()
            .map(|p| p.action)
            .chain(self.ready.keys().copied())
            .chain(self.running.keys().copied())
            .collect();
        hosted.sort();
        self.blocked.clear();
        self.blocked_index.clear();
        self.ready.clear();
        self.running.clear();
        self.available = self.worker.description;
        hosted
    }
}

/// `wanted` limited to what `total` has.
fn clip(wanted: &ResourceDescription, total: &ResourceDescription) -> ResourceDescription {
    ResourceDescription::new(
        wanted.compute_units.min(total.compute_units),
        wanted.gpus.min(total.gpus),
        wanted.fpgas.min(total.fpgas),
        wanted.others.min(total.others),
    )
}
