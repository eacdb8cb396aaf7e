// src/scheduler/policy.rs

//! Pluggable scheduling policies.
//!
//! A policy decides how actions rank against each other and which
//! executable actions are offered to the assignment step when something
//! frees up. Placement itself is policy independent (see
//! [`assignment`](super::assignment)).

use std::collections::BTreeMap;
use std::fmt;

use tracing::trace;

use crate::dag::Action;
use crate::resources::worker::Worker;
use crate::scheduler::profile::Profile;
use crate::scheduler::ready_list::ReadyList;
use crate::scheduler::resource_scheduler::ResourceScheduler;
use crate::scheduler::score::Score;
use crate::types::{ActionId, AppId, PolicyKind, WorkerId};

/// An action offered to the policy together with its action score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub action: ActionId,
    pub score: Score,
}

pub trait SchedulingPolicy: Send + fmt::Debug {
    fn kind(&self) -> PolicyKind;

    /// Build the per-worker scheduler. Called once per worker join.
    ///
    /// `impl_profiles` are the configured defaults; `resource_profiles` are
    /// observations this worker accumulated before (e.g. an earlier
    /// incarnation with the same name) and are folded on top.
    fn generate_scheduler_for_resource(
        &self,
        worker: Worker,
        app_id: Option<AppId>,
        resource_profiles: &BTreeMap<String, Profile>,
        impl_profiles: &BTreeMap<String, Profile>,
    ) -> ResourceScheduler {
        let mut profiles = impl_profiles.clone();
        for (signature, observed) in resource_profiles {
            profiles.entry(signature.clone()).or_default().accumulate(observed);
        }
        ResourceScheduler::new(worker, app_id, profiles)
    }

    fn generate_action_score(&self, action: &Action) -> Score;

    /// Decide which newly unblocked actions are offered for assignment now.
    ///
    /// `data_free` became executable because their predecessors finished,
    /// `resource_free` were released by a worker (lost, shrunk or failed),
    /// `blocked_candidates` are actions the caller would like retried. The
    /// returned list is in the order assignment should try them; anything
    /// the policy defers stays in its unassigned list.
    fn purge_free_actions(
        &mut self,
        data_free: Vec<Candidate>,
        resource_free: Vec<Candidate>,
        blocked_candidates: Vec<Candidate>,
        resource: Option<WorkerId>,
    ) -> Vec<Candidate>;

    fn add_unassigned(&mut self, candidate: Candidate);

    fn remove_unassigned(&mut self, action: ActionId) -> bool;

    fn unassigned_len(&self) -> usize;

    /// Unassigned actions in score order.
    fn unassigned(&self) -> Vec<Candidate>;
}

/// Behaviour shared by the ready-list policies: everything unassigned is
/// offered every time something frees up.
#[derive(Debug, Default)]
struct ReadyListBase {
    unassigned: ReadyList,
}

impl ReadyListBase {
    fn purge(
        &mut self,
        data_free: Vec<Candidate>,
        resource_free: Vec<Candidate>,
        blocked_candidates: Vec<Candidate>,
        resource: Option<WorkerId>,
    ) -> Vec<Candidate> {
        for c in data_free
            .into_iter()
            .chain(resource_free)
            .chain(blocked_candidates)
        {
            self.unassigned.insert(c.action, c.score);
        }
        let offered: Vec<Candidate> = self
            .unassigned
            .drain()
            .into_iter()
            .map(|(action, score)| Candidate { action, score })
            .collect();
        trace!(?resource, offered = offered.len(), "ready list purged");
        offered
    }

    fn add(&mut self, candidate: Candidate) {
        self.unassigned.insert(candidate.action, candidate.score);
    }

    fn listed(&self) -> Vec<Candidate> {
        self.unassigned
            .iter()
            .map(|(action, score)| Candidate { action, score })
            .collect()
    }
}

/// Among equal priorities the earliest submitted action wins.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    base: ReadyListBase,
}

/// Among equal priorities the latest submitted action wins.
#[derive(Debug, Default)]
pub struct LifoPolicy {
    base: ReadyListBase,
}

fn submission_order(action: &Action) -> i64 {
    i64::try_from(action.id.get()).unwrap_or(i64::MAX)
}

impl SchedulingPolicy for FifoPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Fifo
    }

    fn generate_action_score(&self, action: &Action) -> Score {
        Score::new(action.priority, -submission_order(action), 0, 0)
    }

    fn purge_free_actions(
        &mut self,
        data_free: Vec<Candidate>,
        resource_free: Vec<Candidate>,
        blocked_candidates: Vec<Candidate>,
        resource: Option<WorkerId>,
    ) -> Vec<Candidate> {
        self.base
            .purge(data_free, resource_free, blocked_candidates, resource)
    }

    fn add_unassigned(&mut self, candidate: Candidate) {
        self.base.add(candidate);
    }

    fn remove_unassigned(&mut self, action: ActionId) -> bool {
        self.base.unassigned.remove(action)
    }

    fn unassigned_len(&self) -> usize {
        self.base.unassigned.len()
    }

    fn unassigned(&self) -> Vec<Candidate> {
        self.base.listed()
    }
}

impl SchedulingPolicy for LifoPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Lifo
    }

    fn generate_action_score(&self, action: &Action) -> Score {
        Score::new(action.priority, submission_order(action), 0, 0)
    }

    fn purge_free_actions(
        &mut self,
        data_free: Vec<Candidate>,
        resource_free: Vec<Candidate>,
        blocked_candidates: Vec<Candidate>,
        resource: Option<WorkerId>,
    ) -> Vec<Candidate> {
        self.base
            .purge(data_free, resource_free, blocked_candidates, resource)
    }

    fn add_unassigned(&mut self, candidate: Candidate) {
        self.base.add(candidate);
    }

    fn remove_unassigned(&mut self, action: ActionId) -> bool {
        self.base.unassigned.remove(action)
    }

    fn unassigned_len(&self) -> usize {
        self.base.unassigned.len()
    }

    fn unassigned(&self) -> Vec<Candidate> {
        self.base.listed()
    }
}

pub fn build_policy(kind: PolicyKind) -> Box<dyn SchedulingPolicy> {
    match kind {
        PolicyKind::Fifo => Box::new(FifoPolicy::default()),
        PolicyKind::Lifo => Box::new(LifoPolicy::default()),
    }
}
