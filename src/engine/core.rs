// src/engine/core.rs

//! Pure dispatcher state machine.
//!
//! [`CoreRuntime`] consumes [`Request`]s one at a time and returns a
//! [`CoreStep`]: the commands the async shell must carry out (dispatch a
//! job, complete an update, answer a waiter, ...) and whether to keep
//! running. It owns the graph, the pool, every per-worker scheduler and the
//! policy, and performs no IO, so it can be driven directly in tests.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dag::{ActionGraph, ActionState};
use crate::engine::event_handlers::{CoreCommand, CoreStep};
use crate::engine::workload::WorkloadStatus;
use crate::engine::{Request, RuntimeOptions};
use crate::errors::TaskgridError;
use crate::resources::pool::WorkerPool;
use crate::resources::update::{ResourceUpdate, UpdateCompleter, UpdateOutcome};
use crate::resources::worker::{Worker, WorkerKind};
use crate::scheduler::policy::SchedulingPolicy;
use crate::scheduler::profile::Profile;
use crate::scheduler::resource_scheduler::ResourceScheduler;
use crate::task::{DataAnalyser, TaskDescription};
use crate::types::{ActionId, JobId, TaskId, UpdateId, WorkerId};

/// Dispatcher lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Stopped,
}

/// A dispatched job the dispatcher is waiting to hear back from.
#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub action: ActionId,
    pub worker: WorkerId,
    pub signature: String,
    pub dispatched_at: Instant,
}

/// An elasticity request that has not been completed yet.
#[derive(Debug)]
pub(crate) struct PendingUpdate {
    pub update: ResourceUpdate,
    pub completer: UpdateCompleter,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

pub struct CoreRuntime {
    pub(crate) state: DispatcherState,
    pub(crate) options: RuntimeOptions,
    pub(crate) graph: ActionGraph,
    pub(crate) analyser: DataAnalyser,
    pub(crate) pool: WorkerPool,
    pub(crate) schedulers: BTreeMap<WorkerId, ResourceScheduler>,
    pub(crate) policy: Box<dyn SchedulingPolicy>,
    /// Configured default profiles, keyed by implementation signature.
    pub(crate) impl_profiles: BTreeMap<String, Profile>,
    /// Profiles of departed workers, keyed by worker name.
    pub(crate) saved_profiles: BTreeMap<String, BTreeMap<String, Profile>>,
    pub(crate) tasks: BTreeMap<TaskId, TaskDescription>,
    pub(crate) task_actions: BTreeMap<TaskId, ActionId>,
    pub(crate) jobs: BTreeMap<JobId, JobRecord>,
    pub(crate) next_job: u64,
    pub(crate) pending_updates: BTreeMap<UpdateId, PendingUpdate>,
    /// Creations whose requester gave up; the worker is released on arrival.
    pub(crate) abandoned_creations: BTreeSet<UpdateId>,
    pub(crate) counters: Counters,
}

impl std::fmt::Debug for CoreRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreRuntime")
            .field("state", &self.state)
            .field("policy", &self.policy.kind())
            .field("actions", &self.graph.len())
            .field("workers", &self.pool.len())
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

impl CoreRuntime {
    pub fn new(policy: Box<dyn SchedulingPolicy>, options: RuntimeOptions) -> Self {
        Self {
            state: DispatcherState::Running,
            options,
            graph: ActionGraph::new(),
            analyser: DataAnalyser::new(),
            pool: WorkerPool::new(),
            schedulers: BTreeMap::new(),
            policy,
            impl_profiles: BTreeMap::new(),
            saved_profiles: BTreeMap::new(),
            tasks: BTreeMap::new(),
            task_actions: BTreeMap::new(),
            jobs: BTreeMap::new(),
            next_job: 0,
            pending_updates: BTreeMap::new(),
            abandoned_creations: BTreeSet::new(),
            counters: Counters::default(),
        }
    }

    /// Default execution profiles, keyed by `"<task>.<implementation>"`.
    pub fn with_profiles(mut self, profiles: BTreeMap<String, Profile>) -> Self {
        self.impl_profiles = profiles;
        self
    }

    /// Register a worker known before the dispatcher starts.
    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.add_worker(worker);
        self
    }

    /// Handle one request.
    pub fn step(&mut self, request: Request) -> CoreStep {
        if self.state == DispatcherState::Stopped {
            return self.reject_after_stop(request);
        }

        debug!(request = request.kind(), "dispatcher handling request");

        let mut commands = Vec::new();
        let mut keep_running = true;

        match request {
            Request::NewTask { task } => self.handle_new_task(task, &mut commands),
            Request::JobCompleted { result } => self.handle_job_completed(result, &mut commands),
            Request::JobFailed { job_id, cause } => {
                self.handle_job_failed(job_id, cause, &mut commands)
            }
            Request::CancelTask { task } => self.handle_cancel_task(task, &mut commands),
            Request::WorkerJoined { worker } => self.handle_worker_joined(worker, &mut commands),
            Request::WorkerLost { worker } => self.handle_worker_lost(worker, &mut commands),
            Request::ResourceUpdate { update, completer } => {
                self.handle_resource_update(update, completer, &mut commands)
            }
            Request::WorkerCreated {
                update,
                provider,
                name,
                description,
            } => self.handle_worker_created(update, provider, name, description, &mut commands),
            Request::WorkerCreationFailed { update, reason } => {
                self.handle_worker_creation_failed(update, reason, &mut commands)
            }
            Request::AbandonResourceUpdate { update } => self.handle_abandon_update(update),
            Request::WorkloadQuery { reply } => commands.push(CoreCommand::Reply {
                reply,
                status: self.workload(),
            }),
            Request::Shutdown { reply } => {
                self.handle_shutdown(reply, &mut commands);
                keep_running = false;
            }
        }

        CoreStep {
            commands,
            keep_running,
        }
    }

    fn reject_after_stop(&mut self, request: Request) -> CoreStep {
        let mut commands = Vec::new();
        warn!(request = request.kind(), "dispatcher stopped; rejecting request");
        match request {
            Request::ResourceUpdate { completer, .. } => commands.push(CoreCommand::CompleteUpdate {
                completer,
                outcome: UpdateOutcome::Rejected(TaskgridError::ShutdownInProgress.to_string()),
            }),
            Request::WorkerCreated {
                provider, name, description, ..
            } => {
                let worker = Worker::new(
                    self.pool.allocate_id(),
                    name,
                    description,
                    WorkerKind::Cloud { provider },
                );
                commands.push(CoreCommand::TerminateWorker { worker });
            }
            Request::WorkloadQuery { reply } | Request::Shutdown { reply } => {
                commands.push(CoreCommand::Reply {
                    reply,
                    status: self.workload(),
                })
            }
            _ => {}
        }
        CoreStep {
            commands,
            keep_running: false,
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn graph(&self) -> &ActionGraph {
        &self.graph
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn scheduler(&self, worker: WorkerId) -> Option<&ResourceScheduler> {
        self.schedulers.get(&worker)
    }

    pub fn action_of(&self, task: TaskId) -> Option<ActionId> {
        self.task_actions.get(&task).copied()
    }

    pub fn unassigned_len(&self) -> usize {
        self.policy.unassigned_len()
    }

    /// Whether nothing is left to run.
    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
            && self.graph.count_in_state(ActionState::Ready) == 0
            && self.graph.count_in_state(ActionState::Running) == 0
    }

    pub fn workload(&self) -> WorkloadStatus {
        WorkloadStatus {
            blocked: self.graph.count_in_state(ActionState::Blocked),
            ready: self.graph.count_in_state(ActionState::Ready),
            unassigned: self.policy.unassigned_len(),
            running: self.graph.count_in_state(ActionState::Running),
            completed: self.counters.completed,
            failed: self.counters.failed,
            cancelled: self.counters.cancelled,
            workers: self.pool.len(),
            pending_updates: self.pending_updates.len(),
        }
    }

    // ---------------------------------------------------------------------
    // Pool membership
    // ---------------------------------------------------------------------

    pub(crate) fn add_worker(&mut self, worker: Worker) {
        if self.schedulers.contains_key(&worker.id) {
            warn!(worker = %worker.name, id = %worker.id, "worker already registered; ignoring");
            return;
        }
        let empty = BTreeMap::new();
        let previous = self.saved_profiles.get(&worker.name).unwrap_or(&empty);
        let rs = self.policy.generate_scheduler_for_resource(
            worker.clone(),
            worker.app_id,
            previous,
            &self.impl_profiles,
        );
        self.schedulers.insert(worker.id, rs);
        self.pool.add(worker);
    }

    /// Take a worker out of the pool, returning its scheduler.
    pub(crate) fn remove_worker(&mut self, id: WorkerId) -> Option<ResourceScheduler> {
        let rs = self.schedulers.remove(&id)?;
        if let Err(e) = self.pool.remove(id) {
            warn!(error = %e, "scheduler had no pool entry");
        }
        self.saved_profiles
            .insert(rs.worker().name.clone(), rs.profiles().clone());
        info!(worker = %rs.worker().name, "worker decommissioned");
        Some(rs)
    }

    /// Copy the scheduler's view of capacity back into the pool record.
    pub(crate) fn sync_pool(&mut self, id: WorkerId) {
        if let (Some(rs), Some(w)) = (self.schedulers.get(&id), self.pool.get_mut(id)) {
            w.description = *rs.total();
        }
    }

    pub(crate) fn allocate_job(&mut self) -> JobId {
        self.next_job += 1;
        JobId(self.next_job)
    }
}
