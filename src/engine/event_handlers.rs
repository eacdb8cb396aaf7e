// src/engine/event_handlers.rs

//! Request handlers of the core runtime.

use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::dag::ActionState;
use crate::engine::core::{CoreRuntime, DispatcherState, JobRecord, PendingUpdate};
use crate::engine::workload::WorkloadStatus;
use crate::engine::{TaskEnd, TaskOutcome};
use crate::errors::{Result, TaskgridError};
use crate::exec::{Job, JobResult};
use crate::resources::description::ResourceDescription;
use crate::resources::update::{
    ResourceUpdate, UpdateCompleter, UpdateKind, UpdateOutcome, UpdateTarget,
};
use crate::resources::worker::{Worker, WorkerKind};
use crate::scheduler::assignment::{assign, has_capable_worker};
use crate::scheduler::policy::Candidate;
use crate::scheduler::resource_scheduler::{Placement, Queued};
use crate::task::TaskDescription;
use crate::types::{ActionId, JobId, TaskId, UpdateId, WorkerId};

/// Command produced by the pure core, carried out by the async shell.
#[derive(Debug)]
pub enum CoreCommand {
    /// Hand a job to the transport.
    Dispatch(Job),
    /// Ask the transport to abort a running job.
    CancelJob(JobId),
    StopWorkers(Vec<Worker>),
    /// Ask `provider` for a new worker on behalf of `update`.
    CreateWorker {
        provider: String,
        update: UpdateId,
        description: ResourceDescription,
    },
    /// Release a cloud worker through its provider.
    TerminateWorker { worker: Worker },
    CompleteUpdate {
        completer: UpdateCompleter,
        outcome: UpdateOutcome,
    },
    NotifyTask(TaskEnd),
    Reply {
        reply: oneshot::Sender<WorkloadStatus>,
        status: WorkloadStatus,
    },
}

/// Decision returned by the core after handling a single [`Request`](super::Request).
#[derive(Debug)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer loop should keep reading requests.
    pub keep_running: bool,
}

impl CoreRuntime {
    // ---------------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------------

    pub(crate) fn handle_new_task(&mut self, task: TaskDescription, commands: &mut Vec<CoreCommand>) {
        if let Err(e) = task.validate() {
            error!(task = %task.id, error = %e, "rejecting task");
            self.counters.failed += 1;
            commands.push(CoreCommand::NotifyTask(TaskEnd {
                task: task.id,
                action: None,
                outcome: TaskOutcome::Failed(e.to_string()),
            }));
            return;
        }
        if self.task_actions.contains_key(&task.id) {
            warn!(task = %task.id, "task already submitted; ignoring duplicate");
            return;
        }

        let action = self
            .graph
            .register(task.id, task.app_id, task.action_priority());

        let mut deps = self.analyser.analyse(action, &task.parameters);
        for after in &task.after {
            match self.task_actions.get(after) {
                Some(a) => {
                    deps.insert(*a);
                }
                None => debug!(task = %task.id, %after, "explicit predecessor already finished"),
            }
        }

        for dep in deps {
            if let Err(e) = self.graph.add_predecessor(dep, action) {
                warn!(%action, %dep, error = %e, "could not link dependency");
            }
        }

        info!(
            task = %task.id,
            name = %task.name,
            %action,
            predecessors = self.graph.get(action).map(|a| a.predecessors().len()).unwrap_or(0),
            "task submitted"
        );

        self.task_actions.insert(task.id, action);
        self.tasks.insert(task.id, task);

        match self.graph.mark_ready(action) {
            Ok(true) => self.schedule_free(vec![action], Vec::new(), None, commands),
            Ok(false) => debug!(%action, "action blocked on predecessors"),
            Err(e) => error!(%action, error = %e, "failed to evaluate new action"),
        }
    }

    pub(crate) fn handle_cancel_task(&mut self, task: TaskId, commands: &mut Vec<CoreCommand>) {
        let Some(action) = self.task_actions.get(&task).copied() else {
            warn!(%task, "cancel requested for unknown or finished task");
            return;
        };
        let Some(a) = self.graph.get_mut(action) else {
            return;
        };

        match a.state {
            ActionState::Running => {
                a.cancel_requested = true;
                if let Some(job) = a.job {
                    info!(%task, %action, %job, "cancelling running job");
                    commands.push(CoreCommand::CancelJob(job));
                }
            }
            s if s.is_terminal() => debug!(%task, state = %s, "task already finished"),
            _ => {
                let host = a.assignment.map(|(w, _)| w);
                self.policy.remove_unassigned(action);
                if let Some(rs) = host.and_then(|w| self.schedulers.get_mut(&w)) {
                    rs.cancel_action(action);
                }
                let freed = match self.graph.cancel(action) {
                    Ok(freed) => freed,
                    Err(e) => {
                        error!(%action, error = %e, "cancel failed");
                        return;
                    }
                };
                self.finish_cancelled(task, action, commands);

                let mut migrated = Vec::new();
                if let Some(w) = host {
                    migrated = self.after_capacity_change(w, commands);
                }
                self.schedule_free(freed, migrated, host, commands);
            }
        }
    }

    fn finish_cancelled(&mut self, task: TaskId, action: ActionId, commands: &mut Vec<CoreCommand>) {
        info!(%task, %action, "task cancelled");
        self.counters.cancelled += 1;
        self.analyser.data_available(action);
        self.task_actions.remove(&task);
        self.tasks.remove(&task);
        self.graph.remove_terminal(action);
        commands.push(CoreCommand::NotifyTask(TaskEnd {
            task,
            action: Some(action),
            outcome: TaskOutcome::Cancelled,
        }));
    }

    // ---------------------------------------------------------------------
    // Job notifications
    // ---------------------------------------------------------------------

    pub(crate) fn handle_job_completed(&mut self, result: JobResult, commands: &mut Vec<CoreCommand>) {
        let Some(record) = self.jobs.remove(&result.job_id) else {
            debug!(job = %result.job_id, "completion for unknown or already handled job; ignoring");
            return;
        };
        let JobRecord {
            action,
            worker,
            signature,
            dispatched_at,
        } = record;

        if let Some(rs) = self.schedulers.get_mut(&worker) {
            rs.release(action);
            rs.profiled_execution(&signature, dispatched_at.elapsed());
        }

        let freed = match self.graph.complete(action) {
            Ok(freed) => freed,
            Err(e) => {
                error!(%action, error = %e, "completion for unknown action");
                Vec::new()
            }
        };
        let task = self.graph.get(action).map(|a| a.task);
        self.analyser.data_available(action);
        self.graph.remove_terminal(action);
        self.counters.completed += 1;

        if let Some(task) = task {
            info!(%task, %action, job = %result.job_id, outputs = result.outputs().count(), "task completed");
            self.task_actions.remove(&task);
            self.tasks.remove(&task);
            commands.push(CoreCommand::NotifyTask(TaskEnd {
                task,
                action: Some(action),
                outcome: TaskOutcome::Completed,
            }));
        }

        let migrated = self.after_capacity_change(worker, commands);
        self.schedule_free(freed, migrated, Some(worker), commands);
    }

    pub(crate) fn handle_job_failed(&mut self, job_id: JobId, cause: String, commands: &mut Vec<CoreCommand>) {
        let Some(record) = self.jobs.remove(&job_id) else {
            debug!(job = %job_id, "failure for unknown or already handled job; ignoring");
            return;
        };
        if let Some(rs) = self.schedulers.get_mut(&record.worker) {
            rs.release(record.action);
        }

        let retry = self.settle_failed_attempt(record.action, &cause, commands);
        let mut migrated = self.after_capacity_change(record.worker, commands);
        migrated.extend(retry);
        self.schedule_free(Vec::new(), migrated, Some(record.worker), commands);
    }

    /// An attempt of `action` ended without success (failed job, lost
    /// worker). Decide between retrying, cancelling and failing the task.
    /// Returns the action when it should be placed again.
    fn settle_failed_attempt(
        &mut self,
        action: ActionId,
        cause: &str,
        commands: &mut Vec<CoreCommand>,
    ) -> Option<ActionId> {
        let a = self.graph.get(action)?;
        let task_id = a.task;
        let cancel_requested = a.cancel_requested;
        let attempts = a.attempts();
        let tried = a.executing_resources.clone();

        if let Err(e) = self.graph.requeue(action) {
            error!(%action, error = %e, "could not requeue action");
            return None;
        }

        if cancel_requested {
            match self.graph.cancel(action) {
                Ok(freed) => {
                    self.finish_cancelled(task_id, action, commands);
                    // Picked up by the caller's next purge.
                    let candidates = self.candidates(&freed);
                    for c in candidates {
                        self.policy.add_unassigned(c);
                    }
                }
                Err(e) => error!(%action, error = %e, "cancel failed"),
            }
            return None;
        }

        let capable_elsewhere = self
            .tasks
            .get(&task_id)
            .is_some_and(|t| has_capable_worker(t, &self.schedulers, &tried));

        if attempts < self.options.max_scheduling_attempts && capable_elsewhere {
            let retry = TaskgridError::JobDispatchFailure(cause.to_string());
            warn!(task = %task_id, %action, attempt = attempts, error = %retry, "retrying on another worker");
            return Some(action);
        }

        error!(task = %task_id, %action, attempts, %cause, "task failed");
        if let Err(e) = self.graph.fail(action) {
            error!(%action, error = %e, "could not mark action failed");
        }
        self.counters.failed += 1;
        commands.push(CoreCommand::NotifyTask(TaskEnd {
            task: task_id,
            action: Some(action),
            outcome: TaskOutcome::Failed(cause.to_string()),
        }));
        None
    }

    // ---------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------

    fn candidates(&self, actions: &[ActionId]) -> Vec<Candidate> {
        actions
            .iter()
            .filter_map(|id| self.graph.get(*id))
            .map(|a| Candidate {
                action: a.id,
                score: self.policy.generate_action_score(a),
            })
            .collect()
    }

    /// Offer newly executable actions (and whatever the policy still holds)
    /// to the assignment step.
    pub(crate) fn schedule_free(
        &mut self,
        data_free: Vec<ActionId>,
        resource_free: Vec<ActionId>,
        resource: Option<WorkerId>,
        commands: &mut Vec<CoreCommand>,
    ) {
        let data_free = self.candidates(&data_free);
        let resource_free = self.candidates(&resource_free);
        let offered = self
            .policy
            .purge_free_actions(data_free, resource_free, Vec::new(), resource);

        for candidate in offered {
            if !self.graph.is_executable(candidate.action)
                || self.graph.state(candidate.action) != Some(ActionState::Ready)
            {
                continue;
            }
            if let Err(e) = self.try_assign(candidate, commands) {
                match e {
                    TaskgridError::NoCapableWorker(_) => {
                        debug!(action = %candidate.action, error = %e, "action waits for a capable worker")
                    }
                    _ => warn!(action = %candidate.action, error = %e, "assignment failed"),
                }
                self.policy.add_unassigned(candidate);
            }
        }
    }

    fn try_assign(&mut self, candidate: Candidate, commands: &mut Vec<CoreCommand>) -> Result<()> {
        let action = candidate.action;
        let a = self
            .graph
            .get(action)
            .ok_or(TaskgridError::UnknownAction(action))?;
        let task = self
            .tasks
            .get(&a.task)
            .ok_or_else(|| TaskgridError::InvalidTask(a.task, "descriptor missing".to_string()))?;

        let chosen = assign(candidate.score, task, &self.schedulers, &a.executing_resources)?;
        let constraints = task
            .implementation(chosen.implementation)
            .map(|i| i.constraints)
            .ok_or_else(|| TaskgridError::InvalidTask(task.id, "implementation vanished".to_string()))?;

        let rs = self
            .schedulers
            .get_mut(&chosen.worker)
            .ok_or(TaskgridError::UnknownWorker(chosen.worker))?;
        let queued = rs.schedule_action(Placement {
            action,
            implementation: chosen.implementation,
            constraints,
            score: chosen.score,
        });

        if let Some(a) = self.graph.get_mut(action) {
            a.assignment = Some((chosen.worker, chosen.implementation));
        }
        debug!(%action, worker = %chosen.worker, implementation = %chosen.implementation, score = %chosen.score, ?queued, "action assigned");

        if queued == Queued::Ready {
            self.launch(chosen.worker, action, commands);
        }
        Ok(())
    }

    /// Move a reserved action to running and emit its job.
    fn launch(&mut self, worker: WorkerId, action: ActionId, commands: &mut Vec<CoreCommand>) {
        let implementation = match self
            .schedulers
            .get_mut(&worker)
            .and_then(|rs| rs.launch(action))
        {
            Some(p) => p.implementation,
            None => {
                error!(%action, %worker, "launch of an action that is not reserved");
                return;
            }
        };
        if let Err(e) = self.graph.mark_running(action) {
            error!(%action, error = %e, "cannot launch");
            if let Some(rs) = self.schedulers.get_mut(&worker) {
                rs.release(action);
            }
            return;
        }

        let job_id = self.allocate_job();
        let Some(a) = self.graph.get_mut(action) else {
            return;
        };
        a.job = Some(job_id);
        a.executing_resources.push(worker);
        let attempt = a.attempts();
        let task_id = a.task;

        let (Some(task), Some(w)) = (self.tasks.get(&task_id), self.pool.get(worker)) else {
            error!(%action, "missing task or worker for launch");
            return;
        };
        let Some(implementation) = task.implementation(implementation).cloned() else {
            return;
        };

        self.jobs.insert(
            job_id,
            JobRecord {
                action,
                worker,
                signature: task.signature(&implementation),
                dispatched_at: Instant::now(),
            },
        );

        info!(task = %task_id, %action, job = %job_id, worker = %w.name, implementation = %implementation.name, attempt, "dispatching job");
        commands.push(CoreCommand::Dispatch(Job {
            id: job_id,
            action,
            task: task_id,
            task_name: task.name.clone(),
            app_id: task.app_id,
            worker: w.clone(),
            implementation,
            parameters: task.parameters.clone(),
            attempt,
        }));
    }

    /// React to capacity returning to (or leaving) `worker`: apply pending
    /// reductions, evict what no longer fits, tear the worker down if it has
    /// become empty, otherwise launch blocked actions. Returns actions that
    /// must be placed elsewhere.
    pub(crate) fn after_capacity_change(&mut self, worker: WorkerId, commands: &mut Vec<CoreCommand>) -> Vec<ActionId> {
        let Some(rs) = self.schedulers.get_mut(&worker) else {
            return Vec::new();
        };

        let applied = rs.apply_pending_reductions();
        let evicted: Vec<ActionId> = rs.evict_unfit().into_iter().map(|p| p.action).collect();
        let stop = rs.can_be_stopped();
        let promoted = if stop { Vec::new() } else { rs.try_to_launch_blocked() };

        self.sync_pool(worker);
        for update in applied {
            self.complete_update(update, UpdateOutcome::Applied(worker), commands);
        }
        for action in &evicted {
            if let Some(a) = self.graph.get_mut(*action) {
                a.assignment = None;
            }
        }

        if stop {
            self.decommission(worker, commands);
        } else {
            for action in promoted {
                self.launch(worker, action, commands);
            }
        }
        evicted
    }

    fn decommission(&mut self, worker: WorkerId, commands: &mut Vec<CoreCommand>) {
        let Some(rs) = self.remove_worker(worker) else {
            return;
        };
        let w = rs.worker().clone();
        commands.push(CoreCommand::StopWorkers(vec![w.clone()]));
        if matches!(w.kind, WorkerKind::Cloud { .. }) {
            commands.push(CoreCommand::TerminateWorker { worker: w });
        }
    }

    // ---------------------------------------------------------------------
    // Pool changes
    // ---------------------------------------------------------------------

    pub(crate) fn handle_worker_joined(&mut self, worker: Worker, commands: &mut Vec<CoreCommand>) {
        let id = worker.id;
        self.add_worker(worker);
        self.schedule_free(Vec::new(), Vec::new(), Some(id), commands);
    }

    pub(crate) fn handle_worker_lost(&mut self, worker: WorkerId, commands: &mut Vec<CoreCommand>) {
        let Some(mut rs) = self.remove_worker(worker) else {
            warn!(%worker, "lost worker is not in the pool");
            return;
        };
        let w = rs.worker().clone();
        warn!(worker = %w.name, hosted = rs.hosted_actions(), "worker lost");

        let mut to_place = Vec::new();
        for action in rs.drain() {
            let state = self.graph.state(action);
            if state == Some(ActionState::Running) {
                let job = self.graph.get(action).and_then(|a| a.job);
                if let Some(job) = job {
                    self.jobs.remove(&job);
                }
                if let Some(retry) = self.settle_failed_attempt(action, "worker lost", commands) {
                    to_place.push(retry);
                }
            } else {
                if let Some(a) = self.graph.get_mut(action) {
                    a.assignment = None;
                }
                to_place.push(action);
            }
        }

        // Reductions waiting on this worker are moot now.
        let orphaned: Vec<UpdateId> = self
            .pending_updates
            .iter()
            .filter(|(_, p)| p.update.target == UpdateTarget::Worker(worker))
            .map(|(id, _)| *id)
            .collect();
        for update in orphaned {
            self.complete_update(update, UpdateOutcome::Applied(worker), commands);
        }

        if matches!(w.kind, WorkerKind::Cloud { .. }) {
            commands.push(CoreCommand::TerminateWorker { worker: w });
        }
        self.schedule_free(Vec::new(), to_place, None, commands);
    }

    // ---------------------------------------------------------------------
    // Elasticity
    // ---------------------------------------------------------------------

    fn complete_update(&mut self, update: UpdateId, outcome: UpdateOutcome, commands: &mut Vec<CoreCommand>) {
        if let Some(pending) = self.pending_updates.remove(&update) {
            commands.push(CoreCommand::CompleteUpdate {
                completer: pending.completer,
                outcome,
            });
        }
    }

    pub(crate) fn handle_resource_update(
        &mut self,
        update: ResourceUpdate,
        completer: UpdateCompleter,
        commands: &mut Vec<CoreCommand>,
    ) {
        info!(update = %update.id, kind = ?update.kind, target = ?update.target, delta = %update.modification, "resource update requested");

        let reject = |completer, reason: String, commands: &mut Vec<CoreCommand>| {
            warn!(%reason, "resource update rejected");
            commands.push(CoreCommand::CompleteUpdate {
                completer,
                outcome: UpdateOutcome::Rejected(reason),
            });
        };

        match (update.kind, update.target.clone()) {
            (UpdateKind::Increase, UpdateTarget::NewWorker { provider }) => {
                if !self.options.providers.contains(&provider) {
                    reject(completer, format!("unknown cloud provider '{provider}'"), commands);
                    return;
                }
                commands.push(CoreCommand::CreateWorker {
                    provider,
                    update: update.id,
                    description: update.modification,
                });
                self.pending_updates
                    .insert(update.id, PendingUpdate { update, completer });
            }
            (UpdateKind::Increase, UpdateTarget::Join(mut worker)) => {
                if self.schedulers.contains_key(&worker.id) {
                    reject(completer, format!("{} is already in the pool", worker.id), commands);
                    return;
                }
                if worker.app_id.is_none() {
                    worker.app_id = update.app_id;
                }
                let id = worker.id;
                self.add_worker(worker);
                commands.push(CoreCommand::CompleteUpdate {
                    completer,
                    outcome: UpdateOutcome::Applied(id),
                });
                self.schedule_free(Vec::new(), Vec::new(), Some(id), commands);
            }
            (UpdateKind::Increase, UpdateTarget::Worker(id)) => {
                let Some(rs) = self.schedulers.get_mut(&id) else {
                    reject(completer, TaskgridError::UnknownWorker(id).to_string(), commands);
                    return;
                };
                if !rs.worker().kind.is_elastic() {
                    reject(completer, format!("{id} is static and cannot be extended"), commands);
                    return;
                }
                rs.increase(&update.modification);
                self.sync_pool(id);
                commands.push(CoreCommand::CompleteUpdate {
                    completer,
                    outcome: UpdateOutcome::Applied(id),
                });
                self.after_capacity_change(id, commands);
                self.schedule_free(Vec::new(), Vec::new(), Some(id), commands);
            }
            (UpdateKind::Reduce, UpdateTarget::Worker(id)) => {
                let Some(rs) = self.schedulers.get_mut(&id) else {
                    reject(completer, TaskgridError::UnknownWorker(id).to_string(), commands);
                    return;
                };
                rs.pending_modification(update.id, update.modification);
                self.pending_updates
                    .insert(update.id, PendingUpdate { update, completer });
                let migrated = self.after_capacity_change(id, commands);
                self.schedule_free(Vec::new(), migrated, Some(id), commands);
            }
            (UpdateKind::Reduce, _) => {
                reject(completer, "reductions must target an existing worker".to_string(), commands);
            }
        }
    }

    pub(crate) fn handle_worker_created(
        &mut self,
        update: UpdateId,
        provider: String,
        name: String,
        description: ResourceDescription,
        commands: &mut Vec<CoreCommand>,
    ) {
        let id = self.pool.allocate_id();
        let pending = self.pending_updates.remove(&update);
        let app_id = pending.as_ref().and_then(|p| p.update.app_id);
        let worker = Worker::new(id, name, description, WorkerKind::Cloud { provider }).with_app(app_id);

        let Some(pending) = pending else {
            let abandoned = self.abandoned_creations.remove(&update);
            info!(%update, worker = %worker.name, abandoned, "created worker is not wanted; releasing it");
            commands.push(CoreCommand::TerminateWorker { worker });
            return;
        };

        self.add_worker(worker);
        commands.push(CoreCommand::CompleteUpdate {
            completer: pending.completer,
            outcome: UpdateOutcome::Applied(id),
        });
        self.schedule_free(Vec::new(), Vec::new(), Some(id), commands);
    }

    pub(crate) fn handle_worker_creation_failed(
        &mut self,
        update: UpdateId,
        reason: String,
        commands: &mut Vec<CoreCommand>,
    ) {
        self.abandoned_creations.remove(&update);
        warn!(%update, %reason, "worker creation failed");
        self.complete_update(update, UpdateOutcome::Rejected(reason), commands);
    }

    pub(crate) fn handle_abandon_update(&mut self, update: UpdateId) {
        let Some(pending) = self.pending_updates.remove(&update) else {
            debug!(%update, "abandoned update already completed");
            return;
        };
        match pending.update.target {
            UpdateTarget::NewWorker { .. } => {
                self.abandoned_creations.insert(update);
            }
            UpdateTarget::Worker(id) => {
                if let Some(rs) = self.schedulers.get_mut(&id) {
                    rs.drop_pending_reduction(update);
                }
            }
            UpdateTarget::Join(_) => {}
        }
        info!(%update, "resource update abandoned; pool left unchanged");
    }

    // ---------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------

    pub(crate) fn handle_shutdown(&mut self, reply: oneshot::Sender<WorkloadStatus>, commands: &mut Vec<CoreCommand>) {
        let status = self.workload();
        info!(%status, "shutting down dispatcher");
        self.state = DispatcherState::Stopped;

        let pending: Vec<UpdateId> = self.pending_updates.keys().copied().collect();
        for update in pending {
            self.complete_update(
                update,
                UpdateOutcome::Rejected(TaskgridError::ShutdownInProgress.to_string()),
                commands,
            );
        }

        let workers: Vec<Worker> = self.pool.workers().cloned().collect();
        if !workers.is_empty() {
            commands.push(CoreCommand::StopWorkers(workers.clone()));
        }
        for worker in workers {
            if matches!(worker.kind, WorkerKind::Cloud { .. }) {
                commands.push(CoreCommand::TerminateWorker { worker });
            }
        }

        commands.push(CoreCommand::Reply { reply, status });
    }
}
