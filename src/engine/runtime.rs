// src/engine/runtime.rs

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{Result, TaskgridError};
use crate::exec::JobDispatcher;
use crate::resources::provider::CloudProvider;

use super::core::CoreRuntime;
use super::{CoreCommand, Request, TaskEnd};

/// Async shell around [`CoreRuntime`].
///
/// Reads [`Request`]s from the channel, feeds them to the core one at a
/// time and carries out the returned commands against the job transport,
/// the cloud providers and the waiting callers. All scheduling semantics
/// live in the core.
pub struct Runtime<D: JobDispatcher> {
    core: CoreRuntime,
    request_rx: mpsc::Receiver<Request>,
    dispatcher: D,
    providers: BTreeMap<String, Box<dyn CloudProvider>>,
    task_events: Option<mpsc::UnboundedSender<TaskEnd>>,
    /// Requests generated while executing commands (e.g. a dispatch that
    /// failed before leaving). Served before the channel.
    follow_ups: VecDeque<Request>,
}

impl<D: JobDispatcher> fmt::Debug for Runtime<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<D: JobDispatcher> Runtime<D> {
    pub fn new(core: CoreRuntime, request_rx: mpsc::Receiver<Request>, dispatcher: D) -> Self {
        Self {
            core,
            request_rx,
            dispatcher,
            providers: BTreeMap::new(),
            task_events: None,
            follow_ups: VecDeque::new(),
        }
    }

    pub fn with_provider(mut self, provider: Box<dyn CloudProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Receive a [`TaskEnd`] for every task that reaches a terminal state.
    pub fn with_task_events(mut self, tx: mpsc::UnboundedSender<TaskEnd>) -> Self {
        self.task_events = Some(tx);
        self
    }

    /// Main loop. Returns once a `Shutdown` request has been handled or every
    /// sender is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("taskgrid dispatcher started");

        loop {
            let request = match self.follow_ups.pop_front() {
                Some(r) => r,
                None => match self.request_rx.recv().await {
                    Some(r) => r,
                    None => {
                        info!("request channel closed; exiting");
                        break;
                    }
                },
            };

            let step = self.core.step(request);

            for command in step.commands {
                self.execute_command(command).await;
            }

            if !step.keep_running {
                info!("dispatcher stopped");
                break;
            }
        }

        // Anything still queued is answered as rejected.
        self.request_rx.close();
        while let Some(request) = self
            .follow_ups
            .pop_front()
            .or_else(|| self.request_rx.try_recv().ok())
        {
            let step = self.core.step(request);
            for command in step.commands {
                self.execute_command(command).await;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Carry out one command. Transport and provider errors are logged or
    /// turned into follow-up requests; they never end the loop.
    async fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Dispatch(job) => {
                let job_id = job.id;
                if let Err(e) = self.dispatcher.dispatch(job).await {
                    warn!(job = %job_id, error = %e, "job dispatch failed");
                    self.follow_ups.push_back(Request::JobFailed {
                        job_id,
                        cause: e.to_string(),
                    });
                }
            }
            CoreCommand::CancelJob(job_id) => {
                if let Err(e) = self.dispatcher.cancel(job_id).await {
                    warn!(job = %job_id, error = %e, "job cancellation failed");
                }
            }
            CoreCommand::StopWorkers(workers) => {
                let names: Vec<_> = workers.iter().map(|w| w.name.clone()).collect();
                debug!(?names, "stopping workers");
                if let Err(e) = self.dispatcher.stop_workers(workers).await {
                    warn!(?names, error = %e, "stopping workers failed");
                }
            }
            CoreCommand::CreateWorker {
                provider,
                update,
                description,
            } => {
                let outcome = match self.providers.get_mut(&provider) {
                    Some(p) => p.request_worker_creation(update, description).map(|_| ()),
                    None => Err(TaskgridError::ConfigError(format!(
                        "no driver registered for provider '{provider}'"
                    ))),
                };
                if let Err(e) = outcome {
                    self.follow_ups.push_back(Request::WorkerCreationFailed {
                        update,
                        reason: e.to_string(),
                    });
                }
            }
            CoreCommand::TerminateWorker { worker } => {
                let provider = worker.kind.provider().map(str::to_string);
                match provider.and_then(|p| self.providers.get_mut(&p)) {
                    Some(p) => {
                        if let Err(e) = p.request_worker_termination(&worker) {
                            warn!(worker = %worker.name, error = %e, "worker termination failed");
                        }
                    }
                    None => warn!(worker = %worker.name, "no provider to terminate worker"),
                }
            }
            CoreCommand::CompleteUpdate { completer, outcome } => completer.complete(outcome),
            CoreCommand::NotifyTask(end) => {
                if let Some(tx) = &self.task_events
                    && tx.send(end).is_err()
                {
                    debug!("task event receiver dropped");
                }
            }
            CoreCommand::Reply { reply, status } => {
                if reply.send(status).is_err() {
                    debug!("waiter dropped before reply");
                }
            }
        }
    }
}
