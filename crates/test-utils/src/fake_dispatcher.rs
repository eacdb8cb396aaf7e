use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use taskgrid::engine::Request;
use taskgrid::errors::{Result, TaskgridError};
use taskgrid::exec::{BoxFuture, Job, JobDispatcher, JobResult};
use taskgrid::resources::worker::Worker;
use taskgrid::types::{JobId, WorkerId};

/// What the fake saw, shared with the test body.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub jobs: Arc<Mutex<Vec<Job>>>,
    pub cancelled: Arc<Mutex<Vec<JobId>>>,
    pub stopped: Arc<Mutex<Vec<WorkerId>>>,
}

impl Recorded {
    pub fn task_names(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.task_name.clone())
            .collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

/// A fake transport that:
/// - records every dispatched job
/// - when given a request sender, reports each job as completed right away,
///   except for tasks listed in `failing`, which are reported as failed
/// - optionally fails every attempt to stop workers.
pub struct FakeJobDispatcher {
    request_tx: Option<mpsc::Sender<Request>>,
    failing: BTreeSet<String>,
    unreachable_workers: bool,
    recorded: Recorded,
}

impl FakeJobDispatcher {
    /// Record only; jobs never finish unless the test reports them.
    pub fn recording(recorded: Recorded) -> Self {
        Self {
            request_tx: None,
            failing: BTreeSet::new(),
            unreachable_workers: false,
            recorded,
        }
    }

    pub fn auto_complete(request_tx: mpsc::Sender<Request>, recorded: Recorded) -> Self {
        Self {
            request_tx: Some(request_tx),
            failing: BTreeSet::new(),
            unreachable_workers: false,
            recorded,
        }
    }

    pub fn failing(mut self, task_name: &str) -> Self {
        self.failing.insert(task_name.to_string());
        self
    }

    /// `stop_workers` records the workers, then fails.
    pub fn unreachable_workers(mut self) -> Self {
        self.unreachable_workers = true;
        self
    }

    fn report(&self, request: Request) {
        if let Some(tx) = self.request_tx.clone() {
            // Reported from a separate task: the runtime is busy executing
            // this command and is the channel's only reader.
            tokio::spawn(async move {
                let _ = tx.send(request).await;
            });
        }
    }
}

impl JobDispatcher for FakeJobDispatcher {
    fn dispatch(&mut self, job: Job) -> BoxFuture<'_, Result<()>> {
        let request = if self.failing.contains(&job.task_name) {
            Request::JobFailed {
                job_id: job.id,
                cause: "exit status 1".to_string(),
            }
        } else {
            Request::JobCompleted {
                result: JobResult::empty(job.id),
            }
        };
        self.recorded.jobs.lock().unwrap().push(job);
        self.report(request);
        Box::pin(async { Ok(()) })
    }

    fn cancel(&mut self, job: JobId) -> BoxFuture<'_, Result<()>> {
        self.recorded.cancelled.lock().unwrap().push(job);
        Box::pin(async { Ok(()) })
    }

    fn stop_workers(&mut self, workers: Vec<Worker>) -> BoxFuture<'_, Result<()>> {
        self.recorded
            .stopped
            .lock()
            .unwrap()
            .extend(workers.iter().map(|w| w.id));
        let unreachable = self.unreachable_workers;
        Box::pin(async move {
            if unreachable {
                return Err(TaskgridError::JobDispatchFailure("worker unreachable".to_string()));
            }
            Ok(())
        })
    }
}
