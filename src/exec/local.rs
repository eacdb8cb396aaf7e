// src/exec/local.rs

//! Job dispatcher that runs every job as a local process.
//!
//! Each implementation's `command` is run through the platform shell. The
//! worker the job was placed on only shows up in the environment
//! (`TASKGRID_WORKER`); every "worker" is this machine.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::Request;
use crate::exec::backend::{BoxFuture, JobDispatcher};
use crate::exec::job::{Job, JobResult};
use crate::resources::worker::Worker;
use crate::types::{JobId, WorkerId};

/// Handle for a job process that may still be running.
struct ActiveJob {
    worker: WorkerId,
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct LocalProcessDispatcher {
    request_tx: mpsc::Sender<Request>,
    active: HashMap<JobId, ActiveJob>,
}

impl LocalProcessDispatcher {
    pub fn new(request_tx: mpsc::Sender<Request>) -> Self {
        Self {
            request_tx,
            active: HashMap::new(),
        }
    }

    fn forget_finished(&mut self) {
        self.active.retain(|_, job| !job.handle.is_finished());
    }

    fn signal_cancel(&mut self, job: JobId) -> bool {
        match self.active.get_mut(&job).and_then(|a| a.cancel.take()) {
            Some(cancel) => cancel.send(()).is_ok(),
            None => false,
        }
    }
}

impl JobDispatcher for LocalProcessDispatcher {
    fn dispatch(&mut self, job: Job) -> BoxFuture<'_, crate::errors::Result<()>> {
        self.forget_finished();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let tx = self.request_tx.clone();
        let id = job.id;
        let worker = job.worker.id;
        let handle = tokio::spawn(run_job(job, tx, cancel_rx));

        self.active.insert(
            id,
            ActiveJob {
                worker,
                cancel: Some(cancel_tx),
                handle,
            },
        );
        Box::pin(async { Ok(()) })
    }

    fn cancel(&mut self, job: JobId) -> BoxFuture<'_, crate::errors::Result<()>> {
        if !self.signal_cancel(job) {
            debug!(%job, "job already finished; nothing to cancel");
        }
        Box::pin(async { Ok(()) })
    }

    fn stop_workers(&mut self, workers: Vec<Worker>) -> BoxFuture<'_, crate::errors::Result<()>> {
        let doomed: Vec<JobId> = self
            .active
            .iter()
            .filter(|(_, a)| workers.iter().any(|w| w.id == a.worker))
            .map(|(id, _)| *id)
            .collect();
        for job in doomed {
            self.signal_cancel(job);
        }
        for w in &workers {
            info!(worker = %w.name, "worker stopped");
        }
        Box::pin(async { Ok(()) })
    }
}

/// Run one job to completion and report the outcome.
///
/// A cancelled job is reported as failed so the dispatcher can return its
/// capacity.
async fn run_job(job: Job, request_tx: mpsc::Sender<Request>, cancel_rx: oneshot::Receiver<()>) {
    let job_id = job.id;
    let request = match run_job_inner(&job, cancel_rx).await {
        Ok(Some(result)) => Request::JobCompleted { result },
        Ok(None) => Request::JobFailed {
            job_id,
            cause: "cancelled".to_string(),
        },
        Err(err) => {
            error!(job = %job_id, task = %job.task_name, error = %err, "job execution error");
            Request::JobFailed {
                job_id,
                cause: format!("{err:#}"),
            }
        }
    };

    if request_tx.send(request).await.is_err() {
        debug!(job = %job_id, "request channel closed; dropping job outcome");
    }
}

async fn run_job_inner(job: &Job, mut cancel_rx: oneshot::Receiver<()>) -> Result<Option<JobResult>> {
    let command_line = job.implementation.command.as_deref().unwrap_or("true");

    info!(
        job = %job.id,
        task = %job.task_name,
        implementation = %job.implementation.name,
        worker = %job.worker.name,
        attempt = job.attempt,
        cmd = %command_line,
        "starting job process"
    );

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    };

    cmd.env("TASKGRID_JOB", job.id.get().to_string())
        .env("TASKGRID_TASK", &job.task_name)
        .env("TASKGRID_WORKER", &job.worker.name)
        .args(job.parameters.iter().map(|p| p.name.as_str()))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for job {} ({})", job.id, job.task_name))?;

    if let Some(stdout) = child.stdout.take() {
        let job_id = job.id;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(job = %job_id, "{line}");
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let job_id = job.id;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %job_id, "stderr: {line}");
            }
        });
    }

    tokio::select! {
        status = child.wait() => {
            let status = status.with_context(|| format!("waiting for job {}", job.id))?;
            let elapsed = started.elapsed();
            info!(
                job = %job.id,
                task = %job.task_name,
                exit_code = status.code().unwrap_or(-1),
                elapsed_ms = elapsed.as_millis() as u64,
                "job process exited"
            );
            if !status.success() {
                anyhow::bail!("process exited with {status}");
            }
            Ok(Some(JobResult {
                job_id: job.id,
                param_types: job.parameters.iter().map(|p| p.data_type).collect(),
                values: job
                    .parameters
                    .iter()
                    .map(|p| p.direction.writes().then(|| p.name.clone()))
                    .collect(),
            }))
        }

        cancel = &mut cancel_rx => {
            if cancel.is_ok() {
                info!(job = %job.id, "cancellation requested; killing job process");
                if let Err(e) = child.kill().await {
                    warn!(job = %job.id, error = %e, "failed to kill job process");
                }
            }
            Ok(None)
        }
    }
}
