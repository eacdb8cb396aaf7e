// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod resources;
pub mod scheduler;
pub mod task;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{
    CoreRuntime, DispatcherHandle, Runtime, RuntimeOptions, TaskEnd, TaskOutcome, WorkloadStatus,
};
use crate::exec::LocalProcessDispatcher;
use crate::resources::description::ResourceDescription;
use crate::resources::provider::SimulatedCloudProvider;
use crate::resources::update::{ResourceUpdate, UpdateOutcome, UpdateTarget, UpdateTicket};
use crate::scheduler::build_policy;
use crate::types::PolicyKind;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the dispatcher core and its async shell
/// - the local process transport and the simulated cloud providers
/// - Ctrl-C handling
///
/// Returns once every submitted task has settled (or Ctrl-C was pressed),
/// after printing the final workload.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let policy = args.policy.unwrap_or(cfg.scheduler.policy);
    let providers = cfg.provider_settings();
    let options = RuntimeOptions {
        max_scheduling_attempts: cfg.scheduler.max_scheduling_attempts,
        providers: providers.iter().map(|p| p.name.clone()).collect(),
    };

    let mut core = CoreRuntime::new(build_policy(policy), options).with_profiles(cfg.profiles());
    for worker in cfg.static_workers() {
        core = core.with_worker(worker);
    }

    let (tx, rx) = mpsc::channel(cfg.scheduler.request_queue_length);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<TaskEnd>();

    let mut runtime = Runtime::new(core, rx, LocalProcessDispatcher::new(tx.clone()))
        .with_task_events(events_tx);
    for settings in providers.iter().cloned() {
        runtime = runtime.with_provider(Box::new(SimulatedCloudProvider::new(settings, tx.clone())));
    }
    let runtime_handle = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, cfg.update_timeout());

    let tasks = cfg.task_descriptions();
    info!(tasks = tasks.len(), policy = policy_label(policy), "submitting workload");
    let submitted = tasks.len();
    for task in tasks {
        handle.submit_task(task).await?;
    }

    let scale_out = providers.first().map(|p| p.name.clone());
    let settled = wait_until_settled(&handle, &mut events_rx, submitted, scale_out).await?;
    if !settled {
        warn!("interrupted; shutting down with work in flight");
    }

    let status = handle.shutdown().await?;
    match runtime_handle.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "dispatcher task ended abnormally"),
    }

    // Ends delivered between the last poll and the shutdown.
    while let Ok(end) = events_rx.try_recv() {
        report_task_end(&end);
    }

    print_report(&status);
    Ok(())
}

fn policy_label(policy: PolicyKind) -> &'static str {
    match policy {
        PolicyKind::Fifo => "fifo",
        PolicyKind::Lifo => "lifo",
    }
}

/// Drive the workload until nothing can make progress any more.
///
/// Returns `false` if interrupted by Ctrl-C.
///
/// When actions are stuck because no worker can take them and a cloud
/// provider is configured, one new worker at a time is requested from it
/// until the provider refuses.
async fn wait_until_settled(
    handle: &DispatcherHandle,
    events_rx: &mut mpsc::UnboundedReceiver<TaskEnd>,
    submitted: usize,
    scale_out: Option<String>,
) -> Result<bool> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ended = 0usize;
    let mut ticket: Option<UpdateTicket> = None;
    let mut scale_out = scale_out;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                return Ok(false);
            }

            Some(end) = events_rx.recv() => {
                ended += 1;
                report_task_end(&end);
                if ended >= submitted {
                    return Ok(true);
                }
            }

            _ = ticker.tick() => {
                if let Some(t) = &ticket
                    && let Some(outcome) = t.outcome()
                {
                    if let UpdateOutcome::Rejected(reason) = &outcome {
                        info!(%reason, "cloud provider cannot grow the pool any further");
                        scale_out = None;
                    }
                    ticket = None;
                }

                let status = handle.workload().await?;
                debug!(%status, "workload");

                if status.unassigned > 0
                    && status.pending_updates == 0
                    && ticket.is_none()
                    && let Some(provider) = &scale_out
                {
                    let update = ResourceUpdate::increase(
                        UpdateTarget::NewWorker { provider: provider.clone() },
                        ResourceDescription::default(),
                        None,
                    );
                    ticket = Some(handle.request_resource_update(update).await?);
                    continue;
                }

                if is_settled(&status) && ticket.is_none() {
                    return Ok(true);
                }
            }
        }
    }
}

/// Nothing running, nothing placeable, nothing waiting on the pool.
fn is_settled(status: &WorkloadStatus) -> bool {
    status.running == 0 && status.ready == status.unassigned && status.pending_updates == 0
}

fn report_task_end(end: &TaskEnd) {
    match &end.outcome {
        TaskOutcome::Completed => info!(task = %end.task, "task completed"),
        TaskOutcome::Failed(cause) => warn!(task = %end.task, %cause, "task failed"),
        TaskOutcome::Cancelled => info!(task = %end.task, "task cancelled"),
    }
}

fn print_report(status: &WorkloadStatus) {
    println!("taskgrid report");
    println!("  completed: {}", status.completed);
    println!("  failed:    {}", status.failed);
    println!("  cancelled: {}", status.cancelled);
    println!("  blocked:   {}", status.blocked);
    println!("  ready:     {} ({} without a capable worker)", status.ready, status.unassigned);
    println!("  running:   {}", status.running);
    println!("  workers:   {}", status.workers);
}

/// Dry-run output: pool, providers and the workload in submission order.
fn print_dry_run(cfg: &ConfigFile) {
    println!("taskgrid dry-run");
    println!("  scheduler.policy = {}", policy_label(cfg.scheduler.policy));
    println!(
        "  scheduler.max_scheduling_attempts = {}",
        cfg.scheduler.max_scheduling_attempts
    );
    println!(
        "  scheduler.resource_update_timeout_ms = {}",
        cfg.scheduler.resource_update_timeout_ms
    );
    println!();

    let workers = cfg.static_workers();
    println!("workers ({}):", workers.len());
    for w in &workers {
        println!("  - {w}: {} x{} node(s)", w.description, w.nodes);
    }

    if !cfg.cloud.is_empty() {
        println!("cloud providers ({}):", cfg.cloud.len());
        for p in cfg.provider_settings() {
            println!("  - {}: {} up to {} VM(s)", p.name, p.instance, p.max_vms);
        }
    }

    let tasks = cfg.task_descriptions();
    println!("tasks ({}):", tasks.len());
    for task in &tasks {
        println!("  - {} ({})", task.name, task.id);
        if task.priority {
            println!("      priority: true");
        }
        if let Some(tc) = cfg.task.get(&task.name)
            && !tc.after.is_empty()
        {
            println!("      after: {:?}", tc.after);
        }
        for imp in &task.implementations {
            println!(
                "      impl {}: {}",
                imp.name,
                imp.command.as_deref().unwrap_or("<no command>")
            );
        }
    }

    debug!("dry-run complete (no execution)");
}
