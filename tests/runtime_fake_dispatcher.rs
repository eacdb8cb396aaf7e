// tests/runtime_fake_dispatcher.rs

use std::error::Error;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use taskgrid::engine::{DispatcherHandle, Request, Runtime, RuntimeOptions, TaskEnd, TaskOutcome};
use taskgrid::errors::TaskgridError;
use taskgrid::resources::description::ResourceDescription;
use taskgrid::resources::provider::{ProviderSettings, SimulatedCloudProvider};
use taskgrid::resources::update::{ResourceUpdate, UpdateOutcome, UpdateTarget};
use taskgrid::types::{PolicyKind, TaskId, WorkerId};
use taskgrid_test_utils::builders::{TaskBuilder, WorkerBuilder, gpu_constraints};
use taskgrid_test_utils::fake_dispatcher::{FakeJobDispatcher, Recorded};
use taskgrid_test_utils::{core_with_options, core_with_workers, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

async fn next_end(rx: &mut mpsc::UnboundedReceiver<TaskEnd>) -> TaskEnd {
    with_timeout(rx.recv()).await.expect("task event channel closed")
}

#[tokio::test]
async fn runtime_runs_a_chain_to_completion() -> TestResult {
    init_tracing();

    let core = core_with_workers(PolicyKind::Fifo, vec![WorkerBuilder::new(1, "w1").build()]);
    let (tx, rx) = mpsc::channel::<Request>(16);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let recorded = Recorded::default();

    let runtime = Runtime::new(
        core,
        rx,
        FakeJobDispatcher::auto_complete(tx.clone(), recorded.clone()),
    )
    .with_task_events(events_tx);
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_secs(1));
    handle.submit_task(TaskBuilder::new(1, "A").writes("a.out").build()).await?;
    handle
        .submit_task(TaskBuilder::new(2, "B").reads("a.out").build())
        .await?;
    handle.submit_task(TaskBuilder::new(3, "C").after(2).build()).await?;

    let mut ended = Vec::new();
    for _ in 0..3 {
        let end = next_end(&mut events_rx).await;
        assert_eq!(end.outcome, TaskOutcome::Completed);
        ended.push(end.task);
    }
    assert_eq!(ended, vec![TaskId(1), TaskId(2), TaskId(3)]);
    assert_eq!(recorded.task_names(), vec!["A", "B", "C"]);

    let status = handle.shutdown().await?;
    assert_eq!(status.completed, 3);
    assert_eq!(status.in_flight(), 0);
    assert_eq!(*recorded.stopped.lock().unwrap(), vec![WorkerId(1)]);

    timeout(Duration::from_secs(3), running).await???;
    Ok(())
}

#[tokio::test]
async fn failing_task_leaves_dependents_blocked() -> TestResult {
    init_tracing();

    let core = core_with_workers(
        PolicyKind::Fifo,
        vec![
            WorkerBuilder::new(1, "w1").build(),
            WorkerBuilder::new(2, "w2").build(),
        ],
    );
    let (tx, rx) = mpsc::channel::<Request>(16);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let recorded = Recorded::default();

    let dispatcher = FakeJobDispatcher::auto_complete(tx.clone(), recorded.clone()).failing("broken");
    let runtime = Runtime::new(core, rx, dispatcher).with_task_events(events_tx);
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_secs(1));
    handle.submit_task(TaskBuilder::new(1, "broken").build()).await?;
    handle.submit_task(TaskBuilder::new(2, "child").after(1).build()).await?;

    let end = next_end(&mut events_rx).await;
    assert_eq!(end.task, TaskId(1));
    assert!(matches!(end.outcome, TaskOutcome::Failed(_)));

    // One attempt per worker.
    assert_eq!(recorded.task_names(), vec!["broken", "broken"]);

    let status = handle.workload().await?;
    assert_eq!(status.failed, 1);
    assert_eq!(status.blocked, 1);

    let final_status = handle.shutdown().await?;
    assert_eq!(final_status.blocked, 1);
    running.await??;

    // The dispatcher is gone; further requests are refused.
    let refused = handle.submit_task(TaskBuilder::new(3, "late").build()).await;
    assert!(matches!(refused, Err(TaskgridError::ShutdownInProgress)));
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_job_reaches_the_transport() -> TestResult {
    init_tracing();

    let core = core_with_workers(PolicyKind::Fifo, vec![WorkerBuilder::new(1, "w1").build()]);
    let (tx, rx) = mpsc::channel::<Request>(16);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let recorded = Recorded::default();

    let runtime = Runtime::new(core, rx, FakeJobDispatcher::recording(recorded.clone()))
        .with_task_events(events_tx);
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_secs(1));
    handle.submit_task(TaskBuilder::new(1, "long").build()).await?;
    handle.cancel_task(TaskId(1)).await?;

    // Query round trips guarantee both requests were handled.
    let status = handle.workload().await?;
    assert_eq!(status.running, 1);
    assert_eq!(recorded.job_count(), 1);
    let job = recorded.jobs.lock().unwrap()[0].id;
    assert_eq!(*recorded.cancelled.lock().unwrap(), vec![job]);

    handle.job_failed(job, "cancelled").await?;
    let end = next_end(&mut events_rx).await;
    assert_eq!(end.outcome, TaskOutcome::Cancelled);

    handle.shutdown().await?;
    running.await??;
    Ok(())
}

#[tokio::test]
async fn elastic_worker_is_created_on_request_and_runs_waiting_work() -> TestResult {
    init_tracing();

    let options = RuntimeOptions {
        providers: ["sim".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let core = core_with_options(PolicyKind::Fifo, options, Vec::new());
    let (tx, rx) = mpsc::channel::<Request>(16);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let recorded = Recorded::default();

    let provider = SimulatedCloudProvider::new(
        ProviderSettings {
            name: "sim".to_string(),
            instance: ResourceDescription::new(1, 1, 0, 0),
            max_vms: 1,
            creation_delay: Duration::from_millis(10),
        },
        tx.clone(),
    );
    let runtime = Runtime::new(
        core,
        rx,
        FakeJobDispatcher::auto_complete(tx.clone(), recorded.clone()),
    )
    .with_provider(Box::new(provider))
    .with_task_events(events_tx);
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_secs(2));
    handle
        .submit_task(
            TaskBuilder::new(1, "train")
                .implementation("cuda", gpu_constraints())
                .build(),
        )
        .await?;
    assert_eq!(handle.workload().await?.unassigned, 1);

    let new_worker = || {
        ResourceUpdate::increase(
            UpdateTarget::NewWorker {
                provider: "sim".to_string(),
            },
            ResourceDescription::default(),
            None,
        )
    };
    let outcome = handle.apply_resource_update(new_worker()).await?;
    let UpdateOutcome::Applied(worker) = outcome else {
        panic!("expected the VM to join, got {outcome:?}");
    };

    let end = next_end(&mut events_rx).await;
    assert_eq!(end.outcome, TaskOutcome::Completed);
    assert_eq!(recorded.jobs.lock().unwrap()[0].worker.id, worker);

    // Quota of one VM reached.
    let second = handle.apply_resource_update(new_worker()).await?;
    assert!(matches!(second, UpdateOutcome::Rejected(reason) if reason.contains("quota")));

    // Shrinking the VM to nothing removes it from the pool.
    let removed = handle
        .apply_resource_update(ResourceUpdate::reduce(
            worker,
            ResourceDescription::new(1, 1, 0, 0),
            None,
        ))
        .await?;
    assert_eq!(removed, UpdateOutcome::Applied(worker));
    assert_eq!(handle.workload().await?.workers, 0);

    handle.shutdown().await?;
    running.await??;
    Ok(())
}

#[tokio::test]
async fn timed_out_update_is_abandoned() -> TestResult {
    init_tracing();

    let options = RuntimeOptions {
        providers: ["slow".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let core = core_with_options(PolicyKind::Fifo, options, Vec::new());
    let (tx, rx) = mpsc::channel::<Request>(16);

    let provider = SimulatedCloudProvider::new(
        ProviderSettings {
            name: "slow".to_string(),
            instance: ResourceDescription::cpus(1),
            max_vms: 4,
            creation_delay: Duration::from_millis(300),
        },
        tx.clone(),
    );
    let runtime = Runtime::new(core, rx, FakeJobDispatcher::recording(Recorded::default()))
        .with_provider(Box::new(provider));
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_millis(50));
    let result = handle
        .apply_resource_update(ResourceUpdate::increase(
            UpdateTarget::NewWorker {
                provider: "slow".to_string(),
            },
            ResourceDescription::default(),
            None,
        ))
        .await;
    assert!(matches!(result, Err(TaskgridError::ResourceUpdateTimeout(_))));
    assert_eq!(handle.workload().await?.pending_updates, 0);

    // The VM still boots, and is released instead of joining.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.workload().await?.workers, 0);

    handle.shutdown().await?;
    running.await??;
    Ok(())
}

#[tokio::test]
async fn shutdown_with_a_job_in_flight_reports_the_final_workload() -> TestResult {
    init_tracing();

    let core = core_with_workers(PolicyKind::Fifo, vec![WorkerBuilder::new(1, "w1").build()]);
    let (tx, rx) = mpsc::channel::<Request>(16);
    let recorded = Recorded::default();

    let runtime = Runtime::new(core, rx, FakeJobDispatcher::recording(recorded.clone()));
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_secs(1));
    handle.submit_task(TaskBuilder::new(1, "a1").build()).await?;
    for id in 2..=5 {
        handle
            .submit_task(TaskBuilder::new(id, "an").after(id - 1).build())
            .await?;
    }
    assert_eq!(handle.workload().await?.running, 1);

    let status = handle.shutdown().await?;
    assert_eq!(status.running, 1);
    assert_eq!(status.blocked, 4);
    assert_eq!(status.completed, 0);
    assert_eq!(*recorded.stopped.lock().unwrap(), vec![WorkerId(1)]);

    timeout(Duration::from_secs(3), running).await???;
    Ok(())
}

#[tokio::test]
async fn failing_to_stop_workers_does_not_take_the_runtime_down() -> TestResult {
    init_tracing();

    let core = core_with_workers(
        PolicyKind::Fifo,
        vec![
            WorkerBuilder::new(1, "w1").build(),
            WorkerBuilder::new(2, "edge").dynamic().build(),
        ],
    );
    let (tx, rx) = mpsc::channel::<Request>(16);
    let recorded = Recorded::default();

    let dispatcher = FakeJobDispatcher::recording(recorded.clone()).unreachable_workers();
    let runtime = Runtime::new(core, rx, dispatcher);
    let running = tokio::spawn(runtime.run());

    let handle = DispatcherHandle::new(tx, Duration::from_secs(1));
    handle.submit_task(TaskBuilder::new(1, "a1").build()).await?;

    // Emptying the dynamic worker tears it down; the stop fails.
    let removed = handle
        .apply_resource_update(ResourceUpdate::reduce(
            WorkerId(2),
            ResourceDescription::cpus(1),
            None,
        ))
        .await?;
    assert_eq!(removed, UpdateOutcome::Applied(WorkerId(2)));
    assert_eq!(handle.workload().await?.workers, 1);

    let status = handle.shutdown().await?;
    assert_eq!(status.running, 1);
    assert_eq!(
        *recorded.stopped.lock().unwrap(),
        vec![WorkerId(2), WorkerId(1)]
    );

    timeout(Duration::from_secs(3), running).await???;
    Ok(())
}
