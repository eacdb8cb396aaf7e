// tests/scheduler_scores.rs

use std::collections::BTreeMap;
use std::time::Duration;

use taskgrid::dag::ActionGraph;
use taskgrid::resources::description::{Constraints, ResourceDescription};
use taskgrid::scheduler::score::CANNOT_RUN_NOW;
use taskgrid::scheduler::{
    Candidate, Placement, Profile, Queued, ResourceScheduler, Score, assign, build_policy,
};
use taskgrid::types::{ActionId, AppId, ImplId, PolicyKind, TaskId, UpdateId, WorkerId};
use taskgrid_test_utils::builders::{TaskBuilder, WorkerBuilder, gpu_constraints};

fn placement(action: u64, cpus: u32, score: Score) -> Placement {
    Placement {
        action: ActionId(action),
        implementation: ImplId(0),
        constraints: Constraints::cpus(cpus),
        score,
    }
}

#[test]
fn scores_compare_lexicographically() {
    assert!(Score::new(1, -100, CANNOT_RUN_NOW, 0) > Score::new(0, 0, 0, 0));
    assert!(Score::new(0, -1, 0, 0) > Score::new(0, -2, 50, 50));
    assert!(Score::new(0, -1, -3, 0) > Score::new(0, -1, CANNOT_RUN_NOW, 10));
    assert!(Score::new(0, -1, 0, -5) > Score::new(0, -1, 0, -6));
}

#[test]
fn fifo_prefers_earlier_and_lifo_prefers_later_submissions() {
    let mut g = ActionGraph::new();
    let first = g.register(TaskId(1), AppId(1), 0);
    let second = g.register(TaskId(2), AppId(1), 0);
    let urgent = g.register(TaskId(3), AppId(1), 1);

    let fifo = build_policy(PolicyKind::Fifo);
    let lifo = build_policy(PolicyKind::Lifo);
    let score = |p: &dyn taskgrid::scheduler::SchedulingPolicy, id| {
        p.generate_action_score(g.get(id).unwrap())
    };

    assert!(score(fifo.as_ref(), first) > score(fifo.as_ref(), second));
    assert!(score(lifo.as_ref(), second) > score(lifo.as_ref(), first));

    // Priority dominates submission order under both policies.
    assert!(score(fifo.as_ref(), urgent) > score(fifo.as_ref(), first));
    assert!(score(lifo.as_ref(), urgent) > score(lifo.as_ref(), second));
}

#[test]
fn purge_offers_everything_unassigned_in_score_order() {
    let mut policy = build_policy(PolicyKind::Fifo);
    let low = Candidate {
        action: ActionId(2),
        score: Score::new(0, -2, 0, 0),
    };
    let high = Candidate {
        action: ActionId(1),
        score: Score::new(0, -1, 0, 0),
    };
    policy.add_unassigned(low);
    assert_eq!(policy.unassigned(), vec![low]);

    let offered = policy.purge_free_actions(vec![high], Vec::new(), Vec::new(), None);

    assert_eq!(offered, vec![high, low]);
    assert_eq!(policy.unassigned_len(), 0);
}

#[test]
fn resource_score_sinks_workers_that_cannot_start_now() {
    let worker = WorkerBuilder::new(1, "w1").cpus(2).build();
    let mut rs = ResourceScheduler::new(worker, None, BTreeMap::new());
    let base = Score::new(0, -1, 0, 0);

    let fits = rs.generate_resource_score(base, [&Constraints::cpus(2)]);
    assert_eq!(fits.resource, 0);

    assert_eq!(rs.schedule_action(placement(1, 2, base)), Queued::Ready);
    let full = rs.generate_resource_score(base, [&Constraints::cpus(1)]);
    assert_eq!(full.resource, CANNOT_RUN_NOW);

    // Queue length counts against the worker as well.
    assert_eq!(rs.schedule_action(placement(2, 1, base)), Queued::Blocked);
    let queued = rs.generate_resource_score(base, [&Constraints::cpus(1)]);
    assert_eq!(queued.resource, CANNOT_RUN_NOW - 1);
}

#[test]
fn implementation_score_prefers_faster_profiles() {
    let worker = WorkerBuilder::new(1, "w1").cpus(4).build();
    let profiles = BTreeMap::from([
        ("t.slow".to_string(), Profile::with_default(Duration::from_millis(900))),
        ("t.fast".to_string(), Profile::with_default(Duration::from_millis(100))),
    ]);
    let rs = ResourceScheduler::new(worker, None, profiles);
    let base = Score::new(0, 0, 0, 0);

    let slow = rs.generate_implementation_score(base, "t.slow", &Constraints::cpus(1));
    let fast = rs.generate_implementation_score(base, "t.fast", &Constraints::cpus(1));
    let too_big = rs.generate_implementation_score(base, "t.fast", &Constraints::cpus(8));

    assert_eq!(
        rs.profile("t.fast").map(|p| p.average()),
        Some(Duration::from_millis(100))
    );
    assert_eq!(fast.implementation, -100);
    assert!(fast > slow);
    assert!(slow > too_big);
}

#[test]
fn observed_executions_override_default_average() {
    let mut profile = Profile::with_default(Duration::from_millis(500));
    assert_eq!(profile.average(), Duration::from_millis(500));
    assert_eq!(profile.min(), None);

    profile.record(Duration::from_millis(10));
    profile.record(Duration::from_millis(30));

    assert_eq!(profile.executions(), 2);
    assert_eq!(profile.average(), Duration::from_millis(20));
    assert_eq!(profile.min(), Some(Duration::from_millis(10)));
    assert_eq!(profile.max(), Some(Duration::from_millis(30)));
}

#[test]
fn blocked_actions_launch_in_score_order_and_wait_behind_the_head() {
    let worker = WorkerBuilder::new(1, "w1").cpus(2).build();
    let mut rs = ResourceScheduler::new(worker, None, BTreeMap::new());

    assert_eq!(rs.schedule_action(placement(1, 1, Score::new(0, -1, 0, 0))), Queued::Ready);
    rs.launch(ActionId(1));
    assert_eq!(rs.schedule_action(placement(2, 2, Score::new(0, -2, 0, 0))), Queued::Blocked);
    // One core is free, but the wider action ahead of it goes first.
    assert_eq!(rs.schedule_action(placement(3, 1, Score::new(0, -3, 0, 0))), Queued::Blocked);
    assert_eq!(rs.available(), &ResourceDescription::cpus(1));

    rs.release(ActionId(1));
    assert_eq!(rs.try_to_launch_blocked(), vec![ActionId(2)]);
    assert_eq!(rs.available(), &ResourceDescription::cpus(0));
    assert!(rs.is_hosting(ActionId(3)));

    // Withdrawing a reserved action returns its slots.
    assert!(rs.cancel_action(ActionId(2)).is_some());
    assert_eq!(rs.try_to_launch_blocked(), vec![ActionId(3)]);
    assert_eq!(rs.available(), &ResourceDescription::cpus(1));
}

#[test]
fn queued_reduction_withholds_capacity_from_new_actions() {
    let worker = WorkerBuilder::new(1, "w1").cpus(2).dynamic().build();
    let mut rs = ResourceScheduler::new(worker, None, BTreeMap::new());

    assert_eq!(rs.schedule_action(placement(1, 1, Score::default())), Queued::Ready);
    rs.launch(ActionId(1));
    rs.pending_modification(UpdateId(7), ResourceDescription::cpus(1));

    assert_eq!(rs.launchable(), ResourceDescription::cpus(0));
    assert!(!rs.can_run_now(&Constraints::cpus(1)));
    assert_eq!(rs.schedule_action(placement(2, 1, Score::default())), Queued::Blocked);

    rs.release(ActionId(1));
    assert_eq!(rs.apply_pending_reductions(), vec![UpdateId(7)]);
    assert_eq!(rs.total(), &ResourceDescription::cpus(1));
    assert_eq!(rs.try_to_launch_blocked(), vec![ActionId(2)]);
}

#[test]
fn reductions_wait_for_free_capacity_and_apply_in_order() {
    let worker = WorkerBuilder::new(1, "w1").cpus(4).dynamic().build();
    let mut rs = ResourceScheduler::new(worker, None, BTreeMap::new());

    assert_eq!(rs.schedule_action(placement(1, 3, Score::default())), Queued::Ready);
    rs.launch(ActionId(1));

    rs.pending_modification(UpdateId(10), ResourceDescription::cpus(2));
    rs.pending_modification(UpdateId(11), ResourceDescription::cpus(1));
    assert!(rs.apply_pending_reductions().is_empty());

    rs.release(ActionId(1));
    assert_eq!(rs.apply_pending_reductions(), vec![UpdateId(10), UpdateId(11)]);
    assert_eq!(rs.total(), &ResourceDescription::cpus(1));
    assert_eq!(rs.available(), &ResourceDescription::cpus(1));
    assert!(!rs.can_be_stopped());

    // Asking for more than is left only removes what exists.
    rs.pending_modification(UpdateId(12), ResourceDescription::cpus(5));
    assert_eq!(rs.apply_pending_reductions(), vec![UpdateId(12)]);
    assert!(rs.total().is_empty());
    assert!(rs.can_be_stopped());
}

#[test]
fn assignment_breaks_ties_towards_lowest_worker_and_implementation() {
    let schedulers: BTreeMap<_, _> = [3u32, 1, 2]
        .into_iter()
        .map(|id| {
            let w = WorkerBuilder::new(id, &format!("w{id}")).cpus(2).build();
            (WorkerId(id), ResourceScheduler::new(w, None, BTreeMap::new()))
        })
        .collect();

    let task = TaskBuilder::new(1, "t")
        .implementation("a", Constraints::cpus(1))
        .implementation("b", Constraints::cpus(1))
        .build();

    let chosen = assign(Score::default(), &task, &schedulers, &[]).unwrap();
    assert_eq!(chosen.worker, WorkerId(1));
    assert_eq!(chosen.implementation, ImplId(0));

    let retry = assign(Score::default(), &task, &schedulers, &[WorkerId(1)]).unwrap();
    assert_eq!(retry.worker, WorkerId(2));
}

#[test]
fn assignment_respects_devices_and_application_binding() {
    let cpu_only = WorkerBuilder::new(1, "cpu").cpus(8).build();
    let gpu_other_app = WorkerBuilder::new(2, "gpu-a").gpus(1).app(7).build();
    let gpu = WorkerBuilder::new(3, "gpu-b").cpus(1).gpus(1).build();
    let schedulers: BTreeMap<_, _> = [cpu_only, gpu_other_app, gpu]
        .into_iter()
        .map(|w| (w.id, ResourceScheduler::new(w, None, BTreeMap::new())))
        .collect();

    let task = TaskBuilder::new(1, "train")
        .implementation("cuda", gpu_constraints())
        .build();
    assert_eq!(
        assign(Score::default(), &task, &schedulers, &[]).unwrap().worker,
        WorkerId(3)
    );

    let nowhere = assign(Score::default(), &task, &schedulers, &[WorkerId(3)]);
    assert!(matches!(
        nowhere,
        Err(taskgrid::errors::TaskgridError::NoCapableWorker(TaskId(1)))
    ));
}
