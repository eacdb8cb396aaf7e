// tests/data_analysis.rs

use std::collections::{BTreeMap, BTreeSet};

use taskgrid::dag::{ActionGraph, ActionState};
use taskgrid::engine::Request;
use taskgrid::resources::description::{Constraints, ResourceDescription};
use taskgrid::scheduler::{Placement, Queued, ReadyList, ResourceScheduler, Score};
use taskgrid::task::{DataAnalyser, Parameter};
use taskgrid::types::{ActionId, AppId, DataType, Direction, ImplId, PolicyKind, TaskId, WorkerId};
use taskgrid_test_utils::builders::{TaskBuilder, WorkerBuilder};
use taskgrid_test_utils::{core_with_workers, dispatched};

fn file(name: &str, direction: Direction) -> Parameter {
    Parameter::new(name, direction, DataType::File)
}

#[test]
fn readers_wait_for_the_latest_writer_only() {
    let mut analyser = DataAnalyser::new();
    let (w1, w2, r) = (ActionId(1), ActionId(2), ActionId(3));

    assert!(analyser.analyse(w1, &[file("d", Direction::Out)]).is_empty());
    // A second writer does not wait for the first one.
    assert!(analyser.analyse(w2, &[file("d", Direction::Out)]).is_empty());
    assert_eq!(analyser.last_writer("d"), Some(w2));

    let deps = analyser.analyse(r, &[file("d", Direction::In)]);
    assert_eq!(deps, BTreeSet::from([w2]));
}

#[test]
fn inout_reads_previous_version_and_becomes_the_writer() {
    let mut analyser = DataAnalyser::new();
    analyser.analyse(ActionId(1), &[file("model", Direction::Out)]);

    let deps = analyser.analyse(ActionId(2), &[file("model", Direction::InOut)]);

    assert_eq!(deps, BTreeSet::from([ActionId(1)]));
    assert_eq!(analyser.last_writer("model"), Some(ActionId(2)));
    assert_eq!(analyser.tracked_data(), 1);
}

#[test]
fn basic_values_and_streams_create_no_dependencies() {
    let mut analyser = DataAnalyser::new();
    let mut stream = file("events", Direction::Out);
    stream.stream = true;

    analyser.analyse(
        ActionId(1),
        &[
            Parameter::new("n", Direction::Out, DataType::Basic),
            stream.clone(),
            Parameter::new("pipe", Direction::Out, DataType::Stream),
        ],
    );

    let mut reader = stream;
    reader.direction = Direction::In;
    let deps = analyser.analyse(
        ActionId(2),
        &[
            Parameter::new("n", Direction::In, DataType::Basic),
            reader,
            Parameter::new("pipe", Direction::In, DataType::Stream),
        ],
    );

    assert!(deps.is_empty());
    assert_eq!(analyser.tracked_data(), 0);
}

#[test]
fn completed_writer_no_longer_blocks_readers() {
    let mut analyser = DataAnalyser::new();
    analyser.analyse(ActionId(1), &[file("out.csv", Direction::Out)]);

    analyser.data_available(ActionId(1));

    assert_eq!(analyser.last_writer("out.csv"), None);
    assert!(analyser
        .analyse(ActionId(2), &[file("out.csv", Direction::In)])
        .is_empty());
}

#[test]
fn superseded_writer_finishing_keeps_newer_version() {
    let mut analyser = DataAnalyser::new();
    analyser.analyse(ActionId(1), &[file("d", Direction::Out)]);
    analyser.analyse(ActionId(2), &[file("d", Direction::Out)]);

    analyser.data_available(ActionId(1));

    assert_eq!(analyser.last_writer("d"), Some(ActionId(2)));
}

#[test]
fn ready_list_orders_by_score_then_id() {
    let mut list = ReadyList::new();
    list.insert(ActionId(3), Score::new(0, -3, 0, 0));
    list.insert(ActionId(1), Score::new(0, -1, 0, 0));
    list.insert(ActionId(2), Score::new(1, -2, 0, 0));
    list.insert(ActionId(5), Score::new(0, -3, 0, 0));

    let order: Vec<_> = list.iter().map(|(a, _)| a).collect();
    assert_eq!(order, vec![ActionId(2), ActionId(1), ActionId(3), ActionId(5)]);

    // Re-inserting moves the entry instead of duplicating it.
    list.insert(ActionId(5), Score::new(2, 0, 0, 0));
    assert_eq!(list.len(), 4);
    assert_eq!(list.iter().next().map(|(a, _)| a), Some(ActionId(5)));

    assert!(list.remove(ActionId(1)));
    assert!(!list.contains(ActionId(1)));
    assert_eq!(list.drain().len(), 3);
    assert!(list.is_empty());
}

#[test]
fn unscheduling_from_a_worker_frees_capacity_and_successors() {
    let mut graph = ActionGraph::new();
    let a = graph.register(TaskId(1), AppId(1), 0);
    let b = graph.register(TaskId(2), AppId(1), 0);
    assert!(graph.add_successor(b, a).unwrap());
    assert_eq!(graph.state(b), Some(ActionState::Blocked));

    let worker = WorkerBuilder::new(1, "w1").cpus(2).build();
    let mut rs = ResourceScheduler::new(worker, None, BTreeMap::new());
    let placed = rs.schedule_action(Placement {
        action: a,
        implementation: ImplId(0),
        constraints: Constraints::cpus(2),
        score: Score::default(),
    });
    assert_eq!(placed, Queued::Ready);
    assert_eq!(rs.available(), &ResourceDescription::cpus(0));

    let freed = rs.unschedule_action(&mut graph, a).unwrap();

    assert_eq!(freed, vec![b]);
    assert_eq!(rs.hosted_actions(), 0);
    assert_eq!(rs.available(), &ResourceDescription::cpus(2));
    assert!(graph.is_executable(b));
}

#[test]
fn retried_action_remembers_where_it_ran() {
    let mut core = core_with_workers(
        PolicyKind::Fifo,
        vec![
            WorkerBuilder::new(1, "w1").build(),
            WorkerBuilder::new(2, "w2").build(),
        ],
    );
    let out = core.step(Request::NewTask {
        task: TaskBuilder::new(1, "flaky").build(),
    });
    let first = dispatched(&out.commands)[0].id;

    let retry = core.step(Request::JobFailed {
        job_id: first,
        cause: "exit status 2".to_string(),
    });

    let action = core.action_of(TaskId(1)).unwrap();
    let record = core.graph().get(action).unwrap();
    assert!(record.has_run_on(WorkerId(1)));
    assert!(record.has_run_on(WorkerId(2)));
    assert_eq!(record.attempts(), 2);
    assert_eq!(dispatched(&retry.commands)[0].worker.id, WorkerId(2));
}
