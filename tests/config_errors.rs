// tests/config_errors.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use taskgrid::config::{ConfigFile, load_and_validate, validate_config};
use taskgrid::errors::TaskgridError;
use taskgrid::resources::description::ResourceDescription;
use taskgrid::resources::worker::WorkerKind;
use taskgrid::types::{AppId, DeviceType, Direction, ImplId, PolicyKind, TaskId, WorkerId};
use taskgrid_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(result: Result<ConfigFile, TaskgridError>) -> String {
    match result {
        Err(TaskgridError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_dag_cycle_returns_structured_error() {
    let file = write_config(
        r#"
[task.A]
after = ["B"]
[[task.A.implementation]]
name = "sh"
command = "echo A"

[task.B]
after = ["A"]
[[task.B.implementation]]
name = "sh"
command = "echo B"
"#,
    );

    let result = load_and_validate(file.path());

    match result {
        Err(TaskgridError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("A") || msg.contains("B"));
        }
        Err(e) => panic!("Expected DagCycle error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_dependency_returns_config_error() {
    let file = write_config(
        r#"
[task.A]
after = ["NonExistent"]
[[task.A.implementation]]
name = "sh"
command = "echo A"
"#,
    );

    let msg = expect_config_error(load_and_validate(file.path()));
    assert!(msg.contains("unknown dependency"));
    assert!(msg.contains("NonExistent"));
}

#[test]
fn test_self_dependency_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("echo A").after("A").build())
        .raw();

    let msg = expect_config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("cannot depend on itself"));
}

#[test]
fn test_empty_config_is_rejected() {
    let file = write_config("[scheduler]\npolicy = \"lifo\"\n");

    let msg = expect_config_error(load_and_validate(file.path()));
    assert!(msg.contains("at least one"));
}

#[test]
fn test_task_without_implementation_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("lonely", TaskConfigBuilder::new("true").without_implementations().build())
        .raw();

    let err = validate_config(&raw).unwrap_err();
    assert!(matches!(err, TaskgridError::ConfigError(ref msg) if msg.contains("lonely")));
}

#[test]
fn test_zero_scheduling_attempts_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("echo A").build())
        .max_scheduling_attempts(0)
        .raw();

    let msg = expect_config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("max_scheduling_attempts"));
}

#[test]
fn test_duplicate_worker_names_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("echo A").build())
        .with_worker("node", 2)
        .with_worker("node", 4)
        .raw();

    let msg = expect_config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("duplicate worker name 'node'"));
}

#[test]
fn test_cloud_provider_needs_a_quota() {
    let raw = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("echo A").build())
        .with_cloud("sim", 2, 0)
        .raw();

    let msg = expect_config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("sim"));
}

#[test]
fn test_malformed_toml_is_reported() {
    let file = write_config("[task.A\nafter = ");

    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(TaskgridError::TomlError(_))));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = load_and_validate(dir.path().join("Taskgrid.toml"));
    assert!(matches!(result, Err(TaskgridError::IoError(_))));
}

#[test]
fn test_full_config_maps_to_runtime_types() {
    let file = write_config(
        r#"
[scheduler]
policy = "lifo"
max_scheduling_attempts = 3
resource_update_timeout_ms = 1500

[[worker]]
name = "big"
compute_units = 8

[[worker]]
name = "accel"
compute_units = 2
gpus = 1
nodes = 2
app = 7

[cloud.sim]
compute_units = 4
max_vms = 2
creation_delay_ms = 250

[task.train]
after = ["prepare"]
priority = true

[[task.train.implementation]]
name = "cpu"
command = "echo cpu"
compute_units = 4

[[task.train.implementation]]
name = "cuda"
command = "echo cuda"
gpus = 1
device = "gpu"

[[task.train.parameter]]
name = "dataset.bin"
direction = "in"

[task.prepare]
[[task.prepare.implementation]]
name = "sh"
command = "echo prepare"

[[task.prepare.parameter]]
name = "dataset.bin"
direction = "out"

[profile."train.cuda"]
average_ms = 1200
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.scheduler.policy, PolicyKind::Lifo);
    assert_eq!(cfg.scheduler.max_scheduling_attempts, 3);
    assert_eq!(cfg.update_timeout(), Duration::from_millis(1500));

    let workers = cfg.static_workers();
    assert_eq!(workers.len(), 2);
    assert_eq!(workers[0].id, WorkerId(1));
    assert_eq!(workers[0].name, "big");
    assert_eq!(workers[1].id, WorkerId(2));
    assert_eq!(workers[1].description, ResourceDescription::new(2, 1, 0, 0));
    assert_eq!(workers[1].nodes, 2);
    assert_eq!(workers[1].app_id, Some(AppId(7)));
    assert!(workers.iter().all(|w| w.kind == WorkerKind::Static));

    let providers = cfg.provider_settings();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].name, "sim");
    assert_eq!(providers[0].instance, ResourceDescription::cpus(4));
    assert_eq!(providers[0].max_vms, 2);
    assert_eq!(providers[0].creation_delay, Duration::from_millis(250));

    let profiles = cfg.profiles();
    assert_eq!(profiles["train.cuda"].average(), Duration::from_millis(1200));

    // Dependencies are submitted first.
    let tasks = cfg.task_descriptions();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].name, "prepare");
    assert_eq!(tasks[0].id, TaskId(1));
    assert_eq!(tasks[1].name, "train");
    assert_eq!(tasks[1].after, vec![TaskId(1)]);
    assert!(tasks[1].priority);

    let cuda = tasks[1].implementation(ImplId(1)).unwrap();
    assert_eq!(cuda.name, "cuda");
    assert_eq!(cuda.constraints.device, DeviceType::Gpu);
    assert_eq!(cuda.constraints.slots.gpus, 1);
    assert_eq!(cuda.command.as_deref(), Some("echo cuda"));
    assert_eq!(tasks[1].parameters[0].direction, Direction::In);
}

#[test]
fn test_builder_defaults_produce_a_valid_config() {
    let cfg = ConfigFileBuilder::new()
        .with_task("A", TaskConfigBuilder::new("echo A").build())
        .with_task("B", TaskConfigBuilder::new("echo B").after("A").priority(true).build())
        .with_worker("w1", 1)
        .build();

    assert_eq!(cfg.scheduler.policy, PolicyKind::Fifo);
    let names: Vec<_> = cfg.task_descriptions().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["A", "B"]);
}
