// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::resources::description::{Constraints, ResourceDescription};
use crate::types::{AppId, DataType, Direction, PolicyKind};

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [scheduler]
/// policy = "fifo"
/// max_scheduling_attempts = 2
///
/// [[worker]]
/// name = "node1"
/// compute_units = 4
///
/// [cloud.sim]
/// compute_units = 2
/// max_vms = 3
///
/// [task.prepare]
/// [[task.prepare.implementation]]
/// name = "sh"
/// command = "echo prepare"
///
/// [task.train]
/// after = ["prepare"]
/// [[task.train.implementation]]
/// name = "gpu"
/// command = "echo train"
/// gpus = 1
/// device = "gpu"
///
/// [profile."train.gpu"]
/// average_ms = 1500
/// ```
///
/// Use [`ConfigFile::try_from`] (or [`load_and_validate`]) to obtain a
/// validated [`ConfigFile`].
///
/// [`load_and_validate`]: crate::config::loader::load_and_validate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Static workers from `[[worker]]`.
    #[serde(default)]
    pub worker: Vec<WorkerConfig>,

    /// Simulated cloud providers from `[cloud.<name>]`.
    #[serde(default)]
    pub cloud: BTreeMap<String, CloudConfig>,

    /// Demo workload from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Default execution profiles from `[profile."<task>.<implementation>"]`.
    #[serde(default)]
    pub profile: BTreeMap<String, ProfileConfig>,
}

/// Validated configuration.
///
/// Fields are read-only; construction goes through `TryFrom<RawConfigFile>`
/// so every `ConfigFile` in the program has passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub worker: Vec<WorkerConfig>,
    pub cloud: BTreeMap<String, CloudConfig>,
    pub task: BTreeMap<String, TaskConfig>,
    pub profile: BTreeMap<String, ProfileConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            scheduler: raw.scheduler,
            worker: raw.worker,
            cloud: raw.cloud,
            task: raw.task,
            profile: raw.profile,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerSection {
    #[serde(default)]
    pub policy: PolicyKind,

    /// Dispatch attempts per action, first attempt included.
    #[serde(default = "default_max_scheduling_attempts")]
    pub max_scheduling_attempts: usize,

    /// How long a caller waits for an elasticity request.
    #[serde(default = "default_resource_update_timeout_ms")]
    pub resource_update_timeout_ms: u64,

    /// Capacity of the dispatcher request channel.
    #[serde(default = "default_request_queue_length")]
    pub request_queue_length: usize,
}

fn default_max_scheduling_attempts() -> usize {
    crate::engine::DEFAULT_MAX_SCHEDULING_ATTEMPTS
}

fn default_resource_update_timeout_ms() -> u64 {
    30_000
}

fn default_request_queue_length() -> usize {
    256
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            max_scheduling_attempts: default_max_scheduling_attempts(),
            resource_update_timeout_ms: default_resource_update_timeout_ms(),
            request_queue_length: default_request_queue_length(),
        }
    }
}

/// One `[[worker]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    pub name: String,

    #[serde(flatten)]
    pub description: ResourceDescription,

    #[serde(default = "default_nodes")]
    pub nodes: u32,

    /// Reserve the worker for one application.
    #[serde(default)]
    pub app: Option<AppId>,
}

fn default_nodes() -> u32 {
    1
}

/// `[cloud.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudConfig {
    /// Instance type handed out for requests without an explicit size.
    #[serde(flatten)]
    pub description: ResourceDescription,

    #[serde(default = "default_max_vms")]
    pub max_vms: usize,

    #[serde(default)]
    pub creation_delay_ms: u64,
}

fn default_max_vms() -> usize {
    1
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskConfig {
    /// Tasks that must finish before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub priority: bool,

    #[serde(default = "default_app")]
    pub app: AppId,

    #[serde(default)]
    pub implementation: Vec<ImplementationConfig>,

    #[serde(default)]
    pub parameter: Vec<ParameterConfig>,
}

fn default_app() -> AppId {
    AppId(1)
}

/// `[[task.<name>.implementation]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImplementationConfig {
    pub name: String,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(flatten)]
    pub constraints: Constraints,
}

/// `[[task.<name>.parameter]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParameterConfig {
    pub name: String,
    pub direction: Direction,
    #[serde(default, rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub prefix: Option<String>,
}

/// `[profile."<task>.<implementation>"]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProfileConfig {
    pub average_ms: u64,
}
