#![allow(dead_code)]

use taskgrid::config::{
    CloudConfig, ConfigFile, ImplementationConfig, RawConfigFile, TaskConfig, WorkerConfig,
};
use taskgrid::resources::description::{Constraints, ResourceDescription};
use taskgrid::resources::worker::{Worker, WorkerKind};
use taskgrid::task::{Implementation, Parameter, TaskDescription};
use taskgrid::types::{AppId, DataType, DeviceType, Direction, ImplId, TaskId, WorkerId};

/// Builder for `TaskDescription`. Tasks get a one-core implementation
/// named "default" unless implementations are added explicitly.
pub struct TaskBuilder {
    task: TaskDescription,
}

impl TaskBuilder {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            task: TaskDescription::new(TaskId(id), name, AppId(1)),
        }
    }

    pub fn app(mut self, app: u64) -> Self {
        self.task.app_id = AppId(app);
        self
    }

    pub fn priority(mut self) -> Self {
        self.task.priority = true;
        self
    }

    pub fn after(mut self, task: u64) -> Self {
        self.task.after.push(TaskId(task));
        self
    }

    pub fn implementation(mut self, name: &str, constraints: Constraints) -> Self {
        let id = ImplId(self.task.implementations.len() as u32);
        self.task
            .implementations
            .push(Implementation::new(id, name, constraints));
        self
    }

    pub fn reads(mut self, datum: &str) -> Self {
        self.task
            .parameters
            .push(Parameter::new(datum, Direction::In, DataType::File));
        self
    }

    pub fn writes(mut self, datum: &str) -> Self {
        self.task
            .parameters
            .push(Parameter::new(datum, Direction::Out, DataType::File));
        self
    }

    pub fn updates(mut self, datum: &str) -> Self {
        self.task
            .parameters
            .push(Parameter::new(datum, Direction::InOut, DataType::File));
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.task.parameters.push(parameter);
        self
    }

    /// No implementation at all (invalid task).
    pub fn build_bare(self) -> TaskDescription {
        self.task
    }

    pub fn build(mut self) -> TaskDescription {
        if self.task.implementations.is_empty() {
            self.task.implementations.push(Implementation::new(
                ImplId(0),
                "default",
                Constraints::cpus(1),
            ));
        }
        self.task
    }
}

/// Builder for `Worker`.
pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            worker: Worker::new(
                WorkerId(id),
                name,
                ResourceDescription::cpus(1),
                WorkerKind::Static,
            ),
        }
    }

    pub fn cpus(mut self, n: u32) -> Self {
        self.worker.description.compute_units = n;
        self
    }

    pub fn gpus(mut self, n: u32) -> Self {
        self.worker.description.gpus = n;
        self
    }

    pub fn nodes(mut self, n: u32) -> Self {
        self.worker.nodes = n;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.worker.kind = WorkerKind::Dynamic;
        self
    }

    pub fn cloud(mut self, provider: &str) -> Self {
        self.worker.kind = WorkerKind::Cloud {
            provider: provider.to_string(),
        };
        self
    }

    pub fn app(mut self, app: u64) -> Self {
        self.worker.app_id = Some(AppId(app));
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}

/// One-core GPU implementation constraints.
pub fn gpu_constraints() -> Constraints {
    Constraints::default()
        .with_slots(ResourceDescription::new(0, 1, 0, 0))
        .with_device(DeviceType::Gpu)
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_worker(mut self, name: &str, cpus: u32) -> Self {
        self.config.worker.push(WorkerConfig {
            name: name.to_string(),
            description: ResourceDescription::cpus(cpus),
            nodes: 1,
            app: None,
        });
        self
    }

    pub fn with_cloud(mut self, name: &str, cpus: u32, max_vms: usize) -> Self {
        self.config.cloud.insert(
            name.to_string(),
            CloudConfig {
                description: ResourceDescription::cpus(cpus),
                max_vms,
                creation_delay_ms: 0,
            },
        );
        self
    }

    pub fn max_scheduling_attempts(mut self, n: usize) -> Self {
        self.config.scheduler.max_scheduling_attempts = n;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig` with a single one-core implementation.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                after: vec![],
                priority: false,
                app: AppId(1),
                implementation: vec![ImplementationConfig {
                    name: "sh".to_string(),
                    command: Some(cmd.to_string()),
                    constraints: Constraints::cpus(1),
                }],
                parameter: vec![],
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, val: bool) -> Self {
        self.task.priority = val;
        self
    }

    pub fn without_implementations(mut self) -> Self {
        self.task.implementation.clear();
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
