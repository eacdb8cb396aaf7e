// src/config/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::validate::submission_order;
use crate::errors::Result;
use crate::resources::provider::ProviderSettings;
use crate::resources::worker::{Worker, WorkerKind};
use crate::scheduler::profile::Profile;
use crate::task::{Implementation, Parameter, TaskDescription};
use crate::types::{ImplId, TaskId, WorkerId};

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Read, deserialize and validate a config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(path)?;
    ConfigFile::try_from(raw)
}

impl ConfigFile {
    /// `[[worker]]` entries as static workers, ids assigned in file order.
    pub fn static_workers(&self) -> Vec<Worker> {
        self.worker
            .iter()
            .zip(1u32..)
            .map(|(w, id)| {
                Worker::new(WorkerId(id), w.name.clone(), w.description, WorkerKind::Static)
                    .with_nodes(w.nodes)
                    .with_app(w.app)
            })
            .collect()
    }

    pub fn provider_settings(&self) -> Vec<ProviderSettings> {
        self.cloud
            .iter()
            .map(|(name, c)| ProviderSettings {
                name: name.clone(),
                instance: c.description,
                max_vms: c.max_vms,
                creation_delay: Duration::from_millis(c.creation_delay_ms),
            })
            .collect()
    }

    pub fn profiles(&self) -> BTreeMap<String, Profile> {
        self.profile
            .iter()
            .map(|(sig, p)| {
                (
                    sig.clone(),
                    Profile::with_default(Duration::from_millis(p.average_ms)),
                )
            })
            .collect()
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler.resource_update_timeout_ms)
    }

    /// The configured workload as task descriptors, in an order where every
    /// task comes after the tasks in its `after` list.
    pub fn task_descriptions(&self) -> Vec<TaskDescription> {
        let order = submission_order(self);
        let ids: BTreeMap<&str, TaskId> = order
            .iter()
            .zip(1u64..)
            .map(|(name, id)| (name.as_str(), TaskId(id)))
            .collect();

        order
            .iter()
            .filter_map(|name| {
                let cfg = self.task.get(name)?;
                let id = *ids.get(name.as_str())?;
                let mut task = TaskDescription::new(id, name.clone(), cfg.app);
                task.priority = cfg.priority;
                task.after = cfg
                    .after
                    .iter()
                    .filter_map(|dep| ids.get(dep.as_str()).copied())
                    .collect();
                task.implementations = cfg
                    .implementation
                    .iter()
                    .zip(0u32..)
                    .map(|(imp, i)| Implementation {
                        id: ImplId(i),
                        name: imp.name.clone(),
                        constraints: imp.constraints,
                        command: imp.command.clone(),
                    })
                    .collect();
                task.parameters = cfg
                    .parameter
                    .iter()
                    .map(|p| Parameter {
                        name: p.name.clone(),
                        direction: p.direction,
                        data_type: p.data_type,
                        stream: p.stream,
                        prefix: p.prefix.clone(),
                    })
                    .collect();
                Some(task)
            })
            .collect()
    }
}
