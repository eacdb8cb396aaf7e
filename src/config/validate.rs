// src/config/validate.rs

use std::collections::BTreeSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskgridError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskgridError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Run every check against an unvalidated config.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_scheduler(cfg)?;
    validate_workers(cfg)?;
    validate_cloud(cfg)?;
    validate_implementations(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> TaskgridError {
    TaskgridError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<name>] section",
        ));
    }
    Ok(())
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.scheduler;
    if s.max_scheduling_attempts == 0 {
        return Err(config_error(
            "[scheduler].max_scheduling_attempts must be >= 1 (got 0)",
        ));
    }
    if s.request_queue_length == 0 {
        return Err(config_error(
            "[scheduler].request_queue_length must be >= 1 (got 0)",
        ));
    }
    if s.resource_update_timeout_ms == 0 {
        return Err(config_error(
            "[scheduler].resource_update_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_workers(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = BTreeSet::new();
    for w in &cfg.worker {
        if !seen.insert(w.name.as_str()) {
            return Err(config_error(format!("duplicate worker name '{}'", w.name)));
        }
        if w.description.is_empty() {
            return Err(config_error(format!(
                "worker '{}' declares no capacity",
                w.name
            )));
        }
        if w.nodes == 0 {
            return Err(config_error(format!("worker '{}' must have nodes >= 1", w.name)));
        }
    }
    Ok(())
}

fn validate_cloud(cfg: &RawConfigFile) -> Result<()> {
    for (name, c) in &cfg.cloud {
        if c.description.is_empty() {
            return Err(config_error(format!(
                "cloud provider '{name}' declares an empty instance type"
            )));
        }
        if c.max_vms == 0 {
            return Err(config_error(format!(
                "cloud provider '{name}' must allow at least one VM"
            )));
        }
    }
    Ok(())
}

fn validate_implementations(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in &cfg.task {
        if task.implementation.is_empty() {
            return Err(config_error(format!(
                "task '{name}' declares no [[task.{name}.implementation]]"
            )));
        }
        let mut seen = BTreeSet::new();
        for imp in &task.implementation {
            if !seen.insert(imp.name.as_str()) {
                return Err(config_error(format!(
                    "task '{name}' declares implementation '{}' twice",
                    imp.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(config_error(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(config_error(format!(
                    "task '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => Err(TaskgridError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}

/// Task names in an order where every task follows its `after` list.
pub fn submission_order(cfg: &ConfigFile) -> Vec<String> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }
    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(str::to_string).collect(),
        // Validated configs are acyclic.
        Err(_) => cfg.task.keys().cloned().collect(),
    }
}
