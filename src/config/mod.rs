// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a file from disk and turning a validated config
//!   into workers, providers, profiles and task descriptors.
//! - `validate.rs`: semantic checks (capacity, implementations, DAG).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    CloudConfig, ConfigFile, ImplementationConfig, ParameterConfig, ProfileConfig, RawConfigFile,
    SchedulerSection, TaskConfig, WorkerConfig,
};
pub use validate::validate_config;
