// src/types.rs

//! Small shared value types: identifiers and the enums that appear in both
//! the configuration file and the scheduling core.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Identity of a submitted task.
    TaskId(u64),
    "task#"
);
id_type!(
    /// Identity of one scheduling attempt of a task. Allocated in
    /// submission order, so lower ids were submitted earlier.
    ActionId(u64),
    "action#"
);
id_type!(
    /// Identity of a worker in the pool.
    WorkerId(u32),
    "worker#"
);
id_type!(
    /// Index of an implementation inside its task.
    ImplId(u32),
    "impl#"
);
id_type!(
    /// Owning application.
    AppId(u64),
    "app#"
);
id_type!(
    /// Identity of a job handed to the transport layer.
    JobId(u64),
    "job#"
);
id_type!(
    /// Identity of an elasticity request.
    UpdateId(u64),
    "update#"
);

/// Which scheduling policy drives ready-action ordering.
///
/// - `Fifo`: among equal priority, the action submitted first wins.
/// - `Lifo`: among equal priority, the action submitted last wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Fifo,
    Lifo,
}

impl Default for PolicyKind {
    fn default() -> Self {
        PolicyKind::Fifo
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fifo" => Ok(PolicyKind::Fifo),
            "lifo" => Ok(PolicyKind::Lifo),
            other => Err(format!(
                "invalid scheduling policy: {other} (expected \"fifo\" or \"lifo\")"
            )),
        }
    }
}

/// Parameter direction as declared by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    /// Whether the task reads the previous value of the datum.
    pub fn reads(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    /// Whether the task produces a new value of the datum.
    pub fn writes(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// Data type of a task parameter.
///
/// `Basic` values travel inline with the job and never create dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    File,
    Object,
    /// Persistent object, referenced by id rather than copied.
    Psco,
    ExternalObject,
    Stream,
    Basic,
}

impl DataType {
    pub fn is_dependency(self) -> bool {
        !matches!(self, DataType::Basic)
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::File
    }
}

/// Processor type an implementation must run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Gpu,
    Fpga,
    Other,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Cpu
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(DeviceType::Cpu),
            "gpu" => Ok(DeviceType::Gpu),
            "fpga" => Ok(DeviceType::Fpga),
            "other" => Ok(DeviceType::Other),
            other => Err(format!(
                "invalid device type: {other} (expected cpu, gpu, fpga or other)"
            )),
        }
    }
}
