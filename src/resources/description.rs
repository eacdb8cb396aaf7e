// src/resources/description.rs

//! Capacity descriptions and implementation constraints.

use std::fmt;

use serde::Deserialize;

use crate::types::DeviceType;

/// Slot counts per resource category.
///
/// Used both as a worker's capacity and as the amount an implementation
/// consumes while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceDescription {
    /// General compute units (cores).
    #[serde(default)]
    pub compute_units: u32,
    #[serde(default)]
    pub gpus: u32,
    #[serde(default)]
    pub fpgas: u32,
    /// Any other accelerator.
    #[serde(default)]
    pub others: u32,
}

impl ResourceDescription {
    pub fn new(compute_units: u32, gpus: u32, fpgas: u32, others: u32) -> Self {
        Self {
            compute_units,
            gpus,
            fpgas,
            others,
        }
    }

    /// Compute units only.
    pub fn cpus(compute_units: u32) -> Self {
        Self::new(compute_units, 0, 0, 0)
    }

    /// Whether every category holds zero slots.
    pub fn is_empty(&self) -> bool {
        self.compute_units == 0 && self.gpus == 0 && self.fpgas == 0 && self.others == 0
    }

    /// Whether `other` fits entirely inside `self`.
    pub fn contains(&self, other: &ResourceDescription) -> bool {
        self.compute_units >= other.compute_units
            && self.gpus >= other.gpus
            && self.fpgas >= other.fpgas
            && self.others >= other.others
    }

    pub fn increase(&mut self, delta: &ResourceDescription) {
        self.compute_units += delta.compute_units;
        self.gpus += delta.gpus;
        self.fpgas += delta.fpgas;
        self.others += delta.others;
    }

    /// Subtract `delta`, clamping every category at zero.
    pub fn reduce(&mut self, delta: &ResourceDescription) {
        self.compute_units = self.compute_units.saturating_sub(delta.compute_units);
        self.gpus = self.gpus.saturating_sub(delta.gpus);
        self.fpgas = self.fpgas.saturating_sub(delta.fpgas);
        self.others = self.others.saturating_sub(delta.others);
    }

    /// Whether the description offers at least one slot of the given device.
    pub fn has_device(&self, device: DeviceType) -> bool {
        match device {
            DeviceType::Cpu => self.compute_units > 0,
            DeviceType::Gpu => self.gpus > 0,
            DeviceType::Fpga => self.fpgas > 0,
            DeviceType::Other => self.others > 0,
        }
    }
}

impl fmt::Display for ResourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[cu={} gpu={} fpga={} other={}]",
            self.compute_units, self.gpus, self.fpgas, self.others
        )
    }
}

/// Requirements an implementation places on the worker that runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Constraints {
    /// Slots reserved for the duration of the job.
    #[serde(flatten)]
    pub slots: ResourceDescription,
    /// Number of nodes the job spans. A worker advertises how many nodes it
    /// groups; this is checked, never consumed.
    #[serde(default = "default_nodes")]
    pub nodes: u32,
    #[serde(default)]
    pub device: DeviceType,
}

fn default_nodes() -> u32 {
    1
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            slots: ResourceDescription::cpus(1),
            nodes: 1,
            device: DeviceType::Cpu,
        }
    }
}

impl Constraints {
    pub fn cpus(compute_units: u32) -> Self {
        Self {
            slots: ResourceDescription::cpus(compute_units),
            ..Self::default()
        }
    }

    pub fn with_device(mut self, device: DeviceType) -> Self {
        self.device = device;
        self
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_slots(mut self, slots: ResourceDescription) -> Self {
        self.slots = slots;
        self
    }
}
