// src/scheduler/profile.rs

//! Execution-time statistics per implementation.

use std::time::Duration;

/// Running statistics of completed executions.
///
/// A profile with no executions reports the configured default average, so
/// fresh workers still rank implementations sensibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    executions: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    default_average: Duration,
}

impl Default for Profile {
    fn default() -> Self {
        Self::with_default(Duration::ZERO)
    }
}

impl Profile {
    pub fn with_default(default_average: Duration) -> Self {
        Self {
            executions: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            default_average,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        self.executions += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    /// Fold another profile's observations into this one.
    pub fn accumulate(&mut self, other: &Profile) {
        if other.executions == 0 {
            return;
        }
        self.executions += other.executions;
        self.total += other.total;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub fn average(&self) -> Duration {
        match u32::try_from(self.executions) {
            Ok(0) => self.default_average,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.executions as f64),
        }
    }

    pub fn min(&self) -> Option<Duration> {
        (self.executions > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<Duration> {
        (self.executions > 0).then_some(self.max)
    }
}
