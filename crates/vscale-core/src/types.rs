//! Shared types used across vscale crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scaling state owned by the control loop.
///
/// Replaced once per iteration with the policy's output; never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingState {
    /// vCPUs currently believed to be plugged into the guest.
    pub cpu_count: u32,
    /// Consecutive high-idle readings seen since the last reset.
    pub high_idle_streak: u32,
}

impl ScalingState {
    /// A fresh state with the given vCPU count and no streak.
    pub fn new(cpu_count: u32) -> Self {
        Self {
            cpu_count,
            high_idle_streak: 0,
        }
    }
}

impl fmt::Display for ScalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpus={} streak={}", self.cpu_count, self.high_idle_streak)
    }
}

/// One guest idle-percentage observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IdleReading {
    /// Idle percentage, notionally in `[0, 100]`.
    Percent(f64),
    /// Sampling or parsing failed this cycle.
    Unavailable,
}

impl IdleReading {
    pub fn percent(&self) -> Option<f64> {
        match self {
            IdleReading::Percent(v) => Some(*v),
            IdleReading::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, IdleReading::Percent(_))
    }
}

impl From<Option<f64>> for IdleReading {
    fn from(value: Option<f64>) -> Self {
        value.map_or(IdleReading::Unavailable, IdleReading::Percent)
    }
}

/// What the policy wants done with the vCPU count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalingDecision {
    /// Hot-plug one more vCPU.
    ScaleUp,
    /// Unplug the highest-indexed vCPU.
    ScaleDown,
    /// Leave the guest alone.
    NoOp,
}

impl ScalingDecision {
    pub fn is_action(&self) -> bool {
        !matches!(self, ScalingDecision::NoOp)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScalingDecision::ScaleUp => "scale-up",
            ScalingDecision::ScaleDown => "scale-down",
            ScalingDecision::NoOp => "no-op",
        }
    }
}

impl fmt::Display for ScalingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
