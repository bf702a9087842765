//! Scaling policy — the hysteresis state machine.
//!
//! Pure: no I/O, no clocks. The control loop hands in the current state and
//! the cycle's reading and gets back the decision plus the next state.

use tracing::debug;

use vscale_core::{IdleReading, ScalingConfig, ScalingDecision, ScalingState};

/// Thresholds and bounds for the vCPU hysteresis policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub min_cpus: u32,
    pub max_cpus: u32,
    pub low_idle_threshold: f64,
    pub high_idle_threshold: f64,
    pub high_idle_streak_limit: u32,
}

impl ScalingPolicy {
    pub fn new(config: &ScalingConfig) -> Self {
        Self {
            min_cpus: config.min_cpus,
            max_cpus: config.max_cpus,
            low_idle_threshold: config.low_idle_threshold,
            high_idle_threshold: config.high_idle_threshold,
            high_idle_streak_limit: config.high_idle_streak_limit,
        }
    }

    /// Decide what to do with `idle` given `state`.
    ///
    /// Thresholds are exclusive: a reading equal to either one is neutral.
    pub fn decide(
        &self,
        state: ScalingState,
        idle: IdleReading,
    ) -> (ScalingDecision, ScalingState) {
        let idle = match idle {
            IdleReading::Percent(v) => v,
            IdleReading::Unavailable => return (ScalingDecision::NoOp, state),
        };

        if idle < self.low_idle_threshold && state.cpu_count < self.max_cpus {
            return (ScalingDecision::ScaleUp, ScalingState::new(state.cpu_count + 1));
        }

        if idle > self.high_idle_threshold && state.cpu_count > self.min_cpus {
            let streak = state.high_idle_streak + 1;
            if streak >= self.high_idle_streak_limit {
                return (
                    ScalingDecision::ScaleDown,
                    ScalingState::new(state.cpu_count - 1),
                );
            }
            debug!(
                idle,
                streak,
                limit = self.high_idle_streak_limit,
                "high idle, waiting for streak"
            );
            return (
                ScalingDecision::NoOp,
                ScalingState {
                    cpu_count: state.cpu_count,
                    high_idle_streak: streak,
                },
            );
        }

        (ScalingDecision::NoOp, ScalingState::new(state.cpu_count))
    }
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::new(&ScalingConfig::default())
    }
}
