//! Control loop — sample, decide, act, sleep.
//!
//! The loop owns the only `ScalingState`. Every failure inside a cycle is
//! logged and swallowed; the loop only stops when the shutdown channel
//! fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vscale_core::{IdleReading, ScalingDecision, ScalingState, VscaleConfig};
use vscale_hypervisor::{Actuator, CommandRunner, MetricsSampler};

use crate::policy::ScalingPolicy;

/// What happened during one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutcome {
    pub reading: IdleReading,
    pub decision: ScalingDecision,
    /// State after the cycle, including any rollback.
    pub state: ScalingState,
    /// The actuation failed and the state was restored.
    pub rolled_back: bool,
}

pub struct ControlLoop {
    sampler: MetricsSampler,
    actuator: Actuator,
    policy: ScalingPolicy,
    state: ScalingState,
    interval: Duration,
}

impl ControlLoop {
    pub fn new(
        sampler: MetricsSampler,
        actuator: Actuator,
        policy: ScalingPolicy,
        initial: ScalingState,
        interval: Duration,
    ) -> Self {
        Self {
            sampler,
            actuator,
            policy,
            state: initial,
            interval,
        }
    }

    /// Wire a loop from a validated config and a command runner.
    pub fn from_config(
        runner: Arc<dyn CommandRunner>,
        config: &VscaleConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self::new(
            MetricsSampler::new(runner.clone(), &config.vm),
            Actuator::new(runner, &config.vm),
            ScalingPolicy::new(&config.scaling),
            config.scaling.initial_state(),
            config.scaling.check_interval()?,
        ))
    }

    pub fn state(&self) -> ScalingState {
        self.state
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Enable metric collection on the hypervisor.
    ///
    /// A failure is logged and otherwise ignored: the first queries will
    /// simply come back empty until collection is running.
    pub async fn setup(&self) {
        if let Err(e) = self.sampler.setup().await {
            warn!(error = %e, "metrics setup failed, continuing");
        }
    }

    /// Sample and parse, folding any failure into `Unavailable`.
    pub async fn observe(&self) -> IdleReading {
        match self.sampler.read_idle().await {
            Ok(idle) => IdleReading::Percent(idle),
            Err(e) => {
                warn!(error = %e, "idle reading unavailable");
                IdleReading::Unavailable
            }
        }
    }

    /// Run a single sample → decide → act cycle.
    pub async fn step(&mut self) -> CycleOutcome {
        let reading = self.observe().await;
        let before = self.state;

        if let Some(idle) = reading.percent() {
            info!(idle, cpus = before.cpu_count, "idle sampled");
        }

        let (decision, next) = self.policy.decide(before, reading);
        self.state = next;

        let mut rolled_back = false;
        if decision.is_action() {
            match self.actuator.apply(decision, before.cpu_count).await {
                Ok(()) => {
                    info!(
                        %decision,
                        from = before.cpu_count,
                        to = next.cpu_count,
                        "vCPU count changed"
                    );
                }
                Err(e) => {
                    warn!(
                        %decision,
                        cpus = before.cpu_count,
                        error = %e,
                        "actuation failed, keeping previous state"
                    );
                    self.state = before;
                    rolled_back = true;
                }
            }
        } else {
            debug!(state = %self.state, "no scaling action");
        }

        CycleOutcome {
            reading,
            decision,
            state: self.state,
            rolled_back,
        }
    }

    /// Run the control loop until `shutdown` fires.
    ///
    /// The delay is measured from the end of one cycle to the start of the
    /// next, so slow commands stretch the effective period.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.interval,
            state = %self.state,
            "control loop started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!(state = %self.state, "control loop shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscale_hypervisor::ScriptedRunner;

    fn idle_line(v: f64) -> String {
        format!("cicc2_group06   Guest/CPU/Load/Idle  {v:.2}%\n")
    }

    fn control(runner: &Arc<ScriptedRunner>, config: &VscaleConfig) -> ControlLoop {
        ControlLoop::from_config(runner.clone(), config).unwrap()
    }

    fn fast_config() -> VscaleConfig {
        let mut config = VscaleConfig::default();
        config.scaling.check_interval = "10ms".to_string();
        config
    }

    #[tokio::test]
    async fn low_idle_plugs_a_cpu() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query(idle_line(60.0));
        let mut ctl = control(&runner, &fast_config());

        let out = ctl.step().await;
        assert_eq!(out.reading, IdleReading::Percent(60.0));
        assert_eq!(out.decision, ScalingDecision::ScaleUp);
        assert_eq!(out.state, ScalingState::new(2));
        assert!(!out.rolled_back);
        assert_eq!(
            runner.actuations(),
            vec![vec!["VBoxManage", "controlvm", "cicc2_group06", "plugcpu", "1"]]
        );
    }

    #[tokio::test]
    async fn failed_query_changes_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query_failure(1, "VBoxManage: error: not running\n");
        let mut ctl = control(&runner, &fast_config());

        let out = ctl.step().await;
        assert_eq!(out.reading, IdleReading::Unavailable);
        assert_eq!(out.decision, ScalingDecision::NoOp);
        assert_eq!(ctl.state(), ScalingState::new(1));
        assert!(runner.actuations().is_empty());
    }

    #[tokio::test]
    async fn unparsable_sample_does_not_scale_up() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query("Object Metric Values\n");
        let mut ctl = control(&runner, &fast_config());

        let out = ctl.step().await;
        assert_eq!(out.decision, ScalingDecision::NoOp);
        assert!(runner.actuations().is_empty());
    }

    #[tokio::test]
    async fn actuation_failure_rolls_back() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query(idle_line(10.0));
        runner.push_actuation_failure(1, "VBoxManage: error: hot-plug disabled\n");
        let mut ctl = control(&runner, &fast_config());

        let out = ctl.step().await;
        assert_eq!(out.decision, ScalingDecision::ScaleUp);
        assert!(out.rolled_back);
        assert_eq!(ctl.state(), ScalingState::new(1));
    }

    #[tokio::test]
    async fn scale_down_after_streak() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut config = fast_config();
        config.scaling.initial_cpus = Some(3);
        runner.push_query(idle_line(95.0));
        runner.push_query(idle_line(95.0));
        let mut ctl = control(&runner, &config);

        let first = ctl.step().await;
        assert_eq!(first.decision, ScalingDecision::NoOp);
        assert_eq!(first.state.high_idle_streak, 1);

        let second = ctl.step().await;
        assert_eq!(second.decision, ScalingDecision::ScaleDown);
        assert_eq!(second.state, ScalingState::new(2));
        assert_eq!(
            runner.actuations(),
            vec![vec!["VBoxManage", "controlvm", "cicc2_group06", "unplugcpu", "2"]]
        );
    }

    #[tokio::test]
    async fn setup_enables_collection() {
        let runner = Arc::new(ScriptedRunner::new());
        let ctl = control(&runner, &fast_config());
        ctl.setup().await;
        assert_eq!(runner.calls()[0][1..3], ["metrics", "setup"]);
    }

    #[test]
    fn from_config_rejects_invalid() {
        let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new());
        let mut config = VscaleConfig::default();
        config.scaling.max_cpus = 0;
        assert!(ControlLoop::from_config(runner, &config).is_err());
    }

    #[tokio::test]
    async fn run_exits_immediately_when_already_shut_down() {
        let runner = Arc::new(ScriptedRunner::new());
        let mut ctl = control(&runner, &fast_config());
        let (tx, rx) = watch::channel(true);

        ctl.run(rx).await;
        drop(tx);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn shutdown_interrupts_sleep() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query(idle_line(80.0));
        let mut config = VscaleConfig::default();
        config.scaling.check_interval = "3600s".to_string();
        let mut ctl = control(&runner, &config);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            ctl.run(rx).await;
            ctl
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let ctl = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(ctl.state(), ScalingState::new(1));
        assert_eq!(runner.calls().len(), 1);
    }
}
