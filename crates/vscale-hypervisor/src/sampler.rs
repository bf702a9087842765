//! Metrics sampling via `metrics setup` / `metrics query`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use vscale_core::VmConfig;

use crate::error::{HypervisorError, HypervisorResult};
use crate::parser::RawSample;
use crate::runner::CommandRunner;

/// Queries the guest idle metric for one VM.
pub struct MetricsSampler {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    vm: String,
    metric: String,
    period_secs: u32,
    sample_file: Option<PathBuf>,
}

impl MetricsSampler {
    pub fn new(runner: Arc<dyn CommandRunner>, vm: &VmConfig) -> Self {
        Self {
            runner,
            binary: vm.manage_binary.clone(),
            vm: vm.name.clone(),
            metric: vm.metric.clone(),
            period_secs: vm.collection_period_secs,
            sample_file: vm.sample_file.as_ref().map(PathBuf::from),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Enable periodic collection of the idle metric. Run once at startup.
    pub async fn setup(&self) -> HypervisorResult<()> {
        let args = vec![
            "metrics".to_string(),
            "setup".to_string(),
            "--period".to_string(),
            self.period_secs.to_string(),
            self.vm.clone(),
            self.metric.clone(),
        ];
        self.runner.run(&self.binary, &args).await?.into_checked()?;
        info!(
            vm = %self.vm,
            metric = %self.metric,
            period_secs = self.period_secs,
            "metrics collection enabled"
        );
        Ok(())
    }

    /// Run one metrics query and return its combined output.
    ///
    /// The returned text is authoritative. The optional sample file is a
    /// write-only mirror; failing to write it only logs a warning.
    pub async fn sample(&self) -> HypervisorResult<RawSample> {
        let args = vec![
            "metrics".to_string(),
            "query".to_string(),
            self.vm.clone(),
            self.metric.clone(),
        ];
        let text = self.runner.run(&self.binary, &args).await?.into_checked()?;
        debug!(vm = %self.vm, bytes = text.len(), "metrics sampled");

        if let Some(path) = &self.sample_file
            && let Err(e) = persist_sample(path, &text).await
        {
            warn!(error = %e, "failed to mirror sample");
        }

        Ok(RawSample::new(text))
    }

    /// Sample and parse in one step.
    pub async fn read_idle(&self) -> HypervisorResult<f64> {
        let sample = self.sample().await?;
        Ok(sample.idle_percent(&self.metric)?)
    }
}

async fn persist_sample(path: &Path, text: &str) -> HypervisorResult<()> {
    tokio::fs::write(path, text)
        .await
        .map_err(|source| HypervisorError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::runner::ScriptedRunner;

    fn vm_config() -> VmConfig {
        VmConfig {
            name: "test vm".to_string(),
            ..VmConfig::default()
        }
    }

    #[tokio::test]
    async fn setup_issues_period_and_metric() {
        let runner = Arc::new(ScriptedRunner::new());
        let sampler = MetricsSampler::new(runner.clone(), &vm_config());
        sampler.setup().await.unwrap();

        assert_eq!(
            runner.calls(),
            vec![vec![
                "VBoxManage",
                "metrics",
                "setup",
                "--period",
                "2",
                "test vm",
                "Guest/CPU/Load/Idle"
            ]]
        );
    }

    #[tokio::test]
    async fn sample_keeps_vm_name_as_one_argument() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query("test vm   Guest/CPU/Load/Idle  55.00%\n");
        let sampler = MetricsSampler::new(runner.clone(), &vm_config());

        let idle = sampler.read_idle().await.unwrap();
        assert_eq!(idle, 55.0);
        assert_eq!(
            runner.calls()[0],
            vec!["VBoxManage", "metrics", "query", "test vm", "Guest/CPU/Load/Idle"]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_exit_status_error() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query_failure(1, "VBoxManage: error: machine not running\n");
        let sampler = MetricsSampler::new(runner, &vm_config());

        let err = sampler.sample().await.unwrap_err();
        assert!(matches!(err, HypervisorError::ExitStatus { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn unparsable_output_is_parse_error() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query("nothing useful\n");
        let sampler = MetricsSampler::new(runner, &vm_config());

        let err = sampler.read_idle().await.unwrap_err();
        assert!(matches!(
            err,
            HypervisorError::Parse(ParseError::NoMatchingLine { .. })
        ));
    }

    #[tokio::test]
    async fn sample_is_mirrored_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.dat");
        let mut vm = vm_config();
        vm.sample_file = Some(path.to_string_lossy().into_owned());

        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query("test vm Guest/CPU/Load/Idle 12.00%\n");
        let sampler = MetricsSampler::new(runner, &vm);

        let sample = sampler.sample().await.unwrap();
        let mirrored = std::fs::read_to_string(&path).unwrap();
        assert_eq!(mirrored, sample.as_str());
    }

    #[tokio::test]
    async fn mirror_failure_does_not_fail_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = vm_config();
        vm.sample_file = Some(
            dir.path()
                .join("missing-dir")
                .join("monitor.dat")
                .to_string_lossy()
                .into_owned(),
        );

        let runner = Arc::new(ScriptedRunner::new());
        runner.push_query("test vm Guest/CPU/Load/Idle 12.00%\n");
        let sampler = MetricsSampler::new(runner, &vm);

        assert_eq!(sampler.read_idle().await.unwrap(), 12.0);
    }
}
