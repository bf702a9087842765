//! vscale.toml configuration parser.
//!
//! Every field is optional in the file; missing values fall back to the
//! built-in defaults, so an empty file (or no file at all) describes the
//! stock VirtualBox setup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::ScalingState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VscaleConfig {
    pub vm: VmConfig,
    pub scaling: ScalingConfig,
}

/// The managed VM and how to reach its hypervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// VM name as known to the management CLI.
    pub name: String,
    /// Management binary, looked up on `$PATH` unless absolute.
    pub manage_binary: String,
    /// Metric label queried each cycle and matched in the output.
    pub metric: String,
    /// Collection period handed to `metrics setup`, in seconds.
    pub collection_period_secs: u32,
    /// Upper bound on any single management command.
    pub command_timeout: String,
    /// Where to mirror each raw sample for inspection. Never read back.
    pub sample_file: Option<String>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            name: "cicc2_group06".to_string(),
            manage_binary: "VBoxManage".to_string(),
            metric: "Guest/CPU/Load/Idle".to_string(),
            collection_period_secs: 2,
            command_timeout: "30s".to_string(),
            sample_file: None,
        }
    }
}

/// Hysteresis policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub min_cpus: u32,
    pub max_cpus: u32,
    /// Starting vCPU count; defaults to `min_cpus` when absent.
    pub initial_cpus: Option<u32>,
    /// Idle below this (exclusive) adds a vCPU immediately.
    pub low_idle_threshold: f64,
    /// Idle above this (exclusive) counts towards the streak.
    pub high_idle_threshold: f64,
    /// Consecutive high-idle readings before a vCPU is removed.
    pub high_idle_streak_limit: u32,
    /// Delay between the end of one cycle and the start of the next.
    pub check_interval: String,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_cpus: 1,
            max_cpus: 4,
            initial_cpus: None,
            low_idle_threshold: 75.0,
            high_idle_threshold: 85.0,
            high_idle_streak_limit: 2,
            check_interval: "10s".to_string(),
        }
    }
}

impl VscaleConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VscaleConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the validated defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.vm.name.trim().is_empty() {
            return Err(ConfigError::Invalid("vm.name must not be empty".into()));
        }
        if self.vm.metric.trim().is_empty() {
            return Err(ConfigError::Invalid("vm.metric must not be empty".into()));
        }
        if self.vm.manage_binary.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "vm.manage_binary must not be empty".into(),
            ));
        }
        self.vm.command_timeout()?;
        self.scaling.validate()
    }
}

impl VmConfig {
    /// Parsed `command_timeout`. Zero is rejected: every call would time out.
    pub fn command_timeout(&self) -> ConfigResult<Duration> {
        let timeout = parse_duration(&self.command_timeout)?;
        if timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "vm.command_timeout must be greater than zero".into(),
            ));
        }
        Ok(timeout)
    }
}

impl ScalingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let s = self;
        if s.min_cpus == 0 {
            return Err(ConfigError::Invalid("scaling.min_cpus must be at least 1".into()));
        }
        if s.min_cpus > s.max_cpus {
            return Err(ConfigError::Invalid(format!(
                "scaling.min_cpus ({}) exceeds scaling.max_cpus ({})",
                s.min_cpus, s.max_cpus
            )));
        }
        let initial = s.initial_cpus();
        if initial < s.min_cpus || initial > s.max_cpus {
            return Err(ConfigError::Invalid(format!(
                "scaling.initial_cpus ({initial}) outside [{}, {}]",
                s.min_cpus, s.max_cpus
            )));
        }
        if !s.low_idle_threshold.is_finite() || !s.high_idle_threshold.is_finite() {
            return Err(ConfigError::Invalid("idle thresholds must be finite".into()));
        }
        if s.low_idle_threshold > s.high_idle_threshold {
            return Err(ConfigError::Invalid(format!(
                "scaling.low_idle_threshold ({}) exceeds scaling.high_idle_threshold ({})",
                s.low_idle_threshold, s.high_idle_threshold
            )));
        }
        if s.high_idle_streak_limit == 0 {
            return Err(ConfigError::Invalid(
                "scaling.high_idle_streak_limit must be at least 1".into(),
            ));
        }
        s.check_interval()?;
        Ok(())
    }

    pub fn initial_cpus(&self) -> u32 {
        self.initial_cpus.unwrap_or(self.min_cpus)
    }

    /// The state the control loop starts from.
    pub fn initial_state(&self) -> ScalingState {
        ScalingState::new(self.initial_cpus())
    }

    pub fn check_interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.check_interval)
    }
}

/// Parse a duration string like "500ms", "10s", "5m" or a bare number of seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let invalid = || ConfigError::Duration(s.to_string());
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
