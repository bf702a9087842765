//! vCPU hot-plug and unplug.

use std::sync::Arc;

use tracing::info;

use vscale_core::{ScalingDecision, VmConfig};

use crate::error::{HypervisorError, HypervisorResult};
use crate::runner::CommandRunner;

/// Issues `controlvm plugcpu` / `unplugcpu` for one VM.
pub struct Actuator {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    vm: String,
}

impl Actuator {
    pub fn new(runner: Arc<dyn CommandRunner>, vm: &VmConfig) -> Self {
        Self {
            runner,
            binary: vm.manage_binary.clone(),
            vm: vm.name.clone(),
        }
    }

    /// Carry out `decision` for a guest that had `cpu_count` vCPUs before it.
    ///
    /// vCPU indices are zero-based, so scaling up plugs index `cpu_count`
    /// and scaling down unplugs index `cpu_count - 1`.
    pub async fn apply(&self, decision: ScalingDecision, cpu_count: u32) -> HypervisorResult<()> {
        match decision {
            ScalingDecision::ScaleUp => self.plug_cpu(cpu_count).await,
            ScalingDecision::ScaleDown => {
                let index = cpu_count
                    .checked_sub(1)
                    .ok_or(HypervisorError::InvalidCpuIndex { action: "unplug" })?;
                self.unplug_cpu(index).await
            }
            ScalingDecision::NoOp => Ok(()),
        }
    }

    pub async fn plug_cpu(&self, index: u32) -> HypervisorResult<()> {
        info!(vm = %self.vm, index, "plugging vCPU");
        self.controlvm("plugcpu", index).await
    }

    pub async fn unplug_cpu(&self, index: u32) -> HypervisorResult<()> {
        info!(vm = %self.vm, index, "unplugging vCPU");
        self.controlvm("unplugcpu", index).await
    }

    async fn controlvm(&self, verb: &str, index: u32) -> HypervisorResult<()> {
        let args = vec![
            "controlvm".to_string(),
            self.vm.clone(),
            verb.to_string(),
            index.to_string(),
        ];
        self.runner.run(&self.binary, &args).await?.into_checked()?;
        Ok(())
    }
}
