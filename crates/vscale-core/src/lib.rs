//! vscale-core — shared types and configuration for the vscale workspace.
//!
//! Everything here is pure data: the scaling state threaded through the
//! control loop, the idle reading fed into the policy, and the
//! `vscale.toml` configuration with its defaults and validation.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ScalingConfig, VmConfig, VscaleConfig, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
