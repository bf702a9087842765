//! vscale-hypervisor — talking to the hypervisor's management CLI.
//!
//! Every interaction with the hypervisor is an external process invoked
//! with an explicit argument list. The [`CommandRunner`] trait is the only
//! seam to the outside world; everything above it is plain Rust.
//!
//! # Architecture
//!
//! ```text
//! MetricsSampler
//!   ├── setup()  → metrics setup --period N <vm> <metric>   (once)
//!   └── sample() → metrics query <vm> <metric>  → RawSample
//!
//! parser
//!   └── RawSample::idle_percent() → last matching line → f64
//!
//! Actuator
//!   └── apply(decision, cpus) → controlvm <vm> plugcpu|unplugcpu <index>
//!
//! CommandRunner
//!   ├── ProcessRunner   → tokio::process, bounded by a timeout
//!   └── ScriptedRunner  → in-memory, scripted responses (`testing` feature)
//! ```

pub mod actuator;
pub mod error;
pub mod parser;
pub mod runner;
pub mod sampler;

pub use actuator::Actuator;
pub use error::{HypervisorError, HypervisorResult, ParseError};
pub use parser::{RawSample, parse_idle};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
#[cfg(any(test, feature = "testing"))]
pub use runner::ScriptedRunner;
pub use sampler::MetricsSampler;
