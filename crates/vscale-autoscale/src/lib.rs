//! vscale-autoscale — idle-driven vCPU scaling.
//!
//! Samples the guest's CPU idle percentage, runs it through a hysteresis
//! policy, and hot-plugs or unplugs one vCPU at a time.
//!
//! # Scaling Algorithm
//!
//! ```text
//! idle unavailable:
//!     NoOp, state untouched
//!
//! if idle < low and cpus < max:
//!     ScaleUp   (cpus += 1, streak = 0)
//!
//! else if idle > high and cpus > min:
//!     streak += 1
//!     if streak >= streak_limit:
//!         ScaleDown (cpus -= 1, streak = 0)
//!
//! else:
//!     NoOp      (streak = 0)
//! ```
//!
//! Scale-up reacts to a single busy sample; scale-down waits for
//! `streak_limit` consecutive idle samples. That asymmetry is the
//! hysteresis that keeps the vCPU count from flapping.

pub mod control;
pub mod policy;

pub use control::{ControlLoop, CycleOutcome};
pub use policy::ScalingPolicy;
