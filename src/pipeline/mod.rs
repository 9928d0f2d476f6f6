//! Tracking pipeline.
//!
//! - `diff`: Pure change detection between a fetch and the known events
//! - `cycle`: One fetch → diff → notify → persist pass
//! - `watch`: Continuous and one-shot drivers

pub mod cycle;
pub mod diff;
pub mod watch;

pub use cycle::{CycleController, CycleOutcome, CyclePhase, CycleReport, NotifyStatus};
pub use diff::{CyclePlan, compute_new, merge, plan};
pub use watch::{ctrl_c_signal, interval_from_minutes, run_continuous, run_once};
