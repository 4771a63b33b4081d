pub mod config;
pub mod core;
pub mod logging;

pub use config::{CliArgs, ConfigError, MirrorConfig};
pub use core::{CycleError, CycleReport, MirrorEngine, Scheduler, SyncPlan};
