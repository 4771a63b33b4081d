pub mod comparator;
pub mod engine;
pub mod executor;
pub mod hash;
pub mod model;
pub mod report;
pub mod scanner;
pub mod scheduler;

pub use comparator::{CompareConfig, DiffEngine, DiffError, MovePairing, PlanSummary};
pub use engine::{CycleError, MirrorEngine};
pub use executor::SyncExecutor;
pub use hash::HashAlgorithm;
pub use model::{
    ContentIndex, DirectoryIndex, FileAttributes, FileRecord, SyncInput, SyncPlan, TreeSnapshot,
};
pub use report::{CycleReport, ItemError, OperationKind, OperationOutcome};
pub use scanner::{LocalScanner, TreeScanner};
pub use scheduler::{Scheduler, SchedulerError, SchedulerState, SchedulerStats, SyncTask};
