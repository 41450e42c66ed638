/*
[INPUT]:  Public API exports for debank-balance-collector crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod pool;
pub mod report;

// Re-export main types for convenience
pub use aggregator::{Aggregator, BalanceAccumulator, PoolSelection};
pub use config::{CollectorConfig, ReportMode};
pub use discovery::discover_used_chains;
pub use pool::{PoolSummary, Task, TaskOutcome, WorkerPool};
