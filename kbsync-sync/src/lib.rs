//! # kbsync-sync
//!
//! Manifest resolution, change detection and sync orchestration.
//!
//! Call [`Coordinator::try_run`] to run one synchronization pass; the
//! pieces it is built from ([`manifest::resolve`], [`plan::diff`],
//! [`executor::apply`]) are public so tools like `kbsync plan` can stop
//! halfway.

pub mod cache_store;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod expand;
pub mod manifest;
pub mod pipeline;
pub mod plan;
pub mod report;

pub use cache_store::{CacheMap, CacheStore};
pub use coordinator::{Coordinator, RunOptions, RunOutcome};
pub use error::SyncError;
pub use plan::{PlanCounts, SyncPlan};
pub use report::{FileFailure, Operation, RunResult, RunStatus};
