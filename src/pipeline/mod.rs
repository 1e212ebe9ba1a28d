//! The mail to to-do pipeline.
//!
//! - `sync` - fetch new mail and persist it once per provider id
//! - `analysis` - extract at most one to-do per stored message
//! - `todo_sync` - deliver extracted to-dos to the backend list
//! - `outcome` - result types the scheduler inspects
//!
//! Each stage catches every error at its boundary and reports it as a value.

pub mod analysis;
pub mod outcome;
pub mod sync;
pub mod todo_sync;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use analysis::AnalysisOrchestrator;
pub use outcome::{BatchResult, Outcome, SyncResult};
pub use sync::{SyncOrchestrator, SyncTarget};
pub use todo_sync::TodoSyncOrchestrator;
