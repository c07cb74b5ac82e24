//! # Incremental replication engine
//!
//! Drains the backlog of a source channel into a destination channel, one
//! sendable unit at a time, in ascending source order:
//!
//! ```text
//! load checkpoint + identity map
//!        │
//!        ▼
//! fetch backlog (> checkpoint) ──► sort, drop already-mapped
//!        │
//!        ▼
//! aggregate albums ──► for each unit:
//!                        resolve reply target (identity map)
//!                        BackoffSender::send (waits out rate limits)
//!                        record mapping / record failure
//!                        persist every N units
//!        │
//!        ▼
//! persist final checkpoint + identity map
//! ```

mod error;
mod replicator;
mod report;
mod sender;
mod wait;

pub use error::{EngineError, EngineResult};
pub use replicator::{prepare_backlog, Replicator, ReplicatorConfig, RunState};
pub use report::{AbortReason, RunOutcome, RunReport};
pub use sender::BackoffSender;
pub use wait::wait_unless_shutdown;
