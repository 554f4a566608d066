//! Verdict core: run state, the write-through work item store, recovery, and
//! the pure ingestion/verdict/report logic around it.
mod error;
mod ingest;
mod model;
mod recovery;
mod report;
mod storage;
mod store;
mod verdict;

pub use error::{StorageError, StoreError};
pub use ingest::{extract_items, IngestSettings, Table};
pub use model::{
    ItemOutcome, ItemState, ItemStatus, Label, Outcome, Phase, RunState, SourceItem, Timing,
    WorkItem, VERDICT_FIELD,
};
pub use recovery::{recover, RecoveryReport};
pub use report::{
    format_seconds, AccuracyStats, ItemFilter, RunReport, StatusCounts, TimingStats,
    UnknownFilter,
};
pub use storage::{MemoryStorage, StateStorage};
pub use store::{WorkItemStore, STATE_KEY};
pub use verdict::VerdictMarkers;
