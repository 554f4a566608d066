//! Verdict engine: run loop, classifier adapter, and file IO.
mod classifier;
mod controller;
mod export;
mod persist;
mod table;

pub use classifier::{
    decode_response, Classifier, ClassifierSettings, ClassifyError, FailureKind, HttpClassifier,
};
pub use controller::{Clock, RunController, RunError, RunHandle, RunnerOptions, StopReason};
pub use export::{export_report, ExportError, ExportFormat, ExportOptions, ExportSummary};
pub use persist::{ensure_dir, AtomicFileWriter, FileStorage, PersistError};
pub use table::{is_workbook, parse_delimited, read_table, Delimiter, TableError};
