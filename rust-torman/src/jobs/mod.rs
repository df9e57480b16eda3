//! Job orchestration: data model, registry, monitor, completion detection.

pub mod completion;
pub mod model;
pub mod monitor;
pub mod registry;

pub use completion::CompletionDetector;
pub use model::{FileEntry, JobId, JobPhase, JobRecord, JobSnapshot, JobSource, JobState};
pub use monitor::Monitor;
pub use registry::JobRegistry;
