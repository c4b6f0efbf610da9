pub mod clock;
pub mod error;
pub mod export;
pub mod ingest;
pub mod job;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod target;
pub mod throttle;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use clock::{Clock, TokioClock};
pub use error::AppError;
pub use job::{BackoffPolicy, OrchestratorConfig, PollConfig, RunState};
pub use models::{ExtractedFields, ExtractionOutcome, ResultRecord, WorkItem};
pub use orchestrator::{Orchestrator, RunHandle, RunSnapshot, RunSummary};
pub use progress::{BroadcastSink, FnSink, NullSink, ProgressEvent, ProgressSink};
pub use target::{SearchTarget, TargetConfig};
pub use traits::{ContentSource, Extractor, RenderSurface};
