//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.
//!
//! Surfaces replay scripted "frames". [`JsonExtractor`] interprets a frame:
//! [`NOT_READY_FRAME`] is `NotReady`, `error:<detail>` is `Error`, anything
//! else is parsed as JSON [`ExtractedFields`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{ExtractedFields, ExtractionOutcome, WorkItem};
use crate::orchestrator::{RunEvent, RunReporter};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::target::SearchTarget;
use crate::traits::{ContentSource, Extractor, RenderSurface};

pub const NOT_READY_FRAME: &str = "loading";
/// Makes [`MockSurface::snapshot`] panic.
pub const SURFACE_PANIC_FRAME: &str = "__surface_panic__";
/// Makes [`JsonExtractor`] panic.
pub const EXTRACTOR_PANIC_FRAME: &str = "__extractor_panic__";
/// Makes [`MockSurface::snapshot`] fail with a retryable network error.
pub const SNAPSHOT_RETRYABLE_FRAME: &str = "__snapshot_retryable__";
/// Makes [`MockSurface::snapshot`] never resolve.
pub const STALLED_FRAME: &str = "__stalled__";

/// Create a work item with city unset and country "US".
pub fn make_work_item(id: usize, company: &str) -> WorkItem {
    WorkItem::new(id.to_string(), company, None, "US")
}

// ---------------------------------------------------------------------------
// MockClock
// ---------------------------------------------------------------------------

/// Virtual clock: `sleep` advances `now` instantly and records the duration.
#[derive(Clone, Default)]
pub struct MockClock {
    now: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// MockContentSource / MockSurface
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Script {
    Frames(Vec<String>),
    CreateError(String),
    CreatePanic,
}

#[derive(Default)]
struct SourceLog {
    created: Vec<String>,
    released: Vec<String>,
    polls: HashMap<String, usize>,
    open: usize,
    max_open: usize,
}

/// Content source whose surfaces replay scripted frames per query.
///
/// Unscripted queries get a single ready frame whose name is the query.
#[derive(Clone, Default)]
pub struct MockContentSource {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    log: Arc<Mutex<SourceLog>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
    release_panics: Arc<Mutex<HashSet<String>>>,
}

impl MockContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `create_surface` waits until `gate` is notified.
    pub fn with_gate(self, gate: Arc<Notify>) -> Self {
        *self.gate.lock().unwrap() = Some(gate);
        self
    }

    /// Frames returned by successive polls; the last frame repeats.
    pub fn script(&self, item: &WorkItem, frames: Vec<String>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(item.query(), Script::Frames(frames));
    }

    pub fn fail_creation(&self, item: &WorkItem, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(item.query(), Script::CreateError(message.to_string()));
    }

    /// `create_surface` panics for this item.
    pub fn panic_on_create(&self, item: &WorkItem) {
        self.scripts
            .lock()
            .unwrap()
            .insert(item.query(), Script::CreatePanic);
    }

    /// `release_surface` panics for this item's surface before recording it.
    pub fn panic_on_release(&self, item: &WorkItem) {
        self.release_panics.lock().unwrap().insert(item.query());
    }

    pub fn created(&self) -> Vec<String> {
        self.log.lock().unwrap().created.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.log.lock().unwrap().released.clone()
    }

    pub fn polls(&self, item: &WorkItem) -> usize {
        let log = self.log.lock().unwrap();
        log.polls.get(&item.query()).copied().unwrap_or(0)
    }

    pub fn max_open(&self) -> usize {
        self.log.lock().unwrap().max_open
    }
}

impl ContentSource for MockContentSource {
    type Surface = MockSurface;

    async fn create_surface(&self, target: &SearchTarget) -> Result<MockSurface, AppError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let script = self.scripts.lock().unwrap().get(&target.query).cloned();
        let frames = match script {
            Some(Script::CreateError(message)) => {
                return Err(AppError::ResourceCreationFailure(message));
            }
            Some(Script::CreatePanic) => panic!("surface factory crashed"),
            Some(Script::Frames(frames)) => frames,
            None => vec![serde_json::json!({ "name": target.query }).to_string()],
        };

        let mut log = self.log.lock().unwrap();
        log.created.push(target.query.clone());
        log.open += 1;
        log.max_open = log.max_open.max(log.open);

        Ok(MockSurface {
            query: target.query.clone(),
            frames,
            log: Arc::clone(&self.log),
        })
    }

    async fn release_surface(&self, surface: MockSurface) {
        let panics = self.release_panics.lock().unwrap().contains(&surface.query);
        if panics {
            panic!("surface release crashed");
        }
        let mut log = self.log.lock().unwrap();
        log.released.push(surface.query);
        log.open = log.open.saturating_sub(1);
    }
}

/// Surface produced by [`MockContentSource`].
pub struct MockSurface {
    query: String,
    frames: Vec<String>,
    log: Arc<Mutex<SourceLog>>,
}

impl RenderSurface for MockSurface {
    async fn snapshot(&self) -> Result<String, AppError> {
        let poll = {
            let mut log = self.log.lock().unwrap();
            let count = log.polls.entry(self.query.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let frame = self
            .frames
            .get(poll - 1)
            .or_else(|| self.frames.last())
            .cloned()
            .unwrap_or_default();

        match frame.as_str() {
            SURFACE_PANIC_FRAME => panic!("surface crashed"),
            SNAPSHOT_RETRYABLE_FRAME => Err(AppError::NetworkError("renderer busy".into())),
            STALLED_FRAME => std::future::pending().await,
            _ => Ok(frame),
        }
    }
}

// ---------------------------------------------------------------------------
// JsonExtractor
// ---------------------------------------------------------------------------

/// Extractor that reads scripted frames instead of HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn extract(&self, snapshot: &str) -> ExtractionOutcome {
        if snapshot.is_empty() || snapshot == NOT_READY_FRAME {
            return ExtractionOutcome::NotReady;
        }
        if snapshot == EXTRACTOR_PANIC_FRAME {
            panic!("extractor crashed");
        }
        if let Some(detail) = snapshot.strip_prefix("error:") {
            return ExtractionOutcome::Error(detail.to_string());
        }
        match serde_json::from_str::<ExtractedFields>(snapshot) {
            Ok(fields) => ExtractionOutcome::Ready(fields),
            Err(e) => ExtractionOutcome::Error(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Progress sink that keeps every published event.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock run reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunReporter for MockReporter {
    fn report(&self, event: RunEvent<'_>) {
        let label = match &event {
            RunEvent::RunStarted { .. } => "RunStarted",
            RunEvent::RunRejected => "RunRejected",
            RunEvent::JobStarted { .. } => "JobStarted",
            RunEvent::PollNotReady { .. } => "PollNotReady",
            RunEvent::JobSucceeded { .. } => "JobSucceeded",
            RunEvent::JobFailed { .. } => "JobFailed",
            RunEvent::SurfaceReleased { .. } => "SurfaceReleased",
            RunEvent::RunFinished { .. } => "RunFinished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
