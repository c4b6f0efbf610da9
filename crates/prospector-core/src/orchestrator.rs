use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::job::{JobPhase, OrchestratorConfig, RunState};
use crate::models::{ExtractedFields, ExtractionOutcome, ResultRecord, WorkItem};
use crate::progress::{ProgressEvent, ProgressSink, publish_quietly};
use crate::target::TargetConfig;
use crate::throttle::Throttle;
use crate::traits::{ContentSource, Extractor, RenderSurface};

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    RunStarted {
        run_id: Uuid,
        total: usize,
    },
    RunRejected,
    JobStarted {
        job_id: &'a str,
        query: &'a str,
    },
    PollNotReady {
        job_id: &'a str,
        attempt: u32,
        next_delay: Duration,
    },
    JobSucceeded {
        job_id: &'a str,
        processed: usize,
        total: usize,
    },
    JobFailed {
        job_id: &'a str,
        phase: JobPhase,
        error: &'a str,
    },
    SurfaceReleased {
        job_id: &'a str,
    },
    RunFinished {
        run_id: Uuid,
        succeeded: usize,
        failed: usize,
    },
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::RunStarted { run_id, total } => {
                tracing::info!(%run_id, %total, "Run started");
            }
            RunEvent::RunRejected => {
                tracing::warn!("Run rejected: another run is active");
            }
            RunEvent::JobStarted { job_id, query } => {
                tracing::info!(%job_id, %query, "Processing item");
            }
            RunEvent::PollNotReady {
                job_id,
                attempt,
                next_delay,
            } => {
                tracing::debug!(%job_id, %attempt, delay_ms = %next_delay.as_millis(), "Content not ready");
            }
            RunEvent::JobSucceeded {
                job_id,
                processed,
                total,
            } => {
                tracing::info!(%job_id, "Item enriched ({processed}/{total})");
            }
            RunEvent::JobFailed {
                job_id,
                phase,
                error,
            } => {
                tracing::warn!(%job_id, ?phase, %error, "Item failed");
            }
            RunEvent::SurfaceReleased { job_id } => {
                tracing::debug!(%job_id, "Surface released");
            }
            RunEvent::RunFinished {
                run_id,
                succeeded,
                failed,
            } => {
                tracing::info!(%run_id, %succeeded, %failed, "Run finished");
            }
        }
    }
}

/// Point-in-time view of the orchestrator's run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub total: usize,
    pub processed: usize,
    pub queue_len: usize,
}

/// Accumulated output of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub records: Vec<ResultRecord>,
    pub succeeded: usize,
    pub failed: usize,
}

/// Returned by [`Orchestrator::start`] once a run is accepted.
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub total: usize,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Wait for the run to drain its queue.
    pub async fn wait(self) -> Result<RunSummary, AppError> {
        self.task
            .await
            .map_err(|e| AppError::Generic(format!("Run task failed: {e}")))
    }
}

#[derive(Debug)]
struct ActiveRun {
    state: RunState,
    run_id: Option<Uuid>,
    queue: Option<Arc<[WorkItem]>>,
    total: usize,
    processed: usize,
}

impl ActiveRun {
    fn idle() -> Self {
        Self {
            state: RunState::Idle,
            run_id: None,
            queue: None,
            total: 0,
            processed: 0,
        }
    }
}

fn lock_run(run: &Mutex<ActiveRun>) -> MutexGuard<'_, ActiveRun> {
    run.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned run state");
        poisoned.into_inner()
    })
}

/// Sequential enrichment scheduler.
///
/// Runs one job at a time: acquire a surface, poll the extractor until the
/// content is ready, report, release the surface, pause, next job. Only one
/// run may be active per orchestrator; a second `start` gets [`AppError::Busy`].
pub struct Orchestrator<S, E, P, K>
where
    S: ContentSource,
    E: Extractor,
    P: ProgressSink,
    K: Clock,
{
    source: S,
    extractor: E,
    sink: Arc<P>,
    clock: K,
    reporter: Arc<dyn RunReporter>,
    config: OrchestratorConfig,
    targets: TargetConfig,
    run: Arc<Mutex<ActiveRun>>,
}

impl<S, E, P, K> Orchestrator<S, E, P, K>
where
    S: ContentSource,
    E: Extractor,
    P: ProgressSink,
    K: Clock,
{
    pub fn new(source: S, extractor: E, sink: P, clock: K, config: OrchestratorConfig) -> Self {
        Self {
            source,
            extractor,
            sink: Arc::new(sink),
            clock,
            reporter: Arc::new(TracingRunReporter),
            config,
            targets: TargetConfig::default(),
            run: Arc::new(Mutex::new(ActiveRun::idle())),
        }
    }

    pub fn with_targets(mut self, targets: TargetConfig) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_reporter(mut self, reporter: impl RunReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let run = lock_run(&self.run);
        RunSnapshot {
            state: run.state,
            run_id: run.run_id,
            total: run.total,
            processed: run.processed,
            queue_len: run.queue.as_ref().map_or(0, |q| q.len()),
        }
    }

    /// Accept a run over a copy of `items` and begin processing it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, items: &[WorkItem]) -> Result<RunHandle, AppError> {
        let run_id = Uuid::new_v4();
        let queue: Arc<[WorkItem]> = Arc::from(items);
        {
            let mut run = lock_run(&self.run);
            if run.state != RunState::Idle {
                drop(run);
                self.reporter.report(RunEvent::RunRejected);
                return Err(AppError::Busy);
            }
            *run = ActiveRun {
                state: RunState::Running,
                run_id: Some(run_id),
                queue: Some(Arc::clone(&queue)),
                total: queue.len(),
                processed: 0,
            };
        }

        let task = RunTask {
            run_id,
            items: queue,
            source: self.source.clone(),
            extractor: self.extractor.clone(),
            sink: Arc::clone(&self.sink),
            clock: self.clock.clone(),
            reporter: Arc::clone(&self.reporter),
            config: self.config.clone(),
            targets: self.targets.clone(),
            run: Arc::clone(&self.run),
        };
        let total = task.items.len();
        let task = tokio::spawn(task.execute());

        Ok(RunHandle {
            run_id,
            total,
            task,
        })
    }
}

/// Why a job did not produce a successful record.
#[derive(Debug)]
struct JobFailure {
    phase: JobPhase,
    error: AppError,
    fields: Option<ExtractedFields>,
}

impl JobFailure {
    fn new(phase: JobPhase, error: AppError) -> Self {
        Self {
            phase,
            error,
            fields: None,
        }
    }
}

/// Returns the run state to `Idle` however the run task ends.
struct IdleOnDrop<'a>(&'a Mutex<ActiveRun>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        let mut run = lock_run(self.0);
        run.state = RunState::Idle;
        run.queue = None;
    }
}

/// Everything one accepted run needs, moved into the spawned task.
struct RunTask<S, E, P, K> {
    run_id: Uuid,
    items: Arc<[WorkItem]>,
    source: S,
    extractor: E,
    sink: Arc<P>,
    clock: K,
    reporter: Arc<dyn RunReporter>,
    config: OrchestratorConfig,
    targets: TargetConfig,
    run: Arc<Mutex<ActiveRun>>,
}

impl<S, E, P, K> RunTask<S, E, P, K>
where
    S: ContentSource,
    E: Extractor,
    P: ProgressSink,
    K: Clock,
{
    async fn execute(self) -> RunSummary {
        let _idle = IdleOnDrop(&self.run);
        let total = self.items.len();
        self.reporter.report(RunEvent::RunStarted {
            run_id: self.run_id,
            total,
        });

        let throttle = Throttle::new(self.clock.clone(), self.config.politeness.clone());
        let mut summary = RunSummary {
            run_id: self.run_id,
            records: Vec::with_capacity(total),
            succeeded: 0,
            failed: 0,
        };

        for (index, item) in self.items.iter().enumerate() {
            let (record, success) = self.process_job(item).await;
            if success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.records.push(record);

            if index + 1 < total {
                throttle.pause().await;
            }
        }

        self.reporter.report(RunEvent::RunFinished {
            run_id: self.run_id,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
        summary
    }

    /// Dispatch → acquire → wait/extract → report → release for one item.
    async fn process_job(&self, item: &WorkItem) -> (ResultRecord, bool) {
        let target = self.targets.target_for(item);
        self.reporter.report(RunEvent::JobStarted {
            job_id: &item.id,
            query: &target.query,
        });

        let created = AssertUnwindSafe(self.source.create_surface(&target))
            .catch_unwind()
            .await;

        match created {
            Ok(Ok(surface)) => {
                let result = self.wait_and_extract(&surface, &item.id).await;
                let reported = self.finish_job(item, result);
                self.release(surface, &item.id).await;
                reported
            }
            Ok(Err(e)) => {
                let error = match e {
                    AppError::ResourceCreationFailure(_) => e,
                    other => AppError::ResourceCreationFailure(other.to_string()),
                };
                self.finish_job(item, Err(JobFailure::new(JobPhase::AcquiringSurface, error)))
            }
            Err(payload) => {
                let error = AppError::ResourceCreationFailure(format!(
                    "panic while creating surface: {}",
                    panic_message(payload.as_ref())
                ));
                self.finish_job(item, Err(JobFailure::new(JobPhase::AcquiringSurface, error)))
            }
        }
    }

    /// Hand the surface back to the source. A panicking release is logged and ignored.
    async fn release(&self, surface: S::Surface, job_id: &str) {
        let released = AssertUnwindSafe(self.source.release_surface(surface))
            .catch_unwind()
            .await;
        if let Err(payload) = released {
            tracing::warn!(
                %job_id,
                "Surface release panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        self.reporter.report(RunEvent::SurfaceReleased { job_id });
    }

    async fn wait_and_extract(
        &self,
        surface: &S::Surface,
        job_id: &str,
    ) -> Result<ExtractedFields, JobFailure> {
        let waited = AssertUnwindSafe(self.wait_ready(surface, job_id))
            .catch_unwind()
            .await;

        let fields = match waited {
            Ok(result) => result?,
            Err(payload) => {
                return Err(JobFailure::new(
                    JobPhase::WaitingReady,
                    AppError::ExtractionError(format!(
                        "panic while reading surface: {}",
                        panic_message(payload.as_ref())
                    )),
                ));
            }
        };

        if fields.has_identifying_field() {
            Ok(fields)
        } else {
            Err(JobFailure {
                phase: JobPhase::Extracting,
                error: AppError::NotFound,
                fields: Some(fields),
            })
        }
    }

    /// Poll the surface until the extractor reports `Ready` or `Error`, or the bounds run out.
    async fn wait_ready(
        &self,
        surface: &S::Surface,
        job_id: &str,
    ) -> Result<ExtractedFields, JobFailure> {
        let poll = &self.config.poll;
        self.clock.sleep(poll.settle_delay).await;

        let started = self.clock.now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;

            // A surface read that never resolves still ends at the deadline.
            let remaining = poll
                .ready_timeout
                .saturating_sub(self.clock.now().saturating_sub(started));
            let read = tokio::select! {
                biased;
                read = read_surface(surface) => read,
                _ = self.clock.sleep(remaining) => {
                    let elapsed = self.clock.now().saturating_sub(started);
                    return Err(ready_timeout(attempts, elapsed));
                }
            };

            let outcome = match read {
                Ok(Some(snapshot)) => self.extract(snapshot).await,
                Ok(None) => Ok(ExtractionOutcome::NotReady),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(ExtractionOutcome::Ready(fields)) => return Ok(fields),
                Ok(ExtractionOutcome::Error(detail)) => {
                    return Err(JobFailure::new(
                        JobPhase::Extracting,
                        AppError::ExtractionError(detail),
                    ));
                }
                Ok(ExtractionOutcome::NotReady) => {}
                Err(e) => return Err(JobFailure::new(JobPhase::WaitingReady, e)),
            }

            let elapsed = self.clock.now().saturating_sub(started);
            let delay = poll.backoff.delay_for_attempt(attempts);
            if attempts >= poll.max_attempts || elapsed + delay > poll.ready_timeout {
                return Err(ready_timeout(attempts, elapsed));
            }

            self.reporter.report(RunEvent::PollNotReady {
                job_id,
                attempt: attempts,
                next_delay: delay,
            });
            self.clock.sleep(delay).await;
        }
    }

    /// Run the extractor on the blocking pool; a panic becomes `ExtractionError`.
    async fn extract(&self, snapshot: String) -> Result<ExtractionOutcome, AppError> {
        let extractor = self.extractor.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&snapshot))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    AppError::ExtractionError(format!(
                        "extractor panicked: {}",
                        panic_message(e.into_panic().as_ref())
                    ))
                } else {
                    AppError::ExtractionError(format!("extraction task failed: {e}"))
                }
            })
    }

    /// Build the record, bump the processed counter and publish the progress event.
    fn finish_job(
        &self,
        item: &WorkItem,
        result: Result<ExtractedFields, JobFailure>,
    ) -> (ResultRecord, bool) {
        let (processed, total) = {
            let mut run = lock_run(&self.run);
            run.processed += 1;
            (run.processed, run.total)
        };

        let event = match result {
            Ok(fields) => {
                self.reporter.report(RunEvent::JobSucceeded {
                    job_id: &item.id,
                    processed,
                    total,
                });
                ProgressEvent {
                    run_id: self.run_id,
                    job_id: item.id.clone(),
                    processed_count: processed,
                    total,
                    success: true,
                    status: "Found".to_string(),
                    record: ResultRecord::merge(item, &fields),
                    error_detail: None,
                    fields: Some(fields),
                }
            }
            Err(failure) => {
                let detail = failure.error.to_string();
                self.reporter.report(RunEvent::JobFailed {
                    job_id: &item.id,
                    phase: failure.phase,
                    error: &detail,
                });
                ProgressEvent {
                    run_id: self.run_id,
                    job_id: item.id.clone(),
                    processed_count: processed,
                    total,
                    success: false,
                    status: failure.error.status_label().to_string(),
                    record: ResultRecord::failed(item),
                    error_detail: Some(detail),
                    fields: failure.fields,
                }
            }
        };

        publish_quietly(self.sink.as_ref(), &event);
        (event.record, event.success)
    }
}

/// Read a snapshot if the surface is settled. Unstable surfaces and
/// transient snapshot errors yield `None`.
async fn read_surface<R: RenderSurface>(surface: &R) -> Result<Option<String>, AppError> {
    if !surface.is_stable().await {
        return Ok(None);
    }
    match surface.snapshot().await {
        Ok(html) => Ok(Some(html)),
        Err(e) if e.is_retryable() => {
            tracing::debug!(error = %e, "Snapshot not available yet");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn ready_timeout(attempts: u32, elapsed: Duration) -> JobFailure {
    JobFailure::new(
        JobPhase::WaitingReady,
        AppError::TimeoutWaitingForReady {
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
