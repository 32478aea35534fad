use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    domain::{Job, QueueSnapshot},
    infrastructure::shutdown::ShutdownListener,
    tasks::{pipeline::ArchivePipeline, queue::PriorityQueue},
};

/// What `submit` observed when it enqueued a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Jobs waiting after this submission, not counting one that started.
    pub queued: usize,
    /// Whether this submission woke an idle dispatcher.
    pub started: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("the archiver is shutting down and is not accepting new requests")]
    ShuttingDown,
}

/// Sent to requesters whose queued job will not run.
const SHUTDOWN_NOTICE: &str = "the archiver is shutting down; request not processed";

enum NextStep {
    Run(Job),
    Idle,
    /// Shutdown arrived with jobs still queued; the dispatcher stays busy
    /// until their requesters have been told.
    Abandon(Vec<Job>),
}

#[derive(Debug, Default)]
struct DispatchState {
    queue: PriorityQueue<Job>,
    busy: bool,
}

/// Single-flight job runner.
///
/// The queue and the busy flag live under one lock, so a submission either
/// sees a running drain loop that will pick its job up, or starts one itself.
/// The lock is never held across an await.
pub struct Dispatcher {
    state: Mutex<DispatchState>,
    pipeline: ArchivePipeline,
    shutdown: ShutdownListener,
}

impl Dispatcher {
    pub fn new(pipeline: ArchivePipeline, shutdown: ShutdownListener) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DispatchState::default()),
            pipeline,
            shutdown,
        })
    }

    /// Enqueues `job` and returns immediately. If the dispatcher is idle the
    /// cheapest queued job starts on a background task. Refused once shutdown
    /// has been requested.
    pub fn submit(self: &Arc<Self>, job: Job) -> Result<Submission, SubmitError> {
        let (next, queued) = {
            let mut state = self.state.lock();
            if self.shutdown.is_triggered() {
                tracing::warn!(
                    target: "dispatcher",
                    channel_id = %job.channel_id,
                    "rejecting archive job during shutdown"
                );
                return Err(SubmitError::ShuttingDown);
            }
            tracing::info!(
                target: "dispatcher",
                channel_id = %job.channel_id,
                weight = job.weight,
                "enqueuing archive job"
            );
            state.queue.enqueue(job);
            let next = if state.busy {
                None
            } else {
                state.queue.dequeue()
            };
            if next.is_some() {
                state.busy = true;
            }
            if let Some(head) = state.queue.peek() {
                tracing::debug!(
                    target: "dispatcher",
                    queued = state.queue.len(),
                    next_weight = head.weight,
                    "jobs waiting behind the running archive"
                );
            }
            (next, state.queue.len())
        };

        let submission = Submission {
            queued,
            started: next.is_some(),
        };

        if let Some(job) = next {
            let this = self.clone();
            tokio::spawn(async move { this.drain(job).await });
        }
        Ok(submission)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            queued: state.queue.len(),
            busy: state.busy,
        }
    }

    async fn drain(self: Arc<Self>, first: Job) {
        let mut job = first;
        loop {
            self.run_isolated(job).await;
            match self.next_step() {
                NextStep::Run(next) => job = next,
                NextStep::Idle => break,
                NextStep::Abandon(jobs) => {
                    self.release_abandoned(jobs).await;
                    break;
                }
            }
        }
    }

    async fn release_abandoned(&self, jobs: Vec<Job>) {
        tracing::warn!(
            target: "dispatcher",
            remaining = jobs.len(),
            "shutdown requested; notifying requesters of unprocessed jobs"
        );
        for job in jobs {
            self.pipeline
                .report_failure(&job.channel_id, job.reply_to, SHUTDOWN_NOTICE)
                .await;
        }
        self.state.lock().busy = false;
    }

    /// Runs the pipeline on its own task so a panic ends only that job.
    async fn run_isolated(self: &Arc<Self>, job: Job) {
        let channel_id = job.channel_id.clone();
        let reply_to = job.reply_to;
        let this = self.clone();
        let handle = tokio::spawn(async move { this.pipeline.run(job).await });

        if let Err(err) = handle.await {
            tracing::error!(
                target: "dispatcher",
                channel_id = %channel_id,
                error = %err,
                "archive job aborted unexpectedly"
            );
            self.pipeline
                .report_failure(&channel_id, reply_to, "internal error")
                .await;
        }
    }

    /// Hands out the next job, or flips to idle when there is none.
    fn next_step(&self) -> NextStep {
        let mut state = self.state.lock();
        if self.shutdown.is_triggered() {
            let mut abandoned = Vec::with_capacity(state.queue.len());
            while let Some(job) = state.queue.dequeue() {
                abandoned.push(job);
            }
            if abandoned.is_empty() {
                state.busy = false;
                return NextStep::Idle;
            }
            return NextStep::Abandon(abandoned);
        }
        match state.queue.dequeue() {
            Some(job) => NextStep::Run(job),
            None => {
                state.busy = false;
                tracing::debug!(target: "dispatcher", "queue drained; dispatcher idle");
                NextStep::Idle
            }
        }
    }
}
