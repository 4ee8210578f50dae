//! A FIFO job queue that never runs more than one job at a time.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;

use super::events::{Listener, QueueEvent};

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A reusable unit of work. Every run of a job calls it once.
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

struct JobStatus {
    state: JobState,
    error: Option<Arc<anyhow::Error>>,
}

/// A queued piece of work and its lifecycle.
pub struct Job {
    id: u64,
    work: JobFn,
    control: Weak<QueueInner>,
    status: Mutex<JobStatus>,
}

impl Job {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.status().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    /// The error the job failed with, if it did.
    pub fn error(&self) -> Option<Arc<anyhow::Error>> {
        self.status().error.clone()
    }

    /// The queue this job was enqueued on, while it is alive.
    pub fn queue(&self) -> Option<JobQueue> {
        self.control.upgrade().map(|inner| JobQueue { inner })
    }

    fn status(&self) -> MutexGuard<'_, JobStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status();
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &status.state)
            .field("error", &status.error.as_ref().map(|e| e.to_string()))
            .finish()
    }
}

#[derive(Default)]
struct Listeners {
    added: Vec<Listener>,
    finished: Vec<Listener>,
    done: Vec<Listener>,
}

impl Listeners {
    fn of(&mut self, event: QueueEvent) -> &mut Vec<Listener> {
        match event {
            QueueEvent::Added => &mut self.added,
            QueueEvent::Finished => &mut self.finished,
            QueueEvent::Done => &mut self.done,
        }
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Arc<Job>>,
    complete_jobs: Vec<Arc<Job>>,
    failed_jobs: Vec<Arc<Job>>,
    listeners: Listeners,
    next_id: u64,
    chaining: bool,
}

impl QueueState {
    fn processing(&self) -> bool {
        self.queue.iter().any(|job| job.is_running())
    }

    fn processed(&self) -> usize {
        self.complete_jobs.len() + self.failed_jobs.len()
    }
}

#[derive(Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Serializes job execution: jobs run strictly one after another, in the
/// order they were enqueued.
///
/// Cloning a `JobQueue` yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `work`, returning the queue for chaining.
    pub fn enqueue<F, Fut>(&self, work: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.enqueue_job(Arc::new(move || Box::pin(work()) as JobFuture));
        self
    }

    /// Enqueues an already boxed unit of work and returns its job.
    pub fn enqueue_job(&self, work: JobFn) -> Arc<Job> {
        let job = {
            let mut state = self.state();
            state.next_id += 1;
            let job = Arc::new(Job {
                id: state.next_id,
                work,
                control: Arc::downgrade(&self.inner),
                status: Mutex::new(JobStatus {
                    state: JobState::Queued,
                    error: None,
                }),
            });
            state.queue.push_back(Arc::clone(&job));
            job
        };

        self.emit(QueueEvent::Added, &job);
        job
    }

    /// Starts the next queued job, unless one is already running.
    ///
    /// The job body runs on its own tokio task; a panic or an error is
    /// recorded on the job and never escapes the queue.
    pub fn next_job(&self) -> &Self {
        let job = {
            let state = self.state();
            if state.processing() {
                return self;
            }
            let Some(job) = state.queue.front().cloned() else {
                return self;
            };
            job.status().state = JobState::Running;
            job
        };

        tracing::debug!("Starting job {}", job.id);
        let queue = self.clone();
        tokio::spawn(async move {
            let body = tokio::spawn((job.work)());
            let error = match body.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(join_error) => Some(anyhow::anyhow!("job {} panicked: {}", job.id, join_error)),
            };
            queue.settle(&job, error);
        });

        self
    }

    /// Runs the backlog one job at a time until the queue is empty.
    pub fn run(&self) -> &Self {
        let install = {
            let mut state = self.state();
            !std::mem::replace(&mut state.chaining, true)
        };

        if install {
            self.on(
                QueueEvent::Finished,
                Arc::new(|queue: &JobQueue, _: &Arc<Job>| {
                    queue.next_job();
                }),
            );
        }

        if !self.processing() {
            self.next_job();
        }
        self
    }

    /// Makes every future enqueue start the queue as well.
    pub fn run_on_new_job(&self) -> &Self {
        self.on(
            QueueEvent::Added,
            Arc::new(|queue: &JobQueue, _: &Arc<Job>| {
                queue.run();
            }),
        )
    }

    /// Clears the completed and failed lists every time the queue drains.
    pub fn reset_on_done(&self) -> &Self {
        self.on(
            QueueEvent::Done,
            Arc::new(|queue: &JobQueue, _: &Arc<Job>| {
                let mut state = queue.state();
                state.complete_jobs.clear();
                state.failed_jobs.clear();
            }),
        )
    }

    /// Registers `listener` for `event`; already registered listeners are ignored.
    pub fn on(&self, event: QueueEvent, listener: Listener) -> &Self {
        let mut state = self.state();
        let listeners = state.listeners.of(event);
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
        self
    }

    pub fn off(&self, event: QueueEvent, listener: &Listener) -> &Self {
        let mut state = self.state();
        state
            .listeners
            .of(event)
            .retain(|l| !Arc::ptr_eq(l, listener));
        self
    }

    pub fn on_done<F>(&self, listener: F) -> &Self
    where
        F: Fn(&JobQueue, &Arc<Job>) + Send + Sync + 'static,
    {
        self.on(QueueEvent::Done, Arc::new(listener))
    }

    pub fn on_finished<F>(&self, listener: F) -> &Self
    where
        F: Fn(&JobQueue, &Arc<Job>) + Send + Sync + 'static,
    {
        self.on(QueueEvent::Finished, Arc::new(listener))
    }

    pub fn on_new_job<F>(&self, listener: F) -> &Self
    where
        F: Fn(&JobQueue, &Arc<Job>) + Send + Sync + 'static,
    {
        self.on(QueueEvent::Added, Arc::new(listener))
    }

    /// Waits until no job is queued or running.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of the live queue (running job included).
    pub fn get_jobs(&self) -> Vec<Arc<Job>> {
        self.state().queue.iter().cloned().collect()
    }

    pub fn complete_jobs(&self) -> Vec<Arc<Job>> {
        self.state().complete_jobs.clone()
    }

    pub fn failed_jobs(&self) -> Vec<Arc<Job>> {
        self.state().failed_jobs.clone()
    }

    pub fn complete(&self) -> usize {
        self.state().complete_jobs.len()
    }

    pub fn failed(&self) -> usize {
        self.state().failed_jobs.len()
    }

    pub fn processed(&self) -> usize {
        self.state().processed()
    }

    pub fn processing(&self) -> bool {
        self.state().processing()
    }

    pub fn running_job(&self) -> Option<Arc<Job>> {
        self.state()
            .queue
            .iter()
            .rev()
            .find(|job| job.is_running())
            .cloned()
    }

    pub fn size(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().queue.is_empty()
    }

    /// Share of settled jobs among all known jobs, rounded to two decimals.
    pub fn percentage(&self) -> f64 {
        let state = self.state();
        let processed = state.processed();
        let total = processed + state.queue.len();
        if total == 0 {
            return 0.0;
        }
        (processed as f64 / total as f64 * 100.0).round() / 100.0
    }

    /// Whether both handles refer to the same queue.
    pub fn ptr_eq(&self, other: &JobQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn settle(&self, job: &Arc<Job>, error: Option<anyhow::Error>) {
        {
            let mut state = self.state();
            let failed = error.is_some();
            {
                let mut status = job.status();
                status.state = if failed {
                    JobState::Failed
                } else {
                    JobState::Completed
                };
                status.error = error.map(Arc::new);
            }

            state.queue.retain(|queued| !Arc::ptr_eq(queued, job));

            let settled = if failed {
                &mut state.failed_jobs
            } else {
                &mut state.complete_jobs
            };
            if !settled.iter().any(|j| Arc::ptr_eq(j, job)) {
                settled.push(Arc::clone(job));
            }
        }

        match job.error() {
            Some(e) => tracing::error!("Job {} failed: {:#}", job.id, e),
            None => tracing::debug!("Job {} completed", job.id),
        }

        self.emit(QueueEvent::Finished, job);
        if self.is_empty() {
            self.emit(QueueEvent::Done, job);
        }
        if self.is_empty() {
            self.inner.idle.notify_waiters();
        }
    }

    fn emit(&self, event: QueueEvent, job: &Arc<Job>) {
        let listeners = self.state().listeners.of(event).clone();
        for listener in listeners {
            listener(self, job);
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("JobQueue")
            .field("size", &state.queue.len())
            .field("complete", &state.complete_jobs.len())
            .field("failed", &state.failed_jobs.len())
            .finish()
    }
}
