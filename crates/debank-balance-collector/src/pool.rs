/*
[INPUT]:  Fetch tasks, a runner factory (executor per worker), CancellationToken
[OUTPUT]: One TaskOutcome per submitted task on the result channel; bounded worker shutdown
[POS]:    Execution layer - task queue and worker pool
[UPDATE]: When changing termination, supervision or outcome cardinality guarantees
*/

use anyhow::{Result, anyhow};
use debank_balance_adapter::{Executed, FetchTask, TaskKey, TaskRunner};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Item on the shared task queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Fetch(FetchTask),
    /// Shutdown sentinel; every worker that sees it puts it back
    Done,
}

/// What a worker reports for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(Executed),
    Failed { key: TaskKey, error: String },
}

impl TaskOutcome {
    pub fn key(&self) -> TaskKey {
        match self {
            TaskOutcome::Completed(executed) => executed.output.key(),
            TaskOutcome::Failed { key, .. } => key.clone(),
        }
    }
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Done,
    Cancelled,
    QueueClosed,
}

#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    handle: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Result of joining every worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub workers: usize,
    pub done_republished: usize,
    pub finished_on_done: usize,
    pub cancelled: usize,
    pub panicked: usize,
    pub aborted: usize,
}

type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<Task>>>;

/// Fixed-size pool of workers sharing one task queue.
#[derive(Debug)]
pub struct WorkerPool {
    task_tx: mpsc::UnboundedSender<Task>,
    result_rx: mpsc::UnboundedReceiver<TaskOutcome>,
    workers: Vec<WorkerHandle>,
    done_republished: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers, each owning the runner built for it by `factory`.
    ///
    /// Cancelling `parent` stops every worker.
    pub fn spawn<R, F>(size: usize, parent: &CancellationToken, mut factory: F) -> Result<Self>
    where
        R: TaskRunner + 'static,
        F: FnMut(usize) -> Result<R>,
    {
        if size == 0 {
            return Err(anyhow!("worker pool needs at least one worker"));
        }

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let queue: SharedQueue = Arc::new(Mutex::new(task_rx));
        let done_republished = Arc::new(AtomicUsize::new(0));
        let shutdown = parent.child_token();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let runner = match factory(id) {
                Ok(runner) => runner,
                Err(err) => {
                    shutdown.cancel();
                    abort_all(workers);
                    return Err(err.context(format!("build runner for worker {id}")));
                }
            };
            let worker = Worker {
                id,
                queue: queue.clone(),
                requeue: task_tx.clone(),
                results: result_tx.clone(),
                done_republished: done_republished.clone(),
                shutdown: shutdown.clone(),
            };
            let handle = tokio::spawn(worker.run(runner));
            workers.push(WorkerHandle { id, handle });
        }
        // Only workers hold result senders: the channel closes when the last one exits.
        drop(result_tx);

        tracing::info!(workers = size, "worker pool started");
        Ok(Self {
            task_tx,
            result_rx,
            workers,
            done_republished,
            shutdown,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn submit(&self, task: FetchTask) -> Result<()> {
        self.task_tx
            .send(Task::Fetch(task))
            .map_err(|_| anyhow!("task queue closed"))
    }

    /// Publish the shutdown sentinel once
    pub fn finish(&self) -> Result<()> {
        self.task_tx
            .send(Task::Done)
            .map_err(|_| anyhow!("task queue closed"))
    }

    /// Next outcome, or `None` once every worker has exited
    pub async fn recv(&mut self) -> Option<TaskOutcome> {
        self.result_rx.recv().await
    }

    /// Number of `Done` re-publications so far
    pub fn done_republished(&self) -> usize {
        self.done_republished.load(Ordering::SeqCst)
    }

    /// Join every worker within a bounded time.
    ///
    /// A panicked worker cancels the rest; anything still running at the
    /// deadline is aborted.
    pub async fn drain(&mut self) -> PoolSummary {
        self.drain_with_deadline(SHUTDOWN_TIMEOUT).await
    }

    async fn drain_with_deadline(&mut self, timeout: Duration) -> PoolSummary {
        let deadline = Instant::now() + timeout;
        let mut summary = PoolSummary {
            workers: self.workers.len(),
            ..PoolSummary::default()
        };

        let mut workers = std::mem::take(&mut self.workers);
        workers.reverse();
        while let Some(worker) = workers.pop() {
            let WorkerHandle { id, mut handle } = worker;
            let sleep = sleep_until_deadline(deadline);

            tokio::select! {
                res = &mut handle => match res {
                    Ok(WorkerExit::Done) => summary.finished_on_done += 1,
                    Ok(WorkerExit::Cancelled) => summary.cancelled += 1,
                    Ok(WorkerExit::QueueClosed) => {}
                    Err(join_err) => {
                        summary.panicked += 1;
                        if join_err.is_panic() {
                            tracing::error!(worker_id = id, error = %join_err, "worker panicked");
                        } else {
                            tracing::error!(worker_id = id, error = %join_err, "worker join error");
                        }
                        self.shutdown.cancel();
                    }
                },
                _ = sleep => {
                    tracing::error!(worker_id = id, timeout = ?timeout, "worker did not stop in time");
                    handle.abort();
                    summary.aborted += 1 + workers.len();
                    abort_all(std::mem::take(&mut workers));
                }
            }
        }

        summary.done_republished = self.done_republished();
        tracing::info!(
            workers = summary.workers,
            done_republished = summary.done_republished,
            panicked = summary.panicked,
            aborted = summary.aborted,
            "worker pool drained"
        );
        summary
    }
}

struct Worker {
    id: usize,
    queue: SharedQueue,
    requeue: mpsc::UnboundedSender<Task>,
    results: mpsc::UnboundedSender<TaskOutcome>,
    done_republished: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run<R: TaskRunner>(self, mut runner: R) -> WorkerExit {
        tracing::debug!(worker_id = self.id, "worker started");

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break WorkerExit::Cancelled,
                task = next_task(&self.queue) => task,
            };

            match next {
                None => break WorkerExit::QueueClosed,
                Some(Task::Done) => {
                    if self.requeue.send(Task::Done).is_ok() {
                        self.done_republished.fetch_add(1, Ordering::SeqCst);
                    }
                    break WorkerExit::Done;
                }
                Some(Task::Fetch(task)) => self.process(&mut runner, task).await,
            }
        };

        runner.close().await;
        tracing::debug!(worker_id = self.id, exit = ?exit, "worker stopped");
        exit
    }

    async fn process<R: TaskRunner>(&self, runner: &mut R, task: FetchTask) {
        let guard = OutcomeGuard::new(task.key(), self.results.clone());

        let outcome = match runner.run(&task).await {
            Ok(executed) => {
                tracing::debug!(
                    worker_id = self.id,
                    key = %guard.key,
                    attempts = executed.attempts,
                    "task completed"
                );
                TaskOutcome::Completed(executed)
            }
            Err(err) => {
                tracing::warn!(
                    worker_id = self.id,
                    key = %guard.key,
                    error = %err,
                    "task failed"
                );
                TaskOutcome::Failed {
                    key: guard.key.clone(),
                    error: err.to_string(),
                }
            }
        };
        guard.complete(outcome);
    }
}

async fn next_task(queue: &SharedQueue) -> Option<Task> {
    queue.lock().await.recv().await
}

/// Sends exactly one outcome for a task, even if the worker unwinds mid-task.
struct OutcomeGuard {
    key: TaskKey,
    results: mpsc::UnboundedSender<TaskOutcome>,
    sent: bool,
}

impl OutcomeGuard {
    fn new(key: TaskKey, results: mpsc::UnboundedSender<TaskOutcome>) -> Self {
        Self {
            key,
            results,
            sent: false,
        }
    }

    fn complete(mut self, outcome: TaskOutcome) {
        self.sent = true;
        if self.results.send(outcome).is_err() {
            tracing::warn!(key = %self.key, "result channel closed, outcome dropped");
        }
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if self.sent {
            return;
        }
        let _ = self.results.send(TaskOutcome::Failed {
            key: self.key.clone(),
            error: "worker stopped before finishing the task".to_string(),
        });
    }
}

fn sleep_until_deadline(deadline: Instant) -> Sleep {
    tokio::time::sleep_until(deadline)
}

fn abort_all(workers: Vec<WorkerHandle>) {
    for worker in workers {
        worker.handle.abort();
    }
}
