//! Bounded worker pool with acquire/release permits.
//!
//! `num_workers` workers each run `max_tasks_per_worker` threads fed by a
//! bounded channel. A job may only be dispatched with a [`WorkerHandle`]
//! obtained from [`WorkerPool::acquire`], so at most
//! `num_workers * max_tasks_per_worker` jobs run at once, including while the
//! pool is being resized.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};

/// Errors raised by [`WorkerPool`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A pool needs at least one worker and one task slot per worker.
    #[error("pool needs at least one worker with one task slot, got {workers}x{tasks}")]
    EmptyPool { workers: usize, tasks: usize },
    /// Spawning a worker thread failed.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// The handle's worker has shut down.
    #[error("worker {0} is no longer running")]
    WorkerGone(usize),
}

/// Permit counters shared between the pool and its handles.
struct PoolState {
    in_use: Vec<usize>,
    active: usize,
    draining: bool,
    closed: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    changed: Condvar,
    max_tasks_per_worker: usize,
}

impl PoolShared {
    fn release(&self, worker: usize) {
        let mut state = self.state.lock();
        if let Some(count) = state.in_use.get_mut(worker) {
            *count = count.saturating_sub(1);
        }
        drop(state);
        self.changed.notify_all();
    }
}

/// A capacity permit bound to one worker.
///
/// Releasing happens exactly once: either through [`WorkerHandle::release`]
/// or when the handle is dropped.
pub struct WorkerHandle {
    worker: usize,
    shared: Arc<PoolShared>,
}

impl WorkerHandle {
    /// Index of the worker this permit belongs to.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Give the permit back to the pool.
    pub fn release(self) {}
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shared.release(self.worker);
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker", &self.worker)
            .finish()
    }
}

struct Envelope<J> {
    handle: WorkerHandle,
    job: J,
}

struct Worker<J> {
    sender: Sender<Envelope<J>>,
    threads: Vec<JoinHandle<()>>,
}

type Executor<J, R> = Arc<dyn Fn(J) -> R + Send + Sync>;
type CompletionHandler<R> = Arc<dyn Fn(WorkerHandle, R) + Send + Sync>;

/// A fixed set of workers executing jobs of type `J` into results of type `R`.
///
/// Every result is passed, together with the permit it ran under, to a single
/// completion handler on the worker thread. The handler is responsible for
/// releasing the permit (dropping it is enough).
pub struct WorkerPool<J: Send + 'static, R: Send + 'static> {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<Worker<J>>>,
    executor: Executor<J, R>,
    on_complete: CompletionHandler<R>,
    resizing: AtomicBool,
}

impl<J: Send + 'static, R: Send + 'static> WorkerPool<J, R> {
    /// Create a pool and start its worker threads.
    pub fn new(
        num_workers: usize,
        max_tasks_per_worker: usize,
        executor: impl Fn(J) -> R + Send + Sync + 'static,
        on_complete: impl Fn(WorkerHandle, R) + Send + Sync + 'static,
    ) -> Result<Self, PoolError> {
        if num_workers == 0 || max_tasks_per_worker == 0 {
            return Err(PoolError::EmptyPool {
                workers: num_workers,
                tasks: max_tasks_per_worker,
            });
        }

        let pool = Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    in_use: vec![0; num_workers],
                    active: num_workers,
                    draining: false,
                    closed: false,
                }),
                changed: Condvar::new(),
                max_tasks_per_worker,
            }),
            workers: Mutex::new(Vec::with_capacity(num_workers)),
            executor: Arc::new(executor),
            on_complete: Arc::new(on_complete),
            resizing: AtomicBool::new(false),
        };

        {
            let mut workers = pool.workers.lock();
            for index in 0..num_workers {
                workers.push(pool.spawn_worker(index)?);
            }
        }
        Ok(pool)
    }

    fn spawn_worker(&self, index: usize) -> Result<Worker<J>, PoolError> {
        let tasks = self.shared.max_tasks_per_worker;
        let (sender, receiver) = bounded::<Envelope<J>>(tasks);
        let mut threads = Vec::with_capacity(tasks);

        for slot in 0..tasks {
            let receiver = receiver.clone();
            let executor = Arc::clone(&self.executor);
            let on_complete = Arc::clone(&self.on_complete);
            let handle = thread::Builder::new()
                .name(format!("pool-worker-{index}.{slot}"))
                .spawn(move || {
                    while let Ok(Envelope { handle, job }) = receiver.recv() {
                        let result = executor(job);
                        on_complete(handle, result);
                    }
                })
                .map_err(PoolError::Spawn)?;
            threads.push(handle);
        }

        Ok(Worker { sender, threads })
    }

    /// Wait for a free slot and claim it.
    ///
    /// Returns `None` without waiting while a drain is in progress, and wakes
    /// up with `None` if a drain starts while waiting.
    pub fn acquire(&self) -> Option<WorkerHandle> {
        let mut state = self.shared.state.lock();
        loop {
            if state.draining || state.closed {
                return None;
            }
            let max = self.shared.max_tasks_per_worker;
            let active = state.active;
            if let Some(worker) = state.in_use[..active].iter().position(|&n| n < max) {
                state.in_use[worker] += 1;
                return Some(WorkerHandle {
                    worker,
                    shared: Arc::clone(&self.shared),
                });
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Give a permit back without dispatching a job.
    pub fn release(&self, handle: WorkerHandle) {
        handle.release();
    }

    /// Queue `job` on the handle's worker. The handle travels with the job and
    /// reaches the completion handler together with the result.
    pub fn dispatch(&self, handle: WorkerHandle, job: J) -> Result<(), PoolError> {
        let worker = handle.worker;
        let sender = self
            .workers
            .lock()
            .get(worker)
            .map(|w| w.sender.clone())
            .ok_or(PoolError::WorkerGone(worker))?;
        sender
            .send(Envelope { handle, job })
            .map_err(|_| PoolError::WorkerGone(worker))
    }

    /// Change the number of workers.
    ///
    /// Returns `false` when `new_count` is zero or another resize is still
    /// running. Shrinking stops handing out permits for the removed workers
    /// and blocks until their running jobs have released them.
    pub fn resize(&self, new_count: usize) -> bool {
        if new_count == 0 || self.resizing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let old_count = self.shared.state.lock().active;
        let resized = if new_count > old_count {
            self.grow(old_count, new_count)
        } else if new_count < old_count {
            self.shrink(old_count, new_count);
            true
        } else {
            true
        };

        self.resizing.store(false, Ordering::Release);
        if resized {
            tracing::info!("Worker pool resized from {old_count} to {new_count} workers");
        }
        resized
    }

    fn grow(&self, old_count: usize, new_count: usize) -> bool {
        let mut workers = self.workers.lock();
        for index in old_count..new_count {
            match self.spawn_worker(index) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    tracing::error!("failed to grow worker pool: {e}");
                    break;
                }
            }
        }
        let spawned = workers.len();
        drop(workers);

        let mut state = self.shared.state.lock();
        state.in_use.resize(spawned, 0);
        state.active = spawned;
        drop(state);
        self.shared.changed.notify_all();
        spawned == new_count
    }

    fn shrink(&self, old_count: usize, new_count: usize) {
        let mut state = self.shared.state.lock();
        state.active = new_count;
        while state.in_use[new_count..old_count].iter().any(|&n| n > 0) {
            self.shared.changed.wait(&mut state);
        }
        state.in_use.truncate(new_count);
        drop(state);

        let removed = self.workers.lock().split_off(new_count);
        join_workers(removed);
    }

    /// Refuse new permits and wait until every running job has released its
    /// permit.
    pub fn drain(&self) {
        let mut state = self.shared.state.lock();
        state.draining = true;
        self.shared.changed.notify_all();
        while state.in_use.iter().any(|&n| n > 0) {
            self.shared.changed.wait(&mut state);
        }
        state.draining = false;
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Number of active workers.
    pub fn num_workers(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Maximum number of concurrently held permits.
    pub fn capacity(&self) -> usize {
        self.num_workers() * self.shared.max_tasks_per_worker
    }

    /// Number of permits currently held.
    pub fn in_use(&self) -> usize {
        self.shared.state.lock().in_use.iter().sum()
    }

    /// Whether a drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().draining
    }
}

impl<J: Send + 'static, R: Send + 'static> Drop for WorkerPool<J, R> {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.changed.notify_all();
        let workers = std::mem::take(&mut *self.workers.lock());
        join_workers(workers);
    }
}

/// Close the workers' channels and wait for their threads to finish.
fn join_workers<J>(workers: Vec<Worker<J>>) {
    let current = thread::current().id();
    for Worker { sender, threads } in workers {
        drop(sender);
        for handle in threads {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("pool worker thread panicked");
            }
        }
    }
}
