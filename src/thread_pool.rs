// src/thread_pool.rs

//! A fixed-size worker pool for blocking background work (disk writing, waiting on input).

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    running: usize,
    stopping: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    task_ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A worker never panics while holding the lock (tasks run outside it), so a poisoned
        // mutex still holds a consistent queue.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                running: 0,
                stopping: false,
            }),
            task_ready: Condvar::new(),
        });

        let workers = (0..size)
            .filter_map(|index| {
                let shared = shared.clone();
                thread::Builder::new()
                    .name(format!("engine-worker-{}", index))
                    .spawn(move || worker_loop(&shared))
                    .map_err(|e| log::error!("Failed to spawn worker thread {}: {}", index, e))
                    .ok()
            })
            .collect::<Vec<_>>();

        log::debug!("Thread pool started with {} workers", workers.len());
        Self { shared, workers }
    }

    /// A pool sized to the machine's hardware concurrency, never smaller than two workers.
    pub fn with_hardware_concurrency() -> Self {
        let threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(threads.max(2))
    }

    /// Queues `task` and wakes one idle worker.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        state.tasks.push_back(Box::new(task));
        drop(state);
        self.shared.task_ready.notify_one();
    }

    /// Workers not currently running a task.
    pub fn available(&self) -> usize {
        let state = self.shared.lock();
        self.workers.len().saturating_sub(state.running)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.lock().tasks.len()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    state.running += 1;
                    break task;
                }
                if state.stopping {
                    return;
                }
                state = shared
                    .task_ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        };

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        if outcome.is_err() {
            log::error!("A thread pool task panicked");
        }

        shared.lock().running -= 1;
    }
}

impl Drop for ThreadPool {
    /// Lets the workers drain every queued task, then joins them.
    fn drop(&mut self) {
        self.shared.lock().stopping = true;
        self.shared.task_ready.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A worker thread panicked during shutdown");
            }
        }
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size())
            .field("available", &self.available())
            .finish()
    }
}
