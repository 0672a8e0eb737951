//! Bounded worker pool shared by the downloader and the scraper
//!
//! A pool owns a fixed number of worker tasks pulling from an unbounded
//! intake queue. Submission never blocks; backpressure is left to the caller,
//! which compares [`WorkerPool::num_waiting_jobs`] with
//! [`WorkerPool::num_workers`] before submitting.
//!
//! The pool is parametrized by an [`Executor`], one per kind of work, so the
//! downloader and the scraper share this scheduling code while keeping their
//! item types distinct.

use crate::{PoolError, TaskError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::{JoinError, JoinHandle};

/// Executes one kind of pool item
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    type Item: Send + 'static;
    type Output: Send + 'static;

    async fn execute(&self, item: Self::Item) -> Result<Self::Output, TaskError>;
}

/// Completion hook, run by the worker once the item has finished
pub type Completion<O> = Box<dyn FnOnce(Result<O, TaskError>) + Send + 'static>;

struct Envelope<E: Executor> {
    item: E::Item,
    on_complete: Completion<E::Output>,
}

type Intake<E> = Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope<E>>>>;

struct Running<E: Executor> {
    sender: mpsc::UnboundedSender<Envelope<E>>,
    workers: Vec<JoinHandle<()>>,
}

/// Fixed-size pool of workers running items through an [`Executor`]
pub struct WorkerPool<E: Executor> {
    name: &'static str,
    executor: Arc<E>,
    limit: usize,
    in_flight: Arc<AtomicUsize>,
    completed: Arc<Notify>,
    running: Mutex<Option<Running<E>>>,
}

impl<E: Executor> WorkerPool<E> {
    /// Creates a closed pool with `limit` workers
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerPool)` - The pool, ready to be opened
    /// * `Err(PoolError::InvalidConcurrency)` - `limit` is zero
    pub fn with_executor(name: &'static str, limit: usize, executor: E) -> Result<Self, PoolError> {
        if limit == 0 {
            return Err(PoolError::InvalidConcurrency { pool: name, limit });
        }

        Ok(Self {
            name,
            executor: Arc::new(executor),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(Notify::new()),
            running: Mutex::new(None),
        })
    }

    /// Spawns the workers and starts accepting submissions
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self) -> Result<(), PoolError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(PoolError::AlreadyOpen { pool: self.name });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let intake: Intake<E> = Arc::new(AsyncMutex::new(receiver));
        let workers = (0..self.limit)
            .map(|id| {
                tokio::spawn(worker_loop(
                    self.name,
                    id,
                    Arc::clone(&intake),
                    Arc::clone(&self.executor),
                    Arc::clone(&self.in_flight),
                    Arc::clone(&self.completed),
                ))
            })
            .collect();

        *running = Some(Running { sender, workers });
        tracing::info!("{} opened with {} workers", self.name, self.limit);
        Ok(())
    }

    /// Stops accepting submissions, drains accepted items and joins the workers
    pub async fn close(&self) -> Result<(), PoolError> {
        let running = self
            .running
            .lock()
            .take()
            .ok_or(PoolError::NotOpen { pool: self.name })?;

        // Workers exit once the intake is closed and empty
        drop(running.sender);
        for worker in running.workers {
            if let Err(e) = worker.await {
                tracing::error!("{} worker terminated abnormally: {}", self.name, e);
            }
        }

        tracing::info!("{} closed", self.name);
        Ok(())
    }

    /// Closes the pool without joining its workers
    ///
    /// Used to undo an `open` before anything was submitted: the detached
    /// workers exit on their own once the intake is closed and empty.
    pub(crate) fn release(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        drop(running.sender);
        tracing::info!("{} released", self.name);
        true
    }

    /// Hands an item to the pool without waiting for a free worker
    ///
    /// `on_complete` runs exactly once, on the worker, after the item has
    /// finished and before the in-flight count drops.
    pub fn submit<F>(&self, item: E::Item, on_complete: F) -> Result<(), PoolError>
    where
        F: FnOnce(Result<E::Output, TaskError>) + Send + 'static,
    {
        let running = self.running.lock();
        let Some(running) = running.as_ref() else {
            return Err(PoolError::NotOpen { pool: self.name });
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope {
            item,
            on_complete: Box::new(on_complete),
        };
        if running.sender.send(envelope).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::NotOpen { pool: self.name });
        }
        Ok(())
    }

    /// Items submitted but not yet completed
    pub fn num_waiting_jobs(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn num_workers(&self) -> usize {
        self.limit
    }

    pub fn is_open(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolves after an item completes
    ///
    /// Completions that happen while nobody waits leave one pending wakeup.
    pub async fn completed(&self) {
        self.completed.notified().await
    }

    pub(crate) fn executor(&self) -> &E {
        &self.executor
    }
}

async fn worker_loop<E: Executor>(
    pool: &'static str,
    id: usize,
    intake: Intake<E>,
    executor: Arc<E>,
    in_flight: Arc<AtomicUsize>,
    completed: Arc<Notify>,
) {
    loop {
        let envelope = {
            let mut receiver = intake.lock().await;
            receiver.recv().await
        };
        let Some(Envelope { item, on_complete }) = envelope else {
            break;
        };

        // Each item runs in its own task so a panic cannot take the worker down
        let executor = Arc::clone(&executor);
        let outcome = tokio::spawn(async move { executor.execute(item).await })
            .await
            .unwrap_or_else(|e| Err(task_error(e)));

        on_complete(outcome);
        in_flight.fetch_sub(1, Ordering::SeqCst);
        completed.notify_one();
    }

    tracing::trace!("{} worker {} exited", pool, id);
}

/// Converts a failed join into the error reported to completion hooks
pub(crate) fn task_error(error: JoinError) -> TaskError {
    if error.is_panic() {
        TaskError::Panicked(panic_message(error.into_panic()))
    } else {
        TaskError::Cancelled
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
