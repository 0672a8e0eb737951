//! Request and job schedulers
//!
//! Both schedulers are internally synchronized queues shared between the
//! orchestration loops and the fetch callbacks:
//! - [`RequestScheduler`] pops requests by descending priority
//! - [`JobScheduler`] pops jobs in FIFO order
//!
//! Size queries read an atomic counter so the loops can poll them without
//! contending on the queue lock. Disposal is terminal: every later `put` or
//! `get` fails.

use crate::crawler::request::{Job, Request};
use crate::SchedulerError;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Storage behind a scheduler
trait Frontier: Send {
    type Item;

    fn push(&mut self, item: Self::Item);
    fn pop(&mut self) -> Option<Self::Item>;
    fn clear(&mut self);
}

/// A request ordered by its priority alone
///
/// Equal priorities compare equal; priority is rarely set, so no further
/// tie-breaking is done.
struct Prioritized(Request);

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.priority().cmp(&other.0.priority())
    }
}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority() == other.0.priority()
    }
}

impl Eq for Prioritized {}

impl Frontier for BinaryHeap<Prioritized> {
    type Item = Request;

    fn push(&mut self, item: Request) {
        BinaryHeap::push(self, Prioritized(item));
    }

    fn pop(&mut self) -> Option<Request> {
        BinaryHeap::pop(self).map(|p| p.0)
    }

    fn clear(&mut self) {
        BinaryHeap::clear(self);
    }
}

impl Frontier for VecDeque<Job> {
    type Item = Job;

    fn push(&mut self, item: Job) {
        self.push_back(item);
    }

    fn pop(&mut self) -> Option<Job> {
        self.pop_front()
    }

    fn clear(&mut self) {
        VecDeque::clear(self);
    }
}

/// Shared queue logic for both schedulers
struct SchedulerCore<F> {
    name: &'static str,
    queue: Mutex<F>,
    len: AtomicUsize,
    disposed: AtomicBool,
    pushed: Notify,
}

impl<F: Frontier> SchedulerCore<F> {
    fn new(name: &'static str, queue: F) -> Self {
        Self {
            name,
            queue: Mutex::new(queue),
            len: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            pushed: Notify::new(),
        }
    }

    fn put(&self, items: impl IntoIterator<Item = F::Item>) -> Result<(), SchedulerError> {
        let items: Vec<F::Item> = items.into_iter().collect();
        let count = items.len();

        // One lock acquisition for the whole batch
        {
            let mut queue = self.queue.lock();
            if self.disposed.load(Ordering::Acquire) {
                return Err(SchedulerError::Disposed {
                    scheduler: self.name,
                });
            }
            for item in items {
                queue.push(item);
            }
            self.len.fetch_add(count, Ordering::SeqCst);
        }

        if count > 0 {
            tracing::trace!("{} accepted {} items", self.name, count);
            self.pushed.notify_one();
        }
        Ok(())
    }

    fn get(&self, number: usize) -> Result<Vec<F::Item>, SchedulerError> {
        let mut queue = self.queue.lock();
        if self.disposed.load(Ordering::Acquire) {
            return Err(SchedulerError::Disposed {
                scheduler: self.name,
            });
        }

        let mut items = Vec::with_capacity(number.min(self.len.load(Ordering::SeqCst)));
        while items.len() < number {
            match queue.pop() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        self.len.fetch_sub(items.len(), Ordering::SeqCst);
        Ok(items)
    }

    fn dispose(&self) -> Result<(), SchedulerError> {
        let mut queue = self.queue.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyDisposed {
                scheduler: self.name,
            });
        }

        let abandoned = self.len.swap(0, Ordering::SeqCst);
        queue.clear();
        drop(queue);

        // Wake a loop that may be waiting on this scheduler
        self.pushed.notify_one();
        if abandoned > 0 {
            tracing::warn!("{} disposed with {} items abandoned", self.name, abandoned);
        } else {
            tracing::info!("{} disposed", self.name);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Priority queue of pending fetch requests
pub struct RequestScheduler {
    core: SchedulerCore<BinaryHeap<Prioritized>>,
}

impl RequestScheduler {
    /// Creates a scheduler pre-sized for `capacity_hint` requests
    pub fn new(capacity_hint: usize) -> Self {
        Self {
            core: SchedulerCore::new("RequestScheduler", BinaryHeap::with_capacity(capacity_hint)),
        }
    }

    /// Enqueues a batch of requests under a single lock acquisition
    pub fn put(&self, requests: impl IntoIterator<Item = Request>) -> Result<(), SchedulerError> {
        self.core.put(requests)
    }

    /// Pops up to `number` requests, highest priority first
    ///
    /// Returns immediately with whatever is available, possibly nothing.
    pub fn get(&self, number: usize) -> Result<Vec<Request>, SchedulerError> {
        self.core.get(number)
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    /// Permanently disables the scheduler and drops any queued requests
    pub fn dispose(&self) -> Result<(), SchedulerError> {
        self.core.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Resolves after requests have been put (or the scheduler was disposed)
    ///
    /// A notification raised while nobody is waiting is kept for the next
    /// waiter, so checking `is_empty` and then awaiting this cannot miss a put.
    pub async fn pushed(&self) {
        self.core.pushed.notified().await
    }
}

/// FIFO queue of pending jobs
pub struct JobScheduler {
    core: SchedulerCore<VecDeque<Job>>,
}

impl JobScheduler {
    /// Creates a scheduler pre-sized for `capacity_hint` jobs
    pub fn new(capacity_hint: usize) -> Self {
        Self {
            core: SchedulerCore::new("JobScheduler", VecDeque::with_capacity(capacity_hint)),
        }
    }

    pub fn put(&self, jobs: impl IntoIterator<Item = Job>) -> Result<(), SchedulerError> {
        self.core.put(jobs)
    }

    pub fn get(&self, number: usize) -> Result<Vec<Job>, SchedulerError> {
        self.core.get(number)
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    pub fn dispose(&self) -> Result<(), SchedulerError> {
        self.core.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    pub async fn pushed(&self) {
        self.core.pushed.notified().await
    }
}
