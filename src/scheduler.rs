//! Deferred execution for promise continuations.
//!
//! A promise never runs a handler inside the call that settled it or that
//! registered the handler. Instead it hands a [`Task`] to its [`Scheduler`],
//! which runs it on a later turn.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a scheduler, carried by every promise.
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Queue of deferred callbacks.
///
/// Implementations must not run `task` before `enqueue` returns, and must run
/// tasks in the order they were enqueued.
pub trait Scheduler: Send + Sync {
    fn enqueue(&self, task: Task);
}

/// A single-threaded queue drained explicitly by its owner.
///
/// Besides the plain FIFO it keeps virtual-time timers. The clock only moves
/// when the ready queue is empty, jumping to the earliest timer.
///
/// # Examples
///
/// ```
/// use promise_aplus::{QueueScheduler, Scheduler};
/// use std::sync::{Arc, Mutex};
///
/// let scheduler = QueueScheduler::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let log = seen.clone();
/// scheduler.enqueue(Box::new(move || log.lock().unwrap().push("ran")));
/// assert!(seen.lock().unwrap().is_empty());
/// assert_eq!(scheduler.run_until_idle(), 1);
/// assert_eq!(*seen.lock().unwrap(), vec!["ran"]);
/// ```
#[derive(Default)]
pub struct QueueScheduler {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    now: Duration,
    next_seq: u64,
    ready: VecDeque<Task>,
    timers: BinaryHeap<Timer>,
}

struct Timer {
    deadline: Duration,
    seq: u64,
    task: Task,
}

// BinaryHeap is a max-heap; invert so the earliest deadline pops first.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl QueueState {
    fn next_task(&mut self) -> Option<Task> {
        if let Some(task) = self.ready.pop_front() {
            return Some(task);
        }
        let timer = self.timers.pop()?;
        self.now = self.now.max(timer.deadline);
        Some(timer.task)
    }
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule `task` to run once the virtual clock has advanced by `delay`.
    pub fn enqueue_after(&self, delay: Duration, task: Task) {
        let mut state = self.state();
        let timer = Timer {
            deadline: state.now.saturating_add(delay),
            seq: state.next_seq,
            task,
        };
        state.next_seq += 1;
        state.timers.push(timer);
    }

    /// Run the next task, if any. Returns whether a task ran.
    pub fn run_once(&self) -> bool {
        // The lock is released before the task runs so it may enqueue more work.
        let task = self.state().next_task();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks, including ones they enqueue, until nothing is left.
    /// Returns the number of tasks that ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        log::trace!("queue scheduler drained {} tasks", ran);
        ran
    }

    /// Number of tasks waiting, timers included.
    pub fn len(&self) -> usize {
        let state = self.state();
        state.ready.len() + state.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state().now
    }
}

impl Scheduler for QueueScheduler {
    fn enqueue(&self, task: Task) {
        self.state().ready.push_back(task);
    }
}

impl Debug for QueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("QueueScheduler")
            .field("now", &state.now)
            .field("ready", &state.ready.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}
