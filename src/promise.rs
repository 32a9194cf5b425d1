use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::{future::Future, task::{Poll, Waker}};
use crate::resolution::{resolve_into, Resolution};
use crate::scheduler::SchedulerRef;
use crate::{Error, Resolver};

/// What a handler hands back: a value or thenable to resolve the derived
/// promise with, or a reason to reject it with.
pub type HandlerResult<U, E> = Result<Resolution<U, E>, E>;

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

/// Observable settlement status of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

/// An asynchronous value that is fulfilled with a `T` or rejected with an
/// `E`, exactly once.
///
/// Clones share the same state. Handlers registered with [`Promise::then`]
/// and friends always run on a later turn of the promise's scheduler, whether
/// they were registered before or after settlement. A promise can also be
/// awaited; every awaiter gets a clone of the settled result.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Error, Promise, QueueScheduler, Resolution};
/// use std::sync::Arc;
///
/// let scheduler = Arc::new(QueueScheduler::new());
/// let promise = Promise::<i32, Error>::new(scheduler.clone(), |resolver| {
///     resolver.resolve(20);
///     Ok(())
/// });
/// let doubled = promise.and_then(|v| Ok(Resolution::Value(v * 2)));
/// assert!(doubled.is_pending());
/// scheduler.run_until_idle();
/// assert_eq!(doubled.outcome(), Some(Ok(40)));
/// ```
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
    scheduler: SchedulerRef,
}

struct Inner<T, E> {
    state: State<T, E>,
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
    // Settled, but reactions are still being handed to the scheduler.
    flushing: bool,
}

enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    fn status(&self) -> Status {
        match self {
            State::Pending => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }
}

impl<T: Clone, E: Clone> State<T, E> {
    fn outcome(&self) -> Option<Result<T, E>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> Promise<T, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Status {
        self.lock().state.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// Whether both handles point at the same promise.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn scheduler(&self) -> &SchedulerRef {
        &self.scheduler
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: From<Error> + Clone + Send + 'static,
{
    pub(crate) fn pending(scheduler: SchedulerRef) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                reactions: vec![],
                wakers: vec![],
                flushing: false,
            })),
            scheduler,
        }
    }

    /// promise.new
    ///
    /// Runs `setup` synchronously with the promise's resolver. An `Err`
    /// returned from `setup` rejects the promise, unless the resolver was
    /// already used.
    pub fn new<F>(scheduler: SchedulerRef, setup: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending(scheduler);
        let resolver = Resolver::new(promise.clone());
        if let Err(reason) = setup(resolver.clone()) {
            resolver.reject(reason);
        }
        promise
    }

    /// The settled result, if the promise is no longer pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.lock().state.outcome()
    }

    /// The pending to settled transition. No-op once settled.
    ///
    /// Reactions are enqueued outside the lock. Anything registered while
    /// that happens is queued behind them, so registration order holds.
    pub(crate) fn settle(&self, outcome: Result<T, E>) {
        let (mut batch, wakers) = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(reason) => State::Rejected(reason.clone()),
            };
            inner.flushing = true;
            (
                std::mem::take(&mut inner.reactions),
                std::mem::take(&mut inner.wakers),
            )
        };
        log::trace!(
            "promise {} with {} queued reactions",
            if outcome.is_ok() { "fulfilled" } else { "rejected" },
            batch.len()
        );
        loop {
            for reaction in batch {
                let outcome = outcome.clone();
                self.scheduler.enqueue(Box::new(move || reaction(outcome)));
            }
            let mut inner = self.lock();
            batch = std::mem::take(&mut inner.reactions);
            if batch.is_empty() {
                inner.flushing = false;
                break;
            }
        }
        for waker in wakers {
            waker.wake()
        }
    }

    /// Register `reaction` to receive the settled result on a later turn.
    pub(crate) fn subscribe<F>(&self, reaction: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let mut inner = self.lock();
        let settled = inner.state.outcome();
        match settled {
            Some(outcome) if !inner.flushing => {
                drop(inner);
                self.scheduler.enqueue(Box::new(move || reaction(outcome)));
            }
            _ => inner.reactions.push(Box::new(reaction)),
        }
    }

    /// promise.then
    ///
    /// Returns a derived promise settled by whichever handler runs. A handler
    /// returning `Ok(resolution)` resolves the derived promise through the
    /// resolution procedure, `Err(reason)` rejects it.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> HandlerResult<U, E> + Send + 'static,
        R: FnOnce(E) -> HandlerResult<U, E> + Send + 'static,
    {
        let derived = Promise::pending(self.scheduler.clone());
        let target = derived.clone();
        self.subscribe(move |outcome| {
            let produced = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            match produced {
                Ok(resolution) => resolve_into(&target, resolution),
                Err(reason) => target.settle(Err(reason)),
            }
        });
        derived
    }

    /// `then` with only a fulfillment handler; rejections pass through.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> HandlerResult<U, E> + Send + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// promise.catch
    ///
    /// `then` with only a rejection handler; values pass through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> HandlerResult<T, E> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// promise.finally
    ///
    /// Once settled, schedules `callback` for a later turn and settles the
    /// returned promise with the original value or reason.
    pub fn finally<F>(&self, callback: F) -> Promise<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        let on_fulfilled = Finally::new(self.scheduler.clone(), callback);
        let on_rejected = on_fulfilled.clone();
        self.then(
            move |value| {
                on_fulfilled.schedule();
                Ok(Resolution::Value(value))
            },
            move |reason| {
                on_rejected.schedule();
                Err(reason)
            },
        )
    }
}

/// The `finally` callback, shared by both handlers of which only one runs.
struct Finally<F> {
    scheduler: SchedulerRef,
    callback: Arc<Mutex<Option<F>>>,
}

impl<F> Clone for Finally<F> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<F: FnOnce() + Send + 'static> Finally<F> {
    fn new(scheduler: SchedulerRef, callback: F) -> Self {
        Self {
            scheduler,
            callback: Arc::new(Mutex::new(Some(callback))),
        }
    }

    fn schedule(&self) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            self.scheduler.enqueue(Box::new(callback));
        }
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let mut inner = self.lock();
        let settled = inner.state.outcome();
        match settled {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                // Every awaiter keeps its own waker; they are all woken on settle.
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> Debug for Promise<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Promise")
            .field("status", &inner.state.status())
            .field("reactions", &inner.reactions.len())
            .finish()
    }
}
