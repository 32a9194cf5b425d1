//! The promise resolution procedure.
//!
//! Whatever a setup routine or handler produces is folded into a target
//! promise here: plain values fulfill it, promises and foreign thenables are
//! assimilated by chaining onto them, and a promise resolved with itself is
//! rejected with [`Error::ChainingCycle`].
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::{Error, Promise};

/// A value exposing the chaining shape, regardless of where it comes from.
///
/// `chain` is invoked once, with a fresh [`Resolver`] bound to the promise
/// being resolved. Only the first of `resolver.resolve*`, `resolver.reject`,
/// or an `Err` return takes effect.
pub trait Thenable<T, E>: Send {
    fn chain(self: Box<Self>, resolver: Resolver<T, E>) -> Result<(), E>;
}

/// What a promise can be resolved with.
pub enum Resolution<T, E> {
    /// A plain value, fulfilled as is.
    Value(T),
    /// A promise of this crate, adopted by chaining onto it.
    Promise(Promise<T, E>),
    /// A foreign thenable, assimilated by calling its `chain`.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: Debug, E> Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// One-shot flag shared by a resolver and its clones.
#[derive(Debug, Clone, Default)]
struct Latch(Arc<AtomicBool>);

impl Latch {
    /// Returns true for the first caller only.
    fn fire(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// The resolve/reject capabilities of one promise.
///
/// Clones share a latch: whichever call comes first across all of them
/// decides, the rest are ignored.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
    latch: Latch,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T, E> Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise)
            .field("used", &self.latch.0.load(Ordering::Acquire))
            .finish()
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: From<Error> + Clone + Send + 'static,
{
    pub(crate) fn new(promise: Promise<T, E>) -> Self {
        Self {
            promise,
            latch: Latch::default(),
        }
    }

    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value))
    }

    /// Resolve with a value, a promise, or a foreign thenable.
    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        if self.latch.fire() {
            resolve_into(&self.promise, resolution);
        }
    }

    pub fn reject(&self, reason: E) {
        if self.latch.fire() {
            self.promise.settle(Err(reason));
        }
    }
}

/// Fold `resolution` into `promise`.
pub(crate) fn resolve_into<T, E>(promise: &Promise<T, E>, resolution: Resolution<T, E>)
where
    T: Clone + Send + 'static,
    E: From<Error> + Clone + Send + 'static,
{
    if !promise.is_pending() {
        return;
    }
    let thenable: Box<dyn Thenable<T, E>> = match resolution {
        Resolution::Value(value) => {
            promise.settle(Ok(value));
            return;
        }
        Resolution::Promise(other) if other.ptr_eq(promise) => {
            log::debug!("promise resolved with itself");
            promise.settle(Err(Error::ChainingCycle.into()));
            return;
        }
        Resolution::Promise(other) => Box::new(other),
        Resolution::Thenable(thenable) => thenable,
    };
    let resolver = Resolver::new(promise.clone());
    if let Err(reason) = thenable.chain(resolver.clone()) {
        resolver.reject(reason);
    }
}

impl<T, E> Thenable<T, E> for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: From<Error> + Clone + Send + 'static,
{
    fn chain(self: Box<Self>, resolver: Resolver<T, E>) -> Result<(), E> {
        // Reached when a promise is wrapped as a plain thenable.
        if self.ptr_eq(&resolver.promise) {
            log::debug!("promise chained onto itself");
            return Err(Error::ChainingCycle.into());
        }
        self.subscribe(move |outcome| match outcome {
            Ok(value) => resolver.resolve(value),
            Err(reason) => resolver.reject(reason),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Resolution, Resolver, Thenable};
    use crate::{Error, Promise, QueueScheduler, Status};
    use std::sync::{Arc, Mutex};

    /// Settles synchronously, then tries everything else too.
    struct Greedy;

    impl Thenable<i32, Error> for Greedy {
        fn chain(self: Box<Self>, resolver: Resolver<i32, Error>) -> Result<(), Error> {
            resolver.resolve(1);
            resolver.reject(Error::from("second"));
            resolver.resolve(3);
            Err(Error::from("thrown"))
        }
    }

    /// Fails before touching the resolver.
    struct Throwing;

    impl Thenable<i32, Error> for Throwing {
        fn chain(self: Box<Self>, _resolver: Resolver<i32, Error>) -> Result<(), Error> {
            Err(Error::from("getter blew up"))
        }
    }

    /// Hands its resolver out to be settled later.
    struct Parked(Arc<Mutex<Option<Resolver<i32, Error>>>>);

    impl Thenable<i32, Error> for Parked {
        fn chain(self: Box<Self>, resolver: Resolver<i32, Error>) -> Result<(), Error> {
            *self.0.lock().unwrap() = Some(resolver);
            Ok(())
        }
    }

    /// Resolves with another thenable, `depth` levels deep.
    struct Nested(u32);

    impl Thenable<i32, Error> for Nested {
        fn chain(self: Box<Self>, resolver: Resolver<i32, Error>) -> Result<(), Error> {
            match self.0 {
                0 => resolver.resolve(42),
                depth => resolver.resolve_with(Resolution::thenable(Nested(depth - 1))),
            }
            Ok(())
        }
    }

    #[test]
    fn test_first_thenable_call_wins() {
        let scheduler = Arc::new(QueueScheduler::new());
        let promise = Promise::<i32, Error>::resolve(scheduler, Resolution::thenable(Greedy));
        assert_eq!(promise.outcome(), Some(Ok(1)));
    }

    #[test]
    fn test_thenable_error_rejects() {
        let scheduler = Arc::new(QueueScheduler::new());
        let promise = Promise::<i32, Error>::resolve(scheduler, Resolution::thenable(Throwing));
        assert_eq!(promise.outcome(), Some(Err(Error::from("getter blew up"))));
    }

    #[test]
    fn test_nested_thenables_are_unwrapped() {
        let scheduler = Arc::new(QueueScheduler::new());
        let promise = Promise::<i32, Error>::resolve(scheduler, Resolution::thenable(Nested(5)));
        assert_eq!(promise.outcome(), Some(Ok(42)));
    }

    #[test]
    fn test_parked_thenable_settles_later_once() {
        let scheduler = Arc::new(QueueScheduler::new());
        let slot = Arc::new(Mutex::new(None));
        let promise =
            Promise::<i32, Error>::resolve(scheduler, Resolution::thenable(Parked(slot.clone())));
        assert_eq!(promise.status(), Status::Pending);

        let resolver = slot.lock().unwrap().take().expect("chain was not called");
        resolver.reject(Error::from("first"));
        resolver.resolve(2);
        assert_eq!(promise.outcome(), Some(Err(Error::from("first"))));
    }

    #[test]
    fn test_resolving_with_itself_is_a_cycle() {
        let scheduler = Arc::new(QueueScheduler::new());
        let deferred = Promise::<i32, Error>::deferred(scheduler);
        deferred.resolve_with(Resolution::from(deferred.promise.clone()));
        assert_eq!(deferred.promise.outcome(), Some(Err(Error::ChainingCycle)));
    }

    #[test]
    fn test_itself_as_thenable_is_a_cycle() {
        let scheduler = Arc::new(QueueScheduler::new());
        let deferred = Promise::<i32, Error>::deferred(scheduler.clone());
        deferred.resolve_with(Resolution::thenable(deferred.promise.clone()));
        assert_eq!(deferred.promise.outcome(), Some(Err(Error::ChainingCycle)));
        scheduler.run_until_idle();
        assert_eq!(deferred.promise.status(), Status::Rejected);
    }

    #[test]
    fn test_resolver_is_final_while_assimilating() {
        let scheduler = Arc::new(QueueScheduler::new());
        let slot = Arc::new(Mutex::new(None));
        let deferred = Promise::<i32, Error>::deferred(scheduler);
        deferred.resolve_with(Resolution::thenable(Parked(slot.clone())));
        deferred.reject(Error::from("too late"));
        assert!(deferred.promise.is_pending());

        let resolver = slot.lock().unwrap().take().expect("chain was not called");
        resolver.resolve(9);
        assert_eq!(deferred.promise.outcome(), Some(Ok(9)));
    }

    #[test]
    fn test_adopts_rejected_promise_on_later_turn() {
        let scheduler = Arc::new(QueueScheduler::new());
        let rejected = Promise::<i32, Error>::reject(scheduler.clone(), Error::from("p2"));
        let deferred = Promise::<i32, Error>::deferred(scheduler.clone());
        deferred.resolve_with(Resolution::from(rejected));
        assert!(deferred.promise.is_pending());
        scheduler.run_until_idle();
        assert_eq!(deferred.promise.outcome(), Some(Err(Error::from("p2"))));
    }
}
