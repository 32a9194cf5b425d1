use std::fmt::Debug;
use crate::resolution::Resolution;
use crate::scheduler::SchedulerRef;
use crate::{Error, Promise, Resolver};

/// A `Deferred` pairs a pending promise with the capabilities that settle it,
/// for bridging callback-style producers.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Deferred, Error, ChannelScheduler};
/// use futures::executor::block_on;
/// use std::{sync::Arc, thread};
///
/// let scheduler = Arc::new(ChannelScheduler::spawn().unwrap());
/// let (promise, resolver) = Deferred::<String, Error>::new(scheduler).into_parts();
///
/// let task1 = thread::spawn(move || block_on(promise));
/// resolver.resolve("Hi".into());
/// assert_eq!(task1.join().expect("The task1 thread has panicked."), Ok("Hi".to_string()));
/// ```
pub struct Deferred<T, E> {
    pub promise: Promise<T, E>,
    resolver: Resolver<T, E>,
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: From<Error> + Clone + Send + 'static,
{
    pub fn new(scheduler: SchedulerRef) -> Self {
        let promise = Promise::pending(scheduler);
        let resolver = Resolver::new(promise.clone());
        Self { promise, resolver }
    }

    pub fn resolve(&self, value: T) {
        self.resolver.resolve(value)
    }

    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        self.resolver.resolve_with(resolution)
    }

    pub fn reject(&self, reason: E) {
        self.resolver.reject(reason)
    }

    /// A capability handle that can be moved to the producer.
    pub fn resolver(&self) -> Resolver<T, E> {
        self.resolver.clone()
    }

    pub fn into_parts(self) -> (Promise<T, E>, Resolver<T, E>) {
        (self.promise, self.resolver)
    }
}

impl<T, E> Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish_non_exhaustive()
    }
}
