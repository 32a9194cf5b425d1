//! Static constructors, built from the promise core and the resolution
//! procedure only.
use std::sync::{Arc, Mutex, PoisonError};
use crate::resolution::{resolve_into, Resolution};
use crate::scheduler::SchedulerRef;
use crate::{Deferred, Error, Promise};

/// Slots for `all`, filled as entries fulfill.
struct Collected<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Collected<T> {
    /// Store the `index`th value; yields every value once the last one lands.
    fn fill(&mut self, index: usize, value: T) -> Option<Vec<T>> {
        if self.values[index].replace(value).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        Some(self.values.drain(..).flatten().collect())
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: From<Error> + Clone + Send + 'static,
{
    /// Promise.resolve
    ///
    /// A promise of this crate is returned unchanged. Anything else goes
    /// through the resolution procedure: plain values fulfill right away,
    /// foreign thenables are assimilated.
    pub fn resolve(scheduler: SchedulerRef, resolution: Resolution<T, E>) -> Self {
        match resolution {
            Resolution::Promise(promise) => promise,
            resolution => {
                let promise = Self::pending(scheduler);
                resolve_into(&promise, resolution);
                promise
            }
        }
    }

    /// Promise.reject
    ///
    /// `reason` is used verbatim, never assimilated.
    pub fn reject(scheduler: SchedulerRef, reason: E) -> Self {
        let promise = Self::pending(scheduler);
        promise.settle(Err(reason));
        promise
    }

    /// Promise.all
    ///
    /// Fulfills with every entry's value in input order once all of them
    /// fulfill, or rejects with the first rejection observed. Entries that
    /// settle after that keep running; their results are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{Error, Promise, QueueScheduler, Resolution};
    /// use std::sync::Arc;
    ///
    /// let scheduler = Arc::new(QueueScheduler::new());
    /// let all = Promise::<i32, Error>::all(
    ///     scheduler.clone(),
    ///     vec![
    ///         Resolution::Value(1),
    ///         Resolution::from(Promise::reject(scheduler.clone(), Error::from("x"))),
    ///         Resolution::Value(3),
    ///     ],
    /// );
    /// scheduler.run_until_idle();
    /// assert_eq!(all.outcome(), Some(Err(Error::from("x"))));
    /// ```
    pub fn all<I>(scheduler: SchedulerRef, entries: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Resolution<T, E>>,
    {
        let entries: Vec<Self> = entries
            .into_iter()
            .map(|entry| Self::resolve(scheduler.clone(), entry))
            .collect();
        Promise::new(scheduler, move |resolver| {
            if entries.is_empty() {
                resolver.resolve(Vec::new());
                return Ok(());
            }
            let collected = Arc::new(Mutex::new(Collected {
                values: entries.iter().map(|_| None).collect(),
                remaining: entries.len(),
            }));
            for (index, entry) in entries.into_iter().enumerate() {
                let resolver = resolver.clone();
                let collected = collected.clone();
                entry.subscribe(move |outcome| match outcome {
                    Ok(value) => {
                        let done = collected
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .fill(index, value);
                        if let Some(values) = done {
                            resolver.resolve(values);
                        }
                    }
                    Err(reason) => resolver.reject(reason),
                });
            }
            Ok(())
        })
    }

    /// Promise.race
    ///
    /// Settles like whichever entry settles first. An empty list never
    /// settles.
    pub fn race<I>(scheduler: SchedulerRef, entries: I) -> Self
    where
        I: IntoIterator<Item = Resolution<T, E>>,
    {
        let entries: Vec<Self> = entries
            .into_iter()
            .map(|entry| Self::resolve(scheduler.clone(), entry))
            .collect();
        Promise::new(scheduler, move |resolver| {
            for entry in entries {
                let resolver = resolver.clone();
                entry.subscribe(move |outcome| match outcome {
                    Ok(value) => resolver.resolve(value),
                    Err(reason) => resolver.reject(reason),
                });
            }
            Ok(())
        })
    }

    /// A promise that stays pending forever, to cut a chain short.
    pub fn never(scheduler: SchedulerRef) -> Self {
        Promise::new(scheduler, |_| Ok(()))
    }

    pub fn stop(scheduler: SchedulerRef) -> Self {
        Self::never(scheduler)
    }

    pub fn done(scheduler: SchedulerRef) -> Self {
        Self::never(scheduler)
    }

    pub fn deferred(scheduler: SchedulerRef) -> Deferred<T, E> {
        Deferred::new(scheduler)
    }

    pub fn defer(scheduler: SchedulerRef) -> Deferred<T, E> {
        Deferred::new(scheduler)
    }
}
