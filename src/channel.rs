//! A channel scheduler uses a multi-producer, single-consumer channel as its
//! backend. Any thread may enqueue, one worker thread runs the tasks.
//!
use crate::scheduler::{Scheduler, Task};
use std::{
    fmt::Debug,
    io,
    sync::{
        mpsc::{channel, Sender},
        Mutex, PoisonError,
    },
    thread,
};

/// Runs promise continuations on a dedicated worker thread, in send order.
///
/// The worker exits once the scheduler, and with it the sending half of the
/// channel, is dropped.
///
/// # Examples
///
/// ```
/// use promise_aplus::{ChannelScheduler, Error, Promise, Resolution, SchedulerRef};
/// use futures::executor::block_on;
/// use std::sync::Arc;
///
/// let scheduler: SchedulerRef = Arc::new(ChannelScheduler::spawn().unwrap());
/// let promise = Promise::<String, Error>::resolve(scheduler, Resolution::Value("a".into()))
///     .map(|v| v + "b");
/// assert_eq!(block_on(promise), Ok("ab".to_string()));
/// ```
pub struct ChannelScheduler {
    sender: Mutex<Sender<Task>>,
}

impl ChannelScheduler {
    pub fn spawn() -> io::Result<Self> {
        Self::with_name("promise-scheduler")
    }

    pub fn with_name(name: impl Into<String>) -> io::Result<Self> {
        let (sender, receiver) = channel::<Task>();
        let name = name.into();
        log::debug!("starting scheduler worker {:?}", name);
        thread::Builder::new().name(name).spawn(move || {
            for task in receiver {
                task();
            }
            log::trace!("scheduler worker exiting");
        })?;
        Ok(Self {
            sender: Mutex::new(sender),
        })
    }
}

impl Scheduler for ChannelScheduler {
    fn enqueue(&self, task: Task) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        // Only fails when the worker died, e.g. a task panicked.
        if sender.send(task).is_err() {
            log::error!("Scheduler worker is gone, dropping task.");
        }
    }
}

impl Debug for ChannelScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelScheduler").finish_non_exhaustive()
    }
}
