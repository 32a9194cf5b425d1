//! Promises/A+ style promises for rust.
//!
//! A [`Promise`] starts pending and is later fulfilled or rejected, exactly
//! once. Handlers attached with [`Promise::then`] run on a later turn of an
//! injected [`Scheduler`], never inside the call that registered them or
//! settled the promise. Handlers may return plain values, other promises, or
//! any foreign [`Thenable`]; all of them are folded into the derived promise
//! by the resolution procedure.
//!
//! # Examples
//!
//! ```
//! use promise_aplus::{Error, Promise, QueueScheduler, Resolution};
//! use std::sync::{Arc, Mutex};
//!
//! let scheduler = Arc::new(QueueScheduler::new());
//! let seen = Arc::new(Mutex::new(None));
//! let log = seen.clone();
//!
//! Promise::<String, Error>::new(scheduler.clone(), |_| Err(Error::from("miss error")))
//!     .map(|v| v + "!")
//!     .catch(move |e| {
//!         *log.lock().unwrap() = Some(e.to_string());
//!         Ok(Resolution::Value(String::new()))
//!     });
//!
//! scheduler.run_until_idle();
//! assert_eq!(seen.lock().unwrap().as_deref(), Some("miss error"));
//! ```
use thiserror::Error;

pub mod channel;
pub mod combinators;
pub mod deferred;
pub mod promise;
pub mod resolution;
pub mod scheduler;

pub use channel::ChannelScheduler;
pub use deferred::Deferred;
pub use promise::{HandlerResult, Promise, Status};
pub use resolution::{Resolution, Resolver, Thenable};
pub use scheduler::{QueueScheduler, Scheduler, SchedulerRef, Task};

/// Reasons produced by the promise machinery itself, also usable as a
/// general rejection reason.
///
/// Promises with a custom reason type `E` need `E: From<Error>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Chaining cycle detected for promise")]
    ChainingCycle,
    #[error("{0}")]
    Rejected(String),
}

impl From<&str> for Error {
    fn from(reason: &str) -> Self {
        Error::Rejected(reason.to_owned())
    }
}

impl From<String> for Error {
    fn from(reason: String) -> Self {
        Error::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ChainingCycle.to_string(),
            "Chaining cycle detected for promise"
        );
        assert_eq!(Error::from("💥").to_string(), "💥");
        assert_eq!(Error::from(String::from("x")), Error::Rejected("x".into()));
    }
}
