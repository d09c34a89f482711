//! Single-resolution completion primitive
//!
//! A `Completion<T>` settles exactly once, with a value or a `StoreError`.
//! Its `Resolver<T>` may be cloned and handed to every event source of one
//! request (success, error, upgrade-needed); the first signal wins and every
//! later signal is rejected with `CompletionError::AlreadySettled`.
//!
//! # Chaining
//!
//! `then` registers a continuation returning a `Step`: either a plain value or
//! another completion. The chained result settles only once the last step has
//! settled.
//!
//! ```ignore
//! let rows = manager
//!     .open_level("plan", options)
//!     .then(move |ctx| Step::Pending(executor.find_all(&ctx, selector)));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::errors::{CompletionError, StoreError, StoreResult};

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<StoreResult<T>>>>>;

/// Write side of a completion.
pub struct Resolver<T> {
    slot: Slot<T>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Resolver<T> {
    /// Settle with a value
    pub fn resolve(&self, value: T) -> Result<(), CompletionError> {
        self.settle(Ok(value))
    }

    /// Settle with a failure
    pub fn fail(&self, error: StoreError) -> Result<(), CompletionError> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: StoreResult<T>) -> Result<(), CompletionError> {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CompletionError::AlreadySettled)?;
        // Nobody awaiting the completion is not an error for the signaller
        let _ = sender.send(outcome);
        Ok(())
    }
}

enum Inner<T> {
    Channel(oneshot::Receiver<StoreResult<T>>),
    Ready(Option<StoreResult<T>>),
    Chained(BoxFuture<'static, StoreResult<T>>),
}

/// Read side of a completion; a future yielding `StoreResult<T>`.
pub struct Completion<T> {
    inner: Inner<T>,
}

// No field is structurally pinned: receivers and boxed futures are Unpin,
// and ready values are moved out by value.
impl<T> Unpin for Completion<T> {}

/// Outcome of a continuation registered with `then`
pub enum Step<U> {
    /// Continuation finished synchronously
    Ready(U),
    /// Continuation started another asynchronous step
    Pending(Completion<U>),
}

impl<U> From<Completion<U>> for Step<U> {
    fn from(completion: Completion<U>) -> Self {
        Step::Pending(completion)
    }
}

impl<U> From<StoreResult<U>> for Step<U> {
    fn from(result: StoreResult<U>) -> Self {
        match result {
            Ok(value) => Step::Ready(value),
            Err(e) => Step::Pending(Completion::failed(e)),
        }
    }
}

impl<T> Completion<T> {
    /// Creates an unsettled completion and its resolver
    pub fn pending() -> (Resolver<T>, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        let resolver = Resolver {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (
            resolver,
            Completion {
                inner: Inner::Channel(rx),
            },
        )
    }

    /// A completion already settled with a value
    pub fn ready(value: T) -> Self {
        Self {
            inner: Inner::Ready(Some(Ok(value))),
        }
    }

    /// A completion already settled with a failure
    pub fn failed(error: StoreError) -> Self {
        Self {
            inner: Inner::Ready(Some(Err(error))),
        }
    }

    /// Wraps an arbitrary future
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        Self {
            inner: Inner::Chained(Box::pin(future)),
        }
    }
}

impl<T: Send + 'static> Completion<T> {
    /// Chains a continuation onto this completion.
    ///
    /// A failure of this completion skips `f` and fails the chain.
    pub fn then<U, F>(self, f: F) -> Completion<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Step<U> + Send + 'static,
    {
        Completion::from_future(async move {
            match f(self.await?) {
                Step::Ready(value) => Ok(value),
                Step::Pending(next) => next.await,
            }
        })
    }

    /// Maps the settled value
    pub fn map<U, F>(self, f: F) -> Completion<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |value| Step::Ready(f(value)))
    }
}

impl<T> Future for Completion<T> {
    type Output = StoreResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Ready(slot) => Poll::Ready(
                slot.take()
                    .unwrap_or(Err(CompletionError::AlreadySettled.into())),
            ),
            Inner::Channel(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => Poll::Ready(Err(CompletionError::Abandoned.into())),
                Poll::Pending => Poll::Pending,
            },
            Inner::Chained(future) => future.as_mut().poll(cx),
        }
    }
}
