//! Off-thread execution of driver calls with callback delivery.
//!
//! Every dispatched operation runs as its own task on a runtime owned by the
//! [`Executor`]. Its outcome goes through a [`Settlement`], which is consumed
//! by the one call that delivers it, so exactly one of the two callbacks
//! fires exactly once. Callback panics are caught and logged.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::connection::ClientConfig;
use super::error::{DatabaseError, Result};

/// Single-level unwrap: if `take_cause` yields a cause, that cause replaces
/// the error, otherwise the error comes back unchanged.
pub fn unwrap_cause<E, F>(error: E, take_cause: F) -> E
where
    F: FnOnce(E) -> std::result::Result<E, E>,
{
    match take_cause(error) {
        Ok(cause) => cause,
        Err(original) => original,
    }
}

pub fn unwrap_completion(error: DatabaseError) -> DatabaseError {
    unwrap_cause(error, DatabaseError::take_completion_cause)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(non-string panic)".to_string())
}

/// Pending delivery of one operation's outcome.
///
/// Dropping an unsettled settlement delivers [`DatabaseError::Shutdown`].
pub(crate) struct Settlement<T, R>
where
    R: FnOnce(Result<T>),
{
    operation: u64,
    resolve: Option<R>,
    _outcome: PhantomData<fn(T)>,
}

impl<T, R> Settlement<T, R>
where
    R: FnOnce(Result<T>),
{
    pub(crate) fn new(operation: u64, resolve: R) -> Self {
        Self {
            operation,
            resolve: Some(resolve),
            _outcome: PhantomData,
        }
    }

    pub(crate) fn settle(mut self, outcome: Result<T>) {
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: Result<T>) {
        let Some(resolve) = self.resolve.take() else {
            return;
        };
        if let Err(err) = &outcome {
            debug!(operation = self.operation, error = %err, "operation failed");
        }
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || resolve(outcome))) {
            error!(
                operation = self.operation,
                "callback panicked: {}",
                panic_message(&*payload)
            );
        }
    }
}

impl<T, R> Drop for Settlement<T, R>
where
    R: FnOnce(Result<T>),
{
    fn drop(&mut self) {
        if self.resolve.is_some() {
            warn!(operation = self.operation, "operation dropped before completion");
            self.deliver(Err(DatabaseError::Shutdown));
        }
    }
}

/// Handle to the result of [`Executor::submit`].
///
/// Await it from async code or call [`Pending::wait`] from a plain thread.
#[must_use = "a Pending does nothing unless awaited or waited on"]
pub struct Pending<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Block the current thread until the outcome arrives.
    ///
    /// Fails without blocking when called on a runtime thread, which
    /// includes every callback delivered by an [`Executor`]; await the
    /// `Pending` there instead.
    pub fn wait(self) -> Result<T> {
        if Handle::try_current().is_ok() {
            return Err(DatabaseError::Failed("wait called from an async context".into()));
        }
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(DatabaseError::Shutdown))
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DatabaseError::Shutdown)))
    }
}

/// Task scheduler owned by a client
pub struct Executor {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    shut_down: AtomicBool,
    next_operation: AtomicU64,
}

impl Executor {
    /// Start a dedicated multi-threaded runtime.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(config.thread_name.clone());
        if let Some(threads) = config.worker_threads {
            if threads == 0 {
                return Err(DatabaseError::invalid_argument(
                    "Worker thread count must be positive",
                ));
            }
            builder.worker_threads(threads);
        }
        let runtime = builder
            .build()
            .map_err(|e| DatabaseError::Failed(format!("failed to start worker runtime: {e}")))?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            shut_down: AtomicBool::new(false),
            next_operation: AtomicU64::new(1),
        })
    }

    /// Schedule onto a runtime someone else owns.
    ///
    /// [`Executor::shutdown`] then only stops accepting work; the runtime
    /// itself is left running.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            next_operation: AtomicU64::new(1),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Run `operation` on a worker and deliver its outcome to exactly one of
    /// `on_success` / `on_failure`.
    ///
    /// `operation` builds the driver future; an error returned while building
    /// it is delivered like any asynchronous failure. Failures reach
    /// `on_failure` with one level of completion wrapping removed. The
    /// calling thread never waits, except that after shutdown `on_failure`
    /// receives [`DatabaseError::Shutdown`] right away on the calling thread.
    pub fn dispatch<T, Op, Fut, S, F>(&self, operation: Op, on_success: S, on_failure: F)
    where
        T: Send + 'static,
        Op: FnOnce() -> Result<Fut> + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(DatabaseError) + Send + 'static,
    {
        self.spawn_settled(operation, move |outcome| match outcome {
            Ok(value) => on_success(value),
            Err(err) => on_failure(err),
        });
    }

    /// Run `future` on a worker and hand back a [`Pending`] for its outcome.
    pub fn submit<T, Fut>(&self, future: Fut) -> Pending<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.spawn_settled(
            move || Ok(future),
            move |outcome| {
                let _ = sender.send(outcome);
            },
        );
        Pending { receiver }
    }

    fn spawn_settled<T, Op, Fut, R>(&self, operation: Op, resolve: R)
    where
        T: Send + 'static,
        Op: FnOnce() -> Result<Fut> + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        R: FnOnce(Result<T>) + Send + 'static,
    {
        let id = self.next_operation.fetch_add(1, Ordering::Relaxed);
        let settlement = Settlement::new(id, resolve);

        if self.is_shut_down() {
            warn!(operation = id, "dispatch after shutdown");
            settlement.settle(Err(DatabaseError::Shutdown));
            return;
        }

        debug!(operation = id, "dispatching operation");
        self.handle.spawn(async move {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(operation)) {
                Ok(Ok(future)) => AssertUnwindSafe(future)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(DatabaseError::Panicked(panic_message(&*payload)))
                    }),
                Ok(Err(err)) => Err(err),
                Err(payload) => Err(DatabaseError::Panicked(panic_message(&*payload))),
            };
            settlement.settle(outcome.map_err(unwrap_completion));
        });
    }

    /// Stop accepting work and tear down the owned runtime, if any.
    ///
    /// Operations still in flight are dropped and report
    /// [`DatabaseError::Shutdown`].
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(runtime) = self.runtime.lock().take() {
            debug!("shutting down worker runtime");
            runtime.shutdown_background();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
