//! The result object of a single call.

use crate::Error;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::{future::IntoFuture, sync::Arc, time::Duration};
use tokio::{runtime::Handle, sync::watch, task::AbortHandle};
use url::Url;

/// Outcome of a call.
pub type CallResult = Result<Value, Error>;

/// Callback notified once with the outcome of a call.
pub type Callback = Box<dyn FnOnce(CallResult) + Send>;

/// Settle-once state shared by a [`CallHandle`], the task driving the call and
/// its timer.
pub(crate) struct CallState {
    // `None` when the call was started outside of a runtime, in which case it
    // is settled before anyone can set a timeout.
    runtime: Option<Handle>,
    state: Mutex<State>,
    outcome: watch::Sender<Option<CallResult>>,
}

struct State {
    ended: bool,
    timeout: Duration,
    // Live handles and response futures.
    consumers: usize,
    // Bumped whenever the timer is replaced so a timer that already fired
    // can't end the call on behalf of its successor.
    generation: u64,
    timer: Option<AbortHandle>,
    task: Option<AbortHandle>,
    endpoint: Option<Url>,
    callback: Option<Callback>,
}

impl CallState {
    pub(crate) fn new(runtime: Option<Handle>, callback: Option<Callback>) -> Arc<Self> {
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            runtime,
            state: Mutex::new(State {
                ended: false,
                timeout: Duration::ZERO,
                consumers: 0,
                generation: 0,
                timer: None,
                task: None,
                endpoint: None,
                callback,
            }),
            outcome,
        })
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Records the task driving the call so a timeout or abort can cancel it.
    pub(crate) fn attach(&self, task: AbortHandle) {
        let mut state = self.state.lock();
        if state.ended {
            task.abort();
        } else {
            state.task = Some(task);
        }
    }

    pub(crate) fn set_endpoint(&self, endpoint: Url) {
        let mut state = self.state.lock();
        if !state.ended {
            state.endpoint = Some(endpoint);
        }
    }

    fn endpoint(&self) -> Option<Url> {
        self.state.lock().endpoint.clone()
    }

    fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    fn set_timeout(self: &Arc<Self>, timeout: Duration) {
        let mut state = self.state.lock();
        if state.ended {
            return;
        }
        let Some(runtime) = &self.runtime else {
            return;
        };
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.timeout = timeout;
        if timeout.is_zero() {
            return;
        }

        let generation = state.generation;
        let call = Arc::clone(self);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            call.finish(Err(Error::Timeout), true, Some(generation));
        });
        state.timer = Some(timer.abort_handle());
    }

    /// Settles the call with the outcome produced by the task driving it.
    /// Returns false if the call had already ended.
    pub(crate) fn settle(&self, outcome: CallResult) -> bool {
        self.finish(outcome, false, None)
    }

    /// Ends the call from outside the driving task, cancelling it.
    fn cancel(&self, outcome: CallResult) -> bool {
        self.finish(outcome, true, None)
    }

    fn finish(
        &self,
        outcome: CallResult,
        cancel_task: bool,
        generation: Option<u64>,
    ) -> bool {
        let callback = {
            let mut state = self.state.lock();
            if state.ended || generation.is_some_and(|g| g != state.generation) {
                return false;
            }
            state.ended = true;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            let task = state.task.take();
            if cancel_task {
                if let Some(task) = task {
                    task.abort();
                }
            }
            state.callback.take()
        };

        #[cfg(feature = "log")]
        match &outcome {
            Ok(_) => tracing::debug!("Call succeeded"),
            Err(e) => tracing::debug!(%e, "Call failed"),
        }

        self.outcome.send_replace(Some(outcome.clone()));
        if let Some(callback) = callback {
            callback(outcome);
        }
        true
    }

    fn acquire(&self) {
        self.state.lock().consumers += 1;
    }

    /// Drops a consumer. Once none are left the outcome can't be observed, so
    /// the call is cancelled unless a callback is still waiting for it.
    fn release(&self) {
        let orphaned = {
            let mut state = self.state.lock();
            state.consumers -= 1;
            state.consumers == 0 && !state.ended && state.callback.is_none()
        };
        if orphaned {
            #[cfg(feature = "log")]
            tracing::debug!("Call dropped before it ended, cancelling");
            self.cancel(Err(Error::Cancelled));
        }
    }

    fn response(self: &Arc<Self>) -> BoxFuture<'static, CallResult> {
        let consumer = Consumer::new(Arc::clone(self));
        let mut outcome = self.outcome.subscribe();
        async move {
            let _consumer = consumer;
            match outcome.wait_for(Option::is_some).await {
                Ok(settled) => Option::clone(&settled).unwrap_or(Err(Error::Cancelled)),
                // Every owner of the call went away without settling it.
                Err(_) => Err(Error::Cancelled),
            }
        }
        .boxed()
    }
}

/// Holds a call open on behalf of a response future.
struct Consumer(Arc<CallState>);

impl Consumer {
    fn new(call: Arc<CallState>) -> Self {
        call.acquire();
        Self(call)
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// The result of [`SrvClient::invoke`].
///
/// A call ends exactly once: with its result, with [`Error::Timeout`] if the
/// timeout set by [`CallHandle::set_timeout`] expires first, or with
/// [`Error::Cancelled`] after [`CallHandle::abort`]. The outcome is delivered
/// to the callback given to [`SrvClient::invoke_with_callback`], if any, and
/// to every future obtained by awaiting the handle, including futures created
/// after the call ended.
///
/// Dropping the handle and every future obtained from it before the call
/// ends cancels the call, as [`CallHandle::abort`] would, unless the call was
/// started with a callback.
///
/// [`SrvClient::invoke`]: crate::SrvClient::invoke
/// [`SrvClient::invoke_with_callback`]: crate::SrvClient::invoke_with_callback
pub struct CallHandle {
    call: Arc<CallState>,
}

impl CallHandle {
    pub(crate) fn new(call: Arc<CallState>) -> Self {
        call.acquire();
        Self { call }
    }

    /// Bounds the call, measured from now. Replaces any previous timeout; zero
    /// removes it. Has no effect once the call has ended.
    pub fn set_timeout(&self, timeout: Duration) -> &Self {
        self.call.set_timeout(timeout);
        self
    }

    /// Gets the timeout last set on the call.
    pub fn timeout(&self) -> Duration {
        self.call.timeout()
    }

    /// Ends the call with [`Error::Cancelled`], cancelling any request in
    /// flight. Has no effect once the call has ended.
    pub fn abort(&self) {
        self.call.cancel(Err(Error::Cancelled));
    }

    /// Whether the call has ended.
    pub fn is_ended(&self) -> bool {
        self.call.is_ended()
    }

    /// The endpoint most recently selected for the call, if address
    /// resolution has succeeded for any target yet.
    pub fn endpoint(&self) -> Option<Url> {
        self.call.endpoint()
    }

    /// Waits for the outcome of the call.
    pub fn response(&self) -> BoxFuture<'static, CallResult> {
        self.call.response()
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        self.call.release();
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("ended", &self.is_ended())
            .field("timeout", &self.timeout())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

impl IntoFuture for CallHandle {
    type Output = CallResult;
    type IntoFuture = BoxFuture<'static, CallResult>;

    fn into_future(self) -> Self::IntoFuture {
        self.response()
    }
}

impl IntoFuture for &CallHandle {
    type Output = CallResult;
    type IntoFuture = BoxFuture<'static, CallResult>;

    fn into_future(self) -> Self::IntoFuture {
        self.response()
    }
}
