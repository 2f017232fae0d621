//! Clients based on SRV lookups.

use crate::{resolver::SrvResolver, transport, Context};
use arc_swap::ArcSwapOption;
use http::uri::Scheme;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::runtime::Handle;

mod cache;
pub use cache::Cache;

mod call;
pub use call::{CallHandle, CallResult, Callback};
use call::CallState;

mod targets;
use targets::Attempt;

/// Errors encountered by a [`SrvClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// SRV lookup errors
    #[error("SRV lookup error for {srv}")]
    Lookup {
        /// The SRV name that was looked up.
        srv: String,
        /// The resolver's error.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    /// Produced when a SRV lookup succeeds without returning any records
    #[error("SRV lookup for {srv} returned no records")]
    NoRecords {
        /// The SRV name that was looked up.
        srv: String,
    },
    /// Produced when there are no SRV targets for a client to use
    #[error("no SRV targets to use")]
    NoTargets,
    /// Errors resolving a SRV record's target to an address
    #[error("resolving address of SRV target {target}")]
    AddressResolution {
        /// The record's target.
        target: String,
        /// The resolver's error.
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    /// SRV record parsing errors
    #[error("building url from SRV record: {0}")]
    RecordParsing(#[from] url::ParseError),
    /// A target could not be reached or didn't respond intelligibly
    #[error("transport error: {0}")]
    Transport(#[source] transport::RpcError),
    /// The remote procedure reported an error
    #[error("remote procedure failed: {0}")]
    Application(#[source] transport::RpcError),
    /// Every target was tried and none could be reached
    #[error("no available SRV targets after {attempts} attempts")]
    NoAvailableTarget {
        /// How many targets were tried.
        attempts: usize,
        /// The error produced by the last target tried.
        #[source]
        last: Box<Error>,
    },
    /// The call's timeout expired
    #[error("timed out waiting for response")]
    Timeout,
    /// The call was aborted by its caller
    #[error("call cancelled")]
    Cancelled,
    /// Invalid arguments
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether the error means the service's records could not be discovered.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Error::Lookup { .. } | Error::NoRecords { .. })
    }

    /// Whether the error is [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Whether the error is attributable to reaching a target rather than to
    /// the remote procedure itself.
    pub fn is_connection_class(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::AddressResolution { .. }
                | Error::RecordParsing(_)
                | Error::NoAvailableTarget { .. }
        )
    }
}

/// Hook run over each set of discovered records before any is tried. Its
/// output is tried in the order given.
pub type PreprocessTargets<Record> = Arc<dyn Fn(&[Record]) -> Vec<Record> + Send + Sync>;

/// Records produced by [`SrvClient::resolve`].
#[derive(Debug)]
pub struct Resolution<Record> {
    /// The records, in the order targets will be tried.
    pub records: Arc<Cache<Record>>,
    /// Whether the lookup failed and `records` are the ones cached by an
    /// earlier lookup.
    pub fallback: bool,
}

/// Client for calling remote procedures on a service located by SRV records.
///
/// # Usage
///
/// After being created by [`SrvClient::new`] and wrapped in an [`Arc`], remote
/// procedures are called with [`invoke`] or [`invoke_with_callback`]. Each call
/// looks up the service's SRV records, then tries their targets in order until
/// one answers. Targets that can't be resolved or reached are skipped; an
/// error reported by the remote procedure itself ends the call.
///
/// ## DNS Resolvers
///
/// The resolver used to lookup SRV records and their targets' addresses is
/// determined by a client's [`SrvResolver`], and can be set with
/// [`SrvClient::resolver`]. The DNS servers it queries come from the client's
/// [`Context`].
///
/// ## Discovery Failures
///
/// The records of the last successful lookup are cached. When a lookup fails,
/// the cached records are used instead unless
/// [`SrvClient::fallback_on_discovery_error`] is disabled.
///
/// ## Retrying
///
/// By default a call fails with [`Error::NoAvailableTarget`] once every target
/// has failed. With [`SrvClient::retry_on_error`] the lookup and every target
/// are tried again, indefinitely, until the call's timeout expires.
///
/// [`invoke`]: SrvClient::invoke()
/// [`invoke_with_callback`]: SrvClient::invoke_with_callback()
pub struct SrvClient<Resolver: SrvResolver, Transport> {
    srv: String,
    context: Arc<Context>,
    resolver: Resolver,
    transport: Transport,
    http_scheme: Scheme,
    path_prefix: String,
    max_age: Duration,
    fallback_on_discovery_error: bool,
    retry_on_error: bool,
    retry_backoff: Duration,
    preprocess: Option<PreprocessTargets<Resolver::Record>>,
    cache: ArcSwapOption<Cache<Resolver::Record>>,
}

impl<Resolver: SrvResolver, Transport> SrvClient<Resolver, Transport> {
    /// Creates a new client for calling the service located by `srv_name`,
    /// sharing the [global context](Context::global).
    pub fn new(srv_name: impl ToString, resolver: Resolver, transport: Transport) -> Self {
        Self {
            srv: srv_name.to_string(),
            context: Context::global(),
            resolver,
            transport,
            http_scheme: Scheme::HTTP,
            path_prefix: String::from("/"),
            max_age: Duration::from_secs(1),
            fallback_on_discovery_error: true,
            retry_on_error: false,
            retry_backoff: Duration::from_millis(100),
            preprocess: None,
            cache: Default::default(),
        }
    }

    /// Gets the SRV name of the client.
    pub fn get_srv_name(&self) -> &str {
        &self.srv
    }

    /// Gets the records cached by the last successful lookup.
    pub fn cached(&self) -> Option<Arc<Cache<Resolver::Record>>> {
        self.cache.load_full()
    }

    /// Gets a fresh set of SRV records and caches them. If the lookup fails
    /// or finds nothing, the previously cached records are returned instead
    /// when fallback is enabled; otherwise the cache is cleared.
    ///
    /// `max_age` is passed to the resolver, which may answer from its own
    /// cache if it holds records at most that old.
    pub async fn resolve(&self, max_age: Duration) -> Result<Resolution<Resolver::Record>, Error> {
        let lookup = self.context.lookup_options(max_age);

        #[cfg(feature = "log")]
        tracing::debug!(srv = %self.srv, ?max_age, "Resolving SRV records");

        let error = match self.resolver.get_srv_records(&self.srv, &lookup).await {
            Ok(records) if !records.is_empty() => {
                let cache = Arc::new(Cache::new(records));
                self.cache.store(Some(cache.clone()));
                return Ok(Resolution {
                    records: cache,
                    fallback: false,
                });
            }
            Ok(_) => Error::NoRecords {
                srv: self.srv.clone(),
            },
            Err(e) => Error::Lookup {
                srv: self.srv.clone(),
                source: Arc::new(e),
            },
        };

        if self.fallback_on_discovery_error {
            if let Some(cache) = self.cache.load_full() {
                #[cfg(feature = "log")]
                tracing::info!(
                    srv = %self.srv, error = %error,
                    "Falling back to cached SRV records"
                );
                return Ok(Resolution {
                    records: cache,
                    fallback: true,
                });
            }
        }

        #[cfg(feature = "log")]
        tracing::error!(srv = %self.srv, error = %error, "SRV lookup failed");
        self.cache.store(None);
        Err(error)
    }
}

impl<Resolver, Transport> SrvClient<Resolver, Transport>
where
    Resolver: SrvResolver + 'static,
    Transport: transport::Transport + 'static,
{
    /// Calls `method` with `params` on the service, returning immediately.
    ///
    /// Called outside of a Tokio runtime, the returned handle has already
    /// ended with [`Error::Configuration`].
    pub fn invoke(self: &Arc<Self>, method: impl ToString, params: Value) -> CallHandle {
        self.start(method.to_string(), params, None)
    }

    /// Calls `method` with `params` on the service, returning immediately.
    /// `callback` is called once with the outcome of the call, even if the
    /// returned handle is dropped first.
    ///
    /// Called outside of a Tokio runtime, `callback` is called right away
    /// with [`Error::Configuration`].
    pub fn invoke_with_callback(
        self: &Arc<Self>,
        method: impl ToString,
        params: Value,
        callback: impl FnOnce(CallResult) + Send + 'static,
    ) -> CallHandle {
        self.start(method.to_string(), params, Some(Box::new(callback)))
    }

    fn start(
        self: &Arc<Self>,
        method: String,
        params: Value,
        callback: Option<Callback>,
    ) -> CallHandle {
        #[cfg(feature = "log")]
        tracing::debug!(srv = %self.srv, method = %method, "Calling remote procedure");

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let call = CallState::new(None, callback);
                let handle = CallHandle::new(call.clone());
                call.settle(Err(Error::Configuration(format!(
                    "cannot call {method} on {}: {e}",
                    self.srv
                ))));
                return handle;
            }
        };

        let call = CallState::new(Some(runtime.clone()), callback);
        let client = Arc::clone(self);
        let driver = Arc::clone(&call);
        let task = runtime.spawn(async move {
            if let Some(outcome) = client.run(&method, params, &driver).await {
                driver.settle(outcome);
            }
        });
        call.attach(task.abort_handle());
        CallHandle::new(call)
    }

    /// Drives a call to its outcome, or to `None` if it ended elsewhere first.
    async fn run(&self, method: &str, params: Value, call: &CallState) -> Option<CallResult> {
        if let Some(handler) = self.context.handlers().get(&self.srv) {
            #[cfg(feature = "log")]
            tracing::debug!(srv = %self.srv, method, "Answering call with local handler");
            return Some(handler(method.to_string(), params).await);
        }

        loop {
            if call.is_ended() {
                return None;
            }
            let resolution = match self.resolve(self.max_age).await {
                Ok(resolution) => resolution,
                Err(e) => return Some(Err(e)),
            };

            let filtered;
            let targets = match &self.preprocess {
                Some(preprocess) => {
                    filtered = preprocess(resolution.records.items());
                    &filtered[..]
                }
                None => resolution.records.items(),
            };

            let lookup = self.context.lookup_options(self.max_age);
            match self.attempt_targets(targets, &lookup, method, &params, call).await {
                Attempt::Done(outcome) => return Some(outcome),
                Attempt::Superseded => return None,
                Attempt::Exhausted(e) if self.retry_on_error => {
                    #[cfg(feature = "log")]
                    tracing::warn!(
                        srv = %self.srv, method, error = %e,
                        "Every SRV target failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Attempt::Exhausted(e) => {
                    #[cfg(feature = "log")]
                    tracing::error!(srv = %self.srv, method, error = %e, "Every SRV target failed");
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<Resolver: SrvResolver, Transport> SrvClient<Resolver, Transport> {
    /// Sets the SRV name of the client.
    pub fn srv_name(self, srv_name: impl ToString) -> Self {
        Self {
            srv: srv_name.to_string(),
            cache: Default::default(),
            ..self
        }
    }

    /// Sets the resolver of the client.
    pub fn resolver<R: SrvResolver>(self, resolver: R) -> SrvClient<R, Transport> {
        SrvClient {
            resolver,
            cache: Default::default(),
            preprocess: None,
            srv: self.srv,
            context: self.context,
            transport: self.transport,
            http_scheme: self.http_scheme,
            path_prefix: self.path_prefix,
            max_age: self.max_age,
            fallback_on_discovery_error: self.fallback_on_discovery_error,
            retry_on_error: self.retry_on_error,
            retry_backoff: self.retry_backoff,
        }
    }

    /// Sets the transport of the client.
    pub fn transport<T>(self, transport: T) -> SrvClient<Resolver, T> {
        SrvClient {
            transport,
            cache: self.cache,
            preprocess: self.preprocess,
            srv: self.srv,
            context: self.context,
            resolver: self.resolver,
            http_scheme: self.http_scheme,
            path_prefix: self.path_prefix,
            max_age: self.max_age,
            fallback_on_discovery_error: self.fallback_on_discovery_error,
            retry_on_error: self.retry_on_error,
            retry_backoff: self.retry_backoff,
        }
    }

    /// Sets the context providing the client's DNS servers and local handlers.
    pub fn context(self, context: Arc<Context>) -> Self {
        Self { context, ..self }
    }

    /// Sets the http scheme of the client.
    pub fn http_scheme(self, http_scheme: Scheme) -> Self {
        Self {
            http_scheme,
            ..self
        }
    }

    /// Sets the path prefix of the client.
    pub fn path_prefix(self, path_prefix: impl ToString) -> Self {
        let mut path_prefix = path_prefix.to_string();
        if !path_prefix.starts_with('/') {
            path_prefix.insert(0, '/');
        }
        Self {
            path_prefix,
            ..self
        }
    }

    /// Sets how old an answer the resolver may serve calls from its own cache.
    pub fn discovery_max_age(self, max_age: Duration) -> Self {
        Self { max_age, ..self }
    }

    /// Sets whether records cached by an earlier lookup are used when a lookup
    /// fails. Enabled by default.
    pub fn fallback_on_discovery_error(self, fallback_on_discovery_error: bool) -> Self {
        Self {
            fallback_on_discovery_error,
            ..self
        }
    }

    /// Sets whether calls keep retrying every target until their timeout
    /// expires instead of failing once each has been tried. Disabled by
    /// default.
    pub fn retry_on_error(self, retry_on_error: bool) -> Self {
        Self {
            retry_on_error,
            ..self
        }
    }

    /// Sets the pause between rounds of retries.
    pub fn retry_backoff(self, retry_backoff: Duration) -> Self {
        Self {
            retry_backoff,
            ..self
        }
    }

    /// Sets a hook to filter or reorder discovered records before any is tried.
    pub fn preprocess_targets(
        self,
        preprocess: impl Fn(&[Resolver::Record]) -> Vec<Resolver::Record> + Send + Sync + 'static,
    ) -> Self {
        Self {
            preprocess: Some(Arc::new(preprocess)),
            ..self
        }
    }
}

impl<Resolver: SrvResolver + Debug, Transport: Debug> Debug for SrvClient<Resolver, Transport> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrvClient")
            .field("srv", &self.srv)
            .field("resolver", &self.resolver)
            .field("transport", &self.transport)
            .field("http_scheme", &self.http_scheme)
            .field("path_prefix", &self.path_prefix)
            .field("max_age", &self.max_age)
            .field("fallback_on_discovery_error", &self.fallback_on_discovery_error)
            .field("retry_on_error", &self.retry_on_error)
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}
