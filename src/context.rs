//! State shared by every client in a process.

use crate::{handlers::HandlerRegistry, resolver::LookupOptions};
use arc_swap::ArcSwap;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

static GLOBAL: OnceLock<Arc<Context>> = OnceLock::new();

/// Discovery endpoints and local handlers shared by a set of clients.
///
/// [`Context::global`] is the context clients use unless given another with
/// [`SrvClient::context`]. Tests that register handlers or point discovery at
/// different servers should build their own with [`Context::new`] so they can
/// run in parallel.
///
/// [`SrvClient::context`]: crate::SrvClient::context
#[derive(Debug, Default)]
pub struct Context {
    handlers: HandlerRegistry,
    discovery_endpoints: ArcSwap<Vec<SocketAddr>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide context, created empty on first use.
    pub fn global() -> Arc<Context> {
        GLOBAL.get_or_init(Default::default).clone()
    }

    /// Sets the discovery endpoints (DNS servers) resolvers should query.
    /// An empty list restores the resolvers' own configuration.
    pub fn configure_discovery_endpoints(&self, servers: impl IntoIterator<Item = SocketAddr>) {
        let servers = servers.into_iter().collect::<Vec<_>>();
        #[cfg(feature = "log")]
        tracing::debug!(?servers, "Configuring discovery endpoints");
        self.discovery_endpoints.store(Arc::new(servers));
    }

    /// Gets the configured discovery endpoints.
    pub fn discovery_endpoints(&self) -> Arc<Vec<SocketAddr>> {
        self.discovery_endpoints.load_full()
    }

    /// Gets the registry of local handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Clears every local handler and discovery endpoint.
    pub fn reset(&self) {
        self.handlers.clear();
        self.discovery_endpoints.store(Default::default());
    }

    pub(crate) fn lookup_options(&self, max_age: Duration) -> LookupOptions {
        LookupOptions {
            servers: self.discovery_endpoints(),
            max_age,
        }
    }
}
