//! SRV resolver backed by [`hickory_resolver`].

use super::{LookupOptions, SrvResolver};
use crate::SrvRecord;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfig, NameServerConfigGroup, ResolverConfig},
    name_server::TokioConnectionProvider,
    proto::{rr::rdata::SRV, xfer::Protocol},
    Name, ResolveError, Resolver, TokioResolver,
};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

/// A [`TokioResolver`] that follows the discovery endpoints of the client
/// using it, rebuilding itself when they change.
///
/// With no endpoints configured, the system configuration is used. Record
/// freshness follows the TTLs served by DNS rather than
/// [`LookupOptions::max_age`].
#[derive(Default)]
pub struct HickoryResolver {
    current: ArcSwapOption<Configured>,
}

struct Configured {
    servers: Arc<Vec<SocketAddr>>,
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Creates a resolver; nothing is built until the first lookup.
    pub fn new() -> Self {
        Self::default()
    }

    fn resolver_for(
        &self,
        servers: &Arc<Vec<SocketAddr>>,
    ) -> Result<Arc<Configured>, ResolveError> {
        if let Some(current) = self.current.load_full() {
            if current.servers == *servers {
                return Ok(current);
            }
        }

        let resolver = if servers.is_empty() {
            Resolver::builder_tokio()?.build()
        } else {
            let name_servers = servers
                .iter()
                .map(|addr| NameServerConfig::new(*addr, Protocol::Udp))
                .collect::<Vec<_>>();
            let config = ResolverConfig::from_parts(
                None,
                vec![],
                NameServerConfigGroup::from(name_servers),
            );
            Resolver::builder_with_config(config, TokioConnectionProvider::default()).build()
        };

        #[cfg(feature = "log")]
        tracing::debug!(?servers, "Built DNS resolver");

        let configured = Arc::new(Configured {
            servers: servers.clone(),
            resolver,
        });
        self.current.store(Some(configured.clone()));
        Ok(configured)
    }
}

impl std::fmt::Debug for HickoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryResolver")
            .field("servers", &self.current.load().as_ref().map(|c| c.servers.clone()))
            .finish()
    }
}

#[async_trait]
impl SrvResolver for HickoryResolver {
    type Record = SRV;
    type Error = ResolveError;

    async fn get_srv_records_unordered(
        &self,
        srv: &str,
        lookup: &LookupOptions,
    ) -> Result<Vec<Self::Record>, Self::Error> {
        let configured = self.resolver_for(&lookup.servers)?;
        let lookup = configured.resolver.srv_lookup(srv).await?;
        Ok(lookup.into_iter().collect())
    }

    async fn resolve_address(
        &self,
        record: &Self::Record,
        lookup: &LookupOptions,
    ) -> Result<IpAddr, Self::Error> {
        let configured = self.resolver_for(&lookup.servers)?;
        let target: Name = record.target().clone();
        let ips = configured.resolver.lookup_ip(target).await?;
        ips.iter()
            .next()
            .ok_or_else(|| ResolveError::from("address lookup returned no addresses"))
    }
}

impl SrvRecord for SRV {
    type Target = Name;

    fn target(&self) -> &Self::Target {
        self.target()
    }

    fn port(&self) -> u16 {
        self.port()
    }

    fn priority(&self) -> u16 {
        self.priority()
    }

    fn weight(&self) -> u16 {
        self.weight()
    }
}
