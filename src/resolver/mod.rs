//! SRV resolvers.

use crate::SrvRecord;
use async_trait::async_trait;
use std::{
    error::Error,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

#[cfg(feature = "hickory")]
pub mod hickory;

/// Parameters of a single discovery query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Discovery endpoints (DNS servers) to query. Empty means the resolver's
    /// own configuration.
    pub servers: Arc<Vec<SocketAddr>>,
    /// How stale an answer the resolver may serve from its own cache.
    pub max_age: Duration,
}

/// Represents the ability to act as a SRV resolver.
#[async_trait]
pub trait SrvResolver: Send + Sync {
    /// SRV record representation produced by the resolver.
    type Record: SrvRecord + Send + Sync + 'static;

    /// Errors encountered during SRV resolution.
    type Error: Error + Send + Sync + 'static;

    /// Gets the records corresponding to a srv name without sorting by priority
    /// or shuffling based on weight.
    async fn get_srv_records_unordered(
        &self,
        srv: &str,
        lookup: &LookupOptions,
    ) -> Result<Vec<Self::Record>, Self::Error>;

    /// Gets the records corresponding to a srv name, sorting by priority and
    /// shuffling based on weight.
    async fn get_srv_records(
        &self,
        srv: &str,
        lookup: &LookupOptions,
    ) -> Result<Vec<Self::Record>, Self::Error> {
        let mut records = self.get_srv_records_unordered(srv, lookup).await?;
        Self::order_srv_records(&mut records);
        Ok(records)
    }

    /// Sorts SRV records by priority and weight per RFC 2782.
    fn order_srv_records(records: &mut [Self::Record]) {
        let mut rng = rand::rng();
        records.sort_by_cached_key(|record| record.sort_key(&mut rng));
    }

    /// Resolves the target of a single record to a network address.
    async fn resolve_address(
        &self,
        record: &Self::Record,
        lookup: &LookupOptions,
    ) -> Result<IpAddr, Self::Error>;
}

#[async_trait]
impl<R: SrvResolver> SrvResolver for Arc<R> {
    type Record = R::Record;
    type Error = R::Error;

    async fn get_srv_records_unordered(
        &self,
        srv: &str,
        lookup: &LookupOptions,
    ) -> Result<Vec<Self::Record>, Self::Error> {
        (**self).get_srv_records_unordered(srv, lookup).await
    }

    async fn get_srv_records(
        &self,
        srv: &str,
        lookup: &LookupOptions,
    ) -> Result<Vec<Self::Record>, Self::Error> {
        (**self).get_srv_records(srv, lookup).await
    }

    async fn resolve_address(
        &self,
        record: &Self::Record,
        lookup: &LookupOptions,
    ) -> Result<IpAddr, Self::Error> {
        (**self).resolve_address(record, lookup).await
    }
}
