//! SRV records.

use std::{
    cmp::Reverse,
    fmt::Display,
    net::{IpAddr, SocketAddr},
};

use http::uri::Scheme;
use rand::Rng;
use url::Url;

/// Representation of types that contain the fields of a SRV record.
pub trait SrvRecord {
    /// Type representing the SRV record's target. Must implement `Display` so
    /// it can be logged and handed to address resolution.
    type Target: Display + ?Sized;

    /// Gets a SRV record's target.
    fn target(&self) -> &Self::Target;

    /// Gets a SRV record's port.
    fn port(&self) -> u16;

    /// Gets a SRV record's priority.
    fn priority(&self) -> u16;

    /// Gets a SRV record's weight.
    fn weight(&self) -> u16;

    /// Builds the URL a transport should use to reach this record once its
    /// target has been resolved to `address`.
    fn endpoint(
        &self,
        address: IpAddr,
        scheme: &Scheme,
        path: &str,
    ) -> Result<Url, url::ParseError> {
        // `SocketAddr` brackets IPv6 addresses.
        let authority = SocketAddr::new(address, self.port());
        Url::parse(&format!("{}://{}{}", scheme.as_str(), authority, path))
    }

    /// Generates a key to sort a SRV record by priority and weight per RFC 2782.
    fn sort_key(&self, rng: impl Rng) -> (u16, Reverse<u32>) {
        sort_key(self.priority(), self.weight(), rng)
    }
}

/// Generates a key to sort a SRV record by priority and weight per RFC 2782.
pub(crate) fn sort_key(priority: u16, weight: u16, mut rng: impl Rng) -> (u16, Reverse<u32>) {
    // Sort ascending by priority, then descending (hence `Reverse`) by randomized weight
    let rand = rng.random::<u16>() as u32;
    (priority, Reverse(weight as u32 * rand))
}

/// An owned SRV record, for resolvers that don't have a record type of their
/// own and for tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SrvTarget {
    /// Host name the record points at.
    pub name: String,
    /// Port the service listens on.
    pub port: u16,
    /// Lower priorities are tried first.
    pub priority: u16,
    /// Relative weight among records of equal priority.
    pub weight: u16,
}

impl SrvTarget {
    /// Creates a record for `name:port` with zero priority and weight.
    pub fn new(name: impl ToString, port: u16) -> Self {
        Self {
            name: name.to_string(),
            port,
            priority: 0,
            weight: 0,
        }
    }

    /// Sets the priority of the record.
    pub fn with_priority(self, priority: u16) -> Self {
        Self { priority, ..self }
    }

    /// Sets the weight of the record.
    pub fn with_weight(self, weight: u16) -> Self {
        Self { weight, ..self }
    }
}

impl SrvRecord for SrvTarget {
    type Target = str;

    fn target(&self) -> &Self::Target {
        &self.name
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn priority(&self) -> u16 {
        self.priority
    }

    fn weight(&self) -> u16 {
        self.weight
    }
}
