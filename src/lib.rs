#![deny(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

/*!
Rust client for calling remote procedures on services located by DNS SRV
records.

# Introduction

SRV Records, as defined in [RFC 2782](https://tools.ietf.org/html/rfc2782),
are DNS records of the form

`_Service._Proto.Name TTL Class SRV Priority Weight Port Target`

For instance, a DNS server might respond with the following SRV records for
`_rpc._tcp.example.com`:

```text
_rpc._tcp.example.com. 60 IN SRV 1 100 8080 rpc1.example.com.
_rpc._tcp.example.com. 60 IN SRV 2 50  8080 rpc2.example.com.
_rpc._tcp.example.com. 60 IN SRV 2 50  8080 rpc3.example.com.
```

A client wanting to call a procedure on this example service would first try
`rpc1.example.com:8080` (the record with the lowest priority), then the other
two (in a random order, since they are of the same priority) should the first
be unreachable.

`srv-rpc` handles the lookup and caching of SRV records, resolution of their
targets, and failover between them, and bounds the whole exchange with a
timeout:

```ignore
let client = Arc::new(SrvClient::new("_rpc._tcp.example.com", resolver, transport));
let res = client
    .invoke("Fancy.Echo", json!({ "text": "hey" }))
    .set_timeout(Duration::from_secs(5))
    .await?;
```

[`SrvClient::invoke`] returns a [`CallHandle`] right away; the lookup and the
calls happen in a spawned task. The handle settles exactly once, with the
first answer, the first error reported by a remote procedure, the error that
ended the last target tried, or [`Error::Timeout`].

# Resolvers, Transports, and Local Handlers

SRV lookups and address resolution are performed by an [`SrvResolver`]; the
`hickory` feature provides one backed by `hickory_resolver`. Remote procedures
are called through a [`Transport`], which reports whether a failure came from
reaching a target (the next target is tried) or from the procedure itself (the
call fails).

A [`Context`] holds the DNS servers resolvers should query and any local
handlers, which answer calls for a service name in-process without any lookup
or transport. Clients share [`Context::global`] unless given their own.

[`SrvResolver`]: resolver::SrvResolver
[`Transport`]: transport::Transport
*/

mod client;
pub use client::{
    Cache, CallHandle, CallResult, Callback, Error, PreprocessTargets, Resolution, SrvClient,
};

mod context;
pub use context::Context;

pub mod handlers;

mod record;
pub use record::{SrvRecord, SrvTarget};

pub mod resolver;

pub mod transport;

pub use serde_json::Value;
