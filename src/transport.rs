//! The RPC transport used to talk to a single resolved endpoint.

use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, sync::Arc};
use url::Url;

/// Classes of failure a [`Transport`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// The endpoint could not be reached or the HTTP exchange failed.
    Http,
    /// The response could not be decoded.
    Serialization,
    /// The transport gave up waiting for a response on its own.
    Timeout,
    /// The remote procedure ran and reported an error.
    Application,
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RpcErrorKind::Http => "http",
            RpcErrorKind::Serialization => "serialization",
            RpcErrorKind::Timeout => "timeout",
            RpcErrorKind::Application => "application",
        })
    }
}

/// An error reported by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error {code}: {message}")]
pub struct RpcError {
    /// What kind of failure this was.
    pub kind: RpcErrorKind,
    /// Protocol-specific error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
}

impl RpcError {
    /// Creates a new error.
    pub fn new(kind: RpcErrorKind, code: i64, message: impl ToString) -> Self {
        Self {
            kind,
            code,
            message: message.to_string(),
        }
    }

    /// Whether the failure is attributable to reaching or talking to the
    /// endpoint, in which case another endpoint may be tried.
    pub fn is_connection_class(&self) -> bool {
        !matches!(self.kind, RpcErrorKind::Application)
    }
}

/// Performs one request/response exchange against a resolved endpoint.
///
/// Dropping the returned future cancels the exchange; implementations should
/// release any connection they hold when that happens.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Calls `method` with `params` on the service at `endpoint`.
    async fn call(&self, endpoint: &Url, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn call(&self, endpoint: &Url, method: &str, params: Value) -> Result<Value, RpcError> {
        (**self).call(endpoint, method, params).await
    }
}
