//! Local handlers that answer calls for a service name in-process, bypassing
//! discovery and transport entirely.

use crate::Error;
use arc_swap::ArcSwap;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::{collections::HashMap, future::Future, sync::Arc};

/// A local handler: receives the method name and params of a call and
/// produces its entire outcome.
pub type LocalHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Map from service name to [`LocalHandler`].
///
/// Reads never block; writes copy the map, so the last write for a name wins
/// and is visible to the next read.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: ArcSwap<HashMap<String, LocalHandler>>,
}

impl HandlerRegistry {
    /// Sets or, when `handler` is `None`, removes the handler for `srv`.
    pub fn set(&self, srv: &str, handler: Option<LocalHandler>) -> Result<(), Error> {
        if srv.trim().is_empty() {
            return Err(Error::Configuration(
                "local handler service name must not be empty".to_string(),
            ));
        }

        self.handlers.rcu(|current| {
            let mut next = HashMap::clone(current);
            match &handler {
                Some(handler) => next.insert(srv.to_string(), handler.clone()),
                None => next.remove(srv),
            };
            next
        });
        Ok(())
    }

    /// Registers an async function as the handler for `srv`.
    pub fn register<F, Fut>(&self, srv: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        let handler: LocalHandler = Arc::new(move |method, params| handler(method, params).boxed());
        self.set(srv, Some(handler))
    }

    /// Removes the handler for `srv`, if any.
    pub fn unregister(&self, srv: &str) {
        if self.handlers.load().contains_key(srv) {
            self.handlers.rcu(|current| {
                let mut next = HashMap::clone(current);
                next.remove(srv);
                next
            });
        }
    }

    /// Gets the handler for `srv`.
    pub fn get(&self, srv: &str) -> Option<LocalHandler> {
        self.handlers.load().get(srv).cloned()
    }

    /// Removes every handler.
    pub fn clear(&self) {
        self.handlers.store(Default::default());
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.load().keys()).finish()
    }
}
