//! Sequential failover across the targets of one lookup.

use super::{call::CallState, CallResult, Error, SrvClient};
use crate::{
    resolver::{LookupOptions, SrvResolver},
    transport, SrvRecord,
};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// How a pass over a set of targets ended.
pub(super) enum Attempt {
    /// A target answered, or the remote procedure reported an error.
    Done(CallResult),
    /// Every target failed to resolve or be reached. Carries
    /// [`Error::NoAvailableTarget`], or [`Error::NoTargets`] if there were none.
    Exhausted(Error),
    /// The call ended (timed out or was aborted) before the pass finished.
    Superseded,
}

impl<Resolver, Transport> SrvClient<Resolver, Transport>
where
    Resolver: SrvResolver,
    Transport: transport::Transport,
{
    /// Tries `targets` strictly in order, one at a time, until one answers.
    pub(super) async fn attempt_targets(
        &self,
        targets: &[Resolver::Record],
        lookup: &LookupOptions,
        method: &str,
        params: &Value,
        call: &CallState,
    ) -> Attempt {
        let mut last_error = None;
        let mut attempts = 0;

        for target in targets {
            if call.is_ended() {
                return Attempt::Superseded;
            }
            attempts += 1;

            let endpoint = match self.target_endpoint(target, lookup).await {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    #[cfg(feature = "log")]
                    tracing::warn!(
                        host = %target.target(), port = target.port(), error = %e, method,
                        "Failed to resolve SRV target"
                    );
                    last_error = Some(e);
                    continue;
                }
            };
            if call.is_ended() {
                return Attempt::Superseded;
            }
            call.set_endpoint(endpoint.clone());

            match self.transport.call(&endpoint, method, params.clone()).await {
                Ok(res) => {
                    #[cfg(feature = "log")]
                    tracing::info!(URI = %endpoint, method, "execution attempt succeeded");
                    return Attempt::Done(Ok(res));
                }
                Err(err) if err.is_connection_class() => {
                    #[cfg(feature = "log")]
                    tracing::warn!(
                        URI = %endpoint, error = %err, method,
                        "execution attempt failed"
                    );
                    last_error = Some(Error::Transport(err));
                }
                Err(err) => {
                    #[cfg(feature = "log")]
                    tracing::info!(
                        URI = %endpoint, error = %err, method,
                        "remote procedure returned an error"
                    );
                    return Attempt::Done(Err(Error::Application(err)));
                }
            }
        }

        match last_error {
            Some(last) => Attempt::Exhausted(Error::NoAvailableTarget {
                attempts,
                last: Box::new(last),
            }),
            None => Attempt::Exhausted(Error::NoTargets),
        }
    }

    async fn target_endpoint(
        &self,
        target: &Resolver::Record,
        lookup: &LookupOptions,
    ) -> Result<Url, Error> {
        let address = self
            .resolver
            .resolve_address(target, lookup)
            .await
            .map_err(|e| Error::AddressResolution {
                target: target.target().to_string(),
                source: Arc::new(e),
            })?;
        Ok(target.endpoint(address, &self.http_scheme, &self.path_prefix)?)
    }
}
