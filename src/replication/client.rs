use std::time::Duration;
use tokio::net::TcpStream;
use tracing::warn;

use crate::client::{send_request, Request, Response};
use crate::replication::ReplicaTransport;
use crate::{Error, Result};

/// Sends replicated writes to remote followers over TCP.
///
/// A fresh connection is opened for every call, the follower endpoint is any
/// address accepted by [`TcpStream::connect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    async fn try_replicate(endpoint: &str, key: &str, value: &str, seq: u64) -> Result<bool> {
        let mut stream =
            TcpStream::connect(endpoint)
                .await
                .map_err(|e| Error::FollowerUnreachable {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        let request = Request::Replicate {
            key: key.to_string(),
            value: value.to_string(),
            seq,
        };
        match send_request(&mut stream, &request).await {
            Ok(Response::Replicated { ok, .. }) => Ok(ok),
            Ok(other) => Err(Error::UnexpectedResponse {
                peer: endpoint.to_string(),
                response: format!("{other:?}"),
            }),
            Err(e) => Err(Error::FollowerUnreachable {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

impl ReplicaTransport for TcpTransport {
    async fn attempt_replicate(
        &self,
        endpoint: &str,
        key: &str,
        value: &str,
        seq: u64,
        timeout: Duration,
    ) -> bool {
        match tokio::time::timeout(timeout, Self::try_replicate(endpoint, key, value, seq)).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                warn!(endpoint, seq, "{e}");
                false
            }
            Err(_) => {
                let e = Error::FollowerTimeout {
                    endpoint: endpoint.to_string(),
                    timeout,
                };
                warn!(endpoint, seq, "{e}");
                false
            }
        }
    }
}
