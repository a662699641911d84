//! Request Processor
//!
//! The transport layer decodes frames and hands requests in through the
//! [`RequestProcessor`] trait; everything network-shaped (framing, sockets,
//! write flushing) stays on its side of the line behind [`ResponseChannel`].
//!
//! Failure split: an application-level error travels back as a normal error
//! response and the channel stays open for the next request; a decode or
//! I/O-level fault gets an error response followed by a forced close, since
//! the stream can no longer be trusted.

use super::container::ProviderLookup;
use crate::registry::types::ServiceId;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    ServiceNotFound,
    /// The provider ran and returned an error.
    ServiceError,
    /// Fault outside the provider: decode failure, processor bug, etc.
    UnexpectedError,
}

/// One decoded business call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    pub id: u64,
    pub service: ServiceId,
    pub method: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub id: u64,
    pub status: Status,
    pub body: serde_json::Value,
}

/// Write side of one client connection, as narrow as dispatch needs it.
pub trait ResponseChannel: Send + Sync {
    fn send(&self, response: ResponsePayload);
    /// Force-close the connection. Used after faults that poison the stream.
    fn close(&self);
}

/// Capability the transport layer drives for each inbound request.
pub trait RequestProcessor: Send + Sync {
    fn handle_request(&self, channel: Arc<dyn ResponseChannel>, payload: RequestPayload);
    fn handle_exception(
        &self,
        channel: Arc<dyn ResponseChannel>,
        payload: RequestPayload,
        cause: anyhow::Error,
    );
}

/// Provider-side processor: looks the service up in the container and runs
/// it on the runtime, one spawned task per request.
pub struct ProviderProcessor {
    lookup: Arc<dyn ProviderLookup>,
}

impl ProviderProcessor {
    pub fn new(lookup: Arc<dyn ProviderLookup>) -> Arc<Self> {
        Arc::new(Self { lookup })
    }
}

impl RequestProcessor for ProviderProcessor {
    fn handle_request(&self, channel: Arc<dyn ResponseChannel>, payload: RequestPayload) {
        let Some(provider) = self.lookup.lookup(&payload.service) else {
            tracing::warn!(
                "No provider for service {} (request {})",
                payload.service,
                payload.id
            );
            channel.send(ResponsePayload {
                id: payload.id,
                status: Status::ServiceNotFound,
                body: serde_json::json!({
                    "error": format!("no provider for {}", payload.service)
                }),
            });
            return;
        };

        tokio::spawn(async move {
            match provider(payload.args).await {
                Ok(result) => {
                    tracing::debug!("Request {} completed", payload.id);
                    channel.send(ResponsePayload {
                        id: payload.id,
                        status: Status::Ok,
                        body: result,
                    });
                }
                Err(e) => {
                    // Business failure: report it, keep the channel alive.
                    tracing::error!("Request {} failed in provider: {}", payload.id, e);
                    channel.send(ResponsePayload {
                        id: payload.id,
                        status: Status::ServiceError,
                        body: serde_json::json!({ "error": e.to_string() }),
                    });
                }
            }
        });
    }

    fn handle_exception(
        &self,
        channel: Arc<dyn ResponseChannel>,
        payload: RequestPayload,
        cause: anyhow::Error,
    ) {
        tracing::error!("Handling exception for request {}: {}", payload.id, cause);
        channel.send(ResponsePayload {
            id: payload.id,
            status: Status::UnexpectedError,
            body: serde_json::json!({ "error": cause.to_string() }),
        });
        channel.close();
    }
}
