//! Registry Module
//!
//! Provider-side publication and the shared data model. A provider announces
//! each (service, endpoint) pair as an ephemeral node whose lifetime is tied
//! to the store session, so liveness falls out of the session mechanics:
//! crash or partition, and the node (eventually) disappears without anyone
//! sending an explicit removal.
//!
//! ## Submodules
//! - **`types`**: identities, addresses, metas, node-path and payload helpers.
//! - **`client`**: the per-store registry client with its serialized
//!   registration drain, retry timers, and re-publication on reconnect.
//! - **`clients`**: composition-root owned registry of connected clients,
//!   keyed by store address.

pub mod client;
pub mod clients;
pub mod types;

#[cfg(test)]
mod tests;
