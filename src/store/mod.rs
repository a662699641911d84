//! Coordination Store Adapter
//!
//! The registry does not implement its own coordination service. It talks to
//! an external, session-oriented store (ZooKeeper-like) through the narrow
//! [`adapter::CoordinationStore`] trait: ephemeral node creation, existence
//! checks, child-watch subscriptions, and a connection-state stream.
//!
//! ## Submodules
//! - **`adapter`**: the trait plus the event and connection-state types.
//! - **`memory`**: an in-process implementation backing tests and the demo
//!   binary, with session-expiry and failure injection hooks.

pub mod adapter;
pub mod memory;
