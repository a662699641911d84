//! Dispatch Module
//!
//! Provider-side request handling, kept deliberately narrow: the transport
//! layer owns codecs and sockets, this module owns the mapping from a
//! decoded request to a registered service implementation and the status
//! semantics of its reply.
//!
//! ## Submodules
//! - **`container`**: service-identity -> implementation map (`ProviderLookup`).
//! - **`processor`**: `RequestProcessor` capability plus the provider-side
//!   implementation with its keep-open/force-close error split.

pub mod container;
pub mod processor;
