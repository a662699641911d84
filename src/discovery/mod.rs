//! Discovery Module
//!
//! Maintains a consumer's live view of who provides what, fed exclusively by
//! child-watch events from the coordination store.
//!
//! ## Pipeline
//! Raw watch event -> payload parse -> idempotent reconciliation against the
//! membership view -> effect dispatch to the service's listeners -> pool
//! update + wakeup of blocked availability waits.
//!
//! ## Submodules
//! - **`watcher`**: one watch task per subscribed identity, with re-subscribe
//!   on stream loss.
//! - **`reconciler`**: set-membership view that absorbs duplicated and missed
//!   events.
//! - **`listener`**: the notify sink and the blocking availability gate.

pub mod listener;
pub mod reconciler;
pub mod watcher;
