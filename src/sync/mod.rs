//! Sync
//!
//! Debounced validation of local changes and convergence with other
//! instances sharing the durable key.

pub mod channel;
pub mod orchestrator;

pub use channel::{CrossTabChannel, CrossTabMessage, LocalBroadcastChannel};
pub use orchestrator::{ErrorCallback, SyncError, SyncOrchestrator};
