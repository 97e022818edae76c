//! WebSocket support for realtime document snapshots.
//!
//! Clients subscribe to one document and receive its full contents on
//! connect and again after every change.

mod manager;
mod protocol;

pub use manager::SubscriptionManager;
pub use protocol::*;
