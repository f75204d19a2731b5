//! Realtime room modules.
//!
//! - `client`: websocket transport, outbound action gating, and reconnect
//!   handling.
//! - `proto`: protocol messages shared with the room relay.
//! - `session`: higher-level typed event stream with the local room state
//!   mirror and echo suppression.

/// Websocket connection and action sender.
pub mod client;
/// Room relay protocol messages.
pub mod proto;
/// Session wrapper that mirrors room state and emits typed events.
pub mod session;
