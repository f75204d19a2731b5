//! Rust client SDK for the CodeSync collaborative code editor backend.
//!
//! The crate is organized by transport surface:
//! - `auth_api`: HTTP client for account registration and sign-in.
//! - `room`: realtime websocket client, protocol types, and session state.
//! - `store`: file-backed persistence for credentials and the last room.
//! - `backoff`: shared retry and reconnect policies.

/// Auth service client and credential types.
pub mod auth_api;
/// Retry and reconnect policies used across the SDK.
pub mod backoff;
/// Realtime room client, protocol types, and session state helpers.
pub mod room;
/// Persisted session storage.
pub mod store;
