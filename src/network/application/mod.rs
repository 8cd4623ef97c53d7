//! # Application Layer Protocols
//!
//! Application layer (OSI Layer 7) protocols built on the collaborator traits of
//! [`network`](crate::network). Protocol engines here never own a socket or a
//! timer; they are driven by the platform through explicit entry points and use
//! fixed-size buffers only.
//!
//! ## Available Protocols
//!
//! - **[`mqtt`]**: MQTT 3.1.1 client session engine

/// MQTT client session engine.
///
/// Provides connection management, keepalive supervision and QoS 0/1/2
/// acknowledgment handling over any [`Transport`](crate::network::Transport).
pub mod mqtt;
