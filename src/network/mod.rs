//! A network abstraction layer for embedded systems
//!
//! This module defines the collaborator traits the MQTT session engine is driven
//! through. The engine never blocks on the network: it asks a [`Transport`] to
//! open, send and disconnect, and the platform glue reports the asynchronous
//! outcome of those requests back into the session's `on_*` entry points. A
//! [`Ticker`] provides the fixed-period heartbeat that drives keepalive, connect
//! timeouts and reconnect backoff.
//!
//! ```text
//! ┌─────────────────┐  open/send/disconnect  ┌─────────────────┐
//! │     Session     │───────────────────────▶│    Transport    │
//! │  (state machine)│◀───────────────────────│  (TCP, TLS...)  │
//! └─────────────────┘   on_* event routing   └─────────────────┘
//!          ▲
//!          │ tick()
//! ┌─────────────────┐
//! │     Ticker      │
//! └─────────────────┘
//! ```

#![deny(unsafe_code)]

use core::net::{IpAddr, SocketAddr};

/// Common error types for network operations
pub mod error;

/// Application layer protocol implementations
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Ticker, Transport};
}

/// A connection-oriented byte transport towards the broker.
///
/// Every method only *issues* the request. Completion is reported
/// asynchronously by the platform, which routes it into the owning session:
///
/// | Request        | Completion routed to                                      |
/// |----------------|-----------------------------------------------------------|
/// | [`open`]       | `on_transport_connected` / `on_transport_disconnected`    |
/// | [`send`]       | `on_send_complete` / `on_send_failed`                     |
/// | inbound data   | `on_received`                                             |
/// | peer close     | `on_transport_disconnected`                               |
///
/// An `Err` returned synchronously means the request could not even be issued.
///
/// [`open`]: Transport::open
/// [`send`]: Transport::send
pub trait Transport {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Start opening a connection to `remote`.
    ///
    /// `secure` asks the transport to wrap the stream in TLS; the session treats it
    /// as an opaque flag.
    fn open(&mut self, remote: SocketAddr, secure: bool, timeout_secs: u8)
    -> Result<(), Self::Error>;

    /// Queue one fully framed packet for transmission.
    fn send(&mut self, bytes: &[u8], timeout_secs: u8) -> Result<(), Self::Error>;

    /// Close the current connection, if any, and release its handle.
    fn disconnect(&mut self);

    /// Resolve a host name that is not a literal IP address.
    ///
    /// The default implementation has no resolver and returns `None`, in which
    /// case the session waits in `Connecting` until the connect timeout.
    fn resolve(&mut self, _host: &str) -> Option<IpAddr> {
        None
    }
}

/// A fixed-period recurring timer.
///
/// While started, the platform is expected to call the session's `tick()` once
/// per `period_ms`.
pub trait Ticker {
    /// Start (or restart) the periodic tick.
    fn start(&mut self, period_ms: u32);

    /// Stop the periodic tick. Stopping a stopped ticker is a no-op.
    fn stop(&mut self);
}

/// Parse `host` as a literal IPv4 or IPv6 address.
///
/// # Examples
///
/// ```rust
/// use core::net::{IpAddr, Ipv4Addr};
/// use libmqtt::network::parse_ip;
///
/// assert_eq!(parse_ip("192.168.1.20"), Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
/// assert_eq!(parse_ip("broker.local"), None);
/// ```
pub fn parse_ip(host: &str) -> Option<IpAddr> {
    host.parse().ok()
}
