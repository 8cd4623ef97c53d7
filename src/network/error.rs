//! Common error types for MQTT session operations

use core::fmt;

/// A common error type for MQTT session operations.
///
/// This enum defines the errors surfaced by the session engine and its building
/// blocks. It is designed to be simple and portable for `no_std` environments.
/// Only caller-invoked operations return it; failures that happen on the event
/// path (transport, timeouts) are reported through state changes and the
/// registered [`EventHandler`](crate::network::application::mqtt::EventHandler).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The outbound queue has no room for the packet.
    QueueFull,
    /// The outbound queue stayed full even after every queued entry was evicted.
    SeriousBufferError,
    /// A packet does not fit the staging buffer it is being built in.
    PacketTooLarge,
    /// An inbound chunk is empty or would overflow the accumulation buffer.
    BufferOverflow,
    /// An argument is empty, too long, or otherwise not acceptable.
    InvalidArgument,
    /// Inbound bytes do not form a valid MQTT control packet.
    MalformedPacket,
    /// The session has no client configuration (never initialised or torn down).
    NotInitialized,
    /// A configuration document could not be parsed.
    InvalidConfig,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::QueueFull => "outbound queue full",
            Error::SeriousBufferError => "outbound queue cannot hold the packet",
            Error::PacketTooLarge => "packet too large for staging buffer",
            Error::BufferOverflow => "inbound chunk rejected",
            Error::InvalidArgument => "invalid argument",
            Error::MalformedPacket => "malformed packet",
            Error::NotInitialized => "session not initialised",
            Error::InvalidConfig => "invalid configuration",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::QueueFull => defmt::write!(f, "QueueFull"),
            Error::SeriousBufferError => defmt::write!(f, "SeriousBufferError"),
            Error::PacketTooLarge => defmt::write!(f, "PacketTooLarge"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            Error::InvalidArgument => defmt::write!(f, "InvalidArgument"),
            Error::MalformedPacket => defmt::write!(f, "MalformedPacket"),
            Error::NotInitialized => defmt::write!(f, "NotInitialized"),
            Error::InvalidConfig => defmt::write!(f, "InvalidConfig"),
        }
    }
}
