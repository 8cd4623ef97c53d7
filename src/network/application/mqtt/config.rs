//! Session configuration.
//!
//! Each piece of configuration can be built in code through its validating
//! constructor, or the whole set can be loaded from a JSON document:
//!
//! ```rust
//! use libmqtt::network::application::mqtt::config::SessionConfig;
//!
//! let json = br#"{
//!     "connection": { "host": "192.168.1.10", "port": 1883 },
//!     "client": { "client_id": "meter-7", "keepalive": 30 },
//!     "last_will": { "topic": "meters/7/status", "message": "offline", "qos": 1, "retain": true },
//!     "timing": { "connect_timeout": 10 }
//! }"#;
//!
//! let config = SessionConfig::from_json(json).unwrap();
//! assert_eq!(config.connection.port, 1883);
//! assert!(config.client.clean_session);
//! assert_eq!(config.timing.connect_timeout, 10);
//! assert_eq!(config.timing.reconnect_timeout, 5);
//! ```

use crate::network::error::Error;
use heapless::String;
use serde::Deserialize;

use super::codec::QoS;

/// Maximum broker host name length.
pub const MAX_HOST_LEN: usize = 64;
/// Maximum client identifier length.
pub const MAX_CLIENT_ID_LEN: usize = 64;
/// Maximum username and password length.
pub const MAX_CREDENTIAL_LEN: usize = 64;
/// Maximum last-will topic length.
pub const MAX_WILL_TOPIC_LEN: usize = 128;
/// Maximum last-will message length.
pub const MAX_WILL_MESSAGE_LEN: usize = 256;

/// Where the broker lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Literal IP address or host name of the broker.
    pub host: String<MAX_HOST_LEN>,
    /// Broker TCP port.
    pub port: u16,
    /// Ask the transport for a secured (TLS) connection.
    #[serde(default)]
    pub security: bool,
}

impl ConnectionConfig {
    /// Create a connection configuration, rejecting empty or oversized hosts.
    pub fn new(host: &str, port: u16, security: bool) -> Result<Self, Error> {
        if host.is_empty() {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            host: bounded(host)?,
            port,
            security,
        })
    }
}

/// Identity and session options sent in CONNECT.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Client identifier, unique per broker.
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    /// Username; omitted from CONNECT when empty.
    #[serde(default)]
    pub username: String<MAX_CREDENTIAL_LEN>,
    /// Password; omitted from CONNECT when empty.
    #[serde(default)]
    pub password: String<MAX_CREDENTIAL_LEN>,
    /// Keepalive interval in seconds, as advertised in CONNECT.
    /// Zero disables keepalive pings.
    #[serde(default = "default_keepalive")]
    pub keepalive: u16,
    /// Ask the broker to discard any previous session state.
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
}

impl ClientConfig {
    /// Create a client configuration, rejecting oversized strings.
    pub fn new(
        client_id: &str,
        username: &str,
        password: &str,
        keepalive: u16,
        clean_session: bool,
    ) -> Result<Self, Error> {
        Ok(Self {
            client_id: bounded(client_id)?,
            username: bounded(username)?,
            password: bounded(password)?,
            keepalive,
            clean_session,
        })
    }
}

/// Message the broker publishes on the client's behalf after an unexpected
/// disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LastWill {
    /// Topic the will is published to.
    pub topic: String<MAX_WILL_TOPIC_LEN>,
    /// Will payload.
    pub message: String<MAX_WILL_MESSAGE_LEN>,
    /// QoS the broker publishes the will with.
    pub qos: QoS,
    /// Whether the broker retains the will.
    #[serde(default)]
    pub retain: bool,
}

impl LastWill {
    /// Create a last will, rejecting empty or oversized topics.
    pub fn new(topic: &str, message: &str, qos: QoS, retain: bool) -> Result<Self, Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument);
        }
        Ok(Self {
            topic: bounded(topic)?,
            message: bounded(message)?,
            qos,
            retain,
        })
    }
}

/// Supervisor timing, expressed in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Period the ticker is started with.
    pub tick_period_ms: u32,
    /// Ticks a send may stay outstanding before the next queued packet goes out.
    pub send_timeout: u8,
    /// Ticks allowed for the transport and MQTT handshake to complete.
    pub connect_timeout: u16,
    /// Ticks to wait before reconnecting after a failure.
    pub reconnect_timeout: u16,
}

impl Timing {
    /// Convert a keepalive in seconds to whole ticks of this period.
    ///
    /// Rounds down so the ping never goes out later than advertised, and
    /// never returns less than one tick for a non-zero keepalive.
    pub fn keepalive_ticks(&self, keepalive_secs: u16) -> u32 {
        if keepalive_secs == 0 {
            return 0;
        }
        let period = self.tick_period_ms.max(1);
        (u32::from(keepalive_secs) * 1000 / period).max(1)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick_period_ms: 1000,
            send_timeout: 5,
            connect_timeout: 20,
            reconnect_timeout: 5,
        }
    }
}

/// Everything a session needs, loadable in one piece.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Broker location.
    pub connection: ConnectionConfig,
    /// Client identity and options.
    pub client: ClientConfig,
    /// Optional last will.
    #[serde(default)]
    pub last_will: Option<LastWill>,
    /// Supervisor timing.
    #[serde(default)]
    pub timing: Timing,
}

impl SessionConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        let (config, _) =
            serde_json_core::from_slice::<Self>(json).map_err(|_| Error::InvalidConfig)?;
        if config.connection.host.is_empty() {
            return Err(Error::InvalidConfig);
        }
        Ok(config)
    }
}

fn default_keepalive() -> u16 {
    60
}

fn default_clean_session() -> bool {
    true
}

fn bounded<const N: usize>(value: &str) -> Result<String<N>, Error> {
    let mut out = String::new();
    out.push_str(value).map_err(|_| Error::InvalidArgument)?;
    Ok(out)
}
