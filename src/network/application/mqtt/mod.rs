//! MQTT 3.1.1 client session engine for embedded systems.
//!
//! This module drives a single broker connection through connection
//! establishment, keepalive, QoS acknowledgment exchange and reconnection. Nothing
//! here blocks: publish and subscribe calls only queue framed packets, and the
//! platform feeds transport events and timer ticks back into the [`Session`].
//!
//! # Architecture
//!
//! ```text
//!  transport bytes ─▶ Reassembler ─▶ ack engine ─┬─▶ EventHandler
//!                                                │
//!  publish/subscribe ─────────────────────────▶ OutboundQueue ─▶ transport
//!                                                ▲
//!  tick() ─▶ Supervisor ── PINGREQ, timeouts ────┘
//! ```
//!
//! - [`reassembler`]: inbound byte stream to complete frames
//! - [`ack`]: what each inbound frame requires
//! - [`queue`]: bounded FIFO of framed outbound packets
//! - [`supervisor`]: keepalive, connect timeout and reconnect backoff counters
//! - [`session`]: the state machine tying them together
//! - [`codec`]: control packet builders and fixed-header decoders
//!
//! # Usage
//!
//! ```rust,no_run
//! use core::net::SocketAddr;
//! use libmqtt::network::{Ticker, Transport};
//! use libmqtt::network::application::mqtt::{Callbacks, QoS, Session};
//! use libmqtt::network::application::mqtt::config::SessionConfig;
//! # struct Tcp;
//! # impl Transport for Tcp {
//! #     type Error = ();
//! #     fn open(&mut self, _: SocketAddr, _: bool, _: u8) -> Result<(), ()> { Ok(()) }
//! #     fn send(&mut self, _: &[u8], _: u8) -> Result<(), ()> { Ok(()) }
//! #     fn disconnect(&mut self) {}
//! # }
//! # struct Timer;
//! # impl Ticker for Timer {
//! #     fn start(&mut self, _: u32) {}
//! #     fn stop(&mut self) {}
//! # }
//!
//! fn on_data(_topic: &str, _payload: &[u8]) {
//!     // handle the command
//! }
//!
//! let config = SessionConfig::from_json(br#"{
//!     "connection": { "host": "10.0.0.5", "port": 1883 },
//!     "client": { "client_id": "pump-3", "keepalive": 30 }
//! }"#).unwrap();
//!
//! let handler = Callbacks::new().with_data(on_data);
//! let mut session: Session<_, _, _> = Session::from_config(config, Tcp, Timer, handler);
//! session.connect().unwrap();
//!
//! // platform glue, from the transport and timer callbacks:
//! session.on_transport_connected();
//! session.on_received(&[0x20, 0x02, 0x00, 0x00]);
//! session.tick();
//!
//! session.subscribe("pumps/3/cmd", QoS::AtLeastOnce).unwrap();
//! session.publish("pumps/3/state", b"running", QoS::AtMostOnce, true).unwrap();
//! ```

pub mod ack;
pub mod codec;
pub mod config;
pub mod handler;
pub mod queue;
pub mod reassembler;
pub mod session;
pub mod supervisor;

pub use ack::PendingRequest;
pub use codec::{PacketType, QoS};
pub use config::{ClientConfig, ConnectionConfig, LastWill, SessionConfig, Timing};
pub use handler::{Callbacks, EventHandler};
pub use queue::OutboundQueue;
pub use reassembler::Reassembler;
pub use session::{ConnectionState, Session};
