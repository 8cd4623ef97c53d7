//! # libmqtt - MQTT session engine for embedded devices
//!
//! An MQTT v3.1.1 client session engine for constrained network devices. It drives
//! a single TCP connection to a broker through connection establishment,
//! keepalive, QoS-correlated acknowledgment exchange and reconnection, while
//! buffering outbound control packets so that publish and subscribe calls never
//! block on the network.
//!
//! ## Features
//!
//! - **Non-blocking**: the engine issues transport requests and is told about
//!   their outcome; it never waits on the network
//! - **Fixed memory**: every buffer is a const-generic `heapless` container
//! - **QoS 0, 1 and 2** in both directions
//! - **Supervision**: keepalive pings, connect timeout and reconnect backoff from
//!   a single periodic tick
//! - **Configuration** in code or from a JSON document
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libmqtt = "0.1.0"
//! ```
//!
//! Implement [`Transport`](network::Transport) and [`Ticker`](network::Ticker) for
//! your platform, then route their callbacks into the session:
//!
//! ```rust,no_run
//! use core::net::SocketAddr;
//! use libmqtt::network::prelude::*;
//! use libmqtt::network::application::mqtt::{QoS, Session};
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
//! let mut session: Session<_, _, ()> = Session::new(Tcp, Timer, ());
//! session.init_connection("192.168.1.2", 1883, false).unwrap();
//! session.init_client("my_device", "", "", 60, true).unwrap();
//! session.connect().unwrap();
//!
//! session.publish("sensors/temperature", b"23.5", QoS::AtMostOnce, false).unwrap();
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Log through `defmt` for embedded debugging
//! - `log`: Log through the `log` facade on hosted targets

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

// must stay first so the logging macros are visible to every module
mod fmt;

/// Network abstraction layer: transport and timer collaborators and the MQTT
/// session engine built on them.
pub mod network;
