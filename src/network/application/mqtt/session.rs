//! The MQTT client session state machine.
//!
//! A [`Session`] owns everything one broker connection needs: configuration,
//! the inbound [`Reassembler`], the [`OutboundQueue`], the [`Supervisor`] and
//! the application's [`EventHandler`]. It is driven from three directions:
//!
//! - the application, through [`connect`](Session::connect),
//!   [`publish`](Session::publish), [`subscribe`](Session::subscribe) and friends;
//! - the platform transport glue, through the `on_*` event methods;
//! - the platform timer, through [`tick`](Session::tick).
//!
//! All of them take `&mut self`, so the session is never entered twice at the
//! same time. Each entry point finishes by running the dispatch step, which sends
//! at most one queued packet.
//!
//! # State machine
//!
//! ```text
//!                connect()
//! Disconnected ───────────▶ Connecting ──transport up──▶ HandshakeSent
//!                               ▲   │                         │ CONNACK
//!                               │   │ connect timeout         ▼
//!           backoff elapsed     │   └──────────────────▶ ConnectFailed ──▶ teardown
//!  ReconnectBackoff ◀── ReconnectRequested ◀── link lost ── Active
//! ```
//!
//! # Examples
//!
//! ```rust
//! use core::net::SocketAddr;
//! use libmqtt::network::{Ticker, Transport};
//! use libmqtt::network::application::mqtt::{ConnectionState, QoS, Session};
//!
//! #[derive(Default)]
//! struct Loopback { sent: usize }
//!
//! impl Transport for Loopback {
//!     type Error = ();
//!     fn open(&mut self, _: SocketAddr, _: bool, _: u8) -> Result<(), ()> { Ok(()) }
//!     fn send(&mut self, _: &[u8], _: u8) -> Result<(), ()> { self.sent += 1; Ok(()) }
//!     fn disconnect(&mut self) {}
//! }
//!
//! struct NoTimer;
//! impl Ticker for NoTimer {
//!     fn start(&mut self, _: u32) {}
//!     fn stop(&mut self) {}
//! }
//!
//! let mut session: Session<_, _, ()> = Session::new(Loopback::default(), NoTimer, ());
//! session.init_connection("127.0.0.1", 1883, false).unwrap();
//! session.init_client("sensor-1", "", "", 60, true).unwrap();
//! session.connect().unwrap();
//! assert_eq!(session.state(), ConnectionState::Connecting);
//!
//! session.on_transport_connected();                 // CONNECT goes out
//! session.on_send_complete();
//! session.on_received(&[0x20, 0x02, 0x00, 0x00]);  // CONNACK
//! assert_eq!(session.state(), ConnectionState::Active);
//!
//! session.publish("sensors/1/temp", b"21.5", QoS::AtMostOnce, false).unwrap();
//! assert_eq!(session.transport().sent, 2);
//! ```

use core::net::SocketAddr;

use crate::network::error::Error;
use crate::network::{Ticker, Transport, parse_ip};
use heapless::Vec;

use super::ack::{self, Outcome, PendingRequest, Response};
use super::codec::{self, Frame, PacketType, QoS};
use super::config::{ClientConfig, ConnectionConfig, LastWill, SessionConfig, Timing};
use super::handler::EventHandler;
use super::queue::OutboundQueue;
use super::reassembler::Reassembler;
use super::supervisor::{Supervisor, Verdict};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// Not connected and not trying to.
    Disconnected,
    /// Transport connection being opened.
    Connecting,
    /// CONNECT sent, waiting for CONNACK.
    HandshakeSent,
    /// Data phase.
    Active,
    /// The link was lost; counting down the reconnect backoff.
    ReconnectRequested,
    /// Backoff elapsed; the next dispatch reopens the transport.
    ReconnectBackoff,
    /// The connect attempt timed out; the session is torn down.
    ConnectFailed,
}

/// State of the underlying transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Closed,
    Opening,
    Open,
}

/// An MQTT client session over transport `T`, timer `K` and handler `H`.
///
/// `BUF` sizes both the inbound reassembly buffer and the outbound staging
/// buffer, and so bounds the largest packet in either direction. `QUEUE` is the
/// outbound queue capacity in bytes.
pub struct Session<T, K, H, const BUF: usize = 1024, const QUEUE: usize = 2048>
where
    T: Transport,
    K: Ticker,
    H: EventHandler,
{
    transport: T,
    ticker: K,
    handler: H,
    connection: Option<ConnectionConfig>,
    client: Option<ClientConfig>,
    will: Option<LastWill>,
    state: ConnectionState,
    link: Link,
    pending: Option<PendingRequest>,
    unreported_publish: bool,
    supervisor: Supervisor,
    next_packet_id: u16,
    inbound: Reassembler<BUF>,
    staging: Vec<u8, BUF>,
    queue: OutboundQueue<QUEUE>,
}

impl<T, K, H, const BUF: usize, const QUEUE: usize> Session<T, K, H, BUF, QUEUE>
where
    T: Transport,
    K: Ticker,
    H: EventHandler,
{
    /// Create an unconfigured session in the `Disconnected` state.
    pub fn new(transport: T, ticker: K, handler: H) -> Self {
        Self {
            transport,
            ticker,
            handler,
            connection: None,
            client: None,
            will: None,
            state: ConnectionState::Disconnected,
            link: Link::Closed,
            pending: None,
            unreported_publish: false,
            supervisor: Supervisor::new(Timing::default()),
            next_packet_id: 0,
            inbound: Reassembler::new(),
            staging: Vec::new(),
            queue: OutboundQueue::new(),
        }
    }

    /// Create a session and apply a complete configuration.
    pub fn from_config(config: SessionConfig, transport: T, ticker: K, handler: H) -> Self {
        let mut session = Self::new(transport, ticker, handler);
        session.connection = Some(config.connection);
        session.client = Some(config.client);
        session.will = config.last_will;
        session.supervisor.set_timing(config.timing);
        session
    }

    /// Set the broker address.
    pub fn init_connection(&mut self, host: &str, port: u16, security: bool) -> Result<(), Error> {
        self.connection = Some(ConnectionConfig::new(host, port, security)?);
        Ok(())
    }

    /// Set the client identity and session options. `keepalive` is in seconds.
    pub fn init_client(
        &mut self,
        client_id: &str,
        username: &str,
        password: &str,
        keepalive: u16,
        clean_session: bool,
    ) -> Result<(), Error> {
        self.client = Some(ClientConfig::new(
            client_id,
            username,
            password,
            keepalive,
            clean_session,
        )?);
        Ok(())
    }

    /// Set the last will sent with every CONNECT.
    pub fn init_last_will(
        &mut self,
        topic: &str,
        message: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        self.will = Some(LastWill::new(topic, message, qos, retain)?);
        Ok(())
    }

    /// Replace the supervisor timing.
    pub fn set_timing(&mut self, timing: Timing) {
        self.supervisor.set_timing(timing);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The request whose acknowledgment is outstanding, if any.
    pub fn pending(&self) -> Option<PendingRequest> {
        self.pending
    }

    /// Outbound packets not yet handed to the transport.
    pub fn queue(&self) -> &OutboundQueue<QUEUE> {
        &self.queue
    }

    /// Bytes received but not yet resolved into frames.
    pub fn buffered(&self) -> usize {
        self.inbound.buffered()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The ticker.
    pub fn ticker(&self) -> &K {
        &self.ticker
    }

    /// The event handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The event handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Start connecting to the configured broker.
    ///
    /// Any existing connection is closed first. Failures after this point are
    /// retried by the supervisor and reported through the event handler.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.connection.is_none() || self.client.is_none() {
            return Err(Error::NotInitialized);
        }
        info!("connecting");
        self.open_link();
        Ok(())
    }

    /// Close the connection and stop the ticker. Safe to call in any state.
    ///
    /// When the session is `Active`, a DISCONNECT packet is sent first on a
    /// best-effort basis.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Active
            && self.link == Link::Open
            && codec::disconnect(&mut self.staging).is_ok()
        {
            let timeout = self.supervisor.timing().send_timeout;
            if self.transport.send(&self.staging, timeout).is_err() {
                debug!("DISCONNECT could not be sent");
            }
        }
        self.close_link();
        self.ticker.stop();
        self.inbound.clear();
        self.pending = None;
        self.unreported_publish = false;
        if self.state != ConnectionState::Disconnected {
            info!("disconnected from {:?}", self.state);
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Queue a PUBLISH.
    ///
    /// When the queue is full the oldest entries are evicted to make room;
    /// [`Error::SeriousBufferError`] is returned if the packet cannot fit even
    /// in an empty queue.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => self.next_packet_id(),
        };
        codec::publish(&mut self.staging, topic, payload, qos, retain, packet_id)?;
        self.enqueue_staged()
    }

    /// Queue a SUBSCRIBE for one topic filter.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        let packet_id = self.next_packet_id();
        codec::subscribe(&mut self.staging, topic, qos, packet_id)?;
        self.enqueue_staged()
    }

    /// Queue an UNSUBSCRIBE for one topic filter.
    pub fn unsubscribe(&mut self, topic: &str) -> Result<(), Error> {
        let packet_id = self.next_packet_id();
        codec::unsubscribe(&mut self.staging, topic, packet_id)?;
        self.enqueue_staged()
    }

    /// Advance the supervisor by one period.
    pub fn tick(&mut self) {
        let keepalive = self.client.as_ref().map_or(0, |client| {
            self.supervisor.timing().keepalive_ticks(client.keepalive)
        });
        match self.supervisor.tick(self.state, keepalive) {
            Verdict::Idle => {}
            Verdict::Ping { missed_heartbeat } => {
                let sent = self.send_ping();
                if missed_heartbeat {
                    warn!("no PINGRESP within keepalive interval");
                    self.link_lost();
                } else if !sent {
                    self.link_lost();
                }
            }
            Verdict::Reconnect => {
                info!("reconnect backoff elapsed");
                self.state = ConnectionState::ReconnectBackoff;
            }
            Verdict::ConnectTimedOut => {
                error!("connect timed out in state {:?}", self.state);
                self.state = ConnectionState::ConnectFailed;
            }
        }
        self.supervisor.countdown();
        self.dispatch();
    }

    /// The transport connection is up: send CONNECT.
    pub fn on_transport_connected(&mut self) {
        if self.link != Link::Opening {
            debug!("ignoring stale transport connect");
            return;
        }
        self.link = Link::Open;
        let Some(client) = self.client.as_ref() else {
            return;
        };
        if let Err(e) = codec::connect(&mut self.staging, client, self.will.as_ref()) {
            error!("CONNECT does not fit the send buffer: {}", e);
            self.state = ConnectionState::ConnectFailed;
            self.dispatch();
            return;
        }
        debug!("sending CONNECT");
        self.state = ConnectionState::HandshakeSent;
        if !self.send_staged() {
            self.link_lost();
        }
    }

    /// Bytes arrived from the broker.
    ///
    /// Chunks that are empty or would overflow the inbound buffer are dropped
    /// without a state change.
    pub fn on_received(&mut self, chunk: &[u8]) {
        if self.link != Link::Open {
            debug!("ignoring {} bytes on a closed link", chunk.len());
            return;
        }
        if let Err(e) = self.inbound.extend(chunk) {
            warn!(
                "dropping {} byte chunk ({} buffered): {}",
                chunk.len(),
                self.inbound.buffered(),
                e
            );
            return;
        }

        let Self {
            inbound,
            queue,
            staging,
            handler,
            pending,
            state,
            supervisor,
            ..
        } = self;
        let mut refused = false;
        let drained = inbound.drain(|bytes| {
            if refused {
                return;
            }
            let frame = match Frame::parse(bytes) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("dropping undecodable frame: {}", e);
                    return;
                }
            };
            trace!("received {:?} ({} bytes)", frame.packet_type, bytes.len());
            match ack::acknowledge(*state, *pending, &frame) {
                Outcome::Connected => {
                    info!("broker accepted connection");
                    *pending = None;
                    *state = ConnectionState::Active;
                    handler.on_connected();
                }
                Outcome::Refused => refused = true,
                Outcome::Completed => *pending = None,
                Outcome::Respond(response) => respond(queue, staging, response),
                Outcome::Deliver {
                    ack,
                    topic,
                    payload,
                } => {
                    if let Some(response) = ack {
                        respond(queue, staging, response);
                    }
                    handler.on_data_received(topic, payload);
                }
                Outcome::Heartbeat => {
                    supervisor.heartbeat();
                    if matches!(*pending, Some(p) if p.packet_type == PacketType::PingReq) {
                        *pending = None;
                    }
                }
                Outcome::Ignored => {}
            }
        });
        if let Err(e) = drained {
            warn!("inbound stream reset: {}", e);
        }

        if refused {
            self.link_lost();
        } else {
            self.dispatch();
        }
    }

    /// The transport finished sending the last packet.
    pub fn on_send_complete(&mut self) {
        if self.link != Link::Open {
            return;
        }
        self.supervisor.send_done();
        if self.state == ConnectionState::Active && self.unreported_publish {
            self.unreported_publish = false;
            self.handler.on_published();
        }
        self.dispatch();
    }

    /// The transport failed to send the last packet.
    pub fn on_send_failed(&mut self) {
        if self.link != Link::Open {
            return;
        }
        warn!("send failed");
        self.link_lost();
    }

    /// The transport connection closed or could not be opened.
    pub fn on_transport_disconnected(&mut self) {
        if self.link == Link::Closed {
            return;
        }
        warn!("transport disconnected in state {:?}", self.state);
        self.link_lost();
    }

    /// Run the idle-time step for the current state.
    ///
    /// Reopens the transport once the reconnect backoff has elapsed, sends the
    /// next queued packet when `Active` and no send is outstanding, and tears
    /// the session down after a connect timeout. Every event entry point calls
    /// this already; the platform only needs it to kick a freshly filled queue.
    pub fn dispatch(&mut self) {
        match self.state {
            ConnectionState::ReconnectBackoff => self.open_link(),
            ConnectionState::Active => self.send_next(),
            ConnectionState::ConnectFailed => self.teardown(),
            _ => {}
        }
    }

    fn send_next(&mut self) {
        if self.link != Link::Open || !self.supervisor.can_send() {
            return;
        }
        while !self.queue.is_empty() {
            if self.queue.pop(&mut self.staging).is_some() {
                if !self.send_staged() {
                    self.link_lost();
                }
                return;
            }
        }
    }

    /// Hand the staging buffer to the transport and record what was sent.
    fn send_staged(&mut self) -> bool {
        if let Some(request) = PendingRequest::for_outbound(&self.staging) {
            self.pending = Some(request);
        }
        if codec::packet_type(&self.staging) == Some(PacketType::Publish) {
            self.unreported_publish = true;
        }
        self.supervisor.arm_send();
        let timeout = self.supervisor.timing().send_timeout;
        match self.transport.send(&self.staging, timeout) {
            Ok(()) => true,
            Err(_) => {
                warn!("transport refused {} byte packet", self.staging.len());
                false
            }
        }
    }

    fn send_ping(&mut self) -> bool {
        if self.link != Link::Open || codec::pingreq(&mut self.staging).is_err() {
            return false;
        }
        debug!("sending PINGREQ");
        self.send_staged()
    }

    fn enqueue_staged(&mut self) -> Result<(), Error> {
        self.queue.push_evicting(&self.staging)?;
        self.dispatch();
        Ok(())
    }

    fn next_packet_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        if self.next_packet_id == 0 {
            self.next_packet_id = 1;
        }
        self.next_packet_id
    }

    /// Tear down any existing link and begin a fresh connect attempt.
    fn open_link(&mut self) {
        self.close_link();
        self.ticker.stop();
        self.supervisor.reset();
        self.inbound.clear();
        self.pending = None;
        self.unreported_publish = false;

        let timing = self.supervisor.timing();
        self.ticker.start(timing.tick_period_ms);
        self.state = ConnectionState::Connecting;

        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        let Some(ip) =
            parse_ip(&connection.host).or_else(|| self.transport.resolve(&connection.host))
        else {
            warn!("cannot resolve broker host");
            return;
        };
        let remote = SocketAddr::new(ip, connection.port);
        let timeout = u8::try_from(timing.connect_timeout).unwrap_or(u8::MAX);
        self.link = Link::Opening;
        if self.transport.open(remote, connection.security, timeout).is_err() {
            warn!("transport open could not be issued");
            self.link = Link::Closed;
            self.state = ConnectionState::ReconnectRequested;
            self.supervisor.begin_backoff();
        }
    }

    fn close_link(&mut self) {
        if self.link != Link::Closed {
            self.transport.disconnect();
            self.link = Link::Closed;
        }
    }

    /// Drop the link and schedule a reconnect.
    fn link_lost(&mut self) {
        self.close_link();
        self.inbound.clear();
        self.pending = None;
        self.unreported_publish = false;
        self.state = ConnectionState::ReconnectRequested;
        self.supervisor.begin_backoff();
        self.handler.on_disconnected();
        self.dispatch();
    }

    /// Release everything the failed attempt held. Runs once per failure.
    fn teardown(&mut self) {
        if self.client.take().is_none() {
            return;
        }
        error!("connect failed, tearing session down");
        self.connection = None;
        self.will = None;
        self.close_link();
        self.ticker.stop();
        self.inbound.clear();
        self.staging.clear();
        self.queue.clear();
        self.pending = None;
        self.unreported_publish = false;
        self.handler.on_error();
    }
}

impl<T, K, H, const BUF: usize, const QUEUE: usize> core::fmt::Debug for Session<T, K, H, BUF, QUEUE>
where
    T: Transport,
    K: Ticker,
    H: EventHandler,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("link", &self.link)
            .field("pending", &self.pending)
            .field("buffered", &self.inbound.buffered())
            .field("queued", &self.queue.len())
            .finish()
    }
}

fn respond<const BUF: usize, const QUEUE: usize>(
    queue: &mut OutboundQueue<QUEUE>,
    staging: &mut Vec<u8, BUF>,
    response: Response,
) {
    let queued = response
        .encode(staging)
        .and_then(|()| queue.push(&staging[..]));
    if let Err(e) = queued {
        warn!("dropping {:?}: {}", response, e);
    }
}
