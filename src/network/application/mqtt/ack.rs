//! QoS acknowledgment engine.
//!
//! [`acknowledge`] looks at one inbound frame together with the session state
//! and the outstanding [`PendingRequest`] and decides what has to happen next.
//! It never mutates anything itself; the session applies the returned
//! [`Outcome`].
//!
//! | Inbound    | Condition                                  | Outcome                         |
//! |------------|--------------------------------------------|---------------------------------|
//! | CONNACK    | `HandshakeSent`, pending CONNECT, code 0   | [`Outcome::Connected`]          |
//! | CONNACK    | `HandshakeSent`, anything else             | [`Outcome::Refused`]            |
//! | SUBACK     | pending SUBSCRIBE with the same id         | [`Outcome::Completed`]          |
//! | UNSUBACK   | pending UNSUBSCRIBE with the same id       | [`Outcome::Completed`]          |
//! | PUBLISH    | QoS 0 / 1 / 2                              | [`Outcome::Deliver`] (+ ack)    |
//! | PUBACK     | pending PUBLISH with the same id           | [`Outcome::Completed`]          |
//! | PUBREC     |                                            | respond PUBREL                  |
//! | PUBREL     |                                            | respond PUBCOMP                 |
//! | PUBCOMP    | pending PUBLISH with the same id           | [`Outcome::Completed`]          |
//! | PINGREQ    |                                            | respond PINGRESP                |
//! | PINGRESP   |                                            | [`Outcome::Heartbeat`]          |
//!
//! Apart from CONNACK, frames are only acted upon while the session is
//! `Active`.

use crate::network::error::Error;
use heapless::Vec;

use super::codec::{self, Frame, PacketType};
use super::session::ConnectionState;

/// The request whose acknowledgment is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingRequest {
    /// Type of the packet that was sent.
    pub packet_type: PacketType,
    /// Its packet identifier, or 0 for packets without one.
    pub packet_id: u16,
}

impl PendingRequest {
    /// The correlation record for an outbound frame, if the frame expects an
    /// acknowledgment.
    ///
    /// Only CONNECT, SUBSCRIBE, UNSUBSCRIBE, PINGREQ and PUBLISH at QoS 1 or 2
    /// are tracked. Acknowledgments the client sends itself (PUBACK, PUBREL...)
    /// leave the outstanding request untouched.
    pub fn for_outbound(bytes: &[u8]) -> Option<Self> {
        let packet_type = codec::packet_type(bytes)?;
        let tracked = match packet_type {
            PacketType::Connect
            | PacketType::Subscribe
            | PacketType::Unsubscribe
            | PacketType::PingReq => true,
            PacketType::Publish => codec::qos(bytes) > 0,
            _ => false,
        };
        tracked.then(|| Self {
            packet_type,
            packet_id: codec::packet_id(bytes),
        })
    }

    fn matches(&self, packet_type: PacketType, packet_id: u16) -> bool {
        self.packet_type == packet_type && self.packet_id == packet_id
    }
}

/// A packet the client must send in reply to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// Acknowledge a QoS 1 PUBLISH.
    PubAck(u16),
    /// First reply to a QoS 2 PUBLISH.
    PubRec(u16),
    /// Release a QoS 2 PUBLISH the broker has received.
    PubRel(u16),
    /// Complete a QoS 2 PUBLISH the broker has released.
    PubComp(u16),
    /// Answer a broker PINGREQ.
    PingResp,
}

impl Response {
    /// Frame the response into `out`.
    pub fn encode<const N: usize>(&self, out: &mut Vec<u8, N>) -> Result<(), Error> {
        match *self {
            Response::PubAck(id) => codec::puback(out, id),
            Response::PubRec(id) => codec::pubrec(out, id),
            Response::PubRel(id) => codec::pubrel(out, id),
            Response::PubComp(id) => codec::pubcomp(out, id),
            Response::PingResp => codec::pingresp(out),
        }
    }
}

/// What the session has to do for one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    /// The broker accepted the connection.
    Connected,
    /// The CONNACK did not match the handshake; the link must be dropped.
    Refused,
    /// The outstanding request has been acknowledged.
    Completed,
    /// Enqueue a response packet.
    Respond(Response),
    /// Enqueue `ack` if present, then hand the message to the application.
    Deliver {
        /// Acknowledgment owed to the broker.
        ack: Option<Response>,
        /// Topic the message was published to.
        topic: &'a str,
        /// Message payload.
        payload: &'a [u8],
    },
    /// The broker answered a keepalive ping.
    Heartbeat,
    /// Nothing to do.
    Ignored,
}

/// Decide how to react to `frame`.
pub fn acknowledge<'a>(
    state: ConnectionState,
    pending: Option<PendingRequest>,
    frame: &Frame<'a>,
) -> Outcome<'a> {
    match state {
        ConnectionState::HandshakeSent => handshake(pending, frame),
        ConnectionState::Active => active(pending, frame),
        _ => {
            debug!("ignoring {:?} in state {:?}", frame.packet_type, state);
            Outcome::Ignored
        }
    }
}

fn handshake<'a>(pending: Option<PendingRequest>, frame: &Frame<'a>) -> Outcome<'a> {
    if frame.packet_type != PacketType::ConnAck {
        debug!("ignoring {:?} before CONNACK", frame.packet_type);
        return Outcome::Ignored;
    }
    let awaiting_connack = pending.is_some_and(|p| p.packet_type == PacketType::Connect);
    match frame.connack_code() {
        Some(0) if awaiting_connack => Outcome::Connected,
        code => {
            warn!("CONNACK refused (code {:?}, pending {:?})", code, pending);
            Outcome::Refused
        }
    }
}

fn active<'a>(pending: Option<PendingRequest>, frame: &Frame<'a>) -> Outcome<'a> {
    let id = frame.packet_id();
    match frame.packet_type {
        PacketType::SubAck => complete(pending, PacketType::Subscribe, id),
        PacketType::UnsubAck => complete(pending, PacketType::Unsubscribe, id),
        PacketType::PubAck | PacketType::PubComp => complete(pending, PacketType::Publish, id),
        PacketType::PubRec => Outcome::Respond(Response::PubRel(id)),
        PacketType::PubRel => Outcome::Respond(Response::PubComp(id)),
        PacketType::PingReq => Outcome::Respond(Response::PingResp),
        PacketType::PingResp => Outcome::Heartbeat,
        PacketType::Publish => deliver(frame),
        other => {
            debug!("ignoring unexpected {:?}", other);
            Outcome::Ignored
        }
    }
}

fn complete<'a>(pending: Option<PendingRequest>, expected: PacketType, id: u16) -> Outcome<'a> {
    match pending {
        Some(p) if p.matches(expected, id) => Outcome::Completed,
        _ => {
            warn!("mismatched ack for {:?} id {}, pending {:?}", expected, id, pending);
            Outcome::Ignored
        }
    }
}

fn deliver<'a>(frame: &Frame<'a>) -> Outcome<'a> {
    let (Ok(topic), Ok(payload)) = (frame.publish_topic(), frame.publish_payload()) else {
        warn!("dropping malformed PUBLISH");
        return Outcome::Ignored;
    };
    let id = frame.packet_id();
    let ack = match frame.qos() {
        0 => None,
        1 => Some(Response::PubAck(id)),
        2 => Some(Response::PubRec(id)),
        qos => {
            warn!("dropping PUBLISH with invalid QoS {}", qos);
            return Outcome::Ignored;
        }
    };
    Outcome::Deliver {
        ack,
        topic,
        payload,
    }
}
