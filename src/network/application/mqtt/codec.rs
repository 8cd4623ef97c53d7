//! MQTT 3.1.1 control packet encoding and fixed-header decoding.
//!
//! Builders write a complete frame into a caller-owned staging buffer, replacing
//! whatever it held. Decoders work on a buffer that starts at a frame boundary and
//! never read past the bytes they are given.
//!
//! # Examples
//!
//! ```rust
//! use heapless::Vec;
//! use libmqtt::network::application::mqtt::codec::{self, PacketType, QoS};
//!
//! let mut staging: Vec<u8, 64> = Vec::new();
//! codec::publish(&mut staging, "sensors/temp", b"21.5", QoS::AtLeastOnce, false, 7).unwrap();
//!
//! assert_eq!(codec::total_length(&staging), Ok(Some(staging.len())));
//! assert_eq!(codec::packet_type(&staging), Some(PacketType::Publish));
//! assert_eq!(codec::qos(&staging), 1);
//! assert_eq!(codec::packet_id(&staging), 7);
//! ```

use crate::network::error::Error;
use heapless::Vec;
use serde::Deserialize;

use super::config::{ClientConfig, LastWill};

/// Protocol name carried in every CONNECT.
const PROTOCOL_NAME: &[u8] = b"MQTT";
/// MQTT protocol level for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Largest value the remaining-length field can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

// CONNECT flag bits
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// MQTT control packet types, numbered as in the fixed header's upper nibble.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    /// Client request to connect to the broker.
    Connect = 1,
    /// Connect acknowledgment.
    ConnAck = 2,
    /// Publish message.
    Publish = 3,
    /// Publish acknowledgment (QoS 1).
    PubAck = 4,
    /// Publish received (QoS 2, part 1).
    PubRec = 5,
    /// Publish release (QoS 2, part 2).
    PubRel = 6,
    /// Publish complete (QoS 2, part 3).
    PubComp = 7,
    /// Subscribe request.
    Subscribe = 8,
    /// Subscribe acknowledgment.
    SubAck = 9,
    /// Unsubscribe request.
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment.
    UnsubAck = 11,
    /// Ping request.
    PingReq = 12,
    /// Ping response.
    PingResp = 13,
    /// Client is disconnecting.
    Disconnect = 14,
}

impl PacketType {
    /// Decode the packet type from a fixed-header byte.
    pub fn from_header(byte: u8) -> Option<Self> {
        let kind = match byte >> 4 {
            1 => PacketType::Connect,
            2 => PacketType::ConnAck,
            3 => PacketType::Publish,
            4 => PacketType::PubAck,
            5 => PacketType::PubRec,
            6 => PacketType::PubRel,
            7 => PacketType::PubComp,
            8 => PacketType::Subscribe,
            9 => PacketType::SubAck,
            10 => PacketType::Unsubscribe,
            11 => PacketType::UnsubAck,
            12 => PacketType::PingReq,
            13 => PacketType::PingResp,
            14 => PacketType::Disconnect,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether packets of this type carry a packet identifier right after the
    /// fixed header. PUBLISH is excluded: its identifier follows the topic.
    fn has_leading_id(self) -> bool {
        matches!(
            self,
            PacketType::PubAck
                | PacketType::PubRec
                | PacketType::PubRel
                | PacketType::PubComp
                | PacketType::Subscribe
                | PacketType::SubAck
                | PacketType::Unsubscribe
                | PacketType::UnsubAck
        )
    }
}

/// Quality of Service levels for MQTT messages.
///
/// ```rust
/// use libmqtt::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
/// assert!(QoS::try_from(3).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(try_from = "u8")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: at most once, fire and forget.
    AtMostOnce = 0,
    /// **QoS 1**: at least once, acknowledged with PUBACK.
    AtLeastOnce = 1,
    /// **QoS 2**: exactly once, PUBREC/PUBREL/PUBCOMP handshake.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// A borrowed view of one complete inbound control packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Decoded packet type.
    pub packet_type: PacketType,
    /// Whole frame, fixed header included.
    pub bytes: &'a [u8],
    /// Offset of the variable header within `bytes`.
    body_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse the complete frame at the start of `bytes`.
    ///
    /// Trailing bytes beyond the declared frame length are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        let (remaining, header_len) = decode_remaining_length(bytes)?.ok_or(Error::MalformedPacket)?;
        let total = header_len + remaining;
        if bytes.len() < total {
            return Err(Error::MalformedPacket);
        }
        let packet_type = PacketType::from_header(bytes[0]).ok_or(Error::MalformedPacket)?;
        Ok(Self {
            packet_type,
            bytes: &bytes[..total],
            body_offset: header_len,
        })
    }

    /// Bytes following the fixed header.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[self.body_offset..]
    }

    /// QoS bits of the fixed header (meaningful for PUBLISH only).
    pub fn qos(&self) -> u8 {
        (self.bytes[0] >> 1) & 0x03
    }

    /// Retain bit of the fixed header (meaningful for PUBLISH only).
    pub fn retain(&self) -> bool {
        self.bytes[0] & 0x01 != 0
    }

    /// Packet identifier, or 0 when the packet carries none.
    pub fn packet_id(&self) -> u16 {
        let body = self.body();
        match self.packet_type {
            PacketType::Publish if self.qos() > 0 => {
                let topic_len = match read_u16(body, 0) {
                    Some(len) => len as usize,
                    None => return 0,
                };
                read_u16(body, 2 + topic_len).unwrap_or(0)
            }
            kind if kind.has_leading_id() => read_u16(body, 0).unwrap_or(0),
            _ => 0,
        }
    }

    /// Topic of a PUBLISH packet.
    pub fn publish_topic(&self) -> Result<&'a str, Error> {
        if self.packet_type != PacketType::Publish {
            return Err(Error::MalformedPacket);
        }
        let body = self.body();
        let topic_len = read_u16(body, 0).ok_or(Error::MalformedPacket)? as usize;
        let topic = body.get(2..2 + topic_len).ok_or(Error::MalformedPacket)?;
        core::str::from_utf8(topic).map_err(|_| Error::MalformedPacket)
    }

    /// Application payload of a PUBLISH packet.
    pub fn publish_payload(&self) -> Result<&'a [u8], Error> {
        if self.packet_type != PacketType::Publish {
            return Err(Error::MalformedPacket);
        }
        let body = self.body();
        let topic_len = read_u16(body, 0).ok_or(Error::MalformedPacket)? as usize;
        let mut start = 2 + topic_len;
        if self.qos() > 0 {
            start += 2;
        }
        body.get(start..).ok_or(Error::MalformedPacket)
    }

    /// Return code of a CONNACK packet (0 means accepted).
    pub fn connack_code(&self) -> Option<u8> {
        if self.packet_type != PacketType::ConnAck {
            return None;
        }
        self.body().get(1).copied()
    }
}

/// Declared total length (fixed header included) of the frame at the start of
/// `buf`.
///
/// Returns `Ok(None)` while the fixed header itself is still incomplete.
pub fn total_length(buf: &[u8]) -> Result<Option<usize>, Error> {
    Ok(decode_remaining_length(buf)?.map(|(remaining, header_len)| header_len + remaining))
}

/// Packet type of the frame at the start of `buf`.
pub fn packet_type(buf: &[u8]) -> Option<PacketType> {
    buf.first().copied().and_then(PacketType::from_header)
}

/// QoS bits of the frame at the start of `buf`.
pub fn qos(buf: &[u8]) -> u8 {
    buf.first().map(|b| (b >> 1) & 0x03).unwrap_or(0)
}

/// Packet identifier of the frame at the start of `buf`, or 0 if it has none or
/// the frame is incomplete.
pub fn packet_id(buf: &[u8]) -> u16 {
    Frame::parse(buf).map(|frame| frame.packet_id()).unwrap_or(0)
}

/// Build a CONNECT packet from the client configuration and optional will.
pub fn connect<const N: usize>(
    out: &mut Vec<u8, N>,
    client: &ClientConfig,
    will: Option<&LastWill>,
) -> Result<(), Error> {
    let mut flags = 0;
    if client.clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }

    // --- Variable Header: name, level, flags, keepalive ---
    let mut remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;

    // --- Payload ---
    remaining += 2 + client.client_id.len();
    if let Some(will) = will {
        flags |= FLAG_WILL | ((will.qos as u8) << 3);
        if will.retain {
            flags |= FLAG_WILL_RETAIN;
        }
        remaining += 2 + will.topic.len() + 2 + will.message.len();
    }
    if !client.username.is_empty() {
        flags |= FLAG_USERNAME;
        remaining += 2 + client.username.len();
    }
    if !client.password.is_empty() {
        flags |= FLAG_PASSWORD;
        remaining += 2 + client.password.len();
    }

    begin(out, (PacketType::Connect as u8) << 4, remaining)?;
    put_bytes(out, PROTOCOL_NAME)?;
    put(out, &[PROTOCOL_LEVEL, flags])?;
    put(out, &client.keepalive.to_be_bytes())?;
    put_bytes(out, client.client_id.as_bytes())?;
    if let Some(will) = will {
        put_bytes(out, will.topic.as_bytes())?;
        put_bytes(out, will.message.as_bytes())?;
    }
    if !client.username.is_empty() {
        put_bytes(out, client.username.as_bytes())?;
    }
    if !client.password.is_empty() {
        put_bytes(out, client.password.as_bytes())?;
    }
    Ok(())
}

/// Build a PUBLISH packet. `packet_id` is only written for QoS 1 and 2.
pub fn publish<const N: usize>(
    out: &mut Vec<u8, N>,
    topic: &str,
    payload: &[u8],
    qos: QoS,
    retain: bool,
    packet_id: u16,
) -> Result<(), Error> {
    if topic.is_empty() || topic.contains(&['+', '#'][..]) {
        return Err(Error::InvalidArgument);
    }
    let mut header = ((PacketType::Publish as u8) << 4) | ((qos as u8) << 1);
    if retain {
        header |= 0x01;
    }
    let mut remaining = 2 + topic.len() + payload.len();
    if qos != QoS::AtMostOnce {
        remaining += 2;
    }

    begin(out, header, remaining)?;
    put_bytes(out, topic.as_bytes())?;
    if qos != QoS::AtMostOnce {
        put(out, &packet_id.to_be_bytes())?;
    }
    put(out, payload)
}

/// Build a SUBSCRIBE packet for a single topic filter.
pub fn subscribe<const N: usize>(
    out: &mut Vec<u8, N>,
    topic: &str,
    qos: QoS,
    packet_id: u16,
) -> Result<(), Error> {
    if topic.is_empty() {
        return Err(Error::InvalidArgument);
    }
    // SUBSCRIBE carries reserved flag bits 0b0010
    begin(out, ((PacketType::Subscribe as u8) << 4) | 0x02, 2 + 2 + topic.len() + 1)?;
    put(out, &packet_id.to_be_bytes())?;
    put_bytes(out, topic.as_bytes())?;
    put(out, &[qos as u8])
}

/// Build an UNSUBSCRIBE packet for a single topic filter.
pub fn unsubscribe<const N: usize>(
    out: &mut Vec<u8, N>,
    topic: &str,
    packet_id: u16,
) -> Result<(), Error> {
    if topic.is_empty() {
        return Err(Error::InvalidArgument);
    }
    begin(out, ((PacketType::Unsubscribe as u8) << 4) | 0x02, 2 + 2 + topic.len())?;
    put(out, &packet_id.to_be_bytes())?;
    put_bytes(out, topic.as_bytes())
}

/// Build a PUBACK packet.
pub fn puback<const N: usize>(out: &mut Vec<u8, N>, packet_id: u16) -> Result<(), Error> {
    ack(out, (PacketType::PubAck as u8) << 4, packet_id)
}

/// Build a PUBREC packet.
pub fn pubrec<const N: usize>(out: &mut Vec<u8, N>, packet_id: u16) -> Result<(), Error> {
    ack(out, (PacketType::PubRec as u8) << 4, packet_id)
}

/// Build a PUBREL packet.
pub fn pubrel<const N: usize>(out: &mut Vec<u8, N>, packet_id: u16) -> Result<(), Error> {
    // PUBREL carries reserved flag bits 0b0010
    ack(out, ((PacketType::PubRel as u8) << 4) | 0x02, packet_id)
}

/// Build a PUBCOMP packet.
pub fn pubcomp<const N: usize>(out: &mut Vec<u8, N>, packet_id: u16) -> Result<(), Error> {
    ack(out, (PacketType::PubComp as u8) << 4, packet_id)
}

/// Build a PINGREQ packet.
pub fn pingreq<const N: usize>(out: &mut Vec<u8, N>) -> Result<(), Error> {
    begin(out, (PacketType::PingReq as u8) << 4, 0)
}

/// Build a PINGRESP packet.
pub fn pingresp<const N: usize>(out: &mut Vec<u8, N>) -> Result<(), Error> {
    begin(out, (PacketType::PingResp as u8) << 4, 0)
}

/// Build a DISCONNECT packet.
pub fn disconnect<const N: usize>(out: &mut Vec<u8, N>) -> Result<(), Error> {
    begin(out, (PacketType::Disconnect as u8) << 4, 0)
}

fn ack<const N: usize>(out: &mut Vec<u8, N>, header: u8, packet_id: u16) -> Result<(), Error> {
    begin(out, header, 2)?;
    put(out, &packet_id.to_be_bytes())
}

/// Reset `out` and write the fixed header.
fn begin<const N: usize>(out: &mut Vec<u8, N>, header: u8, remaining: usize) -> Result<(), Error> {
    out.clear();
    out.push(header).map_err(|_| Error::PacketTooLarge)?;
    encode_remaining_length(out, remaining)
}

/// Encode the remaining length field for an MQTT packet.
///
/// The encoding uses up to 4 bytes where each byte encodes 7 bits of the length
/// value. The most significant bit indicates if another byte follows.
fn encode_remaining_length<const N: usize>(out: &mut Vec<u8, N>, mut len: usize) -> Result<(), Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::PacketTooLarge);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte).map_err(|_| Error::PacketTooLarge)?;
        if len == 0 {
            return Ok(());
        }
    }
}

/// Decode the remaining length field at `buf[1..]`.
///
/// Returns `(remaining_length, fixed_header_length)`, or `None` if more bytes are
/// needed to finish the field.
fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, Error> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for i in 0..4 {
        let Some(&byte) = buf.get(1 + i) else {
            return Ok(None);
        };
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, 2 + i)));
        }
        multiplier *= 128;
    }
    Err(Error::MalformedPacket)
}

fn put<const N: usize>(out: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    out.extend_from_slice(bytes).map_err(|_| Error::PacketTooLarge)
}

/// Write a length-prefixed UTF-8 string or binary field.
fn put_bytes<const N: usize>(out: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::InvalidArgument)?;
    put(out, &len.to_be_bytes())?;
    put(out, bytes)
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes = buf.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
