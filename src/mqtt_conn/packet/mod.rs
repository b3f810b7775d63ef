// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! MQTT v3.1.1 packet codec.
//!
//! Frames are `fixed header (1 byte) || remaining length (1-4 byte varint) ||
//! variable header || payload`. [`Packet::read`] consumes exactly one frame
//! from the front of a buffer, [`Packet::write`] appends one frame and
//! returns the number of bytes written.

use std::slice::Iter;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use connack::{ConnAck, ConnectReturnCode};
pub use connect::{Connect, LastWill, Login};
pub use ping::{Disconnect, PingReq, PingResp};
pub use puback::{PubAck, PubComp, PubRec, PubRel};
pub use publish::Publish;
pub use suback::{SubAck, SubscribeReturnCode};
pub use subscribe::{Subscribe, SubscribeFilter};
pub use unsuback::UnsubAck;
pub use unsubscribe::Unsubscribe;

pub mod connack;
pub mod connect;
pub mod ping;
pub mod puback;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

/// Largest value representable by the remaining-length varint.
pub const REMAINING_LENGTH_MAX: usize = 268_435_455;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bits marked as reserved in the MQTT spec were incorrectly set")]
    InvalidReservedBits,
    #[error("Encoded remaining length field is malformed")]
    MalformedRemainingLength,
    #[error("Encoded UTF-8 buffers may be no bigger than 65535 bytes")]
    BufferTooBig,
    #[error("Unsupported protocol name")]
    UnsupportedProtocolName,
    #[error("Unsupported protocol level: {0}")]
    UnsupportedProtocolLevel(u8),
    #[error("Connect packet may not include a password when no username is present")]
    InvalidCredentials,
    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),
    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),
    #[error("At least {0} more bytes required")]
    InsufficientBytes(usize),
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("Malformed UTF-8 string")]
    MalformedString,
    #[error("Payload too large")]
    PayloadTooLarge,
}

/// Quality of service for message delivery.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            qos => Err(Error::InvalidQoS(qos)),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

/// Fixed header: packet type + flags byte followed by the remaining length.
pub(crate) struct FixedHeader {
    /// First byte of the frame: type in the high nibble, flags in the low.
    byte1: u8,
    /// Byte count of the fixed header itself (1 + varint length).
    fixed_header_len: usize,
    /// Length of variable header plus payload.
    remaining_len: usize,
}

impl FixedHeader {
    #[inline]
    fn packet_type(&self) -> Result<PacketType, Error> {
        match self.byte1 >> 4 {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            n => Err(Error::InvalidPacketType(n)),
        }
    }

    #[inline]
    fn flags(&self) -> u8 {
        self.byte1 & 0x0F
    }

    /// Byte length of the whole frame.
    #[inline]
    fn packet_len(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }

    /// Parse the fixed header without consuming the stream.
    ///
    /// The remaining length uses 7 data bits per byte with the high bit as a
    /// continuation marker; more than four varint bytes is malformed.
    fn read_from(mut stream: Iter<u8>) -> Result<Self, Error> {
        let stream_len = stream.len();
        if stream_len < 2 {
            return Err(Error::InsufficientBytes(2 - stream_len));
        }
        let byte1 = *stream.next().expect("checked len above");

        let mut remaining_len: usize = 0;
        let mut header_len = 1;
        let mut done = false;
        let mut shift = 0;

        for byte in stream {
            header_len += 1;
            let byte = *byte as usize;
            remaining_len += (byte & 0x7F) << shift;

            done = (byte & 0x80) == 0;
            if done {
                break;
            }

            shift += 7;
            // Continuation past the fourth varint byte (shifts 0, 7, 14, 21)
            // can never be valid.
            if shift > 21 {
                return Err(Error::MalformedRemainingLength);
            }
        }

        if !done {
            return Err(Error::InsufficientBytes(1));
        }

        Ok(Self {
            byte1,
            fixed_header_len: header_len,
            remaining_len,
        })
    }
}

/// A parsed MQTT v3.1.1 control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Decode one frame from the front of `stream`.
    ///
    /// On success the frame's bytes are consumed and the cursor sits at the
    /// start of the next frame. `Error::InsufficientBytes` means the buffer
    /// holds only a prefix of a frame and nothing was consumed. Any other
    /// error means the input is malformed; the offending frame is left in
    /// the buffer.
    pub fn read(stream: &mut BytesMut) -> Result<Self, Error> {
        let stream_len = stream.len();
        let fixed_header = FixedHeader::read_from(stream.iter())?;

        let packet_len = fixed_header.packet_len();
        if stream_len < packet_len {
            return Err(Error::InsufficientBytes(packet_len - stream_len));
        }

        let packet_type = fixed_header.packet_type()?;
        let flags = fixed_header.flags();

        // PUBLISH carries DUP/QoS/RETAIN in the flags nibble; PUBREL,
        // SUBSCRIBE and UNSUBSCRIBE fix it at 0b0010; every other type
        // reserves it as zero. [MQTT-2.2.2-1]
        let flags_ok = match packet_type {
            PacketType::Publish => true,
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => flags == 0b0010,
            _ => flags == 0,
        };
        if !flags_ok {
            return Err(Error::InvalidReservedBits);
        }

        // The full frame is present: detach it and hand the body to the
        // per-packet decoder.
        let frame = stream.split_to(packet_len);

        if fixed_header.remaining_len == 0 {
            return match packet_type {
                PacketType::PingReq => Ok(Packet::PingReq),
                PacketType::PingResp => Ok(Packet::PingResp),
                PacketType::Disconnect => Ok(Packet::Disconnect),
                _ => Err(Error::MalformedPacket),
            };
        }

        let mut body = frame.freeze();
        body.advance(fixed_header.fixed_header_len);

        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(Connect::read(body)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::read(body)?),
            PacketType::Publish => Packet::Publish(Publish::read(flags, body)?),
            PacketType::PubAck => Packet::PubAck(PubAck::read(body)?),
            PacketType::PubRec => Packet::PubRec(PubRec::read(body)?),
            PacketType::PubRel => Packet::PubRel(PubRel::read(body)?),
            PacketType::PubComp => Packet::PubComp(PubComp::read(body)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(body)?),
            PacketType::SubAck => Packet::SubAck(SubAck::read(body)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::read(body)?),
            PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::read(body)?),
            PacketType::PingReq | PacketType::PingResp | PacketType::Disconnect => {
                // Ping and disconnect frames carry no body.
                return Err(Error::MalformedPacket);
            }
        };

        Ok(packet)
    }

    /// Encode this packet onto the end of `stream`, returning the number of
    /// bytes written.
    pub fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        match self {
            Packet::Connect(connect) => connect.write(stream),
            Packet::ConnAck(ack) => ack.write(stream),
            Packet::Publish(publish) => publish.write(stream),
            Packet::PubAck(ack) => ack.write(stream),
            Packet::PubRec(ack) => ack.write(stream),
            Packet::PubRel(ack) => ack.write(stream),
            Packet::PubComp(ack) => ack.write(stream),
            Packet::Subscribe(subscribe) => subscribe.write(stream),
            Packet::SubAck(ack) => ack.write(stream),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(stream),
            Packet::UnsubAck(ack) => ack.write(stream),
            Packet::PingReq => PingReq.write(stream),
            Packet::PingResp => PingResp.write(stream),
            Packet::Disconnect => Disconnect.write(stream),
        }
    }

    #[inline]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }
}

pub(crate) fn read_u8(stream: &mut Bytes) -> Result<u8, Error> {
    if stream.is_empty() {
        return Err(Error::MalformedPacket);
    }
    Ok(stream.get_u8())
}

pub(crate) fn read_u16(stream: &mut Bytes) -> Result<u16, Error> {
    if stream.len() < 2 {
        return Err(Error::MalformedPacket);
    }
    Ok(stream.get_u16())
}

/// Read a 16-bit-length-prefixed byte sequence.
pub(crate) fn read_bytes(stream: &mut Bytes) -> Result<Bytes, Error> {
    let len = read_u16(stream)? as usize;
    if len > stream.len() {
        return Err(Error::MalformedPacket);
    }
    Ok(stream.split_to(len))
}

pub(crate) fn read_string(stream: &mut Bytes) -> Result<String, Error> {
    let s = read_bytes(stream)?;
    String::from_utf8(s.to_vec()).map_err(|_| Error::MalformedString)
}

/// Write a 16-bit-length-prefixed byte sequence. [MQTT-1.5.3] caps the
/// prefix at 65535.
pub(crate) fn write_bytes(stream: &mut BytesMut, bytes: &[u8]) -> Result<(), Error> {
    if bytes.len() > u16::MAX as usize {
        return Err(Error::BufferTooBig);
    }
    stream.put_u16(bytes.len() as u16);
    stream.extend_from_slice(bytes);
    Ok(())
}

pub(crate) fn write_string(stream: &mut BytesMut, string: &str) -> Result<(), Error> {
    write_bytes(stream, string.as_bytes())
}

/// Encode the remaining-length varint, returning the number of bytes used.
pub(crate) fn write_remaining_length(stream: &mut BytesMut, len: usize) -> Result<usize, Error> {
    if len > REMAINING_LENGTH_MAX {
        return Err(Error::PayloadTooLarge);
    }

    let mut done = false;
    let mut x = len;
    let mut count = 0;

    while !done {
        let mut byte = (x % 128) as u8;
        x /= 128;
        if x > 0 {
            byte |= 128;
        }

        stream.put_u8(byte);
        count += 1;
        done = x == 0;
    }

    Ok(count)
}
