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

//! Inbound frame assembly.
//!
//! Transport chunks do not align with packet boundaries: a chunk may end
//! mid-frame and may carry several frames. The buffer accumulates bytes and
//! yields complete packets one at a time, in arrival order.

use bytes::BytesMut;

use crate::mqtt_conn::packet::{self, Packet};

#[derive(Default)]
pub(crate) struct FrameBuffer {
    pending: BytesMut,
}

impl FrameBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Decode the next complete packet, if one is buffered.
    ///
    /// `Ok(None)` means the buffer holds at most a frame prefix; feed more
    /// bytes. Errors are codec failures and poison the stream.
    pub(crate) fn next_packet(&mut self) -> Result<Option<Packet>, packet::Error> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        match Packet::read(&mut self.pending) {
            Ok(packet) => Ok(Some(packet)),
            Err(packet::Error::InsufficientBytes(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drop any partially received frame, e.g. when the transport is reset.
    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_conn::packet::{PubAck, SubAck, SubscribeReturnCode};
    use crate::mqtt_conn::packet::QoS;

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut encoded = BytesMut::new();
        Packet::PubAck(PubAck { packet_id: 5 }).write(&mut encoded).unwrap();

        let mut buffer = FrameBuffer::new();
        buffer.extend(&encoded[..2]);
        assert!(buffer.next_packet().unwrap().is_none());

        buffer.extend(&encoded[2..]);
        assert_eq!(
            buffer.next_packet().unwrap(),
            Some(Packet::PubAck(PubAck { packet_id: 5 }))
        );
        assert!(buffer.next_packet().unwrap().is_none());
    }

    #[test]
    fn multiple_frames_in_one_chunk_drain_in_order() {
        let mut encoded = BytesMut::new();
        Packet::SubAck(SubAck {
            packet_id: 1,
            return_codes: vec![SubscribeReturnCode::Success(QoS::AtLeastOnce)],
        })
        .write(&mut encoded)
        .unwrap();
        Packet::PingResp.write(&mut encoded).unwrap();
        Packet::PubAck(PubAck { packet_id: 2 }).write(&mut encoded).unwrap();

        let mut buffer = FrameBuffer::new();
        buffer.extend(&encoded);

        assert!(matches!(
            buffer.next_packet().unwrap(),
            Some(Packet::SubAck(_))
        ));
        assert_eq!(buffer.next_packet().unwrap(), Some(Packet::PingResp));
        assert_eq!(
            buffer.next_packet().unwrap(),
            Some(Packet::PubAck(PubAck { packet_id: 2 }))
        );
        assert!(buffer.next_packet().unwrap().is_none());
    }

    #[test]
    fn malformed_frame_surfaces_the_codec_error() {
        let mut buffer = FrameBuffer::new();
        buffer.extend(&[0x00, 0x00]);
        assert!(buffer.next_packet().is_err());
    }

    #[test]
    fn clear_drops_partial_frame() {
        let mut encoded = BytesMut::new();
        Packet::PubAck(PubAck { packet_id: 5 }).write(&mut encoded).unwrap();

        let mut buffer = FrameBuffer::new();
        buffer.extend(&encoded[..3]);
        buffer.clear();
        assert!(buffer.next_packet().unwrap().is_none());
    }
}
