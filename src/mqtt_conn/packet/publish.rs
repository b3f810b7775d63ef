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

use bytes::{BufMut, Bytes, BytesMut};

use crate::mqtt_conn::packet::{self, Error, QoS};

/// PUBLISH packet. [MQTT-3.3]
///
/// `packet_id` is meaningful only when `qos > 0`; a QoS-0 publish carries no
/// id on the wire and decodes with `packet_id == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub packet_id: u16,
    pub payload: Bytes,
}

impl Publish {
    pub(crate) fn read(flags: u8, mut stream: Bytes) -> Result<Self, Error> {
        let dup = flags & 0b1000 != 0;
        let qos = QoS::try_from((flags & 0b0110) >> 1)?;
        let retain = flags & 0b0001 != 0;

        let topic = packet::read_string(&mut stream)?;
        let packet_id = match qos {
            QoS::AtMostOnce => 0,
            _ => packet::read_u16(&mut stream)?,
        };

        // The payload is whatever is left of the frame.
        Ok(Publish {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: stream,
        })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let mut len = 2 + self.topic.len() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            len += 2;
        }

        let mut byte1 = 0x30;
        if self.dup {
            byte1 |= 0b1000;
        }
        byte1 |= (self.qos as u8) << 1;
        if self.retain {
            byte1 |= 0b0001;
        }

        let written_start = stream.len();
        stream.put_u8(byte1);
        packet::write_remaining_length(stream, len)?;
        packet::write_string(stream, &self.topic)?;
        if self.qos != QoS::AtMostOnce {
            stream.put_u16(self.packet_id);
        }
        stream.extend_from_slice(&self.payload);

        Ok(stream.len() - written_start)
    }
}
