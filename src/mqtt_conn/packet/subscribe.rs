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

/// One SUBSCRIBE payload entry: topic filter plus requested QoS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub filter: String,
    pub qos: QoS,
}

/// SUBSCRIBE packet. [MQTT-3.8]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

impl Subscribe {
    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        let mut filters = Vec::new();
        while !stream.is_empty() {
            let filter = packet::read_string(&mut stream)?;
            let qos = QoS::try_from(packet::read_u8(&mut stream)?)?;
            filters.push(SubscribeFilter { filter, qos });
        }
        // The payload MUST contain at least one entry. [MQTT-3.8.3-3]
        if filters.is_empty() {
            return Err(Error::MalformedPacket);
        }

        Ok(Subscribe { packet_id, filters })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        if self.filters.is_empty() {
            return Err(Error::MalformedPacket);
        }
        let len = 2 + self
            .filters
            .iter()
            .map(|f| 2 + f.filter.len() + 1)
            .sum::<usize>();

        let written_start = stream.len();
        stream.put_u8(0x82);
        packet::write_remaining_length(stream, len)?;
        stream.put_u16(self.packet_id);
        for entry in &self.filters {
            packet::write_string(stream, &entry.filter)?;
            stream.put_u8(entry.qos as u8);
        }

        Ok(stream.len() - written_start)
    }
}
