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

use crate::mqtt_conn::packet::{self, Error};

/// UNSUBSCRIBE packet. [MQTT-3.10]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

impl Unsubscribe {
    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        let mut filters = Vec::new();
        while !stream.is_empty() {
            filters.push(packet::read_string(&mut stream)?);
        }
        // The payload MUST contain at least one filter. [MQTT-3.10.3-2]
        if filters.is_empty() {
            return Err(Error::MalformedPacket);
        }

        Ok(Unsubscribe { packet_id, filters })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        if self.filters.is_empty() {
            return Err(Error::MalformedPacket);
        }
        let len = 2 + self.filters.iter().map(|f| 2 + f.len()).sum::<usize>();

        let written_start = stream.len();
        stream.put_u8(0xA2);
        packet::write_remaining_length(stream, len)?;
        stream.put_u16(self.packet_id);
        for filter in &self.filters {
            packet::write_string(stream, filter)?;
        }

        Ok(stream.len() - written_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_conn::packet::Packet;

    #[test]
    fn unsubscribe_round_trip() {
        let unsubscribe = Unsubscribe {
            packet_id: 3,
            filters: vec!["a/b".into(), "c/#".into()],
        };

        let mut buf = BytesMut::new();
        Packet::Unsubscribe(unsubscribe.clone()).write(&mut buf).unwrap();
        assert_eq!(buf[0], 0xA2);
        assert_eq!(
            Packet::read(&mut buf).unwrap(),
            Packet::Unsubscribe(unsubscribe)
        );
    }
}
