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

//! The four publish acknowledgement packets. All share the same two-byte
//! packet-id body; PUBREL additionally fixes its flags nibble at 0b0010.

use bytes::{BufMut, Bytes, BytesMut};

use crate::mqtt_conn::packet::{self, Error};

macro_rules! ack_packet {
    ($name:ident, $doc:literal, $byte1:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl $name {
            pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
                let packet_id = packet::read_u16(&mut stream)?;
                Ok($name { packet_id })
            }

            pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
                stream.put_u8($byte1);
                stream.put_u8(0x02);
                stream.put_u16(self.packet_id);
                Ok(4)
            }
        }
    };
}

ack_packet!(PubAck, "PUBACK packet, QoS 1 acknowledgement. [MQTT-3.4]", 0x40);
ack_packet!(PubRec, "PUBREC packet, QoS 2 delivery part 1. [MQTT-3.5]", 0x50);
ack_packet!(PubRel, "PUBREL packet, QoS 2 delivery part 2. [MQTT-3.6]", 0x62);
ack_packet!(PubComp, "PUBCOMP packet, QoS 2 delivery part 3. [MQTT-3.7]", 0x70);
