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

/// Per-filter result in a SUBACK payload: granted QoS or 0x80 failure.
/// [MQTT-3.9.3]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    Success(QoS),
    Failure,
}

impl SubscribeReturnCode {
    fn to_u8(self) -> u8 {
        match self {
            SubscribeReturnCode::Success(qos) => qos as u8,
            SubscribeReturnCode::Failure => 0x80,
        }
    }
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x80 => Ok(SubscribeReturnCode::Failure),
            qos => Ok(SubscribeReturnCode::Success(QoS::try_from(qos)?)),
        }
    }
}

/// SUBACK packet: one return code per requested filter, in order. [MQTT-3.9]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

impl SubAck {
    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        let packet_id = packet::read_u16(&mut stream)?;

        let mut return_codes = Vec::new();
        while !stream.is_empty() {
            return_codes.push(SubscribeReturnCode::try_from(packet::read_u8(&mut stream)?)?);
        }
        if return_codes.is_empty() {
            return Err(Error::MalformedPacket);
        }

        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        let len = 2 + self.return_codes.len();

        let written_start = stream.len();
        stream.put_u8(0x90);
        packet::write_remaining_length(stream, len)?;
        stream.put_u16(self.packet_id);
        for code in &self.return_codes {
            stream.put_u8(code.to_u8());
        }

        Ok(stream.len() - written_start)
    }
}
