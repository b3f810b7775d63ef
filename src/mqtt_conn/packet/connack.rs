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

/// CONNACK return code. [MQTT-3.2.2.3]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted = 0,
    RefusedProtocolVersion = 1,
    RefusedIdentifierRejected = 2,
    RefusedServerUnavailable = 3,
    RefusedBadCredentials = 4,
    RefusedNotAuthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectReturnCode::Accepted),
            1 => Ok(ConnectReturnCode::RefusedProtocolVersion),
            2 => Ok(ConnectReturnCode::RefusedIdentifierRejected),
            3 => Ok(ConnectReturnCode::RefusedServerUnavailable),
            4 => Ok(ConnectReturnCode::RefusedBadCredentials),
            5 => Ok(ConnectReturnCode::RefusedNotAuthorized),
            _ => Err(Error::MalformedPacket),
        }
    }
}

/// CONNACK packet. [MQTT-3.2]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub code: ConnectReturnCode,
}

impl ConnAck {
    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        let flags = packet::read_u8(&mut stream)?;
        // Acknowledge-flags bits 7-1 are reserved. [MQTT-3.2.2-1]
        if flags & 0b1111_1110 != 0 {
            return Err(Error::InvalidReservedBits);
        }
        let code = ConnectReturnCode::try_from(packet::read_u8(&mut stream)?)?;

        Ok(ConnAck {
            session_present: flags & 0b1 != 0,
            code,
        })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        stream.put_u8(0x20);
        stream.put_u8(0x02);
        stream.put_u8(self.session_present as u8);
        stream.put_u8(self.code as u8);
        Ok(4)
    }
}
