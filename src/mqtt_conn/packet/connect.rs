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

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// CONNECT packet. [MQTT-3.1]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub keep_alive: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub last_will: Option<LastWill>,
    pub login: Option<Login>,
}

impl Connect {
    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        let protocol_name = packet::read_string(&mut stream)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(Error::UnsupportedProtocolName);
        }
        let protocol_level = packet::read_u8(&mut stream)?;
        if protocol_level != PROTOCOL_LEVEL {
            return Err(Error::UnsupportedProtocolLevel(protocol_level));
        }

        let connect_flags = packet::read_u8(&mut stream)?;
        // Flags bit 0 is reserved and MUST be zero. [MQTT-3.1.2-3]
        if connect_flags & 0b0000_0001 != 0 {
            return Err(Error::InvalidReservedBits);
        }
        let clean_session = (connect_flags & 0b10) != 0;
        let keep_alive = packet::read_u16(&mut stream)?;

        let client_id = packet::read_string(&mut stream)?;
        let last_will = LastWill::read(connect_flags, &mut stream)?;
        let login = Login::read(connect_flags, &mut stream)?;

        Ok(Connect {
            keep_alive,
            client_id,
            clean_session,
            last_will,
            login,
        })
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        // Protocol name + level + flags + keep alive.
        let mut len = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2;
        len += 2 + self.client_id.len();
        if let Some(will) = &self.last_will {
            len += 2 + will.topic.len() + 2 + will.message.len();
        }
        if let Some(login) = &self.login {
            len += login.encoded_len()?;
        }

        let written_start = stream.len();
        stream.put_u8(0x10);
        packet::write_remaining_length(stream, len)?;
        packet::write_string(stream, PROTOCOL_NAME)?;
        stream.put_u8(PROTOCOL_LEVEL);

        let mut connect_flags = 0u8;
        if self.clean_session {
            connect_flags |= 0b10;
        }
        if let Some(will) = &self.last_will {
            connect_flags |= 0b100;
            connect_flags |= (will.qos as u8) << 3;
            if will.retain {
                connect_flags |= 0b0010_0000;
            }
        }
        if let Some(login) = &self.login {
            connect_flags |= login.flags()?;
        }
        stream.put_u8(connect_flags);
        stream.put_u16(self.keep_alive);

        packet::write_string(stream, &self.client_id)?;
        if let Some(will) = &self.last_will {
            packet::write_string(stream, &will.topic)?;
            packet::write_bytes(stream, &will.message)?;
        }
        if let Some(login) = &self.login {
            login.write(stream)?;
        }

        Ok(stream.len() - written_start)
    }
}

/// Will message registered with the broker at connect time, published by the
/// broker if the client vanishes ungracefully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl LastWill {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<LastWill>, Error> {
        let last_will = match connect_flags & 0b100 {
            0 if (connect_flags & 0b0011_1000) != 0 => {
                // Will QoS/retain without the will flag. [MQTT-3.1.2-11]
                return Err(Error::MalformedPacket);
            }
            0 => None,
            _ => Some(LastWill {
                topic: packet::read_string(stream)?,
                message: packet::read_bytes(stream)?,
                qos: QoS::try_from((connect_flags & 0b11000) >> 3)?,
                retain: (connect_flags & 0b0010_0000) != 0,
            }),
        };

        Ok(last_will)
    }
}

/// Username and optional password. A password without a username is not
/// representable on the wire. [MQTT-3.1.2-22]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub username: String,
    pub password: Option<String>,
}

impl Login {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<Login>, Error> {
        let has_username = connect_flags & 0b1000_0000 != 0;
        let has_password = connect_flags & 0b0100_0000 != 0;

        if has_password && !has_username {
            return Err(Error::InvalidCredentials);
        }
        if !has_username {
            return Ok(None);
        }

        let username = packet::read_string(stream)?;
        let password = if has_password {
            Some(packet::read_string(stream)?)
        } else {
            None
        };

        Ok(Some(Login { username, password }))
    }

    fn flags(&self) -> Result<u8, Error> {
        if self.username.is_empty() && self.password.is_some() {
            return Err(Error::InvalidCredentials);
        }
        let mut flags = 0b1000_0000;
        if self.password.is_some() {
            flags |= 0b0100_0000;
        }
        Ok(flags)
    }

    fn encoded_len(&self) -> Result<usize, Error> {
        let mut len = 2 + self.username.len();
        if let Some(password) = &self.password {
            len += 2 + password.len();
        }
        Ok(len)
    }

    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        packet::write_string(stream, &self.username)?;
        if let Some(password) = &self.password {
            packet::write_string(stream, password)?;
        }
        Ok(())
    }
}
