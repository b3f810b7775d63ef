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

//! Body-less packets: PINGREQ, PINGRESP and DISCONNECT.

use bytes::{BufMut, BytesMut};

use super::Error;

/// PINGREQ packet. [MQTT-3.12]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReq;

impl PingReq {
    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        stream.put_u8(0xC0);
        stream.put_u8(0x00);
        Ok(2)
    }
}

/// PINGRESP packet. [MQTT-3.13]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResp;

impl PingResp {
    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        stream.put_u8(0xD0);
        stream.put_u8(0x00);
        Ok(2)
    }
}

/// DISCONNECT packet. [MQTT-3.14]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect;

impl Disconnect {
    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<usize, Error> {
        stream.put_u8(0xE0);
        stream.put_u8(0x00);
        Ok(2)
    }
}
