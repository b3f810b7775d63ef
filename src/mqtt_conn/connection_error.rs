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

use crate::mqtt_conn::packet;
use crate::mqtt_conn::packet::ConnectReturnCode;
use crate::mqtt_conn::transport::TransportError;

/// Unified error type for connection operations.
///
/// Codec failures and transport failures are wrapped; the remaining variants
/// are connection- or operation-level conditions. Codec and protocol errors
/// reset the transport and enter the reconnect path; `Timeout` is delivered
/// per-operation and leaves the connection up; `Disconnected` is handed to
/// every in-flight request when the application closes the connection.
#[derive(Debug)]
pub enum ConnectionError {
    /// Packet-codec error: the inbound byte stream or an outbound packet
    /// violated the MQTT v3.1.1 encoding rules.
    Packet(packet::Error),

    /// I/O or transport-level error.
    Transport(TransportError),

    /// A tracked operation could not be retransmitted after its
    /// request-timeout elapsed.
    Timeout,

    /// No PINGRESP arrived within the request-timeout after a PINGREQ; the
    /// connection is considered dead and reconnection begins.
    KeepaliveTimeout,

    /// All 65535 packet ids are tied to in-flight operations.
    NoPacketIds,

    /// A well-formed but semantically illegal packet arrived, e.g. a CONNACK
    /// while already connected.
    ProtocolError,

    /// The broker answered SUBSCRIBE with the 0x80 failure return code.
    SubscriptionRefused,

    /// The broker refused the CONNECT with the contained return code.
    ConnectionRefused(ConnectReturnCode),

    /// The operation's request was still pending when the application closed
    /// the connection.
    Disconnected,

    /// The operation requires an active connection.
    NotConnected,

    /// `connect` was called while a session is already being established or
    /// is established.
    AlreadyConnected,

    /// The connection's event loop is gone.
    ChannelClosed,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Packet(e) => write!(f, "Packet codec error: {e}"),
            ConnectionError::Transport(e) => write!(f, "Transport error: {e}"),
            ConnectionError::Timeout => write!(f, "Request timed out"),
            ConnectionError::KeepaliveTimeout => write!(f, "Keep-alive timed out"),
            ConnectionError::NoPacketIds => write!(f, "All packet ids are in flight"),
            ConnectionError::ProtocolError => write!(f, "Protocol error"),
            ConnectionError::SubscriptionRefused => write!(f, "Subscription refused by broker"),
            ConnectionError::ConnectionRefused(code) => {
                write!(f, "Connection refused by broker: {code:?}")
            }
            ConnectionError::Disconnected => write!(f, "Connection closed"),
            ConnectionError::NotConnected => write!(f, "Not connected"),
            ConnectionError::AlreadyConnected => write!(f, "Already connected"),
            ConnectionError::ChannelClosed => write!(f, "Internal channel closed"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Packet(e) => Some(e),
            ConnectionError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<packet::Error> for ConnectionError {
    fn from(e: packet::Error) -> Self {
        ConnectionError::Packet(e)
    }
}

impl From<TransportError> for ConnectionError {
    fn from(e: TransportError) -> Self {
        ConnectionError::Transport(e)
    }
}
