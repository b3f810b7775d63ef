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

//! Commands posted from the public [`crate::mqtt_conn::Connection`] handle
//! to its event loop. Each carries a oneshot for the synchronous part of the
//! reply; completion callbacks fire later, when the broker acks.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::mqtt_conn::connection::EventHandlers;
use crate::mqtt_conn::connection_error::ConnectionError;
use crate::mqtt_conn::packet::{LastWill, Login, QoS};
use crate::mqtt_conn::topic_tree::PublishHandler;
use crate::mqtt_conn::OperationCallback;

pub(crate) enum Request {
    Connect {
        handlers: EventHandlers,
        response_tx: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Disconnect {
        response_tx: oneshot::Sender<Result<(), ConnectionError>>,
    },
    Subscribe {
        filter: String,
        qos: QoS,
        on_publish: PublishHandler,
        on_complete: Option<OperationCallback>,
        response_tx: oneshot::Sender<Result<u16, ConnectionError>>,
    },
    Unsubscribe {
        filter: String,
        on_complete: Option<OperationCallback>,
        response_tx: oneshot::Sender<Result<u16, ConnectionError>>,
    },
    Publish {
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Bytes,
        on_complete: Option<OperationCallback>,
        response_tx: oneshot::Sender<Result<u16, ConnectionError>>,
    },
    Ping {
        response_tx: oneshot::Sender<Result<(), ConnectionError>>,
    },
    SetWill {
        will: Option<LastWill>,
        response_tx: oneshot::Sender<Result<(), ConnectionError>>,
    },
    SetCredentials {
        login: Login,
        response_tx: oneshot::Sender<Result<(), ConnectionError>>,
    },
}
