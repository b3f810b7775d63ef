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

//! The MQTT connection: public handle and protocol event loop.
//!
//! [`Connection`] is a cheap handle; all protocol state lives in a spawned
//! task that multiplexes three event sources with `tokio::select!`: API
//! commands, timer expirations, and transport reads. Application methods may
//! be called from any task or thread; they enqueue a command and return once
//! the loop has processed it. State transitions, codec work, request
//! tracking and subscription dispatch all run on the loop task, so no packet
//! is ever handled concurrently with another.

use std::collections::{HashSet, VecDeque};
use std::future;
use std::io::IoSlice;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::mqtt_conn::connection_error::ConnectionError;
use crate::mqtt_conn::connection_option::ConnectionOption;
use crate::mqtt_conn::frame::FrameBuffer;
use crate::mqtt_conn::packet::{
    ConnAck, Connect, ConnectReturnCode, LastWill, Login, Packet, PubAck, PubComp, PubRec, PubRel,
    Publish, QoS, Subscribe, SubscribeFilter, SubscribeReturnCode, Unsubscribe,
};
use crate::mqtt_conn::request::{
    OutstandingRequest, PendingRequest, RequestKind, RequestTracker,
};
use crate::mqtt_conn::request_response::Request;
use crate::mqtt_conn::topic_tree::{self, PublishHandler, TopicTree};
use crate::mqtt_conn::transport::{Connector, TransportError, TransportOps};
use crate::mqtt_conn::OperationCallback;

/// Connection lifecycle callbacks. All fields are optional; unset callbacks
/// are simply skipped.
#[derive(Default)]
pub struct EventHandlers {
    /// First successful CONNACK, or a refused CONNECT (non-zero code).
    pub on_connection_complete: Option<Box<dyn FnMut(bool, ConnectReturnCode) + Send>>,
    /// Transport loss or protocol failure while connected; reconnection
    /// starts right after this returns.
    pub on_connection_interrupted: Option<Box<dyn FnMut(&ConnectionError) + Send>>,
    /// Successful CONNACK after the first one, i.e. after a reconnect.
    pub on_connection_resumed: Option<Box<dyn FnMut(bool) + Send>>,
    /// The connection reached its terminal DISCONNECTED state. `None` for an
    /// application-initiated disconnect.
    pub on_disconnect: Option<Box<dyn FnMut(Option<&ConnectionError>) + Send>>,
}

/// Handle to an MQTT connection.
///
/// Dropping the handle shuts the event loop down; in-flight operations are
/// failed with [`ConnectionError::Disconnected`].
pub struct Connection {
    tx_send: mpsc::UnboundedSender<Request>,
    #[allow(dead_code)]
    event_loop_handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Create a connection in the DISCONNECTED state. The `connector` is
    /// invoked for the initial connect and for every reconnect attempt.
    pub fn new(connector: impl Connector + Send + 'static, options: ConnectionOption) -> Self {
        let (tx_send, rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let recv_buffer_size = *options.recv_buffer_size();
        let backoff = *options.reconnect_min_delay_ms();
        let actor = ConnectionActor {
            options,
            connector: Box::new(connector),
            rx,
            timer_tx,
            timer_rx,
            state: State::Disconnected,
            handlers: EventHandlers::default(),
            transport: None,
            frame: FrameBuffer::new(),
            read_buf: vec![0u8; recv_buffer_size],
            subscriptions: TopicTree::new(),
            tracker: RequestTracker::new(),
            backoff_current_ms: backoff,
            pingreq_timer: None,
            pingresp_timer: None,
            reconnect_timer: None,
            establish_timer: None,
            connection_count: 0,
            last_pingresp: Instant::now(),
            qos2_handled: HashSet::new(),
        };
        let event_loop_handle = tokio::spawn(actor.run());

        Self {
            tx_send,
            event_loop_handle,
        }
    }

    /// Begin establishing the session: open the transport and send CONNECT.
    /// Returns once the connection has left DISCONNECTED; the outcome is
    /// reported through `handlers`.
    pub async fn connect(&self, handlers: EventHandlers) -> Result<(), ConnectionError> {
        self.roundtrip(|response_tx| Request::Connect {
            handlers,
            response_tx,
        })
        .await
    }

    /// Gracefully close the session: send DISCONNECT when connected, close
    /// the transport, and fail all in-flight operations with
    /// [`ConnectionError::Disconnected`]. Terminal; no automatic re-open.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.roundtrip(|response_tx| Request::Disconnect { response_tx })
            .await
    }

    /// Subscribe to a topic filter. `on_publish` fires for every received
    /// PUBLISH matching the filter; `on_complete` fires when the SUBACK
    /// arrives. Returns the assigned packet id, or 0 if the connection is
    /// offline and the request was queued.
    pub async fn subscribe(
        &self,
        filter: impl Into<String>,
        qos: QoS,
        on_publish: PublishHandler,
        on_complete: Option<OperationCallback>,
    ) -> Result<u16, ConnectionError> {
        let filter = filter.into();
        self.roundtrip(|response_tx| Request::Subscribe {
            filter,
            qos,
            on_publish,
            on_complete,
            response_tx,
        })
        .await
    }

    /// Remove the subscription registered for exactly `filter`. The local
    /// routing entry is removed when the UNSUBACK arrives.
    pub async fn unsubscribe(
        &self,
        filter: impl Into<String>,
        on_complete: Option<OperationCallback>,
    ) -> Result<u16, ConnectionError> {
        let filter = filter.into();
        self.roundtrip(|response_tx| Request::Unsubscribe {
            filter,
            on_complete,
            response_tx,
        })
        .await
    }

    /// Publish a message. For QoS 0 the packet id is always 0 and
    /// `on_complete` fires as soon as the bytes are written; for QoS 1/2 the
    /// returned id stays allocated until the final acknowledgement.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        qos: QoS,
        retain: bool,
        payload: impl Into<Bytes>,
        on_complete: Option<OperationCallback>,
    ) -> Result<u16, ConnectionError> {
        let topic = topic.into();
        let payload = payload.into();
        self.roundtrip(|response_tx| Request::Publish {
            topic,
            qos,
            retain,
            payload,
            on_complete,
            response_tx,
        })
        .await
    }

    /// Send a PINGREQ outside the keep-alive schedule.
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.roundtrip(|response_tx| Request::Ping { response_tx })
            .await
    }

    /// Replace the will message used by subsequent CONNECT packets.
    pub async fn set_will(
        &self,
        topic: impl Into<String>,
        qos: QoS,
        retain: bool,
        payload: impl Into<Bytes>,
    ) -> Result<(), ConnectionError> {
        let will = LastWill {
            topic: topic.into(),
            message: payload.into(),
            qos,
            retain,
        };
        self.roundtrip(|response_tx| Request::SetWill {
            will: Some(will),
            response_tx,
        })
        .await
    }

    /// Replace the credentials used by subsequent CONNECT packets.
    pub async fn set_credentials(
        &self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Result<(), ConnectionError> {
        let login = Login {
            username: username.into(),
            password,
        };
        self.roundtrip(|response_tx| Request::SetCredentials { login, response_tx })
            .await
    }

    async fn roundtrip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ConnectionError>>) -> Request,
    ) -> Result<T, ConnectionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx_send
            .send(build(response_tx))
            .map_err(|_| ConnectionError::ChannelClosed)?;
        response_rx
            .await
            .map_err(|_| ConnectionError::ChannelClosed)?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
    Disconnected,
}

enum TimerEvent {
    /// Periodic keep-alive tick: send PINGREQ.
    PingreqSend,
    /// No PINGRESP within the request timeout.
    PingrespRecv,
    /// Backoff elapsed: attempt to reopen the transport.
    Reconnect,
    /// No CONNACK within the establish timeout.
    ConnackTimeout,
    /// An in-flight request's ack did not arrive in time.
    RequestTimeout(u16),
}

enum Wake {
    Request(Option<Request>),
    Timer(Option<TimerEvent>),
    Read(Result<usize, TransportError>),
}

struct ConnectionActor {
    options: ConnectionOption,
    connector: Box<dyn Connector + Send>,
    rx: mpsc::UnboundedReceiver<Request>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    state: State,
    handlers: EventHandlers,
    transport: Option<Box<dyn TransportOps + Send>>,
    frame: FrameBuffer,
    read_buf: Vec<u8>,
    subscriptions: TopicTree,
    tracker: RequestTracker,
    backoff_current_ms: u64,
    pingreq_timer: Option<tokio::task::JoinHandle<()>>,
    pingresp_timer: Option<tokio::task::JoinHandle<()>>,
    reconnect_timer: Option<tokio::task::JoinHandle<()>>,
    establish_timer: Option<tokio::task::JoinHandle<()>>,
    /// Successful CONNACKs so far; decides complete vs. resumed callbacks.
    connection_count: usize,
    last_pingresp: Instant,
    /// Packet ids of inbound QoS-2 publishes already dispatched and awaiting
    /// PUBREL.
    qos2_handled: HashSet<u16>,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            let wake = {
                let transport = self.transport.as_mut();
                let read_buf = &mut self.read_buf;
                tokio::select! {
                    request = self.rx.recv() => Wake::Request(request),
                    event = self.timer_rx.recv() => Wake::Timer(event),
                    result = async {
                        match transport {
                            Some(t) => t.recv(read_buf).await,
                            None => future::pending().await,
                        }
                    } => Wake::Read(result),
                }
            };

            match wake {
                Wake::Request(Some(request)) => self.handle_request(request).await,
                Wake::Request(None) => break,
                Wake::Timer(Some(event)) => self.handle_timer(event).await,
                Wake::Timer(None) => break,
                Wake::Read(result) => self.handle_read(result).await,
            }
        }

        // Handle dropped: tear the session down.
        self.cancel_all_timers();
        self.tracker.suspend_timers();
        if let Some(mut transport) = self.transport.take() {
            transport
                .shutdown(Duration::from_millis(*self.options.shutdown_timeout_ms()))
                .await;
        }
        self.fail_all_requests();
        self.subscriptions.clear();
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect {
                handlers,
                response_tx,
            } => {
                if self.state != State::Disconnected {
                    let _ = response_tx.send(Err(ConnectionError::AlreadyConnected));
                    return;
                }
                self.handlers = handlers;
                self.state = State::Connecting;
                self.backoff_current_ms = *self.options.reconnect_min_delay_ms();
                let _ = response_tx.send(Ok(()));
                self.attempt_connect().await;
            }

            Request::Disconnect { response_tx } => {
                if self.state == State::Disconnected {
                    let _ = response_tx.send(Ok(()));
                    return;
                }
                let was_connected = self.state == State::Connected;
                self.state = State::Disconnecting;
                self.cancel_all_timers();
                self.tracker.suspend_timers();

                if let Some(mut transport) = self.transport.take() {
                    if was_connected {
                        let mut buf = BytesMut::new();
                        if Packet::Disconnect.write(&mut buf).is_ok() {
                            let _ = transport.send(&[IoSlice::new(&buf)]).await;
                        }
                    }
                    transport
                        .shutdown(Duration::from_millis(*self.options.shutdown_timeout_ms()))
                        .await;
                }
                self.frame.clear();
                self.fail_all_requests();
                self.state = State::Disconnected;
                info!("disconnected");
                if let Some(cb) = self.handlers.on_disconnect.as_mut() {
                    cb(None);
                }
                let _ = response_tx.send(Ok(()));
            }

            Request::Subscribe {
                filter,
                qos,
                on_publish,
                on_complete,
                response_tx,
            } => {
                if !topic_tree::is_valid_filter(&filter) {
                    let _ = response_tx.send(Err(ConnectionError::ProtocolError));
                    return;
                }
                let mut txn = self.subscriptions.begin();
                txn.insert(filter.clone(), qos, on_publish);
                let kind = RequestKind::Subscribe { filter, qos };
                self.submit_request(kind, on_complete, Some(txn), response_tx)
                    .await;
            }

            Request::Unsubscribe {
                filter,
                on_complete,
                response_tx,
            } => {
                let mut txn = self.subscriptions.begin();
                txn.remove(filter.clone());
                let kind = RequestKind::Unsubscribe { filter };
                self.submit_request(kind, on_complete, Some(txn), response_tx)
                    .await;
            }

            Request::Publish {
                topic,
                qos,
                retain,
                payload,
                on_complete,
                response_tx,
            } => {
                let kind = RequestKind::Publish {
                    topic,
                    qos,
                    retain,
                    payload,
                };
                if qos == QoS::AtMostOnce {
                    self.send_untracked_publish(kind, on_complete, response_tx)
                        .await;
                } else {
                    self.submit_request(kind, on_complete, None, response_tx)
                        .await;
                }
            }

            Request::Ping { response_tx } => {
                if self.state != State::Connected {
                    let _ = response_tx.send(Err(ConnectionError::NotConnected));
                    return;
                }
                match self.write_packet(&Packet::PingReq).await {
                    Ok(()) => {
                        self.arm_pingresp_timer();
                        let _ = response_tx.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = response_tx.send(Err(ConnectionError::Transport(
                            TransportError::NotConnected,
                        )));
                        self.connection_lost(e).await;
                    }
                }
            }

            Request::SetWill { will, response_tx } => {
                self.options.set_last_will(will);
                let _ = response_tx.send(Ok(()));
            }

            Request::SetCredentials { login, response_tx } => {
                self.options.set_login(Some(login));
                let _ = response_tx.send(Ok(()));
            }
        }
    }

    /// Route a tracked request: straight to the wire when connected,
    /// otherwise onto the offline queue (reported as packet id 0).
    async fn submit_request(
        &mut self,
        kind: RequestKind,
        on_complete: Option<OperationCallback>,
        tree_txn: Option<topic_tree::Transaction>,
        response_tx: oneshot::Sender<Result<u16, ConnectionError>>,
    ) {
        if self.state != State::Connected {
            self.tracker.queue_offline(PendingRequest {
                kind,
                on_complete,
                tree_txn,
            });
            let _ = response_tx.send(Ok(0));
            return;
        }

        let id = match self.tracker.allocate_id() {
            Ok(id) => id,
            Err(e) => {
                let _ = response_tx.send(Err(e));
                return;
            }
        };
        self.tracker.insert(OutstandingRequest {
            id,
            kind,
            first_attempt: true,
            completed: false,
            timer: None,
            on_complete,
            tree_txn,
        });
        let _ = response_tx.send(Ok(id));
        self.transmit_request(id, false).await;
    }

    /// QoS-0 publish: never enters the tracker, packet id stays 0, complete
    /// as soon as the bytes are out.
    async fn send_untracked_publish(
        &mut self,
        kind: RequestKind,
        on_complete: Option<OperationCallback>,
        response_tx: oneshot::Sender<Result<u16, ConnectionError>>,
    ) {
        if self.state != State::Connected {
            self.tracker.queue_offline(PendingRequest {
                kind,
                on_complete,
                tree_txn: None,
            });
            let _ = response_tx.send(Ok(0));
            return;
        }

        let packet = Self::encode_request(0, &kind, false);
        match self.write_packet(&packet).await {
            Ok(()) => {
                if let Some(cb) = on_complete {
                    cb(None);
                }
                let _ = response_tx.send(Ok(0));
            }
            Err(ConnectionError::Packet(e)) => {
                let _ = response_tx.send(Err(ConnectionError::Packet(e)));
            }
            Err(e) => {
                // Transport broke mid-send; park the publish for the next
                // session.
                self.tracker.queue_offline(PendingRequest {
                    kind,
                    on_complete,
                    tree_txn: None,
                });
                let _ = response_tx.send(Ok(0));
                self.connection_lost(e).await;
            }
        }
    }

    /// Encode the wire packet for a tracked request. `dup` marks a repeated
    /// PUBLISH transmission.
    fn encode_request(id: u16, kind: &RequestKind, dup: bool) -> Packet {
        match kind {
            RequestKind::Publish {
                topic,
                qos,
                retain,
                payload,
            } => Packet::Publish(Publish {
                dup: dup && *qos != QoS::AtMostOnce,
                qos: *qos,
                retain: *retain,
                topic: topic.clone(),
                packet_id: id,
                payload: payload.clone(),
            }),
            RequestKind::PubRel => Packet::PubRel(PubRel { packet_id: id }),
            RequestKind::Subscribe { filter, qos } => Packet::Subscribe(Subscribe {
                packet_id: id,
                filters: vec![SubscribeFilter {
                    filter: filter.clone(),
                    qos: *qos,
                }],
            }),
            RequestKind::Unsubscribe { filter } => Packet::Unsubscribe(Unsubscribe {
                packet_id: id,
                filters: vec![filter.clone()],
            }),
        }
    }

    /// Put a tracked request on the wire and arm its retransmit timer.
    async fn transmit_request(&mut self, id: u16, dup: bool) {
        let packet = {
            let Some(request) = self.tracker.get_mut(id) else {
                return;
            };
            if dup {
                request.first_attempt = false;
            }
            trace!(id, first_attempt = request.first_attempt, "transmitting request");
            Self::encode_request(id, &request.kind, dup)
        };

        match self.write_packet(&packet).await {
            Ok(()) => {
                let timer = self.arm_request_timer(id);
                if let Some(request) = self.tracker.get_mut(id) {
                    request.timer = Some(timer);
                }
            }
            Err(ConnectionError::Packet(e)) => {
                // The request itself is unencodable; it can never succeed.
                if let Some(request) = self.tracker.complete(id) {
                    if let Some(cb) = request.on_complete {
                        cb(Some(ConnectionError::Packet(e)));
                    }
                }
            }
            Err(e) => {
                // Transport failure: the entry stays in the table and is
                // re-sent once the session is back.
                self.connection_lost(e).await;
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::PingreqSend => {
                if self.state != State::Connected {
                    return;
                }
                trace!("keep-alive tick, sending PINGREQ");
                match self.write_packet(&Packet::PingReq).await {
                    Ok(()) => {
                        self.arm_pingresp_timer();
                        self.arm_keepalive();
                    }
                    Err(e) => self.connection_lost(e).await,
                }
            }

            TimerEvent::PingrespRecv => {
                if self.state != State::Connected {
                    return;
                }
                warn!(
                    since_last_pingresp_ms =
                        self.last_pingresp.elapsed().as_millis() as u64,
                    "no PINGRESP within request timeout"
                );
                self.connection_lost(ConnectionError::KeepaliveTimeout).await;
            }

            TimerEvent::Reconnect => {
                // A fire after disconnect() is a no-op.
                if self.state != State::Reconnecting {
                    return;
                }
                self.reconnect_timer = None;
                self.state = State::Connecting;
                self.attempt_connect().await;
            }

            TimerEvent::ConnackTimeout => {
                if self.state != State::Connecting {
                    return;
                }
                debug!("timed out waiting for CONNACK");
                self.connection_lost(ConnectionError::Transport(TransportError::Timeout))
                    .await;
            }

            TimerEvent::RequestTimeout(id) => {
                if self.state != State::Connected {
                    return;
                }
                let packet = {
                    let Some(request) = self.tracker.get_mut(id) else {
                        return;
                    };
                    if request.completed {
                        return;
                    }
                    request.first_attempt = false;
                    Self::encode_request(id, &request.kind, true)
                };
                debug!(id, "ack overdue, retransmitting");
                match self.write_packet(&packet).await {
                    Ok(()) => {
                        let timer = self.arm_request_timer(id);
                        if let Some(request) = self.tracker.get_mut(id) {
                            request.timer = Some(timer);
                        }
                    }
                    Err(e) => {
                        if let Some(request) = self.tracker.complete(id) {
                            if let Some(cb) = request.on_complete {
                                cb(Some(ConnectionError::Timeout));
                            }
                        }
                        self.connection_lost(e).await;
                    }
                }
            }
        }
    }

    async fn handle_read(&mut self, result: Result<usize, TransportError>) {
        match result {
            Ok(0) => {
                debug!("transport closed by peer");
                self.connection_lost(ConnectionError::Transport(TransportError::NotConnected))
                    .await;
            }
            Ok(n) => {
                self.frame.extend(&self.read_buf[..n]);
                loop {
                    match self.frame.next_packet() {
                        Ok(Some(packet)) => {
                            self.handle_packet(packet).await;
                            if self.transport.is_none() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "malformed inbound frame");
                            self.connection_lost(ConnectionError::Packet(e)).await;
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                self.connection_lost(ConnectionError::Transport(e)).await;
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) {
        trace!(packet_type = ?packet.packet_type(), "packet received");
        match packet {
            Packet::ConnAck(ack) => self.handle_connack(ack).await,

            Packet::Publish(publish) => self.handle_inbound_publish(publish).await,

            Packet::PubAck(ack) => {
                let id = ack.packet_id;
                let matches_publish = matches!(
                    self.tracker.get_mut(id).map(|r| &r.kind),
                    Some(RequestKind::Publish {
                        qos: QoS::AtLeastOnce,
                        ..
                    })
                );
                if !matches_publish {
                    trace!(id, "PUBACK without matching request dropped");
                    return;
                }
                if let Some(request) = self.tracker.complete(id) {
                    if let Some(cb) = request.on_complete {
                        cb(None);
                    }
                }
            }

            Packet::PubRec(ack) => {
                let id = ack.packet_id;
                let advanced = match self.tracker.get_mut(id) {
                    Some(request)
                        if matches!(
                            request.kind,
                            RequestKind::Publish {
                                qos: QoS::ExactlyOnce,
                                ..
                            }
                        ) =>
                    {
                        request.kind = RequestKind::PubRel;
                        request.cancel_timer();
                        true
                    }
                    _ => false,
                };
                if !advanced {
                    trace!(id, "PUBREC without matching request dropped");
                    return;
                }
                self.transmit_request(id, false).await;
            }

            Packet::PubComp(ack) => {
                let id = ack.packet_id;
                if !matches!(
                    self.tracker.get_mut(id).map(|r| &r.kind),
                    Some(RequestKind::PubRel)
                ) {
                    trace!(id, "PUBCOMP without matching request dropped");
                    return;
                }
                if let Some(request) = self.tracker.complete(id) {
                    if let Some(cb) = request.on_complete {
                        cb(None);
                    }
                }
            }

            Packet::PubRel(ack) => {
                // Inbound QoS-2 handshake completion.
                self.qos2_handled.remove(&ack.packet_id);
                if let Err(e) = self
                    .write_packet(&Packet::PubComp(PubComp {
                        packet_id: ack.packet_id,
                    }))
                    .await
                {
                    self.connection_lost(e).await;
                }
            }

            Packet::SubAck(ack) => {
                let id = ack.packet_id;
                if !matches!(
                    self.tracker.get_mut(id).map(|r| &r.kind),
                    Some(RequestKind::Subscribe { .. })
                ) {
                    trace!(id, "SUBACK without matching request dropped");
                    return;
                }
                let Some(request) = self.tracker.complete(id) else {
                    return;
                };
                let refused = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReturnCode::Failure));
                if refused {
                    debug!(id, "subscription refused by broker");
                    if let Some(txn) = request.tree_txn {
                        txn.rollback();
                    }
                    if let Some(cb) = request.on_complete {
                        cb(Some(ConnectionError::SubscriptionRefused));
                    }
                } else {
                    if let Some(txn) = request.tree_txn {
                        self.subscriptions.commit(txn);
                    }
                    if let Some(cb) = request.on_complete {
                        cb(None);
                    }
                }
            }

            Packet::UnsubAck(ack) => {
                let id = ack.packet_id;
                if !matches!(
                    self.tracker.get_mut(id).map(|r| &r.kind),
                    Some(RequestKind::Unsubscribe { .. })
                ) {
                    trace!(id, "UNSUBACK without matching request dropped");
                    return;
                }
                if let Some(request) = self.tracker.complete(id) {
                    if let Some(txn) = request.tree_txn {
                        self.subscriptions.commit(txn);
                    }
                    if let Some(cb) = request.on_complete {
                        cb(None);
                    }
                }
            }

            Packet::PingResp => {
                trace!("PINGRESP received");
                self.last_pingresp = Instant::now();
                if let Some(timer) = self.pingresp_timer.take() {
                    timer.abort();
                }
            }

            // Broker-to-client traffic never includes these in v3.1.1.
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::PingReq
            | Packet::Disconnect => {
                warn!(packet_type = ?packet.packet_type(), "illegal packet from broker");
                self.connection_lost(ConnectionError::ProtocolError).await;
            }
        }
    }

    async fn handle_connack(&mut self, ack: ConnAck) {
        if self.state != State::Connected && self.state != State::Connecting {
            return;
        }
        if self.state == State::Connected {
            warn!("CONNACK while already connected");
            self.connection_lost(ConnectionError::ProtocolError).await;
            return;
        }
        self.cancel_establish_timer();

        if ack.code != ConnectReturnCode::Accepted {
            warn!(code = ?ack.code, "broker refused connection");
            if let Some(cb) = self.handlers.on_connection_complete.as_mut() {
                cb(ack.session_present, ack.code);
            }
            // The broker rejected the session parameters; retrying with the
            // same CONNECT cannot succeed.
            self.cancel_all_timers();
            if let Some(mut transport) = self.transport.take() {
                transport
                    .shutdown(Duration::from_millis(*self.options.shutdown_timeout_ms()))
                    .await;
            }
            self.frame.clear();
            self.fail_all_requests();
            self.state = State::Disconnected;
            let reason = ConnectionError::ConnectionRefused(ack.code);
            if let Some(cb) = self.handlers.on_disconnect.as_mut() {
                cb(Some(&reason));
            }
            return;
        }

        self.state = State::Connected;
        self.backoff_current_ms = *self.options.reconnect_min_delay_ms();
        self.connection_count += 1;
        info!(
            session_present = ack.session_present,
            connection_count = self.connection_count,
            "session established"
        );

        if self.connection_count == 1 {
            if let Some(cb) = self.handlers.on_connection_complete.as_mut() {
                cb(ack.session_present, ack.code);
            }
        } else if let Some(cb) = self.handlers.on_connection_resumed.as_mut() {
            cb(ack.session_present);
        }

        self.last_pingresp = Instant::now();
        self.arm_keepalive();

        // Unacked requests from the previous session go out again, PUBLISH
        // with DUP=1, then the offline queue drains in FIFO order.
        self.resend_in_flight().await;
        if self.state == State::Connected {
            self.drain_offline().await;
        }
    }

    async fn handle_inbound_publish(&mut self, publish: Publish) {
        trace!(topic = %publish.topic, qos = ?publish.qos, "PUBLISH received");
        match publish.qos {
            QoS::AtMostOnce => {
                self.subscriptions.dispatch(&publish.topic, &publish.payload);
            }
            QoS::AtLeastOnce => {
                self.subscriptions.dispatch(&publish.topic, &publish.payload);
                if let Err(e) = self
                    .write_packet(&Packet::PubAck(PubAck {
                        packet_id: publish.packet_id,
                    }))
                    .await
                {
                    self.connection_lost(e).await;
                }
            }
            QoS::ExactlyOnce => {
                // Dispatch only the first arrival for this id; duplicates
                // before PUBREL are suppressed.
                if self.qos2_handled.insert(publish.packet_id) {
                    self.subscriptions.dispatch(&publish.topic, &publish.payload);
                }
                if let Err(e) = self
                    .write_packet(&Packet::PubRec(PubRec {
                        packet_id: publish.packet_id,
                    }))
                    .await
                {
                    self.connection_lost(e).await;
                }
            }
        }
    }

    async fn attempt_connect(&mut self) {
        debug!("opening transport");
        match self.connector.open().await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.frame.clear();
                let connect = Connect {
                    keep_alive: *self.options.keep_alive_secs(),
                    client_id: self.options.client_id().clone(),
                    clean_session: *self.options.clean_session(),
                    last_will: self.options.last_will().clone(),
                    login: self.options.login().clone(),
                };
                match self.write_packet(&Packet::Connect(connect)).await {
                    Ok(()) => self.arm_establish_timer(),
                    Err(e) => {
                        debug!(error = %e, "CONNECT send failed");
                        self.enter_reconnect_backoff();
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "transport open failed");
                self.enter_reconnect_backoff();
            }
        }
    }

    /// Transport-level failure while the session should stay alive: reset
    /// the channel, keep in-flight requests for re-send, and schedule a
    /// reconnect attempt.
    async fn connection_lost(&mut self, reason: ConnectionError) {
        if matches!(self.state, State::Disconnecting | State::Disconnected) {
            return;
        }
        let was_connected = self.state == State::Connected;

        if let Some(mut transport) = self.transport.take() {
            transport
                .shutdown(Duration::from_millis(*self.options.shutdown_timeout_ms()))
                .await;
        }
        self.frame.clear();
        self.cancel_ping_timers();
        self.cancel_establish_timer();
        self.tracker.suspend_timers();
        debug!(
            in_flight = self.tracker.in_flight_len(),
            "in-flight requests held for re-send"
        );

        if was_connected {
            warn!(reason = %reason, "connection interrupted");
            if let Some(cb) = self.handlers.on_connection_interrupted.as_mut() {
                cb(&reason);
            }
        }
        self.enter_reconnect_backoff();
    }

    fn enter_reconnect_backoff(&mut self) {
        self.state = State::Reconnecting;
        self.transport = None;

        let delay = Duration::from_millis(self.backoff_current_ms);
        self.backoff_current_ms =
            (self.backoff_current_ms.saturating_mul(2)).min(*self.options.reconnect_max_delay_ms());

        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        let tx = self.timer_tx.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(TimerEvent::Reconnect);
        }));
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
    }

    async fn resend_in_flight(&mut self) {
        for id in self.tracker.in_flight_ids() {
            if self.state != State::Connected {
                return;
            }
            self.transmit_request(id, true).await;
        }
    }

    async fn drain_offline(&mut self) {
        let mut pending_list: VecDeque<PendingRequest> =
            self.tracker.drain_offline().into();
        while let Some(pending) = pending_list.pop_front() {
            if self.state != State::Connected {
                // Transport died mid-drain; everything left waits for the
                // next session, still in order.
                self.tracker.queue_offline(pending);
                continue;
            }

            match &pending.kind {
                RequestKind::Publish {
                    qos: QoS::AtMostOnce,
                    ..
                } => {
                    let packet = Self::encode_request(0, &pending.kind, false);
                    match self.write_packet(&packet).await {
                        Ok(()) => {
                            if let Some(cb) = pending.on_complete {
                                cb(None);
                            }
                        }
                        Err(e) => {
                            self.tracker.queue_offline(pending);
                            self.connection_lost(e).await;
                        }
                    }
                }
                _ => {
                    let id = match self.tracker.allocate_id() {
                        Ok(id) => id,
                        Err(e) => {
                            if let Some(cb) = pending.on_complete {
                                cb(Some(e));
                            }
                            continue;
                        }
                    };
                    self.tracker.insert(OutstandingRequest {
                        id,
                        kind: pending.kind,
                        first_attempt: true,
                        completed: false,
                        timer: None,
                        on_complete: pending.on_complete,
                        tree_txn: pending.tree_txn,
                    });
                    self.transmit_request(id, false).await;
                }
            }
        }
    }

    fn fail_all_requests(&mut self) {
        for request in self.tracker.drain_in_flight() {
            let OutstandingRequest {
                on_complete,
                tree_txn,
                ..
            } = request;
            drop(tree_txn);
            if let Some(cb) = on_complete {
                cb(Some(ConnectionError::Disconnected));
            }
        }
        for pending in self.tracker.drain_offline() {
            let PendingRequest {
                on_complete,
                tree_txn,
                ..
            } = pending;
            drop(tree_txn);
            if let Some(cb) = on_complete {
                cb(Some(ConnectionError::Disconnected));
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ConnectionError> {
        let mut buf = BytesMut::new();
        packet.write(&mut buf)?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };
        trace!(packet_type = ?packet.packet_type(), len = buf.len(), "sending packet");
        transport
            .send(&[IoSlice::new(&buf)])
            .await
            .map_err(ConnectionError::Transport)
    }

    fn arm_request_timer(&self, id: u16) -> tokio::task::JoinHandle<()> {
        let timeout = Duration::from_millis(*self.options.request_timeout_ms());
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            sleep(timeout).await;
            let _ = tx.send(TimerEvent::RequestTimeout(id));
        })
    }

    fn arm_keepalive(&mut self) {
        let secs = *self.options.keep_alive_secs();
        if secs == 0 {
            return;
        }
        if let Some(timer) = self.pingreq_timer.take() {
            timer.abort();
        }
        let tx = self.timer_tx.clone();
        self.pingreq_timer = Some(tokio::spawn(async move {
            sleep(Duration::from_secs(u64::from(secs))).await;
            let _ = tx.send(TimerEvent::PingreqSend);
        }));
    }

    fn arm_pingresp_timer(&mut self) {
        // An earlier PINGREQ may still be outstanding; keep its deadline.
        if self.pingresp_timer.is_some() {
            return;
        }
        let timeout = Duration::from_millis(*self.options.request_timeout_ms());
        let tx = self.timer_tx.clone();
        self.pingresp_timer = Some(tokio::spawn(async move {
            sleep(timeout).await;
            let _ = tx.send(TimerEvent::PingrespRecv);
        }));
    }

    fn arm_establish_timer(&mut self) {
        let timeout_ms = *self.options.connection_establish_timeout_ms();
        if timeout_ms == 0 {
            return;
        }
        if let Some(timer) = self.establish_timer.take() {
            timer.abort();
        }
        let tx = self.timer_tx.clone();
        self.establish_timer = Some(tokio::spawn(async move {
            sleep(Duration::from_millis(timeout_ms)).await;
            let _ = tx.send(TimerEvent::ConnackTimeout);
        }));
    }

    fn cancel_ping_timers(&mut self) {
        if let Some(timer) = self.pingreq_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.pingresp_timer.take() {
            timer.abort();
        }
    }

    fn cancel_establish_timer(&mut self) {
        if let Some(timer) = self.establish_timer.take() {
            timer.abort();
        }
    }

    fn cancel_all_timers(&mut self) {
        self.cancel_ping_timers();
        self.cancel_establish_timer();
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}
