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

//! In-flight request tracking.
//!
//! Every acked operation (QoS>0 PUBLISH, SUBSCRIBE, UNSUBSCRIBE, the PUBREL
//! phase of QoS 2) owns a packet id drawn from `1..=65535` and an entry in
//! the in-flight table until its acknowledgement arrives. Operations issued
//! while the connection is down wait in the offline queue and are replayed
//! in FIFO order, each with a freshly allocated id.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::mqtt_conn::connection_error::ConnectionError;
use crate::mqtt_conn::packet::QoS;
use crate::mqtt_conn::topic_tree::Transaction;
use crate::mqtt_conn::OperationCallback;

/// What to put on the wire for a tracked request; retransmission re-encodes
/// from this (with DUP set for a repeated PUBLISH).
pub(crate) enum RequestKind {
    Publish {
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Bytes,
    },
    /// Second phase of an outbound QoS-2 publish, entered on PUBREC.
    PubRel,
    Subscribe {
        filter: String,
        qos: QoS,
    },
    Unsubscribe {
        filter: String,
    },
}

pub(crate) struct OutstandingRequest {
    pub id: u16,
    pub kind: RequestKind,
    /// False once the packet has been on the wire at least once.
    pub first_attempt: bool,
    pub completed: bool,
    pub timer: Option<JoinHandle<()>>,
    pub on_complete: Option<OperationCallback>,
    /// Tree mutation held back until the matching SUBACK/UNSUBACK.
    pub tree_txn: Option<Transaction>,
}

impl OutstandingRequest {
    /// Cancel the retransmit timer. Idempotent; the handle is taken so a
    /// request's timer is aborted exactly once.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// A request parked while the connection is offline.
pub(crate) struct PendingRequest {
    pub kind: RequestKind,
    pub on_complete: Option<OperationCallback>,
    pub tree_txn: Option<Transaction>,
}

#[derive(Default)]
pub(crate) struct RequestTracker {
    in_flight: HashMap<u16, OutstandingRequest>,
    next_id: u16,
    offline: VecDeque<PendingRequest>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            in_flight: HashMap::new(),
            next_id: 1,
            offline: VecDeque::new(),
        }
    }

    /// Hand out the next packet id not tied to an in-flight request,
    /// scanning `1..=65535` with wrap-around. Id 0 is never allocated; it is
    /// reserved for QoS-0 publishes, which bypass the tracker entirely.
    pub fn allocate_id(&mut self) -> Result<u16, ConnectionError> {
        for _ in 0..u16::MAX {
            let id = self.next_id;
            self.next_id = if self.next_id == u16::MAX {
                1
            } else {
                self.next_id + 1
            };
            if !self.in_flight.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(ConnectionError::NoPacketIds)
    }

    pub fn insert(&mut self, request: OutstandingRequest) {
        debug_assert!(request.id != 0);
        debug_assert!(!self.in_flight.contains_key(&request.id));
        self.in_flight.insert(request.id, request);
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut OutstandingRequest> {
        self.in_flight.get_mut(&id)
    }

    /// Complete and release a request. The entry leaves the table, its timer
    /// is cancelled, and the id becomes reusable. A late ack whose id is no
    /// longer live returns `None` and is dropped by the caller.
    pub fn complete(&mut self, id: u16) -> Option<OutstandingRequest> {
        let mut request = self.in_flight.remove(&id)?;
        if request.completed {
            return None;
        }
        request.completed = true;
        request.cancel_timer();
        Some(request)
    }

    /// Cancel every timer and collect the completion callbacks of all
    /// in-flight requests, clearing the table. Used on disconnect to fail
    /// each request exactly once.
    pub fn drain_in_flight(&mut self) -> Vec<OutstandingRequest> {
        let mut requests: Vec<OutstandingRequest> = self.in_flight.drain().map(|(_, r)| r).collect();
        for request in &mut requests {
            request.cancel_timer();
        }
        requests
    }

    /// Stop all retransmit timers but keep the entries, so they can be
    /// re-sent once the session is re-established.
    pub fn suspend_timers(&mut self) {
        for request in self.in_flight.values_mut() {
            request.cancel_timer();
        }
    }

    /// Ids of all in-flight requests, ascending, for deterministic re-send.
    pub fn in_flight_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.in_flight.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn queue_offline(&mut self, request: PendingRequest) {
        self.offline.push_back(request);
    }

    pub fn drain_offline(&mut self) -> Vec<PendingRequest> {
        self.offline.drain(..).collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}
