/*
 * MIT License
 *
 * Copyright (c) 2025 Takatoshi Kondo
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! QoS 2 exactly-once tests: the outbound PUBLISH/PUBREC/PUBREL/PUBCOMP
//! handshake and inbound duplicate suppression.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use mqtt_connection_tokio::mqtt_conn::packet::{
    ConnAck, ConnectReturnCode, Packet, PubComp, PubRec, PubRel, Publish, QoS, SubAck,
    SubscribeReturnCode,
};
use mqtt_connection_tokio::mqtt_conn::{Connection, ConnectionOption, EventHandlers};
use stub_transport::{stub_pair, StubBroker, StubConnector};

fn options(client_id: &str) -> ConnectionOption {
    ConnectionOption::builder()
        .client_id(client_id)
        .request_timeout_ms(100u64)
        .reconnect_min_delay_ms(50u64)
        .build()
        .unwrap()
}

async fn establish(connection: &Connection, broker: &StubBroker) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handlers = EventHandlers::default();
    handlers.on_connection_complete = Some(Box::new(move |_, _| {
        let _ = tx.send(());
    }));
    connection.connect(handlers).await.unwrap();
    broker.wait_for_frames(1).await;
    broker.feed_packet(&Packet::ConnAck(ConnAck {
        session_present: false,
        code: ConnectReturnCode::Accepted,
    }));
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("CONNACK should complete the connect")
        .unwrap();
}

#[tokio::test]
async fn outbound_qos2_completes_after_full_handshake() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("q2-out"));
    establish(&connection, &broker).await;

    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completions);
    let id = connection
        .publish(
            "exact/topic",
            QoS::ExactlyOnce,
            false,
            &b"once"[..],
            Some(Box::new(move |error| {
                sink.lock().unwrap().push(error.is_none());
            })),
        )
        .await
        .unwrap();

    let frames = broker.wait_for_frames(2).await;
    match &frames[1] {
        Packet::Publish(publish) => {
            assert_eq!(publish.qos, QoS::ExactlyOnce);
            assert_eq!(publish.packet_id, id);
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }

    // PUBREC advances the request to the PUBREL phase; no completion yet.
    broker.feed_packet(&Packet::PubRec(PubRec { packet_id: id }));
    let frames = broker.wait_for_frames(3).await;
    assert!(
        matches!(frames[2], Packet::PubRel(PubRel { packet_id }) if packet_id == id),
        "expected PUBREL, got {:?}",
        frames[2]
    );
    assert!(completions.lock().unwrap().is_empty());

    broker.feed_packet(&Packet::PubComp(PubComp { packet_id: id }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*completions.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn pubrel_is_retransmitted_until_pubcomp() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("q2-rel"));
    establish(&connection, &broker).await;

    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completions);
    let id = connection
        .publish(
            "exact/topic",
            QoS::ExactlyOnce,
            false,
            &b"once"[..],
            Some(Box::new(move |error| {
                sink.lock().unwrap().push(error.is_none());
            })),
        )
        .await
        .unwrap();
    broker.wait_for_frames(2).await;
    broker.feed_packet(&Packet::PubRec(PubRec { packet_id: id }));

    // Withhold PUBCOMP: the request timeout re-sends the PUBREL.
    let frames = broker.wait_for_frames(4).await;
    let pubrels = frames
        .iter()
        .filter(|p| matches!(p, Packet::PubRel(PubRel { packet_id }) if *packet_id == id))
        .count();
    assert!(pubrels >= 2, "PUBREL should be retransmitted, frames: {frames:?}");

    broker.feed_packet(&Packet::PubComp(PubComp { packet_id: id }));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(*completions.lock().unwrap(), vec![true], "single completion");
}

#[tokio::test]
async fn inbound_qos2_is_dispatched_exactly_once() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("q2-in"));
    establish(&connection, &broker).await;

    let topics = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&topics);
    let sub_id = connection
        .subscribe(
            "exact/in",
            QoS::ExactlyOnce,
            Box::new(move |topic, _| {
                sink.lock().unwrap().push(topic.to_string());
            }),
            None,
        )
        .await
        .unwrap();
    broker.wait_for_frames(2).await;
    broker.feed_packet(&Packet::SubAck(SubAck {
        packet_id: sub_id,
        return_codes: vec![SubscribeReturnCode::Success(QoS::ExactlyOnce)],
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let publish = Packet::Publish(Publish {
        dup: false,
        qos: QoS::ExactlyOnce,
        retain: false,
        topic: "exact/in".into(),
        packet_id: 9,
        payload: Bytes::from_static(b"msg"),
    });

    // First delivery dispatches and answers PUBREC.
    broker.feed_packet(&publish);
    let frames = broker.wait_for_frames(3).await;
    assert!(
        frames
            .iter()
            .any(|p| matches!(p, Packet::PubRec(PubRec { packet_id: 9 }))),
        "inbound QoS-2 publish must be PUBRECed, frames: {frames:?}"
    );
    assert_eq!(topics.lock().unwrap().len(), 1);

    // A duplicate before PUBREL is answered but not re-dispatched.
    broker.feed_packet(&publish);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(topics.lock().unwrap().len(), 1, "duplicate suppressed");

    // PUBREL finishes the handshake with PUBCOMP and releases the id.
    broker.feed_packet(&Packet::PubRel(PubRel { packet_id: 9 }));
    let frames = broker.wait_for_frames(5).await;
    assert!(
        frames
            .iter()
            .any(|p| matches!(p, Packet::PubComp(PubComp { packet_id: 9 }))),
        "PUBREL must be answered with PUBCOMP, frames: {frames:?}"
    );

    // The id is free again: a new message may reuse it.
    broker.feed_packet(&Packet::Publish(Publish {
        dup: false,
        qos: QoS::ExactlyOnce,
        retain: false,
        topic: "exact/in".into(),
        packet_id: 9,
        payload: Bytes::from_static(b"next"),
    }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(topics.lock().unwrap().len(), 2);
}
