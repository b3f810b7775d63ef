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

//! Subscription tests: SUBSCRIBE/SUBACK sequencing, wildcard dispatch of
//! received publishes, transactional commit/rollback, and unsubscribe.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use mqtt_connection_tokio::mqtt_conn::packet::{
    ConnAck, ConnectReturnCode, Packet, PubAck, Publish, QoS, SubAck, SubscribeReturnCode,
    UnsubAck,
};
use mqtt_connection_tokio::mqtt_conn::{
    Connection, ConnectionError, ConnectionOption, EventHandlers, PublishHandler,
};
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

fn topic_recorder() -> (Arc<Mutex<Vec<String>>>, PublishHandler) {
    let topics = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&topics);
    let handler: PublishHandler = Box::new(move |topic, _payload| {
        sink.lock().unwrap().push(topic.to_string());
    });
    (topics, handler)
}

fn inbound_publish(topic: &str, qos: QoS, packet_id: u16) -> Packet {
    Packet::Publish(Publish {
        dup: false,
        qos,
        retain: false,
        topic: topic.into(),
        packet_id,
        payload: Bytes::from_static(b"payload"),
    })
}

fn suback_success(packet_id: u16, qos: QoS) -> Packet {
    Packet::SubAck(SubAck {
        packet_id,
        return_codes: vec![SubscribeReturnCode::Success(qos)],
    })
}

#[tokio::test]
async fn single_level_wildcard_dispatch() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-plus"));
    establish(&connection, &broker).await;

    let (topics, handler) = topic_recorder();
    let id = connection
        .subscribe("sensors/+/temp", QoS::AtLeastOnce, handler, None)
        .await
        .unwrap();

    let frames = broker.wait_for_frames(2).await;
    match &frames[1] {
        Packet::Subscribe(subscribe) => {
            assert_eq!(subscribe.packet_id, id);
            assert_eq!(subscribe.filters.len(), 1);
            assert_eq!(subscribe.filters[0].filter, "sensors/+/temp");
            assert_eq!(subscribe.filters[0].qos, QoS::AtLeastOnce);
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    }
    broker.feed_packet(&suback_success(id, QoS::AtLeastOnce));
    tokio::time::sleep(Duration::from_millis(50)).await;

    broker.feed_packet(&inbound_publish("sensors/5/temp", QoS::AtMostOnce, 0));
    broker.feed_packet(&inbound_publish("sensors/5/humid", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*topics.lock().unwrap(), vec!["sensors/5/temp".to_string()]);
}

#[tokio::test]
async fn multi_level_wildcard_dispatch() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-hash"));
    establish(&connection, &broker).await;

    let (topics, handler) = topic_recorder();
    let id = connection
        .subscribe("a/#", QoS::AtMostOnce, handler, None)
        .await
        .unwrap();
    broker.wait_for_frames(2).await;
    broker.feed_packet(&suback_success(id, QoS::AtMostOnce));
    tokio::time::sleep(Duration::from_millis(50)).await;

    for topic in ["a", "a/b", "a/b/c", "b"] {
        broker.feed_packet(&inbound_publish(topic, QoS::AtMostOnce, 0));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        *topics.lock().unwrap(),
        vec!["a".to_string(), "a/b".to_string(), "a/b/c".to_string()]
    );
}

#[tokio::test]
async fn subscription_is_not_live_until_suback() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-txn"));
    establish(&connection, &broker).await;

    let (topics, handler) = topic_recorder();
    let id = connection
        .subscribe("pending/topic", QoS::AtMostOnce, handler, None)
        .await
        .unwrap();
    broker.wait_for_frames(2).await;

    // Before the SUBACK the staged insert is not visible to dispatch.
    broker.feed_packet(&inbound_publish("pending/topic", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(topics.lock().unwrap().is_empty());

    broker.feed_packet(&suback_success(id, QoS::AtMostOnce));
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.feed_packet(&inbound_publish("pending/topic", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*topics.lock().unwrap(), vec!["pending/topic".to_string()]);
}

#[tokio::test]
async fn suback_failure_rolls_the_subscription_back() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-fail"));
    establish(&connection, &broker).await;

    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completions);
    let (topics, handler) = topic_recorder();
    let id = connection
        .subscribe(
            "denied/topic",
            QoS::AtLeastOnce,
            handler,
            Some(Box::new(move |error| {
                sink.lock().unwrap().push(error.map(|e| format!("{e}")));
            })),
        )
        .await
        .unwrap();
    broker.wait_for_frames(2).await;

    broker.feed_packet(&Packet::SubAck(SubAck {
        packet_id: id,
        return_codes: vec![SubscribeReturnCode::Failure],
    }));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        *completions.lock().unwrap(),
        vec![Some("Subscription refused by broker".to_string())]
    );

    broker.feed_packet(&inbound_publish("denied/topic", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(topics.lock().unwrap().is_empty(), "rolled back, no dispatch");
}

#[tokio::test]
async fn unsubscribe_removes_dispatch_on_unsuback() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("unsub"));
    establish(&connection, &broker).await;

    let (topics, handler) = topic_recorder();
    let sub_id = connection
        .subscribe("gone/soon", QoS::AtMostOnce, handler, None)
        .await
        .unwrap();
    broker.wait_for_frames(2).await;
    broker.feed_packet(&suback_success(sub_id, QoS::AtMostOnce));
    tokio::time::sleep(Duration::from_millis(50)).await;

    broker.feed_packet(&inbound_publish("gone/soon", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(topics.lock().unwrap().len(), 1);

    let unsub_id = connection.unsubscribe("gone/soon", None).await.unwrap();
    let frames = broker.wait_for_frames(3).await;
    match &frames[2] {
        Packet::Unsubscribe(unsubscribe) => {
            assert_eq!(unsubscribe.packet_id, unsub_id);
            assert_eq!(unsubscribe.filters, vec!["gone/soon".to_string()]);
        }
        other => panic!("expected UNSUBSCRIBE, got {other:?}"),
    }
    broker.feed_packet(&Packet::UnsubAck(UnsubAck {
        packet_id: unsub_id,
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    broker.feed_packet(&inbound_publish("gone/soon", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(topics.lock().unwrap().len(), 1, "no dispatch after unsubscribe");
}

#[tokio::test]
async fn invalid_filter_is_rejected_synchronously() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-bad"));
    establish(&connection, &broker).await;

    let (_, handler) = topic_recorder();
    let result = connection
        .subscribe("a/#/b", QoS::AtMostOnce, handler, None)
        .await;
    assert!(matches!(result, Err(ConnectionError::ProtocolError)));
}

#[tokio::test]
async fn inbound_qos1_publish_is_acked() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-ack"));
    establish(&connection, &broker).await;

    let (topics, handler) = topic_recorder();
    let id = connection
        .subscribe("acked/topic", QoS::AtLeastOnce, handler, None)
        .await
        .unwrap();
    broker.wait_for_frames(2).await;
    broker.feed_packet(&suback_success(id, QoS::AtLeastOnce));
    tokio::time::sleep(Duration::from_millis(50)).await;

    broker.feed_packet(&inbound_publish("acked/topic", QoS::AtLeastOnce, 77));
    let frames = broker.wait_for_frames(3).await;
    assert!(
        frames
            .iter()
            .any(|p| matches!(p, Packet::PubAck(PubAck { packet_id: 77 }))),
        "inbound QoS-1 publish must be PUBACKed, frames: {frames:?}"
    );
    assert_eq!(*topics.lock().unwrap(), vec!["acked/topic".to_string()]);
}

#[tokio::test]
async fn offline_subscribe_is_queued_until_connected() {
    common::init_tracing();

    let (transport, broker) = stub_pair();
    let connection = Connection::new(StubConnector::single(transport), options("sub-offline"));

    let (topics, handler) = topic_recorder();
    let queued_id = connection
        .subscribe("later/topic", QoS::AtMostOnce, handler, None)
        .await
        .unwrap();
    assert_eq!(queued_id, 0, "offline subscribe reports id 0");

    establish(&connection, &broker).await;

    let frames = broker.wait_for_frames(2).await;
    let live_id = match &frames[1] {
        Packet::Subscribe(subscribe) => {
            assert_eq!(subscribe.filters[0].filter, "later/topic");
            subscribe.packet_id
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };
    assert!(live_id >= 1, "drained subscribe gets a fresh id");

    broker.feed_packet(&suback_success(live_id, QoS::AtMostOnce));
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.feed_packet(&inbound_publish("later/topic", QoS::AtMostOnce, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*topics.lock().unwrap(), vec!["later/topic".to_string()]);
}
