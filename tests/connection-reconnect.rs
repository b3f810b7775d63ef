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

//! Reconnection tests: transport loss, exponential backoff, session
//! resumption with DUP re-sends, and local subscription survival.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use mqtt_connection_tokio::mqtt_conn::packet::{
    ConnAck, ConnectReturnCode, Packet, PubAck, Publish, QoS, SubAck, SubscribeReturnCode,
};
use mqtt_connection_tokio::mqtt_conn::{Connection, ConnectionOption, EventHandlers};
use stub_transport::{stub_pair, StubBroker, StubConnector};

fn options(client_id: &str) -> ConnectionOption {
    ConnectionOption::builder()
        .client_id(client_id)
        .clean_session(false)
        .request_timeout_ms(150u64)
        .reconnect_min_delay_ms(50u64)
        .reconnect_max_delay_ms(400u64)
        .build()
        .unwrap()
}

fn connack(session_present: bool) -> Packet {
    Packet::ConnAck(ConnAck {
        session_present,
        code: ConnectReturnCode::Accepted,
    })
}

async fn establish(connection: &Connection, broker: &StubBroker, handlers: EventHandlers) {
    connection.connect(handlers).await.unwrap();
    broker.wait_for_frames(1).await;
    broker.feed_packet(&connack(false));
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn broker_close_triggers_interrupt_then_resume() {
    common::init_tracing();

    let (first_transport, first_broker) = stub_pair();
    let (second_transport, second_broker) = stub_pair();
    let connector = StubConnector::single(first_transport);

    let connection = Connection::new(connector.clone(), options("re1"));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();
    let complete_tx = event_tx.clone();
    let interrupt_tx = event_tx.clone();
    let resume_tx = event_tx;

    let mut handlers = EventHandlers::default();
    handlers.on_connection_complete = Some(Box::new(move |_, _| {
        let _ = complete_tx.send("complete".into());
    }));
    handlers.on_connection_interrupted = Some(Box::new(move |_| {
        let _ = interrupt_tx.send("interrupted".into());
    }));
    handlers.on_connection_resumed = Some(Box::new(move |session_present| {
        let _ = resume_tx.send(format!("resumed:{session_present}"));
    }));

    connection.connect(handlers).await.unwrap();
    first_broker.wait_for_frames(1).await;
    first_broker.feed_packet(&connack(false));

    let first_event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_event, "complete");

    // Broker drops the connection.
    connector.push(second_transport);
    first_broker.close();

    let second_event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second_event, "interrupted");

    // After backoff the loop reconnects and the second CONNACK resumes.
    second_broker.wait_for_frames(1).await;
    second_broker.feed_packet(&connack(true));

    let third_event = tokio::time::timeout(Duration::from_secs(1), event_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third_event, "resumed:true");
}

#[tokio::test]
async fn backoff_doubles_between_failed_attempts() {
    common::init_tracing();

    // No scripted transports at all: every open fails.
    let connector = StubConnector::new();
    let connection = Connection::new(connector.clone(), options("re-backoff"));

    connection.connect(EventHandlers::default()).await.unwrap();

    // Attempts land at ~0, ~50, ~150, ~350 ms (delays 50, 100, 200).
    tokio::time::sleep(Duration::from_millis(450)).await;
    let opens = connector.open_count();
    assert!(
        (3..=5).contains(&opens),
        "expected backoff-paced attempts, got {opens}"
    );
}

#[tokio::test]
async fn in_flight_publish_is_resent_with_dup_after_reconnect() {
    common::init_tracing();

    let (first_transport, first_broker) = stub_pair();
    let (second_transport, second_broker) = stub_pair();
    let connector = StubConnector::single(first_transport);

    let connection = Connection::new(connector.clone(), options("re-dup"));
    establish(&connection, &first_broker, EventHandlers::default()).await;

    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completions);
    let id = connection
        .publish(
            "stuck/topic",
            QoS::AtLeastOnce,
            false,
            &b"payload"[..],
            Some(Box::new(move |error| {
                sink.lock().unwrap().push(error.is_none());
            })),
        )
        .await
        .unwrap();
    first_broker.wait_for_frames(2).await;

    // Connection dies before the PUBACK arrives.
    connector.push(second_transport);
    first_broker.close();

    // The new session re-sends the same publish with DUP=1 and the same id.
    let frames = second_broker.wait_for_frames(1).await;
    assert!(matches!(frames[0], Packet::Connect(_)));
    second_broker.feed_packet(&connack(true));

    let frames = second_broker.wait_for_frames(2).await;
    match &frames[1] {
        Packet::Publish(publish) => {
            assert_eq!(publish.packet_id, id);
            assert!(publish.dup, "re-send after reconnect must set DUP");
            assert_eq!(publish.topic, "stuck/topic");
        }
        other => panic!("expected re-sent PUBLISH, got {other:?}"),
    }

    // Acking on the new session completes the original operation once.
    second_broker.feed_packet(&Packet::PubAck(PubAck { packet_id: id }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*completions.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn subscriptions_survive_reconnect_locally() {
    common::init_tracing();

    let (first_transport, first_broker) = stub_pair();
    let (second_transport, second_broker) = stub_pair();
    let connector = StubConnector::single(first_transport);

    let connection = Connection::new(connector.clone(), options("re-subs"));
    establish(&connection, &first_broker, EventHandlers::default()).await;

    let topics = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&topics);
    let id = connection
        .subscribe(
            "kept/topic",
            QoS::AtMostOnce,
            Box::new(move |topic, _| {
                sink.lock().unwrap().push(topic.to_string());
            }),
            None,
        )
        .await
        .unwrap();
    first_broker.wait_for_frames(2).await;
    first_broker.feed_packet(&Packet::SubAck(SubAck {
        packet_id: id,
        return_codes: vec![SubscribeReturnCode::Success(QoS::AtMostOnce)],
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    connector.push(second_transport);
    first_broker.close();

    second_broker.wait_for_frames(1).await;
    second_broker.feed_packet(&connack(true));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The broker resumed the session; a publish routed through the new
    // transport still reaches the locally kept subscription.
    second_broker.feed_packet(&Packet::Publish(Publish {
        dup: false,
        qos: QoS::AtMostOnce,
        retain: false,
        topic: "kept/topic".into(),
        packet_id: 0,
        payload: Bytes::from_static(b"still here"),
    }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*topics.lock().unwrap(), vec!["kept/topic".to_string()]);
}

#[tokio::test]
async fn disconnect_stops_reconnect_attempts() {
    common::init_tracing();

    let connector = StubConnector::new();
    let connection = Connection::new(connector.clone(), options("re-stop"));

    connection.connect(EventHandlers::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(connector.open_count() >= 1);

    connection.disconnect().await.unwrap();
    let opens_at_disconnect = connector.open_count();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        connector.open_count(),
        opens_at_disconnect,
        "no further attempts after disconnect"
    );
}
