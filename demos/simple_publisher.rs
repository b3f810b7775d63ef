/**
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
// Simple MQTT Publisher Example
//
// Usage:
// ```bash
// cargo run --example simple_publisher -- <hostname> <port> <topic> <qos> <payload>
// ```
//
// Example:
// ```bash
// cargo run --example simple_publisher -- localhost 1883 "test/topic" 1 "Hello, MQTT!"
// ```
use std::env;
use std::process;

use mqtt_connection_tokio::mqtt_conn;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let (hostname, port, topic, qos, payload) = if args.len() != 6 {
        eprintln!(
            "Usage: {} <hostname> <port> <topic> <qos> <payload>",
            args[0]
        );
        eprintln!();
        eprintln!("Using default values: 127.0.0.1 1883 t1 1 hello");
        eprintln!();
        (
            "127.0.0.1".to_string(),
            1883u16,
            "t1".to_string(),
            1u8,
            "hello".to_string(),
        )
    } else {
        let hostname = args[1].clone();
        let port: u16 = args[2].parse().unwrap_or_else(|_| {
            eprintln!("Error: Invalid port number '{}'", args[2]);
            process::exit(1);
        });
        let topic = args[3].clone();
        let qos: u8 = args[4].parse().unwrap_or_else(|_| {
            eprintln!("Error: Invalid QoS level '{}'. Must be 0, 1, or 2", args[4]);
            process::exit(1);
        });
        let payload = args[5].clone();
        (hostname, port, topic, qos, payload)
    };

    let qos_level = mqtt_conn::QoS::try_from(qos).unwrap_or_else(|_| {
        eprintln!("Error: Invalid QoS level '{qos}'. Must be 0, 1, or 2");
        process::exit(1);
    });

    println!("Simple MQTT Publisher");
    println!("Broker: {hostname}:{port}");
    println!("Topic: {topic}");
    println!("QoS: {qos_level:?}");
    println!("Payload: {payload}");

    let options = mqtt_conn::ConnectionOption::builder()
        .client_id("rust_publisher")
        .clean_session(true)
        .keep_alive_secs(60u16)
        .build()
        .unwrap();

    let connector = mqtt_conn::transport::TcpConnector::new(format!("{hostname}:{port}"));
    let connection = mqtt_conn::Connection::new(connector, options);

    // The lifecycle callbacks report connection progress over a channel so
    // main can await them.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let connected_tx = event_tx.clone();
    let mut handlers = mqtt_conn::EventHandlers::default();
    handlers.on_connection_complete = Some(Box::new(move |_session_present, code| {
        let _ = connected_tx.send(code == mqtt_conn::ConnectReturnCode::Accepted);
    }));

    println!("Connecting to broker...");
    if let Err(e) = connection.connect(handlers).await {
        eprintln!("Error: Failed to initiate connection: {e}");
        process::exit(1);
    }
    match event_rx.recv().await {
        Some(true) => println!("MQTT connection accepted by broker"),
        _ => {
            eprintln!("Error: Connection refused by broker");
            process::exit(1);
        }
    }

    // Publish and wait for the delivery to complete (immediately for QoS 0,
    // after PUBACK / PUBCOMP otherwise).
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let packet_id = connection
        .publish(
            topic,
            qos_level,
            false,
            payload.into_bytes(),
            Some(Box::new(move |error| {
                let _ = done_tx.send(error.map(|e| e.to_string()));
            })),
        )
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: Failed to publish: {e}");
            process::exit(1);
        });

    match done_rx.recv().await {
        Some(None) => {
            println!("Message published successfully (packet id {packet_id})");
        }
        Some(Some(error)) => {
            eprintln!("Error: Publish failed: {error}");
            process::exit(1);
        }
        None => {
            eprintln!("Error: Connection went away before the publish completed");
            process::exit(1);
        }
    }

    if let Err(e) = connection.disconnect().await {
        eprintln!("Warning: Failed to disconnect cleanly: {e}");
    }

    println!("Publisher finished successfully.");
}
