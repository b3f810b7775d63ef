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
// Simple MQTT Subscriber Example
//
// Subscribes to a topic filter and prints every message until interrupted.
// The connection reconnects automatically if the broker drops it.
//
// Usage:
// ```bash
// cargo run --example simple_subscriber -- <hostname> <port> <filter> <qos>
// ```
//
// Example:
// ```bash
// cargo run --example simple_subscriber -- localhost 1883 "sensors/+/temp" 1
// ```
use std::env;
use std::process;

use mqtt_connection_tokio::mqtt_conn;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let (hostname, port, filter, qos) = if args.len() != 5 {
        eprintln!("Usage: {} <hostname> <port> <filter> <qos>", args[0]);
        eprintln!();
        eprintln!("Using default values: 127.0.0.1 1883 t1 1");
        eprintln!();
        ("127.0.0.1".to_string(), 1883u16, "t1".to_string(), 1u8)
    } else {
        let hostname = args[1].clone();
        let port: u16 = args[2].parse().unwrap_or_else(|_| {
            eprintln!("Error: Invalid port number '{}'", args[2]);
            process::exit(1);
        });
        let filter = args[3].clone();
        let qos: u8 = args[4].parse().unwrap_or_else(|_| {
            eprintln!("Error: Invalid QoS level '{}'. Must be 0, 1, or 2", args[4]);
            process::exit(1);
        });
        (hostname, port, filter, qos)
    };

    let qos_level = mqtt_conn::QoS::try_from(qos).unwrap_or_else(|_| {
        eprintln!("Error: Invalid QoS level '{qos}'. Must be 0, 1, or 2");
        process::exit(1);
    });

    println!("Simple MQTT Subscriber");
    println!("Broker: {hostname}:{port}");
    println!("Filter: {filter}");
    println!("QoS: {qos_level:?}");

    let options = mqtt_conn::ConnectionOption::builder()
        .client_id("rust_subscriber")
        .clean_session(true)
        .keep_alive_secs(30u16)
        .build()
        .unwrap();

    let connector = mqtt_conn::transport::TcpConnector::new(format!("{hostname}:{port}"));
    let connection = mqtt_conn::Connection::new(connector, options);

    let mut handlers = mqtt_conn::EventHandlers::default();
    handlers.on_connection_complete = Some(Box::new(|_, code| {
        println!("Connected: {code:?}");
    }));
    handlers.on_connection_interrupted = Some(Box::new(|reason| {
        eprintln!("Connection interrupted: {reason}; reconnecting...");
    }));
    handlers.on_connection_resumed = Some(Box::new(|session_present| {
        println!("Connection resumed (session_present={session_present})");
    }));
    handlers.on_disconnect = Some(Box::new(|_| {
        println!("Disconnected");
    }));

    if let Err(e) = connection.connect(handlers).await {
        eprintln!("Error: Failed to initiate connection: {e}");
        process::exit(1);
    }

    let packet_id = connection
        .subscribe(
            filter,
            qos_level,
            Box::new(|topic, payload| {
                println!("{topic}: {}", String::from_utf8_lossy(payload));
            }),
            Some(Box::new(|error| match error {
                None => println!("Subscription active"),
                Some(e) => eprintln!("Subscribe failed: {e}"),
            })),
        )
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: Failed to subscribe: {e}");
            process::exit(1);
        });
    println!("SUBSCRIBE sent (packet id {packet_id}), waiting for messages. Ctrl-C to quit.");

    tokio::signal::ctrl_c().await.ok();

    println!("Shutting down...");
    if let Err(e) = connection.disconnect().await {
        eprintln!("Warning: Failed to disconnect cleanly: {e}");
    }
}
