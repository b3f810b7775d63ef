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

//! # MQTT Connection Tokio
//!
//! An async MQTT v3.1.1 client connection library for Rust with tokio.
//!
//! The crate maintains a single long-lived session with a broker: it frames
//! and parses control packets, tracks in-flight QoS 1/2 operations with
//! timeout-driven retransmission, routes received PUBLISH packets through a
//! wildcard-aware subscription tree, and drives keep-alive pings and
//! automatic reconnection with exponential backoff.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mqtt_connection_tokio::mqtt_conn;
//!
//! let options = mqtt_conn::ConnectionOption::builder()
//!     .client_id("my-client")
//!     .clean_session(true)
//!     .keep_alive_secs(30u16)
//!     .build()?;
//!
//! let connector = mqtt_conn::transport::TcpConnector::new("localhost:1883");
//! let connection = mqtt_conn::Connection::new(connector, options);
//!
//! let mut handlers = mqtt_conn::EventHandlers::default();
//! handlers.on_connection_complete = Some(Box::new(|session_present, code| {
//!     println!("connected: session_present={session_present} code={code:?}");
//! }));
//! connection.connect(handlers).await?;
//!
//! connection
//!     .subscribe(
//!         "sensors/+/temp",
//!         mqtt_conn::packet::QoS::AtLeastOnce,
//!         Box::new(|topic, payload| {
//!             println!("{topic}: {payload:?}");
//!         }),
//!         None,
//!     )
//!     .await?;
//! ```
//!
//! ## Main Components
//!
//! - [`mqtt_conn::connection`]: The connection handle and its event loop
//! - [`mqtt_conn::packet`]: MQTT v3.1.1 packet codec
//! - [`mqtt_conn::topic_tree`]: Wildcard-aware subscription routing
//! - [`mqtt_conn::transport`]: Transport layer (TCP, TLS) and the
//!   `Connector` used for automatic reconnection
//! - [`mqtt_conn::connection_option`]: Connection configuration
//! - [`mqtt_conn::connection_error`]: Error handling

pub mod mqtt_conn;
