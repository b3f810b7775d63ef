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

use derive_builder::Builder;
use getset::Getters;

use crate::mqtt_conn::packet::{LastWill, Login};

/// Configuration for an MQTT connection.
///
/// Everything except `client_id` has a default. The will message and
/// credentials can also be changed after construction, up until `connect`,
/// via [`crate::mqtt_conn::Connection::set_will`] and
/// [`crate::mqtt_conn::Connection::set_credentials`].
///
/// # Usage
///
/// ```ignore
/// let options = ConnectionOption::builder()
///     .client_id("sensor-17")
///     .clean_session(false)
///     .keep_alive_secs(30u16)
///     .request_timeout_ms(3000u64)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Builder, Getters)]
#[builder(derive(Debug), pattern = "owned", setter(into), build_fn(validate = "ConnectionOptionBuilder::validate"))]
pub struct ConnectionOption {
    /// Client identifier presented in the CONNECT packet.
    #[getset(get = "pub")]
    client_id: String,

    /// Request that the broker discard any prior session state for this
    /// client id.
    ///
    /// # Default
    /// true
    #[builder(default = "true")]
    #[getset(get = "pub")]
    clean_session: bool,

    /// Keep-alive interval in seconds. When non-zero, a PINGREQ is sent at
    /// this interval and an unanswered ping tears the connection down.
    /// 0 disables keep-alive.
    ///
    /// # Default
    /// 0 (disabled)
    #[builder(default = "0")]
    #[getset(get = "pub")]
    keep_alive_secs: u16,

    /// How long to wait for the acknowledgement of a tracked request before
    /// retransmitting, in milliseconds. Also bounds how long an outstanding
    /// PINGREQ may go unanswered.
    ///
    /// # Default
    /// 3000
    #[builder(default = "3000")]
    #[getset(get = "pub")]
    request_timeout_ms: u64,

    /// First reconnect delay, in milliseconds. Doubles on every consecutive
    /// failed attempt and resets on a successful CONNACK.
    ///
    /// # Default
    /// 1000
    #[builder(default = "1000")]
    #[getset(get = "pub")]
    reconnect_min_delay_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds.
    ///
    /// # Default
    /// 120000 (2 minutes)
    #[builder(default = "120_000")]
    #[getset(get = "pub")]
    reconnect_max_delay_ms: u64,

    /// Maximum time to wait for the CONNACK after the transport opens, in
    /// milliseconds. 0 disables the timeout.
    ///
    /// # Default
    /// 0 (disabled)
    #[builder(default = "0")]
    #[getset(get = "pub")]
    connection_establish_timeout_ms: u64,

    /// Maximum time to wait for graceful transport shutdown, in
    /// milliseconds.
    ///
    /// # Default
    /// 5000
    #[builder(default = "5000")]
    #[getset(get = "pub")]
    shutdown_timeout_ms: u64,

    /// Size of the transport read buffer in bytes.
    ///
    /// # Default
    /// 4096
    #[builder(default = "4096")]
    #[getset(get = "pub")]
    recv_buffer_size: usize,

    /// Will message registered with the broker at connect time.
    ///
    /// # Default
    /// None
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    last_will: Option<LastWill>,

    /// Username/password presented in the CONNECT packet.
    ///
    /// # Default
    /// None
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub")]
    login: Option<Login>,
}

impl ConnectionOption {
    pub fn builder() -> ConnectionOptionBuilder {
        ConnectionOptionBuilder::default()
    }

    pub(crate) fn set_last_will(&mut self, will: Option<LastWill>) {
        self.last_will = will;
    }

    pub(crate) fn set_login(&mut self, login: Option<Login>) {
        self.login = login;
    }
}

impl ConnectionOptionBuilder {
    fn validate(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.reconnect_min_delay_ms, self.reconnect_max_delay_ms) {
            if min > max {
                return Err(format!(
                    "reconnect_min_delay_ms ({min}) exceeds reconnect_max_delay_ms ({max})"
                ));
            }
        }
        if let Some(min) = self.reconnect_min_delay_ms {
            if min == 0 {
                return Err("reconnect_min_delay_ms must be non-zero".into());
            }
        }
        Ok(())
    }
}
