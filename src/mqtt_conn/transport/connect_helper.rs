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

//! Helper functions for establishing connected streams.
//!
//! These produce streams ready to hand to a transport's `from_stream`
//! constructor, taking care of the multi-step handshakes for TLS.

use super::TransportError;
use tokio::net::TcpStream;
use tokio::time::Duration;

#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use tokio_rustls::{client::TlsStream, rustls, TlsConnector};

/// Establish a TCP connection to `addr` (e.g. `"broker.local:1883"`),
/// optionally bounded by `timeout`.
pub async fn connect_tcp(
    addr: &str,
    timeout: Option<Duration>,
) -> Result<TcpStream, TransportError> {
    match timeout {
        Some(timeout_duration) => {
            tokio::time::timeout(timeout_duration, TcpStream::connect(addr))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(TransportError::Io)
        }
        None => TcpStream::connect(addr).await.map_err(TransportError::Io),
    }
}

/// Establish a TCP connection followed by a TLS handshake.
///
/// `domain` is the server name presented for certificate verification. When
/// `tls_config` is `None`, a default `ClientConfig` is built from the
/// platform's native root certificates.
#[cfg(feature = "tls")]
pub async fn connect_tcp_tls(
    addr: &str,
    domain: &str,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    timeout: Option<Duration>,
) -> Result<TlsStream<TcpStream>, TransportError> {
    let tcp_stream = connect_tcp(addr, timeout).await?;

    let tls_config = tls_config.unwrap_or_else(default_client_config);

    let connector = TlsConnector::from(tls_config);
    let server_name =
        rustls::ServerName::try_from(domain).map_err(|e| TransportError::Tls(Box::new(e)))?;

    match timeout {
        Some(timeout_duration) => {
            tokio::time::timeout(timeout_duration, connector.connect(server_name, tcp_stream))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::Tls(Box::new(e)))
        }
        None => connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| TransportError::Tls(Box::new(e))),
    }
}

#[cfg(feature = "tls")]
fn default_client_config() -> Arc<rustls::ClientConfig> {
    use rustls::RootCertStore;
    let mut root_store = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
        let _ = root_store.add(&rustls::Certificate(cert.0));
    }
    Arc::new(
        rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}
