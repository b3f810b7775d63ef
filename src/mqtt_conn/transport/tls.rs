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

use super::{connect_helper, Connector, TransportError, TransportOps};
use std::future::Future;
use std::io::IoSlice;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls;

/// TLS-encrypted TCP transport.
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
}

impl TlsTransport {
    /// Wrap an already established TLS stream.
    pub fn from_stream(stream: TlsStream<TcpStream>) -> Self {
        Self { stream }
    }
}

impl TransportOps for TlsTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            // TLS streams gain nothing from vectored writes; write each
            // buffer in full.
            for buffer in buffers {
                self.stream
                    .write_all(buffer)
                    .await
                    .map_err(TransportError::Io)?;
            }
            self.stream.flush().await.map_err(TransportError::Io)?;
            Ok(())
        })
    }

    fn recv<'a>(
        &'a mut self,
        buffer: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, TransportError>> + Send + 'a>> {
        Box::pin(async move { self.stream.read(buffer).await.map_err(TransportError::Io) })
    }

    fn shutdown<'a>(
        &'a mut self,
        timeout_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let _ = timeout(timeout_duration, self.stream.shutdown()).await;
        })
    }
}

/// [`Connector`] producing [`TlsTransport`]s for an address and server name.
pub struct TlsConnector {
    addr: String,
    domain: String,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    connect_timeout: Option<Duration>,
}

impl TlsConnector {
    /// `domain` is the server name used for certificate verification.
    pub fn new(addr: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            domain: domain.into(),
            tls_config: None,
            connect_timeout: None,
        }
    }

    /// Use a custom TLS configuration instead of the native-roots default.
    pub fn with_tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Connector for TlsConnector {
    fn open(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TransportOps + Send>, TransportError>> + Send + '_>>
    {
        Box::pin(async move {
            let stream = connect_helper::connect_tcp_tls(
                &self.addr,
                &self.domain,
                self.tls_config.clone(),
                self.connect_timeout,
            )
            .await?;
            Ok(Box::new(TlsTransport::from_stream(stream)) as Box<dyn TransportOps + Send>)
        })
    }
}
