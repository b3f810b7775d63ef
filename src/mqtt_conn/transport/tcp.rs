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
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Plain TCP transport.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Access the underlying stream, e.g. to set `TCP_NODELAY`.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

impl TransportOps for TcpTransport {
    fn send<'a>(
        &'a mut self,
        buffers: &'a [IoSlice<'a>],
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let total: usize = buffers.iter().map(|b| b.len()).sum();
            let mut written = 0usize;
            let mut start_indices = vec![0usize; buffers.len()];

            // write_vectored may make partial progress; keep going until
            // every buffer is drained.
            while written < total {
                let mut io_slices = Vec::with_capacity(buffers.len());
                for (i, buf) in buffers.iter().enumerate() {
                    if start_indices[i] < buf.len() {
                        io_slices.push(IoSlice::new(&buf[start_indices[i]..]));
                    }
                }

                let n = self
                    .stream
                    .write_vectored(&io_slices)
                    .await
                    .map_err(TransportError::Io)?;
                if n == 0 {
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "write_vectored returned 0 bytes written",
                    )));
                }
                written += n;

                let mut to_skip = n;
                for (i, buf) in buffers.iter().enumerate() {
                    let available = buf.len() - start_indices[i];
                    if available > 0 {
                        let consumed = to_skip.min(available);
                        start_indices[i] += consumed;
                        to_skip -= consumed;
                        if to_skip == 0 {
                            break;
                        }
                    }
                }
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
            // Graceful close if it finishes in time; otherwise the stream is
            // torn down when dropped.
            let _ = timeout(timeout_duration, self.stream.shutdown()).await;
        })
    }
}

/// [`Connector`] producing [`TcpTransport`]s for an address.
pub struct TcpConnector {
    addr: String,
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl Connector for TcpConnector {
    fn open(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn TransportOps + Send>, TransportError>> + Send + '_>>
    {
        Box::pin(async move {
            let stream = connect_helper::connect_tcp(&self.addr, self.connect_timeout).await?;
            Ok(Box::new(TcpTransport::from_stream(stream)) as Box<dyn TransportOps + Send>)
        })
    }
}
