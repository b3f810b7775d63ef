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

pub mod connection;
pub mod connection_error;
pub mod connection_option;
pub mod packet;
pub mod topic_tree;
pub mod transport;

mod frame;
mod request;
mod request_response;

pub use connection::{Connection, EventHandlers};
pub use connection_error::ConnectionError;
pub use connection_option::ConnectionOption;
pub use packet::{ConnectReturnCode, LastWill, Login, QoS};
pub use topic_tree::PublishHandler;
pub use transport::{Connector, TransportError, TransportOps};

/// Callback invoked when a tracked operation (QoS>0 publish, subscribe,
/// unsubscribe) completes. `None` means success; `Some(error)` carries the
/// failure reason.
pub type OperationCallback = Box<dyn FnOnce(Option<ConnectionError>) + Send>;
