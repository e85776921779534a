//! Pluggable edge transport
//!
//! The offloading layer talks to exactly one transport through the
//! [`EdgeTransport`] trait and never constructs connections itself; a
//! session holds one injected, long-lived transport for its lifetime.
//! Two implementations ship with the crate: a framed TCP transport and
//! an in-memory loopback pair for tests and same-process node pairs.

mod loopback;
mod tcp;

pub use loopback::LoopbackTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::error::Result;
use crate::protocol::TransportMessage;

/// One point-to-point or topic-based delivery channel.
///
/// `open` establishes the transport and hands back the inbound message
/// stream; messages arrive on the transport's own execution context,
/// asynchronously and never before `open` returns. `close` is a release
/// request whose completion is not immediately observable — callers
/// tolerate a short grace period before reusing the same identity.
#[async_trait]
pub trait EdgeTransport: Send + Sync {
    /// Establish the transport: listening roles bind and accept,
    /// connecting roles dial the destination. Returns the inbound
    /// message receiver.
    async fn open(&mut self, config: &EndpointConfig) -> Result<mpsc::Receiver<TransportMessage>>;

    /// Transmit one message. Connection failures surface as errors;
    /// there is no automatic retry — retry policy belongs to the caller.
    async fn send(&self, message: TransportMessage) -> Result<()>;

    /// Release the transport resources.
    async fn close(&mut self) -> Result<()>;
}
