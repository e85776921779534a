//! In-memory loopback transport
//!
//! A connected pair of transports backed by channels. Used by the test
//! suites and by embedders running sender and receiver in one process.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::protocol::TransportMessage;

use super::EdgeTransport;

const CHANNEL_CAPACITY: usize = 64;

/// One side of an in-memory transport pair
pub struct LoopbackTransport {
    /// Messages sent here arrive at the peer's inbound receiver
    outbound: Mutex<Option<mpsc::Sender<TransportMessage>>>,

    /// Our inbound receiver, handed out by `open`
    inbound: Mutex<Option<mpsc::Receiver<TransportMessage>>>,
}

impl LoopbackTransport {
    /// Create a connected pair
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let a = LoopbackTransport {
            outbound: Mutex::new(Some(b_tx)),
            inbound: Mutex::new(Some(a_rx)),
        };
        let b = LoopbackTransport {
            outbound: Mutex::new(Some(a_tx)),
            inbound: Mutex::new(Some(b_rx)),
        };
        (a, b)
    }
}

#[async_trait]
impl EdgeTransport for LoopbackTransport {
    async fn open(&mut self, _config: &EndpointConfig) -> Result<mpsc::Receiver<TransportMessage>> {
        self.inbound
            .lock()
            .take()
            .ok_or_else(|| Error::Connection("loopback transport already opened".to_string()))
    }

    async fn send(&self, message: TransportMessage) -> Result<()> {
        let tx = self
            .outbound
            .lock()
            .clone()
            .ok_or_else(|| Error::Connection("loopback transport closed".to_string()))?;
        tx.send(message)
            .await
            .map_err(|_| Error::Connection("loopback peer closed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound.lock().take();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
