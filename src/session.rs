//! Edge session
//!
//! Owns one transport handle for its whole lifetime and is the only
//! component that talks to the transport. Inbound messages flow through
//! the receiver returned by `open`, on the transport's own execution
//! context.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::protocol::TransportMessage;
use crate::transport::EdgeTransport;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Idle,
    Open,
    Closed,
}

/// One transport connection and its inbound event stream
pub struct EdgeSession {
    config: EndpointConfig,
    transport: Box<dyn EdgeTransport>,
    phase: SessionPhase,
}

impl EdgeSession {
    /// Wrap an injected transport. Nothing touches the network until
    /// `open` is called.
    pub fn new(config: EndpointConfig, transport: Box<dyn EdgeTransport>) -> Self {
        Self {
            config,
            transport,
            phase: SessionPhase::Idle,
        }
    }

    /// Endpoint configuration of this session
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Effective node id of this session
    pub fn node_id(&self) -> String {
        self.config.node_id()
    }

    /// Establish the transport and return the inbound message stream.
    ///
    /// For connecting roles this dials the destination; connection
    /// failure surfaces as an error here and is not retried.
    pub async fn open(&mut self) -> Result<mpsc::Receiver<TransportMessage>> {
        if self.phase != SessionPhase::Idle {
            return Err(Error::Internal("session already opened".to_string()));
        }
        self.config.validate()?;
        let receiver = self.transport.open(&self.config).await?;
        self.phase = SessionPhase::Open;
        info!(node_id = %self.node_id(), role = ?self.config.role, "Edge session open");
        Ok(receiver)
    }

    /// Transmit one message with attached key/value metadata
    pub async fn send(&self, metadata: HashMap<String, String>, payload: Vec<u8>) -> Result<()> {
        if self.phase != SessionPhase::Open {
            return Err(Error::Connection("session is not open".to_string()));
        }
        self.transport
            .send(TransportMessage::new(metadata, payload))
            .await
    }

    /// Release the transport.
    ///
    /// Transport release is asynchronous on some backends; this waits
    /// the configured grace period so the same identity can be reused
    /// afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Open {
            return Ok(());
        }
        self.transport.close().await?;
        self.phase = SessionPhase::Closed;

        let grace = Duration::from_millis(self.config.close_grace_ms);
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        debug!(node_id = %self.node_id(), "Edge session closed");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
