//! Point-to-point TCP transport
//!
//! Length-prefixed JSON framing over a single peer connection.
//!
//! Wire format:  [4-byte big-endian length][JSON envelope]
//!
//! Listening roles bind the local endpoint and adopt one peer at a
//! time; connecting roles dial the destination with a bounded timeout.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EndpointConfig;
use crate::error::{Error, Result};
use crate::protocol::TransportMessage;

use super::EdgeTransport;

/// Hard cap on one frame; larger frames are refused
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const CHANNEL_CAPACITY: usize = 64;

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// Framed TCP transport for one point-to-point peer
pub struct TcpTransport {
    writer: SharedWriter,
    tasks: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Create an unopened transport
    pub fn new() -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
            tasks: Vec::new(),
            local_addr: None,
        }
    }

    /// Bound listen address, once a listening role has opened
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn open_listener(
        &mut self,
        config: &EndpointConfig,
        event_tx: mpsc::Sender<TransportMessage>,
    ) -> Result<()> {
        let bind_addr = format!("{}:{}", config.local_host, config.local_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| Error::Connection(format!("bind {} failed: {}", bind_addr, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Connection(e.to_string()))?;
        self.local_addr = Some(addr);
        info!(addr = %addr, "Edge transport listening");

        let writer = Arc::clone(&self.writer);
        let accept_task = tokio::spawn(async move {
            accept_loop(listener, writer, event_tx).await;
        });
        self.tasks.push(accept_task);
        Ok(())
    }

    async fn open_connector(
        &mut self,
        config: &EndpointConfig,
        event_tx: mpsc::Sender<TransportMessage>,
    ) -> Result<()> {
        let dest = format!("{}:{}", config.dest_host, config.dest_port);
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&dest))
            .await
            .map_err(|_| Error::Connection(format!("connect to {} timed out", dest)))?
            .map_err(|e| Error::Connection(format!("connect to {} failed: {}", dest, e)))?;
        info!(dest = %dest, "Edge transport connected");

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let writer = Arc::clone(&self.writer);
        let read_task = tokio::spawn(async move {
            read_loop(read_half, event_tx).await;
            writer.lock().await.take();
        });
        self.tasks.push(read_task);
        Ok(())
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EdgeTransport for TcpTransport {
    async fn open(&mut self, config: &EndpointConfig) -> Result<mpsc::Receiver<TransportMessage>> {
        if !self.tasks.is_empty() {
            return Err(Error::Connection("transport already opened".to_string()));
        }
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        if config.role.is_listening() {
            self.open_listener(config, event_tx).await?;
        } else {
            self.open_connector(config, event_tx).await?;
        }
        Ok(event_rx)
    }

    async fn send(&self, message: TransportMessage) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::Connection("no connected peer".to_string()))?;
        if let Err(e) = write_frame(writer, &message).await {
            // A failed write leaves the connection in an unknown state.
            guard.take();
            return Err(e);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Edge transport closed");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection Loops
// ─────────────────────────────────────────────────────────────────

/// Accept peers one at a time; a new peer replaces a departed one
async fn accept_loop(
    listener: TcpListener,
    writer: SharedWriter,
    event_tx: mpsc::Sender<TransportMessage>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if writer.lock().await.is_some() {
                    warn!(peer_addr = %peer_addr, "Peer slot occupied, rejecting");
                    drop(stream);
                    continue;
                }
                debug!(peer_addr = %peer_addr, "Peer connected");

                let (read_half, write_half) = stream.into_split();
                *writer.lock().await = Some(write_half);

                let writer = Arc::clone(&writer);
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    read_loop(read_half, event_tx).await;
                    writer.lock().await.take();
                    debug!("Peer departed, slot freed");
                });
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Forward inbound frames until EOF or error
async fn read_loop(mut read_half: OwnedReadHalf, event_tx: mpsc::Sender<TransportMessage>) {
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(message)) => {
                if event_tx.send(message).await.is_err() {
                    debug!("Inbound receiver dropped, stopping read loop");
                    return;
                }
            }
            Ok(None) => {
                debug!("Peer closed the connection");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Read failed, dropping connection");
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────────────

/// Read one frame. `None` means a clean EOF at a frame boundary.
async fn read_frame(read_half: &mut OwnedReadHalf) -> Result<Option<TransportMessage>> {
    let mut len_bytes = [0u8; 4];
    match read_half.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Connection(e.to_string())),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(Error::FrameTooLarge {
            size: len,
            cap: MAX_FRAME_BYTES,
        });
    }

    let mut body = vec![0u8; len];
    read_half
        .read_exact(&mut body)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    Ok(Some(TransportMessage::from_json(&body)?))
}

/// Write one frame
async fn write_frame(write_half: &mut OwnedWriteHalf, message: &TransportMessage) -> Result<()> {
    let body = message.to_json()?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(Error::FrameTooLarge {
            size: body.len(),
            cap: MAX_FRAME_BYTES,
        });
    }

    write_half
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    write_half
        .write_all(&body)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    write_half
        .flush()
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointRole;
    use std::collections::HashMap;

    fn server_config() -> EndpointConfig {
        EndpointConfig {
            local_host: "127.0.0.1".to_string(),
            local_port: 0,
            role: EndpointRole::QueryServer,
            ..Default::default()
        }
    }

    fn client_config(addr: SocketAddr) -> EndpointConfig {
        EndpointConfig {
            dest_host: addr.ip().to_string(),
            dest_port: addr.port(),
            role: EndpointRole::QueryClient,
            connect_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    fn message(payload: &[u8]) -> TransportMessage {
        TransportMessage::new(HashMap::new(), payload.to_vec())
    }

    #[tokio::test]
    async fn test_client_to_server_delivery() {
        let mut server = TcpTransport::new();
        let mut server_rx = server.open(&server_config()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpTransport::new();
        let _client_rx = client.open(&client_config(addr)).await.unwrap();

        client.send(message(b"offload")).await.unwrap();
        let got = server_rx.recv().await.unwrap();
        assert_eq!(got.payload, b"offload");

        client.close().await.unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_to_client_delivery() {
        let mut server = TcpTransport::new();
        let _server_rx = server.open(&server_config()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpTransport::new();
        let mut client_rx = client.open(&client_config(addr)).await.unwrap();

        // The server can only write once the peer has attached; sending
        // from the client first guarantees that.
        client.send(message(b"hello")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.send(message(b"reply")).await.unwrap();
        let got = client_rx.recv().await.unwrap();
        assert_eq!(got.payload, b"reply");

        client.close().await.unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_surfaces_error() {
        let config = EndpointConfig {
            dest_host: "127.0.0.1".to_string(),
            // Reserved port, nothing listens here.
            dest_port: 1,
            role: EndpointRole::QueryClient,
            connect_timeout_ms: 500,
            ..Default::default()
        };
        let mut client = TcpTransport::new();
        assert!(client.open(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_send_without_peer_fails() {
        let mut server = TcpTransport::new();
        let _rx = server.open(&server_config()).await.unwrap();
        let result = server.send(message(b"x")).await;
        assert!(result.is_err());
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_refused() {
        let msg = message(&vec![0u8; MAX_FRAME_BYTES]);
        // Base64 expansion pushes the JSON body over the cap.
        let mut server = TcpTransport::new();
        let _server_rx = server.open(&server_config()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpTransport::new();
        let _client_rx = client.open(&client_config(addr)).await.unwrap();

        let result = client.send(msg).await;
        assert!(matches!(result, Err(Error::FrameTooLarge { .. })));

        client.close().await.unwrap();
        server.close().await.unwrap();
    }
}
