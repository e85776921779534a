//! Configuration for offloading sessions
//!
//! The embedding application supplies a structured configuration object,
//! either as a JSON string (the conventional form) or from a TOML file.
//! Recognized top-level members follow the offloading convention:
//! `node-type` (`sender`/`receiver`), `writable-path`, and a `training`
//! section with `sender-pipeline`, `receiver-pipeline` and
//! `transfer-data`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Endpoint Configuration
// ─────────────────────────────────────────────────────────────────

/// Underlying connection kind of the edge transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Direct point-to-point TCP
    Tcp,
    /// TCP with broker-assisted discovery
    Hybrid,
    /// MQTT-style topic delivery
    Mqtt,
    /// AITT-style topic delivery
    Aitt,
}

impl Default for ConnectionKind {
    fn default() -> Self {
        ConnectionKind::Tcp
    }
}

/// Role of this endpoint within the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointRole {
    /// Pushes messages to subscribers
    Publisher,
    /// Listens for published messages
    Subscriber,
    /// Issues requests to a query server
    QueryClient,
    /// Answers requests from query clients
    QueryServer,
}

impl EndpointRole {
    /// Whether this role listens for an inbound connection
    pub fn is_listening(&self) -> bool {
        matches!(self, EndpointRole::Subscriber | EndpointRole::QueryServer)
    }

    /// Whether this role actively connects to the destination
    pub fn is_connecting(&self) -> bool {
        !self.is_listening()
    }
}

impl Default for EndpointRole {
    fn default() -> Self {
        EndpointRole::QueryClient
    }
}

/// Transport endpoint configuration. Immutable once the session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Local bind host
    pub local_host: String,

    /// Local bind port (0 = OS-assigned, listening roles only)
    pub local_port: u16,

    /// Destination host (connecting roles)
    pub dest_host: String,

    /// Destination port (connecting roles)
    pub dest_port: u16,

    /// Topic for broker-based connection kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Connection kind
    pub connection: ConnectionKind,

    /// Role of this endpoint
    pub role: EndpointRole,

    /// Node identifier (defaults to the host name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Grace period after close before transport resources may be
    /// considered released, in milliseconds
    pub close_grace_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            local_host: "0.0.0.0".to_string(),
            local_port: 0,
            dest_host: "127.0.0.1".to_string(),
            dest_port: 0,
            topic: None,
            connection: ConnectionKind::default(),
            role: EndpointRole::default(),
            node_id: None,
            connect_timeout_ms: 10_000,
            close_grace_ms: 200,
        }
    }
}

impl EndpointConfig {
    /// Effective node id: the configured one, or the host name
    pub fn node_id(&self) -> String {
        if let Some(ref id) = self.node_id {
            return id.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| format!("edge-{}", Uuid::new_v4()))
    }

    /// Validate the endpoint before a session is opened
    pub fn validate(&self) -> Result<()> {
        if self.role.is_connecting() {
            if self.dest_host.is_empty() {
                return Err(Error::config("dest_host must be set for connecting roles"));
            }
            if self.dest_port == 0 {
                return Err(Error::config("dest_port must be set for connecting roles"));
            }
        }
        if matches!(self.connection, ConnectionKind::Mqtt | ConnectionKind::Aitt)
            && self.topic.is_none()
        {
            return Err(Error::config("topic is required for broker connection kinds"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Offloading Configuration
// ─────────────────────────────────────────────────────────────────

/// Training role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Owns the data and configuration; drives the handshake
    Sender,
    /// Owns the compute; waits for the handshake to complete
    Receiver,
}

/// Training-mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Pipeline template launched by the sender after all transfers
    /// complete. May contain the `@SENDER@` placeholder.
    #[serde(rename = "sender-pipeline", skip_serializing_if = "Option::is_none")]
    pub sender_pipeline: Option<String>,

    /// Pipeline template transmitted to the receiver as the final
    /// transfer (the completion sentinel). May contain `@SENDER@`
    /// (resolved by the sender before sending) and `@RECEIVER@`
    /// (resolved by the receiver before launch).
    #[serde(rename = "receiver-pipeline", skip_serializing_if = "Option::is_none")]
    pub receiver_pipeline: Option<String>,

    /// Transfer table: stable tag → templated path or literal
    #[serde(rename = "transfer-data")]
    pub transfer_data: HashMap<String, String>,

    /// How long the receiver waits for all transfers and the sentinel
    #[serde(rename = "completion-timeout-ms")]
    pub completion_timeout_ms: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            sender_pipeline: None,
            receiver_pipeline: None,
            transfer_data: HashMap::new(),
            completion_timeout_ms: 10_000,
        }
    }
}

/// Top-level offloading session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Transport endpoint
    pub endpoint: EndpointConfig,

    /// Training role; absent means plain offloading mode
    #[serde(rename = "node-type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,

    /// Directory under which sent and received files are resolved.
    /// Supports `~` expansion.
    #[serde(rename = "writable-path", skip_serializing_if = "Option::is_none")]
    pub writable_path: Option<String>,

    /// Training-mode settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingSettings>,
}

impl OffloadConfig {
    /// Parse from the conventional JSON object form
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: OffloadConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let config: OffloadConfig = toml::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded offloading configuration");
        Ok(config)
    }

    /// Whether this session runs the training protocol
    pub fn is_training(&self) -> bool {
        self.node_type.is_some()
    }

    /// Expanded writable root path, if configured
    pub fn writable_root(&self) -> Option<PathBuf> {
        self.writable_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }

    /// Validate field consistency. Does not touch the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;

        if let Some(node_type) = self.node_type {
            let training = self
                .training
                .as_ref()
                .ok_or_else(|| Error::config("node-type set without a training section"))?;
            if training.transfer_data.is_empty() {
                return Err(Error::config("training.transfer-data must not be empty"));
            }
            if node_type == NodeType::Sender {
                if training.sender_pipeline.is_none() {
                    return Err(Error::config(
                        "training.sender-pipeline is required for sender nodes",
                    ));
                }
                if training.receiver_pipeline.is_none() {
                    return Err(Error::config(
                        "training.receiver-pipeline is required for sender nodes",
                    ));
                }
            }
            if training.completion_timeout_ms == 0 {
                return Err(Error::config("training.completion-timeout-ms must be > 0"));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Writable Root Validation
// ─────────────────────────────────────────────────────────────────

/// Verify that `root` is an existing directory the process can write to.
///
/// Probes with a throwaway file; directory permission bits alone are not
/// reliable across platforms.
pub fn validate_writable_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(Error::PathNotWritable {
            path: root.to_path_buf(),
        });
    }
    let probe = root.join(format!(".edgecast-probe-{}", Uuid::new_v4()));
    match fs::write(&probe, b"probe") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            Ok(())
        }
        Err(_) => Err(Error::PathNotWritable {
            path: root.to_path_buf(),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
