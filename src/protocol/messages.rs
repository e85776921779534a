//! Transport message envelope
//!
//! Every message handed to or received from a transport carries string
//! key/value metadata and a binary payload. The envelope serializes as
//! JSON with the payload base64-encoded, which is also the frame body
//! of the TCP transport.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// One message as seen by the offloading layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMessage {
    /// Unique message ID
    pub id: Uuid,

    /// Send timestamp
    pub timestamp: DateTime<Utc>,

    /// Application-level metadata fields
    pub metadata: HashMap<String, String>,

    /// Binary payload
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
}

impl TransportMessage {
    /// Create a new message with a fresh ID and timestamp
    pub fn new(metadata: HashMap<String, String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            metadata,
            payload,
        }
    }

    /// Look up a metadata field
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Serialize to the JSON frame body
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from a JSON frame body
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Base64 (de)serialization of the payload field
mod payload_base64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
