//! Application-level wire conventions
//!
//! The underlying transport delivers opaque messages with string
//! key/value metadata attached; this module pins down the metadata
//! fields the offloading layer reads and writes, the service-type
//! vocabulary, and the payload digest convention.

mod messages;

pub use messages::TransportMessage;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ─────────────────────────────────────────────────────────────────
// Metadata Keys
// ─────────────────────────────────────────────────────────────────

/// Metadata keys attached to each transport message
pub mod meta {
    /// Service type discriminator, one of the [`ServiceType`] names
    ///
    /// [`ServiceType`]: super::ServiceType
    pub const SERVICE_TYPE: &str = "service-type";

    /// Registry key / install key
    pub const SERVICE_KEY: &str = "service-key";

    /// Model-install hint: file or model name
    pub const NAME: &str = "name";

    /// Model-install hint: free-form description
    pub const DESCRIPTION: &str = "description";

    /// Model-install hint: activate after install. Truthy only for the
    /// literal value "true", case-insensitive.
    pub const ACTIVATE: &str = "activate";

    /// Optional sha-256 hex digest of the payload
    pub const PAYLOAD_DIGEST: &str = "payload-digest";
}

// ─────────────────────────────────────────────────────────────────
// Service Types
// ─────────────────────────────────────────────────────────────────

/// The five service kinds a message can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Model blob delivered inline
    ModelRaw,
    /// Model indirected through a URI
    ModelUri,
    /// Pipeline description delivered inline
    PipelineRaw,
    /// Pipeline description indirected through a URI
    PipelineUri,
    /// Computed reply forwarded to the observer
    Reply,
}

impl ServiceType {
    /// Wire name of this service type
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ModelRaw => "model_raw",
            ServiceType::ModelUri => "model_uri",
            ServiceType::PipelineRaw => "pipeline_raw",
            ServiceType::PipelineUri => "pipeline_uri",
            ServiceType::Reply => "reply",
        }
    }

    /// Parse a wire name. Unknown names yield `None`; callers treat
    /// that as an ignorable anomaly, never a crash.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model_raw" => Some(ServiceType::ModelRaw),
            "model_uri" => Some(ServiceType::ModelUri),
            "pipeline_raw" => Some(ServiceType::PipelineRaw),
            "pipeline_uri" => Some(ServiceType::PipelineUri),
            "reply" => Some(ServiceType::Reply),
            _ => None,
        }
    }

    /// Whether the payload is a URI to resolve rather than the blob
    pub fn is_indirect(&self) -> bool {
        matches!(self, ServiceType::ModelUri | ServiceType::PipelineUri)
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Payload Digest
// ─────────────────────────────────────────────────────────────────

/// Sha-256 hex digest of a payload, as carried in `payload-digest`
pub fn payload_digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
