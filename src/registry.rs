//! Service registry
//!
//! In-memory table of exportable services. A sender declares a service
//! with `set_service` and a later `request` call looks the descriptor
//! up here to build the wire metadata. The table is last-write-wins and
//! deliberately not persisted.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{meta, ServiceType};

// ─────────────────────────────────────────────────────────────────
// Service Descriptor
// ─────────────────────────────────────────────────────────────────

/// Structured record describing one exportable service.
///
/// Interchanged as a compact JSON blob, both inside the registry and on
/// the wire as message metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service kind
    #[serde(rename = "service-type")]
    pub service_type: ServiceType,

    /// Registry / install key, unique within one registry
    #[serde(rename = "service-key")]
    pub service_key: String,

    /// Model-install hint: file or model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Model-install hint: free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Model-install hint: activate after install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate: Option<String>,
}

impl ServiceDescriptor {
    /// Create a descriptor with only the required fields
    pub fn new(service_type: ServiceType, service_key: impl Into<String>) -> Self {
        Self {
            service_type,
            service_key: service_key.into(),
            name: None,
            description: None,
            activate: None,
        }
    }

    /// Parse the JSON blob form, rejecting blobs without a usable key
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: ServiceDescriptor = serde_json::from_str(json)?;
        if descriptor.service_key.is_empty() {
            return Err(Error::invalid_parameter("descriptor service-key is empty"));
        }
        Ok(descriptor)
    }

    /// Serialize to the JSON blob form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether the activate hint is truthy. Only the literal value
    /// "true" (case-insensitive) counts.
    pub fn activate_flag(&self) -> bool {
        self.activate
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Build the wire metadata for a request using this descriptor
    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(
            meta::SERVICE_TYPE.to_string(),
            self.service_type.as_str().to_string(),
        );
        metadata.insert(meta::SERVICE_KEY.to_string(), self.service_key.clone());
        if let Some(ref name) = self.name {
            metadata.insert(meta::NAME.to_string(), name.clone());
        }
        if let Some(ref description) = self.description {
            metadata.insert(meta::DESCRIPTION.to_string(), description.clone());
        }
        if let Some(ref activate) = self.activate {
            metadata.insert(meta::ACTIVATE.to_string(), activate.clone());
        }
        metadata
    }
}

// ─────────────────────────────────────────────────────────────────
// Service Registry
// ─────────────────────────────────────────────────────────────────

/// In-memory key → descriptor table. Safe to share between the caller
/// and the dispatch task.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceDescriptor>>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a descriptor. Re-registering a key overwrites
    /// the prior entry.
    pub fn set(&self, key: impl Into<String>, descriptor: ServiceDescriptor) {
        self.services.write().insert(key.into(), descriptor);
    }

    /// Look up a descriptor by key
    pub fn get(&self, key: &str) -> Option<ServiceDescriptor> {
        self.services.read().get(key).cloned()
    }

    /// Remove a descriptor
    pub fn remove(&self, key: &str) -> Option<ServiceDescriptor> {
        self.services.write().remove(key)
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.services.write().clear();
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
