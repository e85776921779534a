//! Transfer table and writable-root placeholders
//!
//! Table keys are stable tags used symmetrically by sender and receiver
//! to correlate a file with its pipeline role. Values are templated
//! paths or literals carrying at most one occurrence of each
//! placeholder; exactly one entry carries the receiver-side placeholder
//! and names the pipeline slot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Sender-side writable-root placeholder
pub const SENDER_ROOT: &str = "@SENDER@";

/// Receiver-side writable-root placeholder
pub const RECEIVER_ROOT: &str = "@RECEIVER@";

/// Substitute the first occurrence of `placeholder` with `root`.
///
/// Templates without the placeholder come back unchanged, and resolving
/// twice equals resolving once.
pub fn resolve(template: &str, placeholder: &str, root: &Path) -> String {
    template.replacen(placeholder, &root.to_string_lossy(), 1)
}

/// Resolve the sender-side placeholder
pub fn resolve_sender(template: &str, root: &Path) -> String {
    resolve(template, SENDER_ROOT, root)
}

/// Resolve the receiver-side placeholder
pub fn resolve_receiver(template: &str, root: &Path) -> String {
    resolve(template, RECEIVER_ROOT, root)
}

// ─────────────────────────────────────────────────────────────────
// Transfer Table
// ─────────────────────────────────────────────────────────────────

/// Validated transfer table with a deterministic iteration order
#[derive(Debug, Clone)]
pub struct TransferTable {
    entries: BTreeMap<String, String>,
    pipeline_tag: String,
}

impl TransferTable {
    /// Build from the config map.
    ///
    /// Exactly one entry must carry the receiver-side placeholder; that
    /// entry is the pipeline slot the sentinel is sent under.
    pub fn new(transfer_data: &HashMap<String, String>) -> Result<Self> {
        if transfer_data.is_empty() {
            return Err(Error::invalid_parameter("transfer table is empty"));
        }

        let entries: BTreeMap<String, String> = transfer_data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut pipeline_tags: Vec<&String> = entries
            .iter()
            .filter(|(_, v)| v.contains(RECEIVER_ROOT))
            .map(|(k, _)| k)
            .collect();
        let pipeline_tag = match (pipeline_tags.len(), pipeline_tags.pop()) {
            (1, Some(tag)) => tag.clone(),
            (n, _) => {
                return Err(Error::invalid_parameter(format!(
                    "transfer table must contain exactly one {} entry, found {}",
                    RECEIVER_ROOT, n
                )))
            }
        };

        Ok(Self {
            entries,
            pipeline_tag,
        })
    }

    /// Tag of the pipeline slot (the entry carrying `@RECEIVER@`)
    pub fn pipeline_tag(&self) -> &str {
        &self.pipeline_tag
    }

    /// Data entries in tag order, pipeline slot excluded
    pub fn data_entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries
            .iter()
            .filter(move |(tag, _)| **tag != self.pipeline_tag)
    }

    /// Tags the receiver must observe before completion, pipeline
    /// slot excluded
    pub fn expected_tags(&self) -> BTreeSet<String> {
        self.data_entries().map(|(tag, _)| tag.clone()).collect()
    }

    /// Whether a tag exists in the table
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Receiver-side destination for an inbound item: the writable root
    /// joined with the file name of the tag's template. Unknown tags
    /// fall back to the tag itself.
    pub fn receiver_path(&self, tag: &str, root: &Path) -> PathBuf {
        let file_name = self
            .entries
            .get(tag)
            .map(|template| resolve_receiver(template, Path::new("")))
            .and_then(|resolved| {
                Path::new(&resolved)
                    .file_name()
                    .map(|n| n.to_os_string())
            });
        match file_name {
            Some(name) => root.join(name),
            None => root.join(tag),
        }
    }

    /// Number of entries including the pipeline slot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table only holds the pipeline slot
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
