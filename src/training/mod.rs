//! Training handshake state
//!
//! The sender pushes every transfer-table file and finishes with a
//! pipeline description that doubles as the completion sentinel. The
//! receiver's dispatch path records arrivals here; `wait_for_completion`
//! blocks the receiver's start sequence until the sentinel and every
//! data tag have been observed, or the configured budget elapses.
//!
//! Arrival signaling is a notification raced against a deadline, so the
//! waiter wakes exactly when the dispatch path records the final piece
//! instead of polling on a fixed interval.

pub mod transfer;

pub use transfer::{resolve_receiver, resolve_sender, TransferTable, RECEIVER_ROOT, SENDER_ROOT};

use std::collections::BTreeSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::{NodeType, TrainingSettings};
use crate::error::{Error, Result};
use crate::pipeline::PipelineHandle;

/// Handshake progress shared between the caller and the dispatch task
#[derive(Debug, Default)]
struct Progress {
    received_tags: BTreeSet<String>,
    sentinel: Option<String>,
}

/// Per-session training state
pub struct TrainingState {
    role: NodeType,
    table: TransferTable,
    sender_pipeline: Option<String>,
    receiver_pipeline: Option<String>,
    completion_timeout: Duration,
    progress: Mutex<Progress>,
    arrival: Notify,
    pipeline: Mutex<Option<Box<dyn PipelineHandle>>>,
}

impl TrainingState {
    /// Build from the validated training section of the configuration
    pub fn new(role: NodeType, settings: &TrainingSettings) -> Result<Self> {
        let table = TransferTable::new(&settings.transfer_data)?;
        Ok(Self {
            role,
            table,
            sender_pipeline: settings.sender_pipeline.clone(),
            receiver_pipeline: settings.receiver_pipeline.clone(),
            completion_timeout: Duration::from_millis(settings.completion_timeout_ms),
            progress: Mutex::new(Progress::default()),
            arrival: Notify::new(),
            pipeline: Mutex::new(None),
        })
    }

    /// Training role of this node
    pub fn role(&self) -> NodeType {
        self.role
    }

    /// The validated transfer table
    pub fn table(&self) -> &TransferTable {
        &self.table
    }

    /// Pipeline template this node launches locally
    pub fn sender_pipeline(&self) -> Option<&str> {
        self.sender_pipeline.as_deref()
    }

    /// Pipeline template pushed to the receiver as the sentinel
    pub fn receiver_pipeline(&self) -> Option<&str> {
        self.receiver_pipeline.as_deref()
    }

    // ─────────────────────────────────────────────────────────────
    // Arrival Recording (dispatch side)
    // ─────────────────────────────────────────────────────────────

    /// Whether a data transfer may still be accepted. Items arriving
    /// after the sentinel are dropped.
    pub fn accept_transfer(&self, tag: &str) -> bool {
        let progress = self.progress.lock();
        if progress.sentinel.is_some() {
            warn!(tag = %tag, "Transfer item arrived after the sentinel, dropping");
            return false;
        }
        true
    }

    /// Record a persisted data transfer and wake any completion waiter
    pub fn record_transfer(&self, tag: &str) {
        self.progress.lock().received_tags.insert(tag.to_string());
        debug!(tag = %tag, "Transfer item recorded");
        self.arrival.notify_waiters();
    }

    /// Record the sentinel pipeline description. The first arrival
    /// wins; a duplicate is dropped.
    pub fn record_sentinel(&self, description: String) -> bool {
        {
            let mut progress = self.progress.lock();
            if progress.sentinel.is_some() {
                warn!("Duplicate sentinel, dropping");
                return false;
            }
            progress.sentinel = Some(description);
        }
        debug!("Sentinel recorded");
        self.arrival.notify_waiters();
        true
    }

    /// Whether the sentinel has arrived
    pub fn sentinel_received(&self) -> bool {
        self.progress.lock().sentinel.is_some()
    }

    /// Sentinel present and every data tag observed
    pub fn is_complete(&self) -> bool {
        self.completed_sentinel().is_some()
    }

    fn completed_sentinel(&self) -> Option<String> {
        let progress = self.progress.lock();
        progress.sentinel.as_ref()?;
        let all_received = self
            .table
            .expected_tags()
            .iter()
            .all(|tag| progress.received_tags.contains(tag));
        if all_received {
            progress.sentinel.clone()
        } else {
            None
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Completion Wait (caller side)
    // ─────────────────────────────────────────────────────────────

    /// Block until the handshake completes, returning the sentinel
    /// pipeline description.
    ///
    /// Fails with a timeout once the configured budget elapses. The
    /// sentinel alone is not enough; every data tag must have arrived.
    pub async fn wait_for_completion(&self) -> Result<String> {
        let waited_ms = self.completion_timeout.as_millis() as u64;
        let deadline = tokio::time::Instant::now() + self.completion_timeout;

        loop {
            let notified = self.arrival.notified();
            tokio::pin!(notified);
            // Register the waiter before checking, so an arrival landing
            // between the check and the await still wakes us.
            notified.as_mut().enable();

            if let Some(description) = self.completed_sentinel() {
                return Ok(description);
            }

            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or(Error::CompletionTimeout { waited_ms })?;
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Err(Error::CompletionTimeout { waited_ms });
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Pipeline Slot
    // ─────────────────────────────────────────────────────────────

    /// Take ownership of the launched pipeline
    pub fn attach_pipeline(&self, handle: Box<dyn PipelineHandle>) {
        *self.pipeline.lock() = Some(handle);
    }

    /// Whether a pipeline is attached and running
    pub fn pipeline_running(&self) -> bool {
        self.pipeline
            .lock()
            .as_ref()
            .map(|p| p.is_running())
            .unwrap_or(false)
    }

    /// Stop the owned pipeline if one is running
    pub fn stop_pipeline(&self) -> Result<()> {
        if let Some(pipeline) = self.pipeline.lock().as_mut() {
            pipeline.stop()?;
        }
        Ok(())
    }

    /// Stop and release the owned pipeline
    pub fn shutdown(&self) -> Result<()> {
        let mut slot = self.pipeline.lock();
        if let Some(mut pipeline) = slot.take() {
            pipeline.stop()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
