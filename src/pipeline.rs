//! Pipeline engine boundary
//!
//! Launching a training pipeline goes through this seam; the actual
//! media/tensor pipeline engine lives outside the crate. [`MockRuntime`]
//! records constructions and lifecycle calls for tests.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Constructs pipelines from textual descriptions
pub trait PipelineRuntime: Send + Sync {
    fn construct(&self, description: &str) -> Result<Box<dyn PipelineHandle>>;
}

/// One constructed pipeline
pub trait PipelineHandle: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn is_running(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────
// Mock Runtime (for testing)
// ─────────────────────────────────────────────────────────────────

/// Shared log of what the mock runtime has been asked to do
#[derive(Debug, Default)]
pub struct MockRuntimeLog {
    /// Descriptions passed to `construct`, in order
    pub constructed: Vec<String>,
    pub started: usize,
    pub stopped: usize,
}

/// Runtime that records descriptions instead of executing them
#[derive(Default)]
pub struct MockRuntime {
    log: Arc<Mutex<MockRuntimeLog>>,
    fail_construct: bool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose `construct` always fails
    pub fn failing() -> Self {
        Self {
            log: Arc::new(Mutex::new(MockRuntimeLog::default())),
            fail_construct: true,
        }
    }

    /// Snapshot of the recorded activity
    pub fn log(&self) -> MockRuntimeLog {
        let log = self.log.lock();
        MockRuntimeLog {
            constructed: log.constructed.clone(),
            started: log.started,
            stopped: log.stopped,
        }
    }
}

impl PipelineRuntime for MockRuntime {
    fn construct(&self, description: &str) -> Result<Box<dyn PipelineHandle>> {
        if self.fail_construct {
            return Err(Error::Unsupported("mock construct failure".to_string()));
        }
        self.log.lock().constructed.push(description.to_string());
        Ok(Box::new(MockHandle {
            log: Arc::clone(&self.log),
            running: false,
        }))
    }
}

struct MockHandle {
    log: Arc<Mutex<MockRuntimeLog>>,
    running: bool,
}

impl PipelineHandle for MockHandle {
    fn start(&mut self) -> Result<()> {
        self.log.lock().started += 1;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.running {
            self.log.lock().stopped += 1;
            self.running = false;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
