//! Shared helpers for the integration suites

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use edgecast::{
    EdgeSession, EndpointConfig, LocalInstaller, LoopbackTransport, MockResolver, MockRuntime,
    NodeType, OffloadConfig, OffloadCoordinator, OffloadEvent, TrainingSettings, TransportMessage,
};

/// Endpoint that validates cleanly and skips the close grace wait
pub fn endpoint() -> EndpointConfig {
    EndpointConfig {
        dest_port: 4000,
        close_grace_ms: 0,
        ..Default::default()
    }
}

/// Plain-mode configuration rooted at `root`
pub fn plain_config(root: &Path) -> OffloadConfig {
    OffloadConfig {
        endpoint: endpoint(),
        writable_path: Some(root.display().to_string()),
        ..Default::default()
    }
}

/// Training configuration for one role
pub fn training_config(
    role: NodeType,
    root: &Path,
    transfer_data: &[(&str, &str)],
    completion_timeout_ms: u64,
) -> OffloadConfig {
    let transfer_data: HashMap<String, String> = transfer_data
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    OffloadConfig {
        endpoint: endpoint(),
        node_type: Some(role),
        writable_path: Some(root.display().to_string()),
        training: Some(TrainingSettings {
            sender_pipeline: Some(
                "datasrc location=@SENDER@/train.bin ! trainer name=local".to_string(),
            ),
            receiver_pipeline: Some(
                "datasrc location=@RECEIVER@/train.bin ! trainer name=remote".to_string(),
            ),
            transfer_data,
            completion_timeout_ms,
        }),
    }
}

/// A coordinator plus the collaborators the tests inspect afterwards
pub struct TestNode {
    pub coordinator: OffloadCoordinator,
    pub events: mpsc::Receiver<OffloadEvent>,
    pub resolver: Arc<MockResolver>,
    pub installer: Arc<LocalInstaller>,
    pub runtime: Arc<MockRuntime>,
}

/// Build a coordinator over one side of a loopback pair
pub async fn node(config: OffloadConfig, transport: LoopbackTransport) -> TestNode {
    let root = config
        .writable_root()
        .expect("test configs always set writable-path");
    std::fs::create_dir_all(&root).unwrap();

    let resolver = Arc::new(MockResolver::new());
    let installer = Arc::new(LocalInstaller::new(&root));
    let runtime = Arc::new(MockRuntime::new());
    let (coordinator, events) = OffloadCoordinator::create(
        config,
        Box::new(transport),
        resolver.clone(),
        installer.clone(),
        runtime.clone(),
    )
    .await
    .expect("coordinator create");

    TestNode {
        coordinator,
        events,
        resolver,
        installer,
        runtime,
    }
}

/// An opened raw session for injecting hand-built wire messages
pub async fn raw_session(
    transport: LoopbackTransport,
) -> (EdgeSession, mpsc::Receiver<TransportMessage>) {
    let mut session = EdgeSession::new(endpoint(), Box::new(transport));
    let rx = session.open().await.expect("session open");
    (session, rx)
}

/// Metadata map literal
pub fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Receive the next event or panic after one second
pub async fn next_event(events: &mut mpsc::Receiver<OffloadEvent>) -> OffloadEvent {
    tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
        .await
        .expect("event within one second")
        .expect("event channel open")
}
