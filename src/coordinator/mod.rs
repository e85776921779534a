//! Offloading coordinator
//!
//! Central state holder of one offloading session. Owns the edge
//! session and the service registry, classifies inbound messages by
//! service type, and dispatches them to model install, pipeline
//! install, URI resolution, or reply forwarding. In training mode it
//! additionally drives the sender/receiver handshake.
//!
//! Dispatch runs on its own task fed by the session's inbound stream;
//! a failure while processing one message is reported through the
//! event channel and never aborts the loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{validate_writable_root, NodeType, OffloadConfig};
use crate::error::{Error, Result};
use crate::installer::ServiceInstaller;
use crate::pipeline::PipelineRuntime;
use crate::protocol::{meta, payload_digest, ServiceType, TransportMessage};
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::resolver::UriResolver;
use crate::session::EdgeSession;
use crate::training::{self, TrainingState};
use crate::transport::EdgeTransport;

/// Capacity of the observer event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// Typed events raised to the session observer
#[derive(Debug)]
pub enum OffloadEvent {
    /// A model blob was installed into the local registry
    ModelRegistered { key: String, version: String },
    /// A pipeline description was installed into the local registry
    PipelineRegistered { key: String },
    /// A computed reply arrived from the remote node
    Reply { payload: Vec<u8> },
    /// Processing one inbound message failed; the loop continues
    DispatchFailed { key: String, error: String },
}

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    /// A start call is in flight; excludes concurrent starts
    Starting,
    Started,
    Stopped,
    Destroyed,
}

// ─────────────────────────────────────────────────────────────────
// Dispatch Context
// ─────────────────────────────────────────────────────────────────

/// Everything the dispatch task needs, detached from the coordinator
/// so the caller and the transport's delivery context never contend
/// on one lock.
struct DispatchContext {
    resolver: Arc<dyn UriResolver>,
    installer: Arc<dyn ServiceInstaller>,
    writable_root: Option<PathBuf>,
    training: Option<Arc<TrainingState>>,
    events: mpsc::Sender<OffloadEvent>,
}

// ─────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────

/// One offloading session: edge session + registry + dispatch task
pub struct OffloadCoordinator {
    config: OffloadConfig,
    session: tokio::sync::Mutex<EdgeSession>,
    registry: Arc<ServiceRegistry>,
    runtime: Arc<dyn PipelineRuntime>,
    training: Option<Arc<TrainingState>>,
    writable_root: Option<PathBuf>,
    state: parking_lot::Mutex<SessionState>,
    dispatch_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl OffloadCoordinator {
    /// Build the session, open the transport, and spawn the dispatch
    /// task. Returns the coordinator and the observer event stream.
    ///
    /// An unwritable `writable-path` is rejected here, before any
    /// network action. Failure to open the edge session is fatal; the
    /// whole coordinator is discarded.
    pub async fn create(
        config: OffloadConfig,
        transport: Box<dyn EdgeTransport>,
        resolver: Arc<dyn UriResolver>,
        installer: Arc<dyn ServiceInstaller>,
        runtime: Arc<dyn PipelineRuntime>,
    ) -> Result<(Self, mpsc::Receiver<OffloadEvent>)> {
        config.validate()?;

        let writable_root = config.writable_root();
        if let Some(ref root) = writable_root {
            validate_writable_root(root)?;
        }

        let training = match (config.node_type, config.training.as_ref()) {
            (Some(role), Some(settings)) => Some(Arc::new(TrainingState::new(role, settings)?)),
            _ => None,
        };

        let mut session = EdgeSession::new(config.endpoint.clone(), transport);
        let inbound = session.open().await?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let context = DispatchContext {
            resolver,
            installer,
            writable_root: writable_root.clone(),
            training: training.clone(),
            events: event_tx,
        };
        let dispatch_task = tokio::spawn(dispatch_loop(inbound, context));

        info!(
            node_id = %session.node_id(),
            training = training.is_some(),
            "Offloading session created"
        );

        Ok((
            Self {
                config,
                session: tokio::sync::Mutex::new(session),
                registry: Arc::new(ServiceRegistry::new()),
                runtime,
                training,
                writable_root,
                state: parking_lot::Mutex::new(SessionState::Created),
                dispatch_task: parking_lot::Mutex::new(Some(dispatch_task)),
            },
            event_rx,
        ))
    }

    /// Session configuration
    pub fn config(&self) -> &OffloadConfig {
        &self.config
    }

    /// The service registry of this session
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Declare an exportable service from its JSON descriptor blob
    pub fn set_service(&self, key: &str, descriptor_json: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::invalid_parameter("service key is empty"));
        }
        if descriptor_json.is_empty() {
            return Err(Error::invalid_parameter("service descriptor is empty"));
        }
        let descriptor = ServiceDescriptor::from_json(descriptor_json)?;
        self.registry.set(key, descriptor);
        debug!(key = %key, "Service registered");
        Ok(())
    }

    /// Send a payload under a previously declared service.
    ///
    /// Unknown keys fail before any network action.
    pub async fn request(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let descriptor = self
            .registry
            .get(key)
            .ok_or_else(|| Error::service_not_found(key))?;

        let mut metadata = descriptor.to_metadata();
        metadata.insert(meta::PAYLOAD_DIGEST.to_string(), payload_digest(&payload));
        self.session.lock().await.send(metadata, payload).await
    }

    // ─────────────────────────────────────────────────────────────
    // Training Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Run the training handshake for this node's role.
    ///
    /// The sender pushes every transfer-table file and the sentinel,
    /// then launches its own pipeline. The receiver blocks until the
    /// handshake completes, then launches the received pipeline. Plain
    /// sessions have no start phase.
    pub async fn start(&self) -> Result<()> {
        let training = self
            .training
            .clone()
            .ok_or_else(|| Error::Unsupported("start on a non-training session".to_string()))?;
        // Claim the start before awaiting anything, so a concurrent
        // start cannot run the handshake twice.
        let previous = {
            let mut state = self.state.lock();
            match *state {
                SessionState::Destroyed => {
                    return Err(Error::Internal("session already destroyed".to_string()))
                }
                SessionState::Starting | SessionState::Started => {
                    return Err(Error::Internal("session already started".to_string()))
                }
                previous => {
                    *state = SessionState::Starting;
                    previous
                }
            }
        };

        let result = match training.role() {
            NodeType::Sender => self.start_sender(&training).await,
            NodeType::Receiver => self.start_receiver(&training).await,
        };

        // A destroy racing the handshake wins; only settle the state
        // if nothing else claimed it meanwhile.
        let mut state = self.state.lock();
        if *state == SessionState::Starting {
            *state = if result.is_ok() {
                SessionState::Started
            } else {
                previous
            };
        }
        drop(state);
        result
    }

    /// Stop the owned training pipeline. Already-transferred services
    /// stay registered on the remote node.
    pub async fn stop(&self) -> Result<()> {
        let training = self
            .training
            .as_ref()
            .ok_or_else(|| Error::Unsupported("stop on a non-training session".to_string()))?;

        if *self.state.lock() != SessionState::Started {
            return Ok(());
        }
        training.stop_pipeline()?;
        *self.state.lock() = SessionState::Stopped;
        info!("Training stopped");
        Ok(())
    }

    /// Tear the session down: stop the pipeline, quiesce the dispatch
    /// task, release the transport, and drop the registry. Idempotent.
    pub async fn destroy(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Destroyed {
                return Ok(());
            }
            *state = SessionState::Destroyed;
        }

        if let Some(ref training) = self.training {
            training.shutdown()?;
        }
        // Stop listening before freeing shared state so no dispatch
        // runs against a dead session.
        if let Some(task) = self.dispatch_task.lock().take() {
            task.abort();
        }
        self.session.lock().await.close().await?;
        self.registry.clear();
        info!("Offloading session destroyed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Sender Handshake
    // ─────────────────────────────────────────────────────────────

    async fn start_sender(&self, training: &TrainingState) -> Result<()> {
        let root = self
            .writable_root
            .clone()
            .ok_or_else(|| Error::config("writable-path is required for a training sender"))?;

        // Push every data file first. Any failure aborts the start;
        // files already delivered stay delivered.
        for (tag, template) in training.table().data_entries() {
            if !template.contains(training::SENDER_ROOT) {
                return Err(Error::invalid_parameter(format!(
                    "transfer entry '{}' has no {} placeholder",
                    tag,
                    training::SENDER_ROOT
                )));
            }
            let path = PathBuf::from(training::resolve_sender(template, &root));
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| Error::file_read(&path, e))?;

            let mut descriptor = ServiceDescriptor::new(ServiceType::ModelRaw, tag.clone());
            descriptor.name = file_name_of(&path);
            self.registry.set(tag.clone(), descriptor);
            self.request(tag, bytes).await?;
            info!(tag = %tag, path = %path.display(), "Transfer item sent");
        }

        // The sentinel goes last: the receiver-side pipeline template
        // with this node's placeholder resolved, the receiver's left
        // untouched.
        let template = training
            .receiver_pipeline()
            .ok_or_else(|| Error::config("training.receiver-pipeline is not set"))?;
        let resolved = training::resolve_sender(template, &root);
        let pipeline_tag = training.table().pipeline_tag().to_string();
        let descriptor = ServiceDescriptor::new(ServiceType::PipelineRaw, pipeline_tag.clone());
        self.registry.set(pipeline_tag.clone(), descriptor);
        self.request(&pipeline_tag, resolved.into_bytes()).await?;
        info!(tag = %pipeline_tag, "Sentinel sent");

        // Only after every transfer succeeded does the sender launch
        // its own pipeline.
        let template = training
            .sender_pipeline()
            .ok_or_else(|| Error::config("training.sender-pipeline is not set"))?;
        let description = training::resolve_sender(template, &root);
        let mut handle = self.runtime.construct(&description)?;
        handle.start()?;
        training.attach_pipeline(handle);
        info!("Sender pipeline launched");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Receiver Handshake
    // ─────────────────────────────────────────────────────────────

    async fn start_receiver(&self, training: &TrainingState) -> Result<()> {
        let description = training.wait_for_completion().await?;

        let root = self
            .writable_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let description = training::resolve_receiver(&description, &root);
        let mut handle = self.runtime.construct(&description)?;
        handle.start()?;
        training.attach_pipeline(handle);
        info!("Receiver pipeline launched");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Inbound Dispatch
// ─────────────────────────────────────────────────────────────────

async fn dispatch_loop(mut inbound: mpsc::Receiver<TransportMessage>, context: DispatchContext) {
    while let Some(message) = inbound.recv().await {
        let key = message.meta(meta::SERVICE_KEY).unwrap_or("").to_string();
        if let Err(error) = dispatch_one(&context, &message).await {
            warn!(key = %key, error = %error, "Dispatch failed");
            let _ = context
                .events
                .send(OffloadEvent::DispatchFailed {
                    key,
                    error: error.to_string(),
                })
                .await;
        }
    }
    debug!("Dispatch loop ended");
}

async fn dispatch_one(context: &DispatchContext, message: &TransportMessage) -> Result<()> {
    let type_name = message
        .meta(meta::SERVICE_TYPE)
        .ok_or_else(|| Error::Protocol("message has no service-type".to_string()))?;
    let Some(service_type) = ServiceType::parse(type_name) else {
        // Unknown types are an ignorable anomaly, never a crash.
        warn!(service_type = %type_name, "Unknown service type, ignoring message");
        return Ok(());
    };

    verify_digest(message)?;

    if service_type == ServiceType::Reply {
        let _ = context
            .events
            .send(OffloadEvent::Reply {
                payload: message.payload.clone(),
            })
            .await;
        return Ok(());
    }

    let key = message
        .meta(meta::SERVICE_KEY)
        .ok_or_else(|| Error::Protocol("message has no service-key".to_string()))?
        .to_string();

    let bytes = if service_type.is_indirect() {
        let uri = std::str::from_utf8(&message.payload)
            .map_err(|_| Error::Protocol("URI payload is not valid UTF-8".to_string()))?;
        context.resolver.fetch(uri).await?
    } else {
        message.payload.clone()
    };

    match service_type {
        ServiceType::ModelRaw | ServiceType::ModelUri => {
            handle_model(context, &key, message, bytes).await
        }
        ServiceType::PipelineRaw | ServiceType::PipelineUri => {
            let description = String::from_utf8(bytes)
                .map_err(|_| Error::Protocol("pipeline description is not valid UTF-8".to_string()))?;
            handle_pipeline(context, &key, description).await
        }
        ServiceType::Reply => unreachable!("handled above"),
    }
}

fn verify_digest(message: &TransportMessage) -> Result<()> {
    if let Some(expected) = message.meta(meta::PAYLOAD_DIGEST) {
        let actual = payload_digest(&message.payload);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::DigestMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(())
}

async fn handle_model(
    context: &DispatchContext,
    key: &str,
    message: &TransportMessage,
    bytes: Vec<u8>,
) -> Result<()> {
    let activate = message
        .meta(meta::ACTIVATE)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let description = message.meta(meta::DESCRIPTION);

    // A training receiver places the blob where its transfer table
    // says the pipeline expects it; plain sessions install under the
    // writable root, or a per-key directory when none was given.
    // The key and name metadata are remote input: both are reduced to
    // a bare file name so no peer can point the write outside the root.
    let path = match receiving_training(context) {
        Some(training) => {
            if !training.accept_transfer(key) {
                return Ok(());
            }
            let root = context
                .writable_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            if training.table().contains(key) {
                training.table().receiver_path(key, &root)
            } else {
                root.join(sanitized_file_name(key)?)
            }
        }
        None => {
            let dir = match context.writable_root {
                Some(ref root) => root.clone(),
                None => PathBuf::from(".").join(sanitized_file_name(key)?),
            };
            let file_name = sanitized_file_name(message.meta(meta::NAME).unwrap_or(key))?;
            dir.join(file_name)
        }
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::file_write(parent, e))?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Error::file_write(&path, e))?;

    let version = context
        .installer
        .install_model(key, &path, activate, description)
        .await?;

    if let Some(training) = receiving_training(context) {
        training.record_transfer(key);
    }
    let _ = context
        .events
        .send(OffloadEvent::ModelRegistered {
            key: key.to_string(),
            version,
        })
        .await;
    Ok(())
}

async fn handle_pipeline(context: &DispatchContext, key: &str, description: String) -> Result<()> {
    if let Some(training) = receiving_training(context) {
        if !training.record_sentinel(description.clone()) {
            return Ok(());
        }
    }
    context.installer.install_pipeline(key, &description).await?;
    let _ = context
        .events
        .send(OffloadEvent::PipelineRegistered {
            key: key.to_string(),
        })
        .await;
    Ok(())
}

/// Training state of a receiver node, if this session is one
fn receiving_training(context: &DispatchContext) -> Option<&Arc<TrainingState>> {
    context
        .training
        .as_ref()
        .filter(|t| t.role() == NodeType::Receiver)
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Reduce a remote-supplied name to its final path component.
///
/// Absolute paths and traversal prefixes are stripped; names with no
/// usable component (`..`, `.`, empty) are refused.
fn sanitized_file_name(raw: &str) -> Result<String> {
    Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("unusable file name '{}'", raw)))
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
