//! edgecast — device-to-device offloading for edge AI workloads
//!
//! One node hands neural-network models, pipeline descriptions, or
//! computed replies to another over a pluggable transport. On top of
//! that sits a training mode that orchestrates distributed model
//! training between a sender (owns data and configuration) and a
//! receiver (owns compute): the sender pushes the transfer table's
//! files and finishes with a pipeline description acting as the
//! completion sentinel; the receiver blocks its start sequence until
//! the handshake completes.
//!
//! The pipeline engine, the local model registry, and the transport
//! backends are external collaborators reached through the
//! [`PipelineRuntime`], [`ServiceInstaller`], [`UriResolver`] and
//! [`EdgeTransport`] seams.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use edgecast::{
//!     HttpResolver, LocalInstaller, MockRuntime, OffloadConfig, OffloadCoordinator,
//!     TcpTransport,
//! };
//!
//! # async fn run() -> edgecast::Result<()> {
//! let config = OffloadConfig::from_json_str(
//!     r#"{ "endpoint": { "dest_host": "10.0.0.2", "dest_port": 4000 } }"#,
//! )?;
//! let (coordinator, mut events) = OffloadCoordinator::create(
//!     config,
//!     Box::new(TcpTransport::new()),
//!     Arc::new(HttpResolver::new()),
//!     Arc::new(LocalInstaller::new("/var/lib/edgecast")),
//!     Arc::new(MockRuntime::new()),
//! )
//! .await?;
//!
//! coordinator.set_service(
//!     "classifier",
//!     r#"{ "service-type": "model_raw", "service-key": "classifier" }"#,
//! )?;
//! coordinator.request("classifier", std::fs::read("model.tflite")?).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod installer;
pub mod logging;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod training;
pub mod transport;

pub use config::{
    ConnectionKind, EndpointConfig, EndpointRole, NodeType, OffloadConfig, TrainingSettings,
};
pub use coordinator::{OffloadCoordinator, OffloadEvent};
pub use error::{Error, ErrorKind, Result};
pub use installer::{LocalInstaller, ServiceInstaller};
pub use pipeline::{MockRuntime, PipelineHandle, PipelineRuntime};
pub use protocol::{payload_digest, ServiceType, TransportMessage};
pub use registry::{ServiceDescriptor, ServiceRegistry};
pub use resolver::{HttpResolver, MockResolver, UriResolver};
pub use session::EdgeSession;
pub use training::{TrainingState, TransferTable};
pub use transport::{EdgeTransport, LoopbackTransport, TcpTransport};
