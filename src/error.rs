//! Error types for the edgecast offloading layer
//!
//! Provides structured error handling with:
//! - A small set of error kinds for machine classification
//! - Retryable / fatal classification for callers
//! - Error context and chaining via `source`

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for offloading operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error kinds, used by embedders to map failures onto their
/// own error surfaces without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing required argument / config field
    InvalidParameter,
    /// Unknown registry key or missing resource
    NotFound,
    /// Allocation refused (oversized frame, exhausted buffer)
    OutOfMemory,
    /// File or network I/O failure
    Io,
    /// A bounded wait elapsed without the expected arrival
    Timeout,
    /// Writable root or store path is not writable
    PermissionDenied,
    /// Unknown service type, role, or unimplemented operation
    Unsupported,
    /// Corrupted handle state or logic error
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidParameter => "invalid-parameter",
            ErrorKind::NotFound => "not-found",
            ErrorKind::OutOfMemory => "out-of-memory",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// Main error type for the offloading layer
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed or missing argument
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Configuration parse or validation failure
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────
    // Lookup Errors
    // ─────────────────────────────────────────────────────────────

    /// Unknown service registry key
    #[error("Service not found: {key}")]
    ServiceNotFound { key: String },

    /// Missing file or resource
    #[error("Not found: {what}")]
    NotFound { what: String },

    // ─────────────────────────────────────────────────────────────
    // IO / Transport Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// URI fetch failure
    #[error("Failed to fetch {uri}: {message}")]
    Fetch { uri: String, message: String },

    /// Malformed wire message or metadata
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Inbound payload digest did not match its metadata
    #[error("Payload digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Frame exceeds the transport's size cap
    #[error("Frame of {size} bytes exceeds cap of {cap} bytes")]
    FrameTooLarge { size: usize, cap: usize },

    // ─────────────────────────────────────────────────────────────
    // Coordination Errors
    // ─────────────────────────────────────────────────────────────

    /// The completion detector exhausted its wait budget
    #[error("Required data not received within {waited_ms}ms")]
    CompletionTimeout { waited_ms: u64 },

    /// Writable root is missing or not writable
    #[error("Path not writable: {path}")]
    PathNotWritable { path: PathBuf },

    /// Unknown service type, role, or unimplemented operation
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// JSON encode/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decode failure
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Corrupted handle state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into a coarse kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Error::Config { .. } => ErrorKind::InvalidParameter,
            Error::Json(_) => ErrorKind::InvalidParameter,
            Error::Toml(_) => ErrorKind::InvalidParameter,

            Error::ServiceNotFound { .. } => ErrorKind::NotFound,
            Error::NotFound { .. } => ErrorKind::NotFound,

            Error::FileRead { .. } | Error::FileWrite { .. } => ErrorKind::Io,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                _ => ErrorKind::Io,
            },
            Error::Connection(_) => ErrorKind::Io,
            Error::Fetch { .. } => ErrorKind::Io,
            Error::Protocol(_) => ErrorKind::InvalidParameter,
            Error::DigestMismatch { .. } => ErrorKind::Io,
            Error::FrameTooLarge { .. } => ErrorKind::OutOfMemory,

            Error::CompletionTimeout { .. } => ErrorKind::Timeout,
            Error::PathNotWritable { .. } => ErrorKind::PermissionDenied,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if retrying the same call can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Fetch { .. }
                | Error::Io(_)
                | Error::FileRead { .. }
                | Error::FileWrite { .. }
                | Error::CompletionTimeout { .. }
        )
    }

    /// Check if the owning session is unusable after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::PathNotWritable { .. } | Error::Internal(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create an invalid-parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Create a service-not-found error
    pub fn service_not_found(key: impl Into<String>) -> Self {
        Error::ServiceNotFound { key: key.into() }
    }

    /// Create a file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a URI fetch error
    pub fn fetch(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Fetch {
            uri: uri.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
