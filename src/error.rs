//! Error types for the Fluid CSI node plugin
//!
//! All modules use `CsiResult<T>` as their return type. Every error maps onto
//! a status code the orchestrator understands via [`CsiError::code`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for node plugin operations
pub type CsiResult<T> = Result<T, CsiError>;

/// Status codes surfaced to the calling orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    InvalidArgument,
    PermissionDenied,
    NotFound,
    Internal,
    Unimplemented,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::PermissionDenied => "PermissionDenied",
            Self::NotFound => "NotFound",
            Self::Internal => "Internal",
            Self::Unimplemented => "Unimplemented",
        };
        write!(f, "{}", name)
    }
}

/// All errors that can occur in the node plugin
#[derive(Error, Debug)]
pub enum CsiError {
    // Request errors
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Unimplemented(String),

    // Metadata store errors
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("Metadata store error: {0}")]
    Store(String),

    #[error("Unknown Fuse clean policy: {0}")]
    UnknownCleanPolicy(String),

    // Mount errors
    #[error("Mount of {source_path} on {target} failed: {output}")]
    Mount {
        source_path: PathBuf,
        target: PathBuf,
        output: String,
    },

    #[error("Unmount of {target} failed: {output}")]
    Unmount { target: PathBuf, output: String },

    #[error("Mount point {path} is not ready: {output}")]
    MountNotReady { path: PathBuf, output: String },

    #[error("Volume {0} is still in use")]
    VolumeInUse(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, exit code: {code:?}, output: {output}")]
    CommandExecution {
        command: String,
        code: Option<i32>,
        output: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CsiError>,
    },
}

impl CsiError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a not found error for a metadata object
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wrap an error with the operation and identifiers it happened under
    pub fn context(context: impl Into<String>, source: CsiError) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Status code for this error, looking through context wrappers
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::PermissionDenied(_) => Code::PermissionDenied,
            Self::Unimplemented(_) => Code::Unimplemented,
            Self::NotFound { .. } => Code::NotFound,
            Self::Context { source, .. } => source.code(),
            _ => Code::Internal,
        }
    }

    /// Whether the target of the operation is absent
    pub fn is_not_found(&self) -> bool {
        self.code() == Code::NotFound
    }
}

/// Extension for attaching context to fallible results
pub trait ResultExt<T> {
    /// Wrap the error with a context message built lazily
    fn with_context<F, S>(self, f: F) -> CsiResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for CsiResult<T> {
    fn with_context<F, S>(self, f: F) -> CsiResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| CsiError::context(f(), e))
    }
}
