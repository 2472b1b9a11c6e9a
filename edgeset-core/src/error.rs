//! # Error Handling
//!
//! Error kinds for every EdgeSet operation.
//!
//! None of these are retried inside the library. Each error travels up as a typed
//! result to the protocol session, which reports it on the wire and applies the
//! configured failure policy (halt or continue).

use thiserror::Error;

/// Result type alias for EdgeSet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for EdgeSet
#[derive(Error, Debug)]
pub enum Error {
    // Request errors
    #[error("{operation}() parameters not parsed correctly: {message}")]
    ParameterParse { operation: String, message: String },

    #[error("command_name not recognised: {name}")]
    UnknownOperation { name: String },

    #[error("{message}")]
    ProtocolSync { message: String },

    // Addressing errors
    #[error("{message}")]
    Range { message: String },

    // Resource errors
    #[error("memory allocation for {resource} failed ({bytes} bytes)")]
    Allocation { resource: String, bytes: usize },

    // Persistent tier errors
    #[error("device error: {message}")]
    Device {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // System errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn range(message: impl Into<String>) -> Self {
        Error::Range { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Error::ProtocolSync { message: message.into() }
    }

    pub fn device(message: impl Into<String>) -> Self {
        Error::Device { message: message.into(), source: None }
    }

    pub fn param(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ParameterParse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Get error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ParameterParse { .. } => "PARAMETER_PARSE",
            Error::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            Error::ProtocolSync { .. } => "PROTOCOL_SYNC",
            Error::Range { .. } => "RANGE",
            Error::Allocation { .. } => "ALLOCATION",
            Error::Device { .. } => "DEVICE",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Prefix written in front of the message on the host line, e.g. `ack_error: ...`.
    ///
    /// These match the diagnostics the host tooling already greps for.
    pub fn wire_prefix(&self) -> &'static str {
        match self {
            Error::Range { .. } => "index_error",
            Error::Allocation { .. } => "mem_error",
            Error::Device { .. } | Error::Io { .. } => "dev_error",
            _ => "ack_error",
        }
    }

    /// Render the single diagnostic line sent to the host
    pub fn wire_line(&self) -> String {
        format!("{}: {}", self.wire_prefix(), self)
    }

    /// Whether the transport itself is unusable after this error
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e {
            Error::Range { message } => Error::Range {
                message: format!("{}: {}", f(), message),
            },
            Error::Device { message, source } => Error::Device {
                message: format!("{}: {}", f(), message),
                source,
            },
            Error::ProtocolSync { message } => Error::ProtocolSync {
                message: format!("{}: {}", f(), message),
            },
            other => other,
        })
    }
}
