//! Backend-level error types.
//!
//! These describe what the native layer rejected and at which stage. The
//! session layer maps them onto the caller-facing taxonomy in
//! [`crate::error::SerialError`].

use thiserror::Error;

/// Errors produced by a [`SerialBackend`](super::SerialBackend) or one of its handles.
#[derive(Debug, Error)]
pub enum PortError {
    /// The device could not be acquired (missing, busy, permission denied).
    #[error("Error opening port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The device was acquired but rejected the requested configuration.
    #[error("Error configuring port {path}: {message}")]
    Config { path: String, message: String },

    /// The requested baud rate has no native speed on this platform.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// A native I/O call on an open handle failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortError {
    /// Create an Open error from a path and the native failure.
    pub fn open(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Create a Config error from a path and a message.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Native diagnostic text without the stage prefix.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Open { source, .. } => source.to_string(),
            Self::Config { message, .. } => message.clone(),
            Self::UnsupportedBaudRate(rate) => format!("no native speed for {rate} baud"),
            Self::Io(e) => e.to_string(),
        }
    }
}
