//! Caller-facing error taxonomy.
//!
//! Every variant is terminal to the one operation that raised it and carries
//! the native diagnostic text. `NotOpen` is a precondition failure detected
//! before any native call and never wraps an I/O error.

use serde::Serialize;
use thiserror::Error;

/// Errors returned by [`PortSession`](crate::session::PortSession) and
/// [`PortService`](crate::service::PortService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerialError {
    /// The device is missing, busy or not accessible. May succeed later.
    #[error("Error opening port: {0}")]
    Open(String),

    /// The device rejected the requested configuration.
    #[error("Error configuring port: {0}")]
    Config(String),

    /// The native close call failed. The handle is released regardless.
    #[error("Error closing port: {0}")]
    Close(String),

    #[error("Error writing to port: {0}")]
    Write(String),

    #[error("Error reading from port: {0}")]
    Read(String),

    /// Operation requires an open port.
    #[error("Operation requires an open serial port, but the port is closed")]
    NotOpen,

    /// The access probe failed.
    #[error("No permission to access port {path}: {reason}")]
    Permission { path: String, reason: String },

    /// The requested baud rate has no native speed on this platform.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),
}

impl SerialError {
    /// Stable machine-readable code for the caller.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Open(_) => "OPEN_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Close(_) => "CLOSE_ERROR",
            Self::Write(_) => "WRITE_ERROR",
            Self::Read(_) => "READ_ERROR",
            Self::NotOpen => "NOT_OPEN",
            Self::Permission { .. } => "PERMISSION_ERROR",
            Self::UnsupportedBaudRate(_) => "UNSUPPORTED_BAUD_RATE",
        }
    }

    /// Underlying native diagnostic, if any.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Open(d) | Self::Config(d) | Self::Close(d) | Self::Write(d) | Self::Read(d) => {
                Some(d.clone())
            }
            Self::Permission { reason, .. } => Some(reason.clone()),
            Self::UnsupportedBaudRate(rate) => Some(format!("no native speed for {rate} baud")),
            Self::NotOpen => None,
        }
    }

    /// Only a failed open is worth retrying; the device may become available.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Structured form for the command surface.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
            diagnostic: self.diagnostic(),
        }
    }
}

/// Serializable error payload handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Result type for session and service operations.
pub type SerialResult<T> = Result<T, SerialError>;
