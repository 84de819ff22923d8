//! Core traits for the platform handle abstraction.
//!
//! `SerialBackend` is the per-platform factory (open, enumerate, permission
//! probe) and `PortHandle` is the single native resource it hands out. The
//! session layer depends only on these two traits, so the POSIX, Windows and
//! fake backends are interchangeable.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounded-wait policy applied to a port when it is opened.
///
/// On Windows the fields map 1:1 onto `COMMTIMEOUTS`. On POSIX only
/// `read_constant_ms` is used: it becomes `VTIME` (in deciseconds) with
/// `VMIN = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    /// Maximum gap between two received bytes.
    pub read_interval_ms: u32,
    /// Fixed part of the total read timeout.
    pub read_constant_ms: u32,
    /// Per-requested-byte part of the total read timeout.
    pub read_multiplier_ms: u32,
    /// Fixed part of the total write timeout.
    pub write_constant_ms: u32,
    /// Per-byte part of the total write timeout.
    pub write_multiplier_ms: u32,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            read_interval_ms: 50,
            read_constant_ms: 500,
            read_multiplier_ms: 10,
            write_constant_ms: 50,
            write_multiplier_ms: 10,
        }
    }
}

impl TimeoutPolicy {
    /// `VTIME` value for POSIX raw mode, in deciseconds.
    ///
    /// Clamped to `1..=255`: zero would turn the read into a non-blocking poll.
    pub fn posix_vtime(&self) -> u8 {
        let deciseconds = self.read_constant_ms.div_ceil(100);
        deciseconds.clamp(1, u8::MAX as u32) as u8
    }
}

/// Requested configuration for a port.
///
/// Framing is always 8 data bits, no parity, one stop bit; only the speed and
/// the timeout policy vary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Read/write timeout policy.
    #[serde(default)]
    pub timeouts: TimeoutPolicy,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new(9600)
    }
}

impl PortConfig {
    /// 8N1 at the given baud rate with the default timeout policy.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            timeouts: TimeoutPolicy::default(),
        }
    }

    /// Replace the timeout policy.
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Native identifier of an open port.
///
/// The file descriptor on POSIX, the `HANDLE` value on Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub i64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One open native port.
///
/// A handle is exclusively owned; dropping it releases the native resource.
/// Use [`PortHandle::close`] to observe a close failure instead.
///
/// Reading and writing the same handle from different threads requires
/// external synchronisation; the handle itself provides none.
pub trait PortHandle: Send + fmt::Debug {
    /// Native identifier of this handle.
    fn id(&self) -> HandleId;

    /// Whether the cached native handle is still valid. Performs no syscall.
    fn is_open(&self) -> bool;

    /// Perform a single native write attempt.
    ///
    /// Returns the number of bytes the platform accepted, which may be fewer
    /// than `data.len()`.
    fn write(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read at most `max_len` bytes, waiting no longer than the timeout policy.
    ///
    /// A timeout yields an empty buffer rather than an error.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, PortError>;

    /// Release the native resource, reporting a failed close.
    fn close(self) -> Result<(), PortError>
    where
        Self: Sized;
}

/// Factory and host-level queries for one platform.
pub trait SerialBackend: Clone + Send + fmt::Debug {
    /// Handle type produced by [`SerialBackend::open`].
    type Handle: PortHandle;

    /// Acquire exclusive access to `path` and put it into raw mode.
    ///
    /// Either a fully configured handle is returned or nothing is left open.
    fn open(&self, path: &str, config: &PortConfig) -> Result<Self::Handle, PortError>;

    /// Currently present serial devices. Failures yield an empty list.
    fn list_devices(&self) -> Vec<String>;

    /// Probe read/write accessibility of `path` without opening it.
    fn check_permission(&self, path: &str) -> std::io::Result<()>;

    /// Human readable OS name and version.
    fn platform_version(&self) -> String;
}
