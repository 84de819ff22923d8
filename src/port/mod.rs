//! Platform handle abstraction.
//!
//! One trait pair (`SerialBackend` / `PortHandle`) with a termios backend on
//! POSIX, a Comm-API backend on Windows and an in-memory fake for tests.

pub mod baud;
pub mod error;
pub mod fake;
pub mod traits;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

pub use error::PortError;
pub use fake::{CallCounts, FakeBackend, FakeDevice, FakeEvent, FakeFailure, FakeHandle};
pub use traits::*;

#[cfg(unix)]
pub use posix::{PosixBackend, PosixHandle};

#[cfg(windows)]
pub use windows::{WindowsBackend, WindowsHandle};

/// Device-file name prefixes scanned by the POSIX enumerator.
pub const DEFAULT_DEVICE_PREFIXES: &[&str] =
    &["ttyS", "ttyUSB", "ttyACM", "ttyAMA", "rfcomm", "cu."];

/// Largest buffer a single native read allocates, whatever `max_len` asks for.
pub const READ_CHUNK_LIMIT: usize = 64 * 1024;

/// The backend for the host platform.
#[cfg(unix)]
pub type NativeBackend = PosixBackend;

/// The backend for the host platform.
#[cfg(windows)]
pub type NativeBackend = WindowsBackend;
