//! Serial COM Library
//!
//! Cross-platform access to serial devices: open a port by path, configure
//! it for raw 8N1 I/O at a chosen baud rate, exchange binary data, close it,
//! enumerate devices and probe permissions.
//!
//! # Modules
//!
//! - `port`: Platform handle layer (termios, Windows Comm API, in-memory fake)
//! - `session`: Single-port lifecycle and error translation
//! - `service`: Multi-handle command surface for host glue code
//! - `error`: Caller-facing error taxonomy
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```
//! use serial_com::{FakeBackend, FakeDevice, PortConfig, PortSession};
//!
//! let backend = FakeBackend::new();
//! backend.add_device("/dev/ttyUSB0", FakeDevice::new().loopback());
//!
//! let mut session = PortSession::new(backend);
//! session.open("/dev/ttyUSB0", &PortConfig::new(115200)).unwrap();
//! session.write(b"AT\r\n").unwrap();
//! assert_eq!(session.read(64).unwrap(), b"AT\r\n");
//! session.close().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod port;
pub mod service;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{ErrorReport, SerialError, SerialResult};
pub use port::{
    FakeBackend, FakeDevice, HandleId, NativeBackend, PortConfig, PortError, PortHandle,
    SerialBackend, TimeoutPolicy,
};
pub use service::PortService;
pub use session::{PortSession, SessionState, SessionStats, WriteOutcome};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
