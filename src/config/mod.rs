//! Configuration module for serial-com.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_COM_CONFIG` environment variable (explicit path)
//! 2. `./serial-com.toml` (current directory)
//! 3. `<user config dir>/serial-com/config.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Selected values can be overridden via environment variables named
//! `SERIAL_COM_<SECTION>_<KEY>`, for example `SERIAL_COM_SERIAL_DEFAULT_BAUD=115200`
//! or `SERIAL_COM_LOGGING_LEVEL=debug`.
//!
//! # Example
//!
//! ```toml
//! [serial]
//! default_baud = 115200
//! device_prefixes = ["ttyUSB", "ttyACM"]
//!
//! [serial.timeouts]
//! read_constant_ms = 1000
//!
//! [serial.port_aliases]
//! gps = "/dev/ttyUSB1"
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig};
