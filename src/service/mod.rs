//! Command surface for the host glue layer.
//!
//! `PortService` exposes the caller-facing commands (open, close, write, read,
//! permission, enumeration, platform version) and keeps one
//! [`PortSession`] per open handle, keyed by the native handle identifier.
//!
//! # Architecture
//!
//! ```text
//! caller ──> PortService ──> PortSession ──> SerialBackend ──> OS
//!                 │
//!                 └── SerialConfig (aliases, default timeouts)
//! ```

use crate::config::SerialConfig;
use crate::error::{SerialError, SerialResult};
use crate::port::{HandleId, NativeBackend, PortConfig, SerialBackend};
use crate::session::{self, PortSession};
use std::collections::BTreeMap;
use tracing::debug;

/// Multi-session front end over one backend.
#[derive(Debug)]
pub struct PortService<B: SerialBackend> {
    backend: B,
    config: SerialConfig,
    sessions: BTreeMap<HandleId, PortSession<B>>,
}

impl<B: SerialBackend> PortService<B> {
    /// Service with the default serial settings.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SerialConfig::default())
    }

    /// Service using aliases and timeouts from `config`.
    pub fn with_config(backend: B, config: SerialConfig) -> Self {
        Self {
            backend,
            config,
            sessions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Open a port and return its native handle identifier.
    ///
    /// `path` is resolved through the configured aliases first.
    ///
    /// # Errors
    ///
    /// - `SerialError::Open` if the device is missing, busy or not accessible
    /// - `SerialError::Config` if the device rejected the configuration
    /// - `SerialError::UnsupportedBaudRate` if the rate has no native speed
    pub fn open_port(&mut self, path: &str, baud_rate: u32) -> SerialResult<HandleId> {
        let device = self.config.resolve_port(path);
        let port_config = PortConfig::new(baud_rate).with_timeouts(self.config.timeouts);

        let mut session = PortSession::new(self.backend.clone());
        let id = session.open(&device, &port_config)?;
        self.sessions.insert(id, session);
        debug!(handle = %id, open_sessions = self.sessions.len(), "handle registered");
        Ok(id)
    }

    /// Close the session behind `handle`. Unknown handles are already closed.
    ///
    /// # Errors
    ///
    /// - `SerialError::Close` if the native close failed; the handle is
    ///   forgotten regardless
    pub fn close_port(&mut self, handle: HandleId) -> SerialResult<()> {
        match self.sessions.remove(&handle) {
            Some(mut session) => session.close(),
            None => Ok(()),
        }
    }

    /// Write `data` and return how many bytes the device accepted.
    ///
    /// # Errors
    ///
    /// - `SerialError::NotOpen` if `handle` is not open
    /// - `SerialError::Write` if the native write failed
    pub fn write_to_port(&mut self, handle: HandleId, data: &[u8]) -> SerialResult<usize> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or(SerialError::NotOpen)?;
        session.write(data).map(|outcome| outcome.written)
    }

    /// Read up to `max_len` bytes.
    ///
    /// # Errors
    ///
    /// - `SerialError::NotOpen` if `handle` is not open
    /// - `SerialError::Read` if the native read failed
    pub fn read_from_port(&mut self, handle: HandleId, max_len: usize) -> SerialResult<Vec<u8>> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or(SerialError::NotOpen)?;
        session.read(max_len)
    }

    /// Probe whether the process may read and write `path`.
    ///
    /// # Errors
    ///
    /// - `SerialError::Permission` carrying the native reason
    pub fn request_permission(&self, path: &str) -> SerialResult<bool> {
        session::check_permission(&self.backend, &self.config.resolve_port(path))
    }

    /// Serial devices present right now.
    pub fn list_devices(&self) -> Vec<String> {
        self.backend.list_devices()
    }

    pub fn platform_version(&self) -> String {
        self.backend.platform_version()
    }

    /// Whether `handle` refers to an open session.
    pub fn is_open(&self, handle: HandleId) -> bool {
        self.sessions.get(&handle).is_some_and(|s| s.is_open())
    }

    /// Identifiers of all open sessions, ascending.
    pub fn open_handles(&self) -> Vec<HandleId> {
        self.sessions.keys().copied().collect()
    }

    /// Close every session, returning the first close failure.
    pub fn close_all(&mut self) -> SerialResult<()> {
        let mut first_error = None;
        for (_, mut session) in std::mem::take(&mut self.sessions) {
            if let Err(e) = session.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl PortService<NativeBackend> {
    /// Service on the host platform backend.
    ///
    /// On POSIX the enumerator scans the configured device prefixes.
    pub fn native(config: SerialConfig) -> Self {
        #[cfg(unix)]
        let backend = NativeBackend::new().with_device_prefixes(config.device_prefixes.clone());
        #[cfg(windows)]
        let backend = NativeBackend::new();
        Self::with_config(backend, config)
    }
}
