//! Port session manager.
//!
//! A [`PortSession`] owns zero or one native handle. It enforces the
//! `Closed -> Open -> Closed` lifecycle, checks the open precondition before
//! any native call, and translates backend errors into [`SerialError`].
//!
//! Sessions are not synchronised. Wrap one in a mutex if it must be shared
//! between threads.

use crate::error::{SerialError, SerialResult};
use crate::port::{HandleId, PortConfig, PortError, PortHandle, SerialBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Closed,
    Open,
}

/// Result of a single write attempt.
///
/// A short write is a success; the caller decides whether to send the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub requested: usize,
    pub written: usize,
}

impl WriteOutcome {
    /// Whether the platform accepted fewer bytes than requested.
    pub fn is_partial(&self) -> bool {
        self.written < self.requested
    }

    /// Bytes the caller still has to send.
    pub fn remaining(&self) -> usize {
        self.requested - self.written
    }
}

/// Byte counters over the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub opens: u64,
    pub bytes_written_total: u64,
    pub bytes_read_total: u64,
}

fn open_failure(err: PortError) -> SerialError {
    match err {
        PortError::Config { .. } => SerialError::Config(err.diagnostic()),
        PortError::UnsupportedBaudRate(rate) => SerialError::UnsupportedBaudRate(rate),
        PortError::Open { .. } | PortError::Io(_) => SerialError::Open(err.diagnostic()),
    }
}

/// One logical connection to a serial device.
#[derive(Debug)]
pub struct PortSession<B: SerialBackend> {
    backend: B,
    handle: Option<B::Handle>,
    path: Option<String>,
    stats: SessionStats,
}

impl<B: SerialBackend> PortSession<B> {
    /// A closed session on the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            handle: None,
            path: None,
            stats: SessionStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Whether a valid handle is held. Performs no native call.
    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_open())
    }

    /// Path of the open device.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Native identifier of the open handle.
    pub fn handle_id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(|h| h.id())
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Open `path` with `config`.
    ///
    /// An already open handle is closed first. On failure the session stays
    /// closed.
    ///
    /// # Errors
    ///
    /// - `SerialError::Open` if the device is missing, busy or not accessible
    /// - `SerialError::Config` if the device rejected the configuration
    /// - `SerialError::UnsupportedBaudRate` if the rate has no native speed
    pub fn open(&mut self, path: &str, config: &PortConfig) -> SerialResult<HandleId> {
        if self.handle.is_some() {
            debug!(path, previous = ?self.path, "re-opening session, closing previous handle");
            if let Err(e) = self.close() {
                warn!(error = %e, "previous handle failed to close cleanly");
            }
        }

        let handle = self.backend.open(path, config).map_err(open_failure)?;
        let id = handle.id();
        self.handle = Some(handle);
        self.path = Some(path.to_string());
        self.stats.opens += 1;
        info!(path, handle = %id, baud = config.baud_rate, "session opened");
        Ok(id)
    }

    /// Write `data` in a single native attempt.
    ///
    /// # Errors
    ///
    /// - `SerialError::NotOpen` if the session is closed (no native call is made)
    /// - `SerialError::Write` if the native write failed
    pub fn write(&mut self, data: &[u8]) -> SerialResult<WriteOutcome> {
        let handle = self.handle.as_mut().ok_or(SerialError::NotOpen)?;
        let written = handle
            .write(data)
            .map_err(|e| SerialError::Write(e.diagnostic()))?;

        let outcome = WriteOutcome {
            requested: data.len(),
            written,
        };
        if outcome.is_partial() {
            debug!(
                requested = outcome.requested,
                written = outcome.written,
                "partial write"
            );
        }
        self.stats.bytes_written_total += written as u64;
        Ok(outcome)
    }

    /// Read up to `max_len` bytes.
    ///
    /// Returns an empty buffer when the timeout elapses with nothing received.
    ///
    /// # Errors
    ///
    /// - `SerialError::NotOpen` if the session is closed (no native call is made)
    /// - `SerialError::Read` if the native read failed
    pub fn read(&mut self, max_len: usize) -> SerialResult<Vec<u8>> {
        let handle = self.handle.as_mut().ok_or(SerialError::NotOpen)?;
        if max_len == 0 {
            return Ok(Vec::new());
        }
        let data = handle
            .read(max_len)
            .map_err(|e| SerialError::Read(e.diagnostic()))?;
        self.stats.bytes_read_total += data.len() as u64;
        Ok(data)
    }

    /// Close the session. Closing a closed session succeeds.
    ///
    /// # Errors
    ///
    /// - `SerialError::Close` if the native close failed. The session is
    ///   closed anyway and the handle is not retried.
    pub fn close(&mut self) -> SerialResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let path = self.path.take();
        let id = handle.id();
        handle
            .close()
            .map_err(|e| SerialError::Close(e.diagnostic()))?;
        info!(path = ?path, handle = %id, "session closed");
        Ok(())
    }

    /// Probe read/write access to `path` without opening it.
    ///
    /// Independent of the session state.
    ///
    /// # Errors
    ///
    /// - `SerialError::Permission` carrying the native reason
    pub fn check_permission(&self, path: &str) -> SerialResult<bool> {
        check_permission(&self.backend, path)
    }
}

impl<B: SerialBackend> Drop for PortSession<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close handle on session drop");
        }
    }
}

/// Probe read/write access to `path` on `backend`.
pub fn check_permission<B: SerialBackend>(backend: &B, path: &str) -> SerialResult<bool> {
    backend
        .check_permission(path)
        .map(|()| true)
        .map_err(|e| SerialError::Permission {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{FakeBackend, FakeDevice, FakeFailure};

    fn session_with(device: FakeDevice) -> (FakeBackend, PortSession<FakeBackend>) {
        let backend = FakeBackend::new();
        backend.add_device("FAKE0", device);
        let session = PortSession::new(backend.clone());
        (backend, session)
    }

    #[test]
    fn test_new_session_is_closed() {
        let (_, session) = session_with(FakeDevice::new());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.handle_id(), None);
        assert_eq!(session.path(), None);
    }

    #[test]
    fn test_open_then_close() {
        let (backend, mut session) = session_with(FakeDevice::new());
        let id = session.open("FAKE0", &PortConfig::new(115200)).unwrap();

        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.handle_id(), Some(id));
        assert_eq!(session.path(), Some("FAKE0"));
        assert_eq!(backend.baud_rate("FAKE0"), Some(115200));

        session.close().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!backend.is_held("FAKE0"));
    }

    #[test]
    fn test_write_outcome_partial() {
        let outcome = WriteOutcome {
            requested: 100,
            written: 40,
        };
        assert!(outcome.is_partial());
        assert_eq!(outcome.remaining(), 60);

        let full = WriteOutcome {
            requested: 4,
            written: 4,
        };
        assert!(!full.is_partial());
    }

    #[test]
    fn test_config_failure_maps_to_config_error() {
        let (backend, mut session) = session_with(FakeDevice::new());
        backend.fail_next(FakeFailure::Config);

        let err = session.open("FAKE0", &PortConfig::default()).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(!err.is_retryable());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!backend.is_held("FAKE0"));
    }

    #[test]
    fn test_zero_length_read_makes_no_native_call() {
        let (backend, mut session) = session_with(FakeDevice::new());
        session.open("FAKE0", &PortConfig::default()).unwrap();

        assert!(session.read(0).unwrap().is_empty());
        assert_eq!(backend.calls().reads, 0);
    }

    #[test]
    fn test_native_read_failure_is_read_error() {
        let (backend, mut session) = session_with(FakeDevice::new());
        session.open("FAKE0", &PortConfig::default()).unwrap();
        backend.fail_next(FakeFailure::Read);

        let err = session.read(8).unwrap_err();
        assert!(matches!(err, SerialError::Read(ref d) if d.contains("Input/output")));
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn test_native_write_failure_is_write_error() {
        let (backend, mut session) = session_with(FakeDevice::new());
        session.open("FAKE0", &PortConfig::default()).unwrap();
        backend.fail_next(FakeFailure::Write);

        assert_eq!(session.write(b"x").unwrap_err().code(), "WRITE_ERROR");
    }

    #[test]
    fn test_stats_accumulate() {
        let (_, mut session) = session_with(FakeDevice::new().loopback());
        session.open("FAKE0", &PortConfig::default()).unwrap();
        session.write(b"abcd").unwrap();
        session.read(2).unwrap();

        let stats = session.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.bytes_written_total, 4);
        assert_eq!(stats.bytes_read_total, 2);
    }

    #[test]
    fn test_drop_releases_handle() {
        let (backend, mut session) = session_with(FakeDevice::new());
        session.open("FAKE0", &PortConfig::default()).unwrap();
        drop(session);

        assert!(!backend.is_held("FAKE0"));
        assert_eq!(backend.calls().closes, 1);
    }

    #[test]
    fn test_permission_check_ignores_state() {
        let backend = FakeBackend::new();
        backend.add_device("DENIED0", FakeDevice::new().permission_denied());
        let session = PortSession::new(backend);

        let err = session.check_permission("DENIED0").unwrap_err();
        match err {
            SerialError::Permission { path, reason } => {
                assert_eq!(path, "DENIED0");
                assert!(reason.contains("Permission denied"));
            }
            other => panic!("expected Permission error, got {other:?}"),
        }
    }
}
