//! In-memory backend for tests and demos.
//!
//! `FakeBackend` simulates a set of devices without touching the OS. It records
//! every native-level call so tests can assert that the session layer made (or
//! skipped) a call, and it can inject a failure into the next open, close, read
//! or write.
//!
//! # Example
//! ```
//! use serial_com::port::{FakeBackend, FakeDevice, PortConfig, PortHandle, SerialBackend};
//!
//! let backend = FakeBackend::new();
//! backend.add_device("/dev/ttyFAKE0", FakeDevice::new().loopback());
//!
//! let mut handle = backend.open("/dev/ttyFAKE0", &PortConfig::new(9600)).unwrap();
//! assert_eq!(handle.write(b"ping\0").unwrap(), 5);
//! assert_eq!(handle.read(64).unwrap(), b"ping\0".to_vec());
//! assert_eq!(backend.calls().writes, 1);
//! ```

use super::baud;
use super::error::PortError;
use super::traits::{HandleId, PortConfig, PortHandle, SerialBackend};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;

/// Behaviour of one simulated device.
#[derive(Debug, Clone, Default)]
pub struct FakeDevice {
    loopback: bool,
    max_write_per_call: Option<usize>,
    permission_denied: bool,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo everything written back into the receive queue.
    pub fn loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Accept at most `limit` bytes per write call.
    pub fn max_write_per_call(mut self, limit: usize) -> Self {
        self.max_write_per_call = Some(limit);
        self
    }

    /// Fail the read/write access probe.
    pub fn permission_denied(mut self) -> Self {
        self.permission_denied = true;
        self
    }
}

/// Native operation a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeFailure {
    Open,
    Config,
    Close,
    Write,
    Read,
}

/// Number of native-level calls made against the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub opens: usize,
    pub closes: usize,
    pub writes: usize,
    pub reads: usize,
}

/// Ordered log entry of handle lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Opened { path: String, id: HandleId },
    Closed { path: String, id: HandleId },
}

#[derive(Debug, Default)]
struct DeviceState {
    device: FakeDevice,
    rx: VecDeque<u8>,
    write_log: Vec<Vec<u8>>,
    open_handle: Option<HandleId>,
    baud_rate: Option<u32>,
}

#[derive(Debug, Default)]
struct FakeState {
    devices: BTreeMap<String, DeviceState>,
    pending_failures: HashSet<FakeFailure>,
    supported_rates: Option<Vec<u32>>,
    calls: CallCounts,
    events: Vec<FakeEvent>,
    next_id: i64,
}

impl FakeState {
    fn take_failure(&mut self, failure: FakeFailure) -> bool {
        self.pending_failures.remove(&failure)
    }

    fn release(&mut self, path: &str, id: HandleId) {
        self.calls.closes += 1;
        if let Some(device) = self.devices.get_mut(path) {
            if device.open_handle == Some(id) {
                device.open_handle = None;
            }
        }
        self.events.push(FakeEvent::Closed {
            path: path.to_string(),
            id,
        });
    }
}

fn no_such_device() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "No such file or directory")
}

/// Shared in-memory backend. Clones observe the same devices and counters.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// Backend with no devices.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_id: 3,
                ..Default::default()
            })),
        }
    }

    /// Backend that only accepts the POSIX baud constants.
    #[cfg(unix)]
    pub fn with_posix_rates() -> Self {
        let backend = Self::new();
        backend.state.lock().supported_rates = Some(baud::supported_posix_rates());
        backend
    }

    /// Plug in (or replace) a device.
    pub fn add_device(&self, path: impl Into<String>, device: FakeDevice) {
        self.state.lock().devices.insert(
            path.into(),
            DeviceState {
                device,
                ..Default::default()
            },
        );
    }

    /// Unplug a device. Open handles on it start failing.
    pub fn remove_device(&self, path: &str) {
        self.state.lock().devices.remove(path);
    }

    /// Make the device deliver `data` to the next reads.
    pub fn push_rx(&self, path: &str, data: &[u8]) {
        if let Some(device) = self.state.lock().devices.get_mut(path) {
            device.rx.extend(data);
        }
    }

    /// Fail the next native call of the given kind.
    pub fn fail_next(&self, failure: FakeFailure) {
        self.state.lock().pending_failures.insert(failure);
    }

    /// Native call counters.
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Open/close events in order.
    pub fn events(&self) -> Vec<FakeEvent> {
        self.state.lock().events.clone()
    }

    /// Every chunk the device accepted, per write call.
    pub fn write_log(&self, path: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .devices
            .get(path)
            .map(|d| d.write_log.clone())
            .unwrap_or_default()
    }

    /// Whether a handle on `path` is currently held.
    pub fn is_held(&self, path: &str) -> bool {
        self.state
            .lock()
            .devices
            .get(path)
            .is_some_and(|d| d.open_handle.is_some())
    }

    /// Baud rate the device was last configured with.
    pub fn baud_rate(&self, path: &str) -> Option<u32> {
        self.state.lock().devices.get(path).and_then(|d| d.baud_rate)
    }
}

impl SerialBackend for FakeBackend {
    type Handle = FakeHandle;

    fn open(&self, path: &str, config: &PortConfig) -> Result<FakeHandle, PortError> {
        let mut state = self.state.lock();

        match &state.supported_rates {
            Some(rates) if !rates.contains(&config.baud_rate) => {
                return Err(PortError::UnsupportedBaudRate(config.baud_rate));
            }
            _ => {
                baud::resolve_windows(config.baud_rate)?;
            }
        }

        state.calls.opens += 1;
        if state.take_failure(FakeFailure::Open) {
            return Err(PortError::open(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"),
            ));
        }

        match state.devices.get(path) {
            None => return Err(PortError::open(path, no_such_device())),
            Some(device) if device.open_handle.is_some() => {
                return Err(PortError::open(
                    path,
                    io::Error::new(io::ErrorKind::Other, "Device or resource busy"),
                ));
            }
            Some(_) => {}
        }

        let id = HandleId(state.next_id);
        state.next_id += 1;
        state.events.push(FakeEvent::Opened {
            path: path.to_string(),
            id,
        });

        if state.take_failure(FakeFailure::Config) {
            // The device was acquired, so unwinding it is a native close.
            state.release(path, id);
            return Err(PortError::config(path, "Error from tcsetattr"));
        }

        if let Some(device) = state.devices.get_mut(path) {
            device.open_handle = Some(id);
            device.baud_rate = Some(config.baud_rate);
        }

        Ok(FakeHandle {
            id,
            path: path.to_string(),
            state: Arc::clone(&self.state),
            released: false,
        })
    }

    fn list_devices(&self) -> Vec<String> {
        self.state.lock().devices.keys().cloned().collect()
    }

    fn check_permission(&self, path: &str) -> io::Result<()> {
        let state = self.state.lock();
        match state.devices.get(path) {
            None => Err(no_such_device()),
            Some(d) if d.device.permission_denied => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "Permission denied",
            )),
            Some(_) => Ok(()),
        }
    }

    fn platform_version(&self) -> String {
        "FakeOS 1.0".to_string()
    }
}

/// Handle onto a simulated device.
#[derive(Debug)]
pub struct FakeHandle {
    id: HandleId,
    path: String,
    state: Arc<Mutex<FakeState>>,
    released: bool,
}

impl PortHandle for FakeHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.released
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        state.calls.writes += 1;
        if state.take_failure(FakeFailure::Write) {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::Other,
                "Input/output error",
            )));
        }
        let device = state.devices.get_mut(&self.path).ok_or_else(|| {
            PortError::Io(io::Error::new(io::ErrorKind::NotConnected, "No such device"))
        })?;

        let accepted = device
            .device
            .max_write_per_call
            .map_or(data.len(), |limit| data.len().min(limit));
        let chunk = &data[..accepted];
        device.write_log.push(chunk.to_vec());
        if device.device.loopback {
            device.rx.extend(chunk);
        }
        Ok(accepted)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, PortError> {
        let mut state = self.state.lock();
        state.calls.reads += 1;
        if state.take_failure(FakeFailure::Read) {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::Other,
                "Input/output error",
            )));
        }
        let device = state.devices.get_mut(&self.path).ok_or_else(|| {
            PortError::Io(io::Error::new(io::ErrorKind::NotConnected, "No such device"))
        })?;

        let n = max_len.min(device.rx.len());
        Ok(device.rx.drain(..n).collect())
    }

    fn close(mut self) -> Result<(), PortError> {
        self.released = true;
        let mut state = self.state.lock();
        state.release(&self.path, self.id);
        if state.take_failure(FakeFailure::Close) {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::Other,
                "Input/output error",
            )));
        }
        Ok(())
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.state.lock().release(&self.path, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with(path: &str, device: FakeDevice) -> FakeBackend {
        let backend = FakeBackend::new();
        backend.add_device(path, device);
        backend
    }

    #[test]
    fn test_loopback_preserves_zero_bytes() {
        let backend = backend_with("FAKE0", FakeDevice::new().loopback());
        let mut handle = backend.open("FAKE0", &PortConfig::default()).unwrap();

        let payload = [0x00, 0x41, 0x00, 0xFF];
        assert_eq!(handle.write(&payload).unwrap(), 4);
        assert_eq!(handle.read(16).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_partial_write_cap() {
        let backend = backend_with("FAKE0", FakeDevice::new().max_write_per_call(40));
        let mut handle = backend.open("FAKE0", &PortConfig::default()).unwrap();

        assert_eq!(handle.write(&[7u8; 100]).unwrap(), 40);
        assert_eq!(backend.write_log("FAKE0")[0].len(), 40);
    }

    #[test]
    fn test_empty_read_is_not_an_error() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        let mut handle = backend.open("FAKE0", &PortConfig::default()).unwrap();
        assert!(handle.read(10).unwrap().is_empty());
    }

    #[test]
    fn test_read_respects_max_len() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        backend.push_rx("FAKE0", b"Hello, World!");
        let mut handle = backend.open("FAKE0", &PortConfig::default()).unwrap();

        assert_eq!(handle.read(5).unwrap(), b"Hello".to_vec());
        assert_eq!(handle.read(64).unwrap(), b", World!".to_vec());
    }

    #[test]
    fn test_missing_device() {
        let backend = FakeBackend::new();
        let err = backend.open("/dev/ttyFAKE0", &PortConfig::default()).unwrap_err();
        assert!(err.to_string().contains("No such"));
        assert_eq!(backend.calls().opens, 1);
    }

    #[test]
    fn test_second_open_is_busy() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        let _first = backend.open("FAKE0", &PortConfig::default()).unwrap();
        let err = backend.open("FAKE0", &PortConfig::default()).unwrap_err();
        assert!(matches!(err, PortError::Open { .. }));
    }

    #[test]
    fn test_drop_releases_device() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        let handle = backend.open("FAKE0", &PortConfig::default()).unwrap();
        assert!(backend.is_held("FAKE0"));

        drop(handle);
        assert!(!backend.is_held("FAKE0"));
        assert_eq!(backend.calls().closes, 1);
    }

    #[test]
    fn test_config_failure_unwinds_acquisition() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        backend.fail_next(FakeFailure::Config);

        let err = backend.open("FAKE0", &PortConfig::default()).unwrap_err();
        assert!(matches!(err, PortError::Config { .. }));
        assert!(!backend.is_held("FAKE0"));
        assert_eq!(backend.calls().closes, 1);
    }

    #[test]
    fn test_failed_close_still_releases() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        let handle = backend.open("FAKE0", &PortConfig::default()).unwrap();
        backend.fail_next(FakeFailure::Close);

        assert!(handle.close().is_err());
        assert!(!backend.is_held("FAKE0"));
        assert_eq!(backend.calls().closes, 1);
    }

    #[test]
    fn test_unplugged_device_fails_io() {
        let backend = backend_with("FAKE0", FakeDevice::new());
        let mut handle = backend.open("FAKE0", &PortConfig::default()).unwrap();
        backend.remove_device("FAKE0");

        assert!(matches!(handle.read(4), Err(PortError::Io(_))));
        assert!(matches!(handle.write(b"x"), Err(PortError::Io(_))));
    }

    #[test]
    fn test_permission_check() {
        let backend = FakeBackend::new();
        backend.add_device("OK0", FakeDevice::new());
        backend.add_device("DENIED0", FakeDevice::new().permission_denied());

        assert!(backend.check_permission("OK0").is_ok());
        assert_eq!(
            backend.check_permission("DENIED0").unwrap_err().kind(),
            io::ErrorKind::PermissionDenied
        );
        assert_eq!(
            backend.check_permission("MISSING0").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_posix_rates_reject_odd_baud() {
        let backend = FakeBackend::with_posix_rates();
        backend.add_device("FAKE0", FakeDevice::new());

        let err = backend.open("FAKE0", &PortConfig::new(1337)).unwrap_err();
        assert!(matches!(err, PortError::UnsupportedBaudRate(1337)));
        assert_eq!(backend.calls().opens, 0);
    }
}
