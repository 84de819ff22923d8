//! Shared test utilities for serial-com integration tests.
//!
//! Builders for fake backends with devices already plugged in, so each test
//! starts from a known set of simulated ports.

#![allow(dead_code)]

use serial_com::port::{FakeBackend, FakeDevice};
use serial_com::{PortConfig, PortSession};

/// Device path used by most tests.
pub const LOOPBACK: &str = "/dev/ttyFAKE_LOOP";

/// A second device for re-open tests.
pub const SECOND: &str = "/dev/ttyFAKE_B";

/// Backend with a loopback device and a plain device.
pub fn backend_with_loopback() -> FakeBackend {
    let backend = FakeBackend::new();
    backend.add_device(LOOPBACK, FakeDevice::new().loopback());
    backend.add_device(SECOND, FakeDevice::new());
    backend
}

/// Backend holding a single device with the given behaviour.
pub fn backend_with(path: &str, device: FakeDevice) -> FakeBackend {
    let backend = FakeBackend::new();
    backend.add_device(path, device);
    backend
}

/// A session already open on `path` at 9600 baud.
pub fn open_session(backend: &FakeBackend, path: &str) -> PortSession<FakeBackend> {
    let mut session = PortSession::new(backend.clone());
    session
        .open(path, &PortConfig::new(9600))
        .expect("Failed to open fake device");
    session
}
