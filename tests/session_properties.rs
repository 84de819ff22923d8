//! Lifecycle properties of `PortSession` over the in-memory backend.
//!
//! Covers:
//! - Precondition checks that must not reach the platform layer
//! - Re-open ordering and idempotent close
//! - Binary-safe transfer and partial writes
//! - Error classification for failed opens, closes and I/O

mod common;

use common::{backend_with, backend_with_loopback, open_session, LOOPBACK, SECOND};
use pretty_assertions::assert_eq;
use serial_com::port::{FakeDevice, FakeEvent, FakeFailure};
use serial_com::{HandleId, PortConfig, PortSession, SerialError, SessionState};

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn test_closed_session_makes_no_native_calls() {
    let backend = backend_with_loopback();
    let mut session = PortSession::new(backend.clone());

    assert_eq!(session.write(b"hello"), Err(SerialError::NotOpen));
    assert_eq!(session.read(16), Err(SerialError::NotOpen));
    assert!(session.close().is_ok());

    let calls = backend.calls();
    assert_eq!(calls.writes, 0);
    assert_eq!(calls.reads, 0);
    assert_eq!(calls.closes, 0);
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_zero_length_read_on_open_session() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    assert!(session.read(0).unwrap().is_empty());
    assert_eq!(backend.calls().reads, 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_reopen_closes_previous_handle_first() {
    let backend = backend_with_loopback();
    let mut session = PortSession::new(backend.clone());

    let first = session.open(LOOPBACK, &PortConfig::new(9600)).unwrap();
    let second = session.open(SECOND, &PortConfig::new(19200)).unwrap();

    assert_ne!(first, second);
    assert_eq!(
        backend.events(),
        vec![
            FakeEvent::Opened {
                path: LOOPBACK.to_string(),
                id: first
            },
            FakeEvent::Closed {
                path: LOOPBACK.to_string(),
                id: first
            },
            FakeEvent::Opened {
                path: SECOND.to_string(),
                id: second
            },
        ]
    );
    assert!(!backend.is_held(LOOPBACK));
    assert!(backend.is_held(SECOND));
    assert_eq!(session.path(), Some(SECOND));
}

#[test]
fn test_reopen_same_path() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    session.open(LOOPBACK, &PortConfig::new(115200)).unwrap();

    assert!(session.is_open());
    assert_eq!(backend.baud_rate(LOOPBACK), Some(115200));
    assert_eq!(backend.calls().closes, 1);
}

#[test]
fn test_reopen_survives_failed_close_of_previous_handle() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    backend.fail_next(FakeFailure::Close);
    let second = session.open(SECOND, &PortConfig::new(9600)).unwrap();

    assert!(!backend.is_held(LOOPBACK));
    assert!(backend.is_held(SECOND));
    assert_eq!(session.handle_id(), Some(second));
    assert_eq!(session.path(), Some(SECOND));
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn test_double_close_is_idempotent() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    session.close().unwrap();
    session.close().unwrap();

    assert_eq!(backend.calls().closes, 1);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.handle_id(), None);
}

#[test]
fn test_drop_releases_device() {
    let backend = backend_with_loopback();
    {
        let _session = open_session(&backend, LOOPBACK);
        assert!(backend.is_held(LOOPBACK));
    }
    assert!(!backend.is_held(LOOPBACK));
}

// ============================================================================
// Data transfer
// ============================================================================

#[test]
fn test_loopback_preserves_embedded_zero_bytes() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);
    let payload = [0x02, 0x00, 0x41, 0x00, 0x00, 0x03];

    let outcome = session.write(&payload).unwrap();
    assert_eq!(outcome.written, payload.len());
    assert!(!outcome.is_partial());

    let echoed = session.read(64).unwrap();
    assert_eq!(echoed.len(), payload.len());
    assert_eq!(echoed, payload.to_vec());
}

#[test]
fn test_read_respects_max_len() {
    let backend = backend_with(LOOPBACK, FakeDevice::new());
    backend.push_rx(LOOPBACK, b"0123456789");
    let mut session = open_session(&backend, LOOPBACK);

    assert_eq!(session.read(4).unwrap(), b"0123".to_vec());
    assert_eq!(session.read(64).unwrap(), b"456789".to_vec());
    assert!(session.read(64).unwrap().is_empty());
    assert_eq!(session.stats().bytes_read_total, 10);
}

#[test]
fn test_unbounded_read_len_returns_available_bytes() {
    let backend = backend_with(LOOPBACK, FakeDevice::new());
    backend.push_rx(LOOPBACK, &[0x00, 0x01, 0x02]);
    let mut session = open_session(&backend, LOOPBACK);

    assert_eq!(session.read(usize::MAX).unwrap(), vec![0x00, 0x01, 0x02]);
    assert!(session.read(usize::MAX).unwrap().is_empty());
}

#[test]
fn test_partial_write_reports_count() {
    let backend = backend_with(LOOPBACK, FakeDevice::new().max_write_per_call(40));
    let mut session = open_session(&backend, LOOPBACK);

    let outcome = session.write(&[0xA5; 100]).unwrap();

    assert_eq!(outcome.written, 40);
    assert_eq!(outcome.remaining(), 60);
    assert!(outcome.is_partial());
    assert_eq!(backend.calls().writes, 1);
}

#[test]
fn test_write_failure_keeps_session_open() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    backend.fail_next(FakeFailure::Write);
    let err = session.write(b"x").unwrap_err();
    assert_eq!(err.code(), "WRITE_ERROR");
    assert!(session.is_open());

    assert_eq!(session.write(b"y").unwrap().written, 1);
}

#[test]
fn test_read_failure_classified() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    backend.fail_next(FakeFailure::Read);
    assert!(matches!(session.read(8), Err(SerialError::Read(_))));
}

// ============================================================================
// Open and close failures
// ============================================================================

#[test]
fn test_missing_device_is_open_error() {
    let backend = backend_with_loopback();
    let mut session = PortSession::new(backend.clone());

    let err = session
        .open("/dev/ttyFAKE0", &PortConfig::new(9600))
        .unwrap_err();

    match &err {
        SerialError::Open(diagnostic) => assert!(diagnostic.contains("No such")),
        other => panic!("expected open error, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_busy_device_is_open_error() {
    let backend = backend_with_loopback();
    let _holder = open_session(&backend, LOOPBACK);
    let mut session = PortSession::new(backend.clone());

    let err = session.open(LOOPBACK, &PortConfig::new(9600)).unwrap_err();
    assert_eq!(err.code(), "OPEN_ERROR");
    assert!(!session.is_open());
}

#[test]
fn test_config_failure_releases_device() {
    let backend = backend_with_loopback();
    let mut session = PortSession::new(backend.clone());

    backend.fail_next(FakeFailure::Config);
    let err = session.open(LOOPBACK, &PortConfig::new(9600)).unwrap_err();

    assert!(matches!(err, SerialError::Config(_)));
    assert!(!backend.is_held(LOOPBACK));
    assert_eq!(backend.calls().opens, backend.calls().closes);
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_close_failure_still_closes() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    backend.fail_next(FakeFailure::Close);
    assert!(matches!(session.close(), Err(SerialError::Close(_))));

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!backend.is_held(LOOPBACK));
    assert_eq!(session.write(b"x"), Err(SerialError::NotOpen));
}

#[test]
fn test_failed_reopen_leaves_session_closed() {
    let backend = backend_with_loopback();
    let mut session = open_session(&backend, LOOPBACK);

    assert!(session.open("/dev/ttyGONE", &PortConfig::new(9600)).is_err());

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!backend.is_held(LOOPBACK));
}

#[test]
fn test_zero_baud_rejected_before_open() {
    let backend = backend_with_loopback();
    let mut session = PortSession::new(backend.clone());

    let err = session.open(LOOPBACK, &PortConfig::new(0)).unwrap_err();
    assert_eq!(err, SerialError::UnsupportedBaudRate(0));
    assert_eq!(backend.calls().opens, 0);
}

#[cfg(unix)]
#[test]
fn test_posix_rate_table() {
    let backend = serial_com::port::FakeBackend::with_posix_rates();
    backend.add_device(LOOPBACK, FakeDevice::new());
    let mut session = PortSession::new(backend.clone());

    for rate in [9600, 19200, 38400, 57600, 115200] {
        session.open(LOOPBACK, &PortConfig::new(rate)).unwrap();
        assert_eq!(backend.baud_rate(LOOPBACK), Some(rate));
    }

    let err = session.open(LOOPBACK, &PortConfig::new(1337)).unwrap_err();
    assert_eq!(err, SerialError::UnsupportedBaudRate(1337));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_handle_ids_are_distinct() {
    let backend = backend_with_loopback();
    let a = open_session(&backend, LOOPBACK);
    let b = open_session(&backend, SECOND);

    let ids: Vec<HandleId> = [a.handle_id(), b.handle_id()]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}
