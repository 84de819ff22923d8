//! POSIX termios backend.
//!
//! Opens the device file with `O_NOCTTY`, switches the line to raw 8N1,
//! takes `TIOCEXCL` and hands back an owned descriptor. The descriptor lives
//! in an [`OwnedFd`] from the moment `open(2)` succeeds, so every early return
//! in the configuration path closes it.

use super::baud::{self, NativeSpeed};
use super::error::PortError;
use super::traits::{HandleId, PortConfig, PortHandle, SerialBackend};
use super::{DEFAULT_DEVICE_PREFIXES, READ_CHUNK_LIMIT};
use rustix::fs::{Access, Mode, OFlags};
use rustix::io::Errno;
use rustix::termios::{
    self, ControlModes, InputModes, OptionalActions, QueueSelector, SpecialCodeIndex,
};
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};
use std::path::PathBuf;
use tracing::{debug, info, trace};

/// termios-based backend for Linux, macOS and the BSDs.
#[derive(Debug, Clone)]
pub struct PosixBackend {
    device_dir: PathBuf,
    prefixes: Vec<String>,
}

impl Default for PosixBackend {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            prefixes: DEFAULT_DEVICE_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl PosixBackend {
    /// Backend scanning `/dev` with the default prefixes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the device-file prefixes used for enumeration.
    pub fn with_device_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Enumerate a directory other than `/dev`.
    pub fn with_device_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.device_dir = dir.into();
        self
    }
}

fn config_error(path: &str, call: &str, err: Errno) -> PortError {
    PortError::config(path, format!("Error from {call}: {}", io::Error::from(err)))
}

/// Apply raw 8N1, the speed and the read timeout to an open descriptor.
fn configure(
    fd: &OwnedFd,
    path: &str,
    speed: NativeSpeed,
    config: &PortConfig,
) -> Result<(), PortError> {
    let mut tty = termios::tcgetattr(fd).map_err(|e| config_error(path, "tcgetattr", e))?;

    tty.make_raw();
    tty.control_modes &= !(ControlModes::CSIZE
        | ControlModes::PARENB
        | ControlModes::CSTOPB
        | ControlModes::CRTSCTS);
    tty.control_modes |= ControlModes::CS8 | ControlModes::CLOCAL | ControlModes::CREAD;
    tty.input_modes &= !(InputModes::IXOFF | InputModes::IXANY);
    tty.special_codes[SpecialCodeIndex::VMIN] = 0;
    tty.special_codes[SpecialCodeIndex::VTIME] = config.timeouts.posix_vtime();

    tty.set_speed(speed).map_err(|e| {
        PortError::config(
            path,
            format!(
                "Error setting speed {}: {}",
                config.baud_rate,
                io::Error::from(e)
            ),
        )
    })?;

    termios::tcsetattr(fd, OptionalActions::Now, &tty)
        .map_err(|e| config_error(path, "tcsetattr", e))?;

    // Stale input from before the open is not part of this session.
    if let Err(e) = termios::tcflush(fd, QueueSelector::IOFlush) {
        debug!(path, error = %e, "tcflush failed");
    }

    // Opened non-blocking so a missing carrier cannot hang open(2); reads
    // from here on block under VMIN/VTIME.
    let flags = rustix::fs::fcntl_getfl(fd).map_err(|e| config_error(path, "fcntl", e))?;
    rustix::fs::fcntl_setfl(fd, flags.difference(OFlags::NONBLOCK))
        .map_err(|e| config_error(path, "fcntl", e))?;

    Ok(())
}

impl SerialBackend for PosixBackend {
    type Handle = PosixHandle;

    fn open(&self, path: &str, config: &PortConfig) -> Result<PosixHandle, PortError> {
        let speed = baud::resolve_posix(config.baud_rate)?;

        let fd = rustix::fs::open(
            path,
            OFlags::RDWR | OFlags::NOCTTY | OFlags::NONBLOCK | OFlags::SYNC | OFlags::CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| PortError::open(path, e.into()))?;

        configure(&fd, path, speed, config)?;

        termios::ioctl_tiocexcl(&fd).map_err(|e| PortError::open(path, e.into()))?;

        info!(path, fd = fd.as_raw_fd(), baud = config.baud_rate, "opened serial port");
        Ok(PosixHandle {
            fd,
            path: path.to_string(),
        })
    }

    fn list_devices(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.device_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.device_dir.display(), error = %e, "device scan failed");
                return Vec::new();
            }
        };

        let mut devices: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
            })
            .map(|entry| entry.path().to_string_lossy().into_owned())
            .collect();
        devices.sort();
        devices
    }

    fn check_permission(&self, path: &str) -> io::Result<()> {
        rustix::fs::access(path, Access::READ_OK | Access::WRITE_OK).map_err(io::Error::from)
    }

    fn platform_version(&self) -> String {
        let uts = rustix::system::uname();
        format!(
            "{} {}",
            uts.sysname().to_string_lossy(),
            uts.release().to_string_lossy()
        )
    }
}

/// An open, configured terminal device.
#[derive(Debug)]
pub struct PosixHandle {
    fd: OwnedFd,
    path: String,
}

impl PosixHandle {
    /// Path the handle was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PortHandle for PosixHandle {
    fn id(&self) -> HandleId {
        HandleId(self.fd.as_raw_fd() as i64)
    }

    fn is_open(&self) -> bool {
        self.fd.as_raw_fd() >= 0
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        if data.is_empty() {
            return Ok(0);
        }
        let n = rustix::io::write(&self.fd, data).map_err(|e| PortError::Io(e.into()))?;
        trace!(path = %self.path, requested = data.len(), written = n, "write");
        Ok(n)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, PortError> {
        if max_len == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; max_len.min(READ_CHUNK_LIMIT)];
        let n = match rustix::io::read(&self.fd, &mut buffer[..]) {
            Ok(n) => n,
            Err(e) if e == Errno::AGAIN || e == Errno::INTR => return Ok(Vec::new()),
            Err(e) => return Err(PortError::Io(e.into())),
        };
        buffer.truncate(n);
        trace!(path = %self.path, bytes = buffer.len(), "read");
        Ok(buffer)
    }

    fn close(self) -> Result<(), PortError> {
        let raw = self.fd.into_raw_fd();
        // SAFETY: `raw` was just released from the handle's `OwnedFd`, so no
        // other owner can close or reuse it.
        if unsafe { libc::close(raw) } != 0 {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        info!(path = %self.path, fd = raw, "closed serial port");
        Ok(())
    }
}
