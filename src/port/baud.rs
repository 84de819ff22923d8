//! Baud rate resolution.
//!
//! POSIX termios only guarantees the closed set of `Bnnn` speeds, so a
//! requested rate must be looked up and rejected when absent. Windows takes the integer in `DCB::BaudRate`
//! directly and only needs a sanity check.

use super::error::PortError;
#[cfg(unix)]
use rustix::termios::speed;

/// Rates with a `Bnnn` constant on every supported POSIX target.
#[cfg(unix)]
const COMMON_POSIX_SPEEDS: &[(u32, u32)] = &[
    (50, speed::B50),
    (75, speed::B75),
    (110, speed::B110),
    (134, speed::B134),
    (150, speed::B150),
    (200, speed::B200),
    (300, speed::B300),
    (600, speed::B600),
    (1200, speed::B1200),
    (1800, speed::B1800),
    (2400, speed::B2400),
    (4800, speed::B4800),
    (9600, speed::B9600),
    (19200, speed::B19200),
    (38400, speed::B38400),
    (57600, speed::B57600),
    (115200, speed::B115200),
    (230400, speed::B230400),
];

/// High speeds only Linux defines.
#[cfg(any(target_os = "linux", target_os = "android"))]
const EXTENDED_POSIX_SPEEDS: &[(u32, u32)] = &[
    (460800, speed::B460800),
    (500000, speed::B500000),
    (576000, speed::B576000),
    (921600, speed::B921600),
    (1000000, speed::B1000000),
    (1152000, speed::B1152000),
    (1500000, speed::B1500000),
    (2000000, speed::B2000000),
    (2500000, speed::B2500000),
    (3000000, speed::B3000000),
    (3500000, speed::B3500000),
    (4000000, speed::B4000000),
];

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
const EXTENDED_POSIX_SPEEDS: &[(u32, u32)] = &[];

/// Speed value handed to the platform layer.
pub type NativeSpeed = u32;

#[cfg(unix)]
fn posix_speeds() -> impl Iterator<Item = &'static (u32, u32)> {
    COMMON_POSIX_SPEEDS.iter().chain(EXTENDED_POSIX_SPEEDS.iter())
}

/// Every baud rate the POSIX backend accepts on this target, ascending.
#[cfg(unix)]
pub fn supported_posix_rates() -> Vec<u32> {
    posix_speeds().map(|(rate, _)| *rate).collect()
}

/// Map a requested rate onto its `Bnnn` constant.
///
/// Fails with [`PortError::UnsupportedBaudRate`] instead of rounding to a
/// neighbouring speed.
#[cfg(unix)]
pub fn resolve_posix(requested: u32) -> Result<NativeSpeed, PortError> {
    posix_speeds()
        .find(|(rate, _)| *rate == requested)
        .map(|(_, speed)| *speed)
        .ok_or(PortError::UnsupportedBaudRate(requested))
}

/// Validate a requested rate for `DCB::BaudRate`.
pub fn resolve_windows(requested: u32) -> Result<u32, PortError> {
    if requested == 0 {
        return Err(PortError::UnsupportedBaudRate(requested));
    }
    Ok(requested)
}

/// Resolve a requested rate for the host platform.
pub fn resolve(requested: u32) -> Result<NativeSpeed, PortError> {
    #[cfg(unix)]
    {
        resolve_posix(requested)
    }

    #[cfg(not(unix))]
    {
        resolve_windows(requested)
    }
}
