//! Windows communications API backend.
//!
//! `CreateFileW` with no sharing gives exclusive access, `SetCommState` puts
//! the port into binary 8N1 without flow control and `SetCommTimeouts` applies
//! the bounded-wait policy. Devices are enumerated from
//! `HARDWARE\DEVICEMAP\SERIALCOMM`.

use super::baud;
use super::error::PortError;
use super::traits::{HandleId, PortConfig, PortHandle, SerialBackend};
use super::READ_CHUNK_LIMIT;
use std::ffi::OsStr;
use std::io;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use tracing::{debug, info, trace};
use winapi::shared::minwindef::{DWORD, FALSE, HKEY};
use winapi::shared::winerror::{ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use winapi::um::commapi::{GetCommState, PurgeComm, SetCommState, SetCommTimeouts};
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winbase::{
    COMMTIMEOUTS, DCB, DTR_CONTROL_ENABLE, NOPARITY, ONESTOPBIT, PURGE_RXCLEAR, PURGE_TXCLEAR,
    RTS_CONTROL_ENABLE,
};
use winapi::um::winnt::{
    FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, HANDLE, KEY_READ, REG_SZ,
};
use winapi::um::winreg::{
    RegCloseKey, RegEnumValueW, RegOpenKeyExW, RegQueryValueExW, HKEY_LOCAL_MACHINE,
};

const SERIALCOMM_KEY: &str = r"HARDWARE\DEVICEMAP\SERIALCOMM";
const CURRENT_VERSION_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion";

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(once(0)).collect()
}

/// Route bare names through the device namespace so `COM10` and above open.
pub fn device_path(path: &str) -> String {
    if path.starts_with(r"\\") {
        path.to_string()
    } else {
        format!(r"\\.\{path}")
    }
}

/// Read-only registry key, closed on drop.
struct RegKey(HKEY);

impl RegKey {
    fn open_local_machine(subkey: &str) -> io::Result<Self> {
        let subkey = wide(subkey);
        let mut hkey: HKEY = ptr::null_mut();
        // SAFETY: `subkey` is NUL-terminated and outlives the call; `hkey` is a
        // valid out-pointer.
        let status =
            unsafe { RegOpenKeyExW(HKEY_LOCAL_MACHINE, subkey.as_ptr(), 0, KEY_READ, &mut hkey) };
        if status != ERROR_SUCCESS as i32 {
            return Err(io::Error::from_raw_os_error(status));
        }
        Ok(Self(hkey))
    }

    /// All `REG_SZ` values as `(name, data)` pairs.
    fn string_values(&self) -> Vec<(String, String)> {
        let mut values = Vec::new();
        let mut index: DWORD = 0;
        loop {
            let mut name = [0u16; 256];
            let mut name_len = name.len() as DWORD;
            let mut data = [0u8; 512];
            let mut data_len = data.len() as DWORD;
            let mut value_type: DWORD = 0;

            // SAFETY: the key is open for the lifetime of `self`; both buffers
            // are local and their lengths are passed alongside them.
            let status = unsafe {
                RegEnumValueW(
                    self.0,
                    index,
                    name.as_mut_ptr(),
                    &mut name_len,
                    ptr::null_mut(),
                    &mut value_type,
                    data.as_mut_ptr(),
                    &mut data_len,
                )
            };
            index += 1;

            if status == ERROR_NO_MORE_ITEMS as i32 {
                break;
            }
            if status != ERROR_SUCCESS as i32 {
                debug!(status, index, "skipping unreadable registry value");
                continue;
            }
            if value_type != REG_SZ {
                continue;
            }
            let name = String::from_utf16_lossy(&name[..name_len as usize]);
            values.push((name, decode_reg_sz(&data[..data_len as usize])));
        }
        values
    }

    fn query_string(&self, name: &str) -> Option<String> {
        let name = wide(name);
        let mut data = [0u8; 512];
        let mut data_len = data.len() as DWORD;
        let mut value_type: DWORD = 0;
        // SAFETY: `name` is NUL-terminated; `data` is local and its length is
        // passed alongside it.
        let status = unsafe {
            RegQueryValueExW(
                self.0,
                name.as_ptr(),
                ptr::null_mut(),
                &mut value_type,
                data.as_mut_ptr(),
                &mut data_len,
            )
        };
        if status != ERROR_SUCCESS as i32 || value_type != REG_SZ {
            return None;
        }
        Some(decode_reg_sz(&data[..data_len as usize]))
    }
}

impl Drop for RegKey {
    fn drop(&mut self) {
        // SAFETY: the key was opened by `open_local_machine` and is closed once.
        unsafe { RegCloseKey(self.0) };
    }
}

fn decode_reg_sz(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Comm-API backend.
#[derive(Debug, Clone, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for WindowsBackend {
    type Handle = WindowsHandle;

    fn open(&self, path: &str, config: &PortConfig) -> Result<WindowsHandle, PortError> {
        let baud_rate = baud::resolve_windows(config.baud_rate)?;
        let name = wide(&device_path(path));

        // SAFETY: `name` is NUL-terminated and outlives the call; null security
        // attributes and template are permitted.
        let raw = unsafe {
            CreateFileW(
                name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(PortError::open(path, io::Error::last_os_error()));
        }
        // Closed by Drop on every error path below.
        let handle = WindowsHandle {
            handle: raw,
            path: path.to_string(),
        };

        // SAFETY: DCB is plain old data; all-zero is a valid bit pattern.
        let mut dcb: DCB = unsafe { std::mem::zeroed() };
        dcb.DCBlength = std::mem::size_of::<DCB>() as DWORD;
        // SAFETY: `handle` is a valid comm handle owned by this function.
        if unsafe { GetCommState(handle.handle, &mut dcb) } == FALSE {
            return Err(PortError::config(
                path,
                format!("Error from GetCommState: {}", io::Error::last_os_error()),
            ));
        }

        dcb.BaudRate = baud_rate;
        dcb.ByteSize = 8;
        dcb.Parity = NOPARITY;
        dcb.StopBits = ONESTOPBIT;
        dcb.set_fBinary(1);
        dcb.set_fParity(0);
        dcb.set_fOutxCtsFlow(0);
        dcb.set_fOutxDsrFlow(0);
        dcb.set_fDsrSensitivity(0);
        dcb.set_fOutX(0);
        dcb.set_fInX(0);
        dcb.set_fErrorChar(0);
        dcb.set_fNull(0);
        dcb.set_fAbortOnError(0);
        dcb.set_fDtrControl(DTR_CONTROL_ENABLE);
        dcb.set_fRtsControl(RTS_CONTROL_ENABLE);

        // SAFETY: as above; `dcb` was initialised by GetCommState.
        if unsafe { SetCommState(handle.handle, &mut dcb) } == FALSE {
            return Err(PortError::config(
                path,
                format!("Error from SetCommState: {}", io::Error::last_os_error()),
            ));
        }

        let policy = &config.timeouts;
        let mut timeouts = COMMTIMEOUTS {
            ReadIntervalTimeout: policy.read_interval_ms,
            ReadTotalTimeoutMultiplier: policy.read_multiplier_ms,
            ReadTotalTimeoutConstant: policy.read_constant_ms,
            WriteTotalTimeoutMultiplier: policy.write_multiplier_ms,
            WriteTotalTimeoutConstant: policy.write_constant_ms,
        };
        // SAFETY: valid handle and a fully initialised COMMTIMEOUTS.
        if unsafe { SetCommTimeouts(handle.handle, &mut timeouts) } == FALSE {
            return Err(PortError::config(
                path,
                format!("Error from SetCommTimeouts: {}", io::Error::last_os_error()),
            ));
        }

        // SAFETY: valid handle; failure only leaves stale bytes queued.
        unsafe { PurgeComm(handle.handle, PURGE_RXCLEAR | PURGE_TXCLEAR) };

        info!(path, baud = baud_rate, "opened serial port");
        Ok(handle)
    }

    fn list_devices(&self) -> Vec<String> {
        match RegKey::open_local_machine(SERIALCOMM_KEY) {
            Ok(key) => key
                .string_values()
                .into_iter()
                .map(|(_, device)| device)
                .collect(),
            Err(e) => {
                debug!(error = %e, "SERIALCOMM key unavailable");
                Vec::new()
            }
        }
    }

    fn check_permission(&self, _path: &str) -> io::Result<()> {
        Ok(())
    }

    fn platform_version(&self) -> String {
        let build = RegKey::open_local_machine(CURRENT_VERSION_KEY)
            .ok()
            .and_then(|key| key.query_string("CurrentBuildNumber"))
            .and_then(|build| build.trim().parse::<u32>().ok());
        match build {
            Some(build) if build >= 10240 => format!("Windows 10+ (build {build})"),
            Some(build) => format!("Windows (build {build})"),
            None => "Windows".to_string(),
        }
    }
}

/// An open, configured COM port.
#[derive(Debug)]
pub struct WindowsHandle {
    handle: HANDLE,
    path: String,
}

// SAFETY: the HANDLE is exclusively owned and only used through &mut self.
unsafe impl Send for WindowsHandle {}

impl WindowsHandle {
    /// Path the handle was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PortHandle for WindowsHandle {
    fn id(&self) -> HandleId {
        HandleId(self.handle as isize as i64)
    }

    fn is_open(&self) -> bool {
        self.handle != INVALID_HANDLE_VALUE
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        if data.is_empty() {
            return Ok(0);
        }
        let len = data.len().min(DWORD::MAX as usize) as DWORD;
        let mut written: DWORD = 0;
        // SAFETY: the handle is open; `data` is valid for `len` bytes and no
        // OVERLAPPED is used.
        let ok = unsafe {
            WriteFile(
                self.handle,
                data.as_ptr() as *const _,
                len,
                &mut written,
                ptr::null_mut(),
            )
        };
        if ok == FALSE {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        trace!(path = %self.path, requested = data.len(), written, "write");
        Ok(written as usize)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, PortError> {
        if max_len == 0 {
            return Ok(Vec::new());
        }
        let len = max_len.min(READ_CHUNK_LIMIT);
        let mut buffer = vec![0u8; len];
        let mut read: DWORD = 0;
        // SAFETY: the handle is open; `buffer` is valid for `len` bytes and no
        // OVERLAPPED is used.
        let ok = unsafe {
            ReadFile(
                self.handle,
                buffer.as_mut_ptr() as *mut _,
                len as DWORD,
                &mut read,
                ptr::null_mut(),
            )
        };
        if ok == FALSE {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        buffer.truncate(read as usize);
        trace!(path = %self.path, bytes = buffer.len(), "read");
        Ok(buffer)
    }

    fn close(mut self) -> Result<(), PortError> {
        let raw = std::mem::replace(&mut self.handle, INVALID_HANDLE_VALUE);
        if raw == INVALID_HANDLE_VALUE {
            return Ok(());
        }
        // SAFETY: `raw` was swapped out of the handle, so it is closed once.
        if unsafe { CloseHandle(raw) } == FALSE {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        info!(path = %self.path, "closed serial port");
        Ok(())
    }
}

impl Drop for WindowsHandle {
    fn drop(&mut self) {
        if self.handle != INVALID_HANDLE_VALUE {
            // SAFETY: the handle is still owned and is invalidated right after.
            unsafe { CloseHandle(self.handle) };
            self.handle = INVALID_HANDLE_VALUE;
        }
    }
}
