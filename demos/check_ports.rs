//! Check available serial ports on the system.
//!
//! Lists every device the host enumerator reports and probes read/write
//! access on each, which is useful for hardware testing and debugging.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example check_ports
//! ```

use serial_com::{NativeBackend, SerialBackend};

fn main() {
    let backend = NativeBackend::default();

    println!("Serial Port Detection Utility");
    println!("Platform: {}", backend.platform_version());
    println!("{:=<70}", "");
    println!();

    let devices = backend.list_devices();
    if devices.is_empty() {
        println!("No serial ports detected on this system");
        println!();
        println!("This could mean:");
        println!("  - No serial devices are connected");
        println!("  - USB-to-serial drivers are not installed");
        println!("  - Devices use a name prefix outside the configured list");
        return;
    }

    println!("Found {} serial port(s):", devices.len());
    println!();

    for (idx, device) in devices.iter().enumerate() {
        let access = match backend.check_permission(device) {
            Ok(()) => "read/write".to_string(),
            Err(e) => format!("denied ({e})"),
        };
        println!("{}. {:<40} {}", idx + 1, device, access);
    }
}
