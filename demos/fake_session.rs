//! Session lifecycle against the in-memory backend.
//!
//! Runs without hardware: opens a simulated loopback device, sends a frame
//! containing zero bytes, reads it back, then shows partial writes and the
//! error codes a caller sees.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example fake_session
//! ```

use serial_com::port::{FakeBackend, FakeDevice};
use serial_com::{PortConfig, PortSession, SerialResult};

fn main() -> SerialResult<()> {
    let backend = FakeBackend::new();
    backend.add_device("/dev/ttyFAKE0", FakeDevice::new().loopback());
    backend.add_device("/dev/ttyFAKE1", FakeDevice::new().max_write_per_call(8));

    let mut session = PortSession::new(backend.clone());
    let handle = session.open("/dev/ttyFAKE0", &PortConfig::new(115200))?;
    println!("opened /dev/ttyFAKE0 as handle {handle}");

    let frame = [0x02, b'H', 0x00, b'I', 0x03];
    let outcome = session.write(&frame)?;
    println!("wrote {}/{} bytes", outcome.written, outcome.requested);

    let echoed = session.read(64)?;
    println!("read back {:02X?}", echoed);

    // Re-opening closes the loopback handle first.
    session.open("/dev/ttyFAKE1", &PortConfig::new(9600))?;
    let outcome = session.write(b"a longer message")?;
    println!(
        "short write: {} accepted, {} remaining",
        outcome.written,
        outcome.remaining()
    );

    session.close()?;
    match session.write(b"late") {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("after close: {} ({})", e.code(), e),
    }

    match session.open("/dev/ttyMISSING", &PortConfig::default()) {
        Ok(_) => println!("unexpected success"),
        Err(e) => println!("missing device: {} ({})", e.code(), e),
    }

    println!("native calls: {:?}", backend.calls());
    Ok(())
}
