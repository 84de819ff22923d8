use clap::{Parser, Subcommand};
use serde::Serialize;
use serial_com::config::{Config, ConfigLoader};
use serial_com::{logging, HandleId, NativeBackend, PortService, SerialError};
use std::path::PathBuf;
use tracing::{debug, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-com",
    version,
    about = "Open, configure and exchange bytes with serial devices.",
    long_about = "Cross-platform serial port tool. Lists devices, probes access rights and performs a single raw 8N1 write/read exchange against a port."
)]
struct Args {
    /// Configuration file to load instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial devices present right now.
    List {
        /// Print JSON instead of one path per line.
        #[arg(long)]
        json: bool,
    },
    /// Check read/write access to a device.
    Check {
        /// Device path or configured alias.
        port: String,
    },
    /// Print the host platform version.
    Version,
    /// Open a port, write once, read once and close it.
    Exchange {
        /// Device path or configured alias.
        port: String,
        /// Baud rate; defaults to `serial.default_baud`.
        #[arg(short, long)]
        baud: Option<u32>,
        /// Text payload to write.
        #[arg(short, long, conflicts_with = "hex")]
        data: Option<String>,
        /// Hex payload to write, e.g. "02 41 00 03".
        #[arg(long)]
        hex: Option<String>,
        /// Maximum number of bytes to read back; 0 skips the read.
        #[arg(short, long, default_value_t = 256)]
        read: usize,
    },
}

#[derive(Serialize)]
struct DeviceListing<'a> {
    platform: String,
    devices: &'a [String],
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let loader = match path {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(loader.into_config())
}

/// Parse whitespace-separated or contiguous hex digits into bytes.
fn parse_hex(input: &str) -> Result<Vec<u8>, String> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        return Err(format!("non-hex characters in '{input}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{input}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn transfer(
    service: &mut PortService<NativeBackend>,
    handle: HandleId,
    payload: &[u8],
    read_len: usize,
) -> Result<(), SerialError> {
    if !payload.is_empty() {
        let written = service.write_to_port(handle, payload)?;
        println!("wrote {written}/{} bytes", payload.len());
    }
    if read_len > 0 {
        let data = service.read_from_port(handle, read_len)?;
        if data.is_empty() {
            println!("read timed out with no data");
        } else {
            println!("read {} bytes: {}", data.len(), format_hex(&data));
            println!("text: {}", String::from_utf8_lossy(&data));
        }
    }
    Ok(())
}

fn exchange(
    service: &mut PortService<NativeBackend>,
    port: &str,
    baud: u32,
    payload: &[u8],
    read_len: usize,
) -> Result<(), SerialError> {
    let handle = service.open_port(port, baud)?;
    debug!(%handle, port, baud, "port opened");

    let result = transfer(service, handle, payload, read_len);
    if let Err(e) = service.close_port(handle) {
        warn!(error = %e, "close failed");
        result?;
        return Err(e);
    }
    result
}

// --- Main Application Entry Point ---
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    logging::init(&config.logging);

    let default_baud = config.serial.default_baud;
    let mut service = PortService::native(config.serial);

    match args.command {
        Command::List { json } => {
            let devices = service.list_devices();
            if json {
                let listing = DeviceListing {
                    platform: service.platform_version(),
                    devices: &devices,
                };
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else if devices.is_empty() {
                println!("No serial devices found.");
            } else {
                for device in devices {
                    println!("{device}");
                }
            }
        }
        Command::Check { port } => match service.request_permission(&port) {
            Ok(_) => println!("{port}: read/write access granted"),
            Err(e) => {
                println!("{}", serde_json::to_string_pretty(&e.report())?);
                return Err(e.into());
            }
        },
        Command::Version => println!("{}", service.platform_version()),
        Command::Exchange {
            port,
            baud,
            data,
            hex,
            read,
        } => {
            let payload = match (data, hex) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(hex)) => parse_hex(&hex)?,
                (None, None) => Vec::new(),
            };
            exchange(
                &mut service,
                &port,
                baud.unwrap_or(default_baud),
                &payload,
                read,
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("02 41 00 03").unwrap(), vec![0x02, 0x41, 0x00, 0x03]);
        assert_eq!(parse_hex("ff00").unwrap(), vec![0xFF, 0x00]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x00, 0xAB, 0x7F]), "00 AB 7F");
    }

    #[test]
    fn test_cli_parses_exchange() {
        let args = Args::try_parse_from([
            "serial-com",
            "exchange",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "--hex",
            "0d0a",
        ])
        .unwrap();
        match args.command {
            Command::Exchange { baud, hex, read, .. } => {
                assert_eq!(baud, Some(115200));
                assert_eq!(hex.as_deref(), Some("0d0a"));
                assert_eq!(read, 256);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_rejects_data_and_hex() {
        assert!(Args::try_parse_from([
            "serial-com",
            "exchange",
            "COM3",
            "--data",
            "hi",
            "--hex",
            "00",
        ])
        .is_err());
    }
}
