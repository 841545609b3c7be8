//! Byte sources - where the raw stream comes from
//!
//! The recorder only needs one capability from a transport: a blocking
//! `read` that returns some bytes or an error. Anything implementing
//! [`std::io::Read`] qualifies, which covers serial ports, pipes, and test
//! doubles alike.
//!
//! A read that returns `Ok(0)` or fails with `TimedOut`, `WouldBlock` or
//! `Interrupted` means "nothing arrived this poll interval". The reader uses
//! those gaps to notice shutdown. A source that blocks indefinitely still
//! lets the pipeline stop, but its thread is abandoned rather than joined.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rs232conf::{DataBits, Parity, SerialConfig, StopBits};
use tracing::{debug, info};

use crate::error::PipelineError;

/// Capability to pull raw bytes from a transport.
pub trait ByteSource: Send + 'static {
    /// Blocking read into `buf`, returning how many bytes were filled.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read + Send + 'static> ByteSource for R {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

/// Whether an I/O error just means the poll interval elapsed without data.
pub fn is_idle_poll(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A run of bytes exactly as one read returned them, stamped on capture.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    data: Bytes,
    captured_at: Instant,
}

impl StreamChunk {
    /// Stamp `data` with the current instant.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::captured(data, Instant::now())
    }

    /// Build a chunk with an explicit capture instant.
    pub fn captured(data: impl Into<Bytes>, captured_at: Instant) -> Self {
        Self {
            data: data.into(),
            captured_at,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// An opened serial device.
pub type SerialSource = Box<dyn serialport::SerialPort>;

/// Open the serial device described by `config`.
///
/// The configured read timeout bounds every read, which is what lets the
/// reader notice cancellation on a quiet line.
pub fn open_serial(config: &SerialConfig) -> Result<SerialSource, PipelineError> {
    debug!(
        "opening {} at {} baud ({}{}{}, timeout {:?})",
        config.device_path,
        config.baud_rate,
        config.data_bits,
        parity_letter(config.parity),
        config.stop_bits,
        config.read_timeout
    );

    let port = serialport::new(&config.device_path, config.baud_rate)
        .parity(map_parity(config.parity))
        .stop_bits(map_stop_bits(config.stop_bits))
        .data_bits(map_data_bits(config.data_bits))
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout(config.read_timeout))
        .open()
        .map_err(|source| PipelineError::TransportOpen {
            device: config.device_path.clone(),
            source,
        })?;

    info!("opened serial device {}", config.device_path);
    Ok(port)
}

/// A zero timeout would turn every read into a busy poll.
fn read_timeout(configured: Duration) -> Duration {
    configured.max(Duration::from_millis(1))
}

fn parity_letter(parity: Parity) -> char {
    match parity {
        Parity::None => 'N',
        Parity::Odd => 'O',
        Parity::Even => 'E',
    }
}

fn map_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn map_stop_bits(stop_bits: StopBits) -> serialport::StopBits {
    match stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

fn map_data_bits(data_bits: DataBits) -> serialport::DataBits {
    match data_bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

/// A serial port the OS knows about.
#[derive(Debug, Clone)]
pub struct PortListing {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial ports present on this machine.
pub fn list_ports() -> Result<Vec<PortListing>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortListing {
            kind: describe_port_type(&p.port_type),
            name: p.port_name,
        })
        .collect())
}

fn describe_port_type(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let product = usb.product.as_deref().unwrap_or("usb");
            format!("{} ({:04x}:{:04x})", product, usb.vid, usb.pid)
        }
        serialport::SerialPortType::PciPort => "pci".to_string(),
        serialport::SerialPortType::BluetoothPort => "bluetooth".to_string(),
        serialport::SerialPortType::Unknown => "unknown".to_string(),
    }
}
