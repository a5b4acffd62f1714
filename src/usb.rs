//! USB session for the GC2 device.
//!
//! The GC2 enumerates as vendor `0x2C79`, product `0x0110` and streams its
//! text protocol over an interrupt IN endpoint. Reads use a short timeout
//! so the owning loop can poll shot deadlines and cancellation between
//! chunks; a timeout on its own is never a disconnection.

use std::time::{Duration, Instant};

use rusb::{DeviceHandle, GlobalContext};
use thiserror::Error;
use tracing::{debug, info, warn};

/// GC2 USB vendor id.
pub const VENDOR_ID: u16 = 0x2C79;
/// GC2 USB product id.
pub const PRODUCT_ID: u16 = 0x0110;

const INTERFACE: u8 = 0;
const ENDPOINT_IN: u8 = 0x81;

/// Per-chunk read timeout.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Zero-byte reads persisting this long count as a disconnection.
const ZERO_READ_WINDOW: Duration = Duration::from_secs(1);
/// Consecutive hard I/O errors tolerated before declaring disconnection.
const MAX_IO_ERROR_STREAK: u32 = 3;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("GC2 not found (vendor {VENDOR_ID:#06x}, product {PRODUCT_ID:#06x})")]
    NotFound,

    /// Fatal for the session: retrying cannot help until the user fixes
    /// device permissions (udev rules on Linux).
    #[error("permission denied opening the GC2")]
    PermissionDenied,

    #[error("device disconnected")]
    Disconnected,

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Byte source feeding the frame reassembler. Seam between the real USB
/// session and the scripted mock.
pub trait ChunkSource: Send {
    /// `Ok(Some(bytes))` on data, `Ok(None)` on a benign timeout, `Err` on
    /// a terminal condition (the session must be reopened).
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, DeviceError>;
}

/// An open handle on the GC2.
pub struct UsbSession {
    handle: DeviceHandle<GlobalContext>,
    io_error_streak: u32,
    zero_reads_since: Option<Instant>,
}

impl UsbSession {
    /// Find and claim the device.
    pub fn open() -> Result<Self, DeviceError> {
        for device in rusb::devices()?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if desc.vendor_id() != VENDOR_ID || desc.product_id() != PRODUCT_ID {
                continue;
            }

            let handle = device.open().map_err(classify_open_error)?;
            // Not supported everywhere (macOS); claiming still works there.
            let _ = handle.set_auto_detach_kernel_driver(true);
            handle.claim_interface(INTERFACE).map_err(classify_open_error)?;
            info!(
                bus = device.bus_number(),
                address = device.address(),
                "GC2 opened"
            );
            return Ok(Self {
                handle,
                io_error_streak: 0,
                zero_reads_since: None,
            });
        }
        Err(DeviceError::NotFound)
    }

    /// Release the interface and drop the handle.
    pub fn close(self) {
        let _ = self.handle.release_interface(INTERFACE);
    }
}

impl ChunkSource for UsbSession {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, DeviceError> {
        let mut buf = [0u8; 512];
        match self.handle.read_interrupt(ENDPOINT_IN, &mut buf, READ_TIMEOUT) {
            Ok(0) => {
                // The device keeps the endpoint hot; a sustained run of
                // empty reads means it is gone even if libusb disagrees.
                let since = *self.zero_reads_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= ZERO_READ_WINDOW {
                    warn!("zero-byte reads for {ZERO_READ_WINDOW:?}, treating as disconnect");
                    return Err(DeviceError::Disconnected);
                }
                Ok(None)
            }
            Ok(n) => {
                self.io_error_streak = 0;
                self.zero_reads_since = None;
                Ok(Some(buf[..n].to_vec()))
            }
            Err(rusb::Error::Timeout) => {
                // Idle device; not an error of any kind.
                self.io_error_streak = 0;
                Ok(None)
            }
            Err(rusb::Error::NoDevice) => Err(DeviceError::Disconnected),
            Err(rusb::Error::Access) => Err(DeviceError::PermissionDenied),
            Err(e) => {
                self.io_error_streak += 1;
                if self.io_error_streak >= MAX_IO_ERROR_STREAK {
                    warn!(error = %e, streak = self.io_error_streak, "I/O error streak, disconnecting");
                    Err(DeviceError::Disconnected)
                } else {
                    debug!(error = %e, streak = self.io_error_streak, "transient USB read error");
                    Ok(None)
                }
            }
        }
    }
}

fn classify_open_error(e: rusb::Error) -> DeviceError {
    match e {
        rusb::Error::Access => DeviceError::PermissionDenied,
        rusb::Error::NoDevice => DeviceError::NotFound,
        other => DeviceError::Usb(other),
    }
}
