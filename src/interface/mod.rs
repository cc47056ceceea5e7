//! The Scanner Interface: every other component talks to the device
//! exclusively through this trait. Two implementations exist: [`usb::UsbInterface`]
//! for real hardware, and [`mock::MockInterface`] for deterministic replay
//! testing.

mod mock;
#[cfg(feature = "hardware")]
mod usb;

pub use mock::{Call, Checkpoint, MockInterface};
#[cfg(feature = "hardware")]
pub use usb::UsbInterface;

use crate::error::Result;

/// Which RAM region a buffer/gamma write targets, per the control-transfer
/// `value` field (`0x82` buffer-select framing).
pub type BufferKind = u8;

/// The Scanner Interface contract. Every register write must be readable
/// through the ASIC's own read path once the call returns; buffered writes
/// are committed before returning.
pub trait ScannerInterface {
    fn write_register(&mut self, addr: u16, val: u8) -> Result<()>;

    /// Batches contiguous writes when the implementation can; the default
    /// just writes each register individually.
    fn write_registers(&mut self, set: &[(u16, u8)]) -> Result<()> {
        for &(addr, val) in set {
            self.write_register(addr, val)?;
        }
        Ok(())
    }

    fn read_register(&mut self, addr: u16) -> Result<u8>;

    /// Writes `bytes` to a RAM buffer region, chunked by the caller to the
    /// ASIC's bulk-write ceiling before this is called.
    fn write_buffer(&mut self, kind: BufferKind, addr: u32, bytes: &[u8]) -> Result<()>;

    /// Writes a gamma/slope table, same chunking contract as `write_buffer`.
    fn write_gamma(&mut self, kind: BufferKind, addr: u32, bytes: &[u8]) -> Result<()>;

    fn read_fe_register(&mut self, addr: u8) -> Result<u8>;
    fn write_fe_register(&mut self, addr: u8, val: u8) -> Result<()>;

    /// Blocks until `n` bytes have arrived or the device signals EOF.
    fn bulk_read(&mut self, dst: &mut [u8]) -> Result<usize>;

    fn sleep_ms(&mut self, n: u64) -> Result<()>;

    /// Low-level USB device handle, for resets. Implementations that have
    /// no real device (the mock) return `None`.
    fn get_usb_device(&self) -> Option<&dyn std::any::Any>;

    /// Fires a named checkpoint; real hardware implementations ignore this,
    /// the mock uses it to drive deterministic test scripts.
    fn test_checkpoint(&mut self, name: &'static str) {
        let _ = name;
    }
}
