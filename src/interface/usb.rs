//! Real-hardware [`ScannerInterface`] backed by `rusb`, the standard hosted
//! binding to libusb. Implements the control/bulk protocol from the
//! external interface contract directly: no ASIC-specific knowledge lives
//! here, only the wire framing.

use std::time::Duration;

use rusb::{DeviceHandle, GlobalContext};

use super::{BufferKind, ScannerInterface};
use crate::error::{GenesysError, Result};

const REQUEST_REGISTER: u8 = 0x0c;
const VALUE_BUFFER: u16 = 0x82;
const VALUE_SET_REGISTER: u16 = 0x83;
const VALUE_READ_REGISTER: u16 = 0x84;
const VALUE_WRITE_REGISTER: u16 = 0x85;
const VALUE_BUF_ENDACCESS: u16 = 0x8c;
const VALUE_GET_REGISTER: u16 = 0x8e;

const BULK_OUT_ENDPOINT: u8 = 0x01;
const BULK_IN_ENDPOINT: u8 = 0x00;
const BULK_REGISTER: u8 = 0x11;
const BULK_RAM: u8 = 0x00;
const BULKOUT_MAXSIZE: usize = 0xF000;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(2000);
const BULK_TIMEOUT: Duration = Duration::from_millis(5000);

pub struct UsbInterface {
    handle: DeviceHandle<GlobalContext>,
    bulk_write_max: usize,
}

impl UsbInterface {
    pub fn open(vendor_id: u16, product_id: u16, bulk_write_max: usize) -> Result<Self> {
        let handle = rusb::open_device_with_vid_pid(vendor_id, product_id)
            .ok_or_else(|| GenesysError::Invalid(format!("no device {vendor_id:04x}:{product_id:04x}")))?;
        handle.claim_interface(0)?;
        Ok(UsbInterface {
            handle,
            bulk_write_max,
        })
    }

    fn control_out(&mut self, value: u16, index: u16, data: &[u8]) -> Result<()> {
        self.handle
            .write_control(0x40, REQUEST_REGISTER, value, index, data, CONTROL_TIMEOUT)
            .map_err(retry_once_map)?;
        Ok(())
    }

    fn control_in(&mut self, value: u16, index: u16, data: &mut [u8]) -> Result<usize> {
        let n = self
            .handle
            .read_control(0xc0, REQUEST_REGISTER, value, index, data, CONTROL_TIMEOUT)
            .map_err(retry_once_map)?;
        Ok(n)
    }

    fn write_ram(&mut self, bulk_kind: u8, kind: BufferKind, addr: u32, bytes: &[u8]) -> Result<()> {
        for chunk in bytes.chunks(self.bulk_write_max.min(BULKOUT_MAXSIZE)) {
            self.control_out(VALUE_BUFFER, kind as u16, &addr.to_be_bytes())?;
            self.handle
                .write_bulk(BULK_OUT_ENDPOINT, chunk, BULK_TIMEOUT)
                .map_err(retry_once_map)?;
            self.control_out(VALUE_BUF_ENDACCESS, bulk_kind as u16, &[])?;
        }
        Ok(())
    }
}

fn retry_once_map(err: rusb::Error) -> GenesysError {
    GenesysError::from(err)
}

impl ScannerInterface for UsbInterface {
    fn write_register(&mut self, addr: u16, val: u8) -> Result<()> {
        self.control_out(VALUE_SET_REGISTER, addr, &[val])
    }

    fn read_register(&mut self, addr: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.control_in(VALUE_READ_REGISTER, addr, &mut buf)?;
        Ok(buf[0])
    }

    fn write_buffer(&mut self, kind: BufferKind, addr: u32, bytes: &[u8]) -> Result<()> {
        self.write_ram(BULK_RAM, kind, addr, bytes)
    }

    fn write_gamma(&mut self, kind: BufferKind, addr: u32, bytes: &[u8]) -> Result<()> {
        self.write_ram(BULK_RAM, kind, addr, bytes)
    }

    fn read_fe_register(&mut self, addr: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.control_in(VALUE_GET_REGISTER, addr as u16, &mut buf)?;
        Ok(buf[0])
    }

    fn write_fe_register(&mut self, addr: u8, val: u8) -> Result<()> {
        self.control_out(VALUE_WRITE_REGISTER, addr as u16, &[val])
    }

    fn bulk_read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let n = self
            .handle
            .read_bulk(BULK_IN_ENDPOINT, dst, BULK_TIMEOUT)
            .map_err(retry_once_map)?;
        Ok(n)
    }

    fn sleep_ms(&mut self, n: u64) -> Result<()> {
        std::thread::sleep(Duration::from_millis(n));
        Ok(())
    }

    fn get_usb_device(&self) -> Option<&dyn std::any::Any> {
        Some(&self.handle)
    }
}

#[allow(dead_code)]
const _UNUSED_REGISTER_BULK_KIND: u8 = BULK_REGISTER;
