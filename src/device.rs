//! The `Device` data model: everything known about one attached scanner
//! across its lifetime, independent of any particular scan.

use std::collections::HashMap;

use genesys_tables::{AsicFamily, FrontendDescriptor, Model, MotorDescriptor, SensorDescriptor};

use crate::calibration::CalibrationCacheEntry;
use crate::planner::ScanSession;

/// Primary or secondary (transparency adapter) motor head position, in
/// motor-base-dpi steps from home. `Unknown` forces the next move to begin
/// with a home search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadPosition {
    Known(u32),
    Unknown,
}

impl Default for HeadPosition {
    fn default() -> Self {
        HeadPosition::Unknown
    }
}

/// Everything the backend knows about one attached scanner. Created on
/// first attach, mutated only through the Scanner Interface or the
/// planner, destroyed at backend exit. Deliberately not `Sync`/`Send`: the
/// concurrency model forbids sharing a `Device` across threads, and rather
/// than enforce that with a runtime lock, the type simply does not offer a
/// way to do it.
#[derive(Debug)]
pub struct Device {
    pub vendor_id: u16,
    pub product_id: u16,
    pub model_name: &'static str,
    pub asic: AsicFamily,

    pub sensor: &'static SensorDescriptor,
    pub motor: &'static MotorDescriptor,
    pub frontend: &'static FrontendDescriptor,

    pub x_offset_mm: f32,
    pub y_offset_mm: f32,
    pub ta_y_offset_mm: f32,
    pub buttons_mask: u16,
    pub is_sheetfed: bool,

    /// Address -> last-known value, updated on every write and refreshed on
    /// read-back.
    pub registers: HashMap<u16, u8>,

    pub primary_head: HeadPosition,
    pub ta_head: HeadPosition,

    pub already_initialized: bool,
    pub cache: Vec<CalibrationCacheEntry>,

    /// Present only while a scan is actually in progress.
    pub session: Option<ScanSession>,
}

impl Device {
    pub fn from_model(model: &'static Model) -> Self {
        Device {
            vendor_id: model.vendor_id,
            product_id: model.product_id,
            model_name: model.name,
            asic: model.asic,
            sensor: model.sensor,
            motor: model.motor,
            frontend: model.frontend,
            x_offset_mm: model.x_offset_mm,
            y_offset_mm: model.y_offset_mm,
            ta_y_offset_mm: model.ta_y_offset_mm,
            buttons_mask: model.buttons_mask,
            is_sheetfed: model.is_sheetfed,
            registers: HashMap::new(),
            primary_head: HeadPosition::Unknown,
            ta_head: HeadPosition::Unknown,
            already_initialized: false,
            cache: Vec::new(),
            session: None,
        }
    }

    pub fn geometry(&self, method: genesys_tables::ScanMethod) -> crate::planner::ModelGeometry {
        let y_offset_mm = if method == genesys_tables::ScanMethod::Flatbed {
            self.y_offset_mm
        } else {
            self.ta_y_offset_mm
        };
        crate::planner::ModelGeometry {
            x_offset_mm: self.x_offset_mm,
            y_offset_mm,
        }
    }

    pub fn set_register(&mut self, addr: u16, val: u8) {
        self.registers.insert(addr, val);
    }

    pub fn register(&self, addr: u16) -> u8 {
        *self.registers.get(&addr).unwrap_or(&0)
    }

    /// A snapshot of the current register bank, for the fail-policy's
    /// "restore the pre-move register snapshot" requirement.
    pub fn snapshot_registers(&self) -> HashMap<u16, u8> {
        self.registers.clone()
    }

    pub fn restore_registers(&mut self, snapshot: HashMap<u16, u8>) {
        self.registers = snapshot;
    }

    pub fn is_sheetfed(&self) -> bool {
        self.is_sheetfed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_device_starts_uninitialized_with_unknown_head() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let device = Device::from_model(model);
        assert!(!device.already_initialized);
        assert_eq!(device.primary_head, HeadPosition::Unknown);
        assert!(device.cache.is_empty());
    }
}
