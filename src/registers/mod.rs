//! Register Model and CommandSet: the ASIC-specific half of every other
//! component, behind one polymorphic interface per ASIC family.

mod generic;
mod gl646;
mod gl843;

pub use generic::{FamilyQuirks, Gl124, Gl841, Gl846, Gl847};
pub use gl646::Gl646;
pub use gl843::Gl843;

use genesys_tables::AsicFamily;

use crate::device::Device;
use crate::error::Result;
use crate::interface::ScannerInterface;
use crate::planner::{ScanSession, Settings};

/// Which analog-frontend power state `set_fe` should drive the hardware
/// into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontendState {
    Init,
    Set,
    PowerSave,
}

/// The front-panel button/sensor readout `update_hardware_sensors` polls,
/// one bit per button per the `GENESYS_HAS_*` mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareSensors(pub u16);

/// The ASIC-specific half of every component: register names, bit
/// positions, and protocol preludes differ enough between the five
/// families that this stays a genuine polymorphic interface rather than a
/// unified register layout (see the design notes on why).
pub trait CommandSet {
    fn family(&self) -> AsicFamily;

    /// Cold-boots the ASIC: USB configuration, default register load,
    /// initial gamma table.
    fn init(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;

    fn init_regs_for_shading(&self, iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()>;
    fn init_regs_for_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()>;
    fn init_regs_for_scan_session(&self, device: &mut Device, session: &ScanSession) -> Result<()>;
    fn init_regs_for_warmup(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;

    fn send_gamma_table(&self, iface: &mut dyn ScannerInterface, device: &Device, gamma: &[u16; 3]) -> Result<()>;

    fn set_fe(&self, iface: &mut dyn ScannerInterface, device: &mut Device, state: FrontendState) -> Result<()>;

    fn begin_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, start_motor: bool) -> Result<()>;
    fn end_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, check_stopped: bool) -> Result<()>;

    fn move_back_home(&self, iface: &mut dyn ScannerInterface, device: &mut Device, wait: bool) -> Result<()>;
    fn move_to_ta(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;

    fn load_document(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;
    fn eject_document(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;
    fn detect_document_end(&self, iface: &mut dyn ScannerInterface) -> Result<bool>;

    fn offset_calibration(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;
    fn coarse_gain_calibration(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;
    fn led_calibration(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<genesys_tables::SensorExposure>;

    fn update_hardware_sensors(&self, iface: &mut dyn ScannerInterface, device: &Device) -> Result<HardwareSensors>;

    fn save_power(&self, iface: &mut dyn ScannerInterface, on: bool) -> Result<()>;
    fn set_powersaving(&self, iface: &mut dyn ScannerInterface, minutes: i32) -> Result<()>;
    fn set_xpa_lamp_power(&self, iface: &mut dyn ScannerInterface, on: bool) -> Result<()>;
    fn set_motor_mode(&self, iface: &mut dyn ScannerInterface, device: &mut Device, mode: u8) -> Result<()>;

    fn has_send_shading_data(&self) -> bool;
    fn send_shading_data(&self, iface: &mut dyn ScannerInterface, device: &Device, session: &ScanSession, coefficients: &crate::calibration::ShadingCoefficients) -> Result<()>;

    fn needs_home_before_init_regs_for_scan(&self, device: &Device) -> bool;
    fn wait_for_motor_stop(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()>;
    fn update_home_sensor_gpio(&self, iface: &mut dyn ScannerInterface) -> Result<bool>;

    fn calculate_scan_session(&self, device: &Device, settings: &Settings) -> ScanSession {
        crate::planner::plan(
            settings,
            device.sensor,
            device.motor,
            device.asic,
            device.geometry(settings.scan_method),
        )
    }
}

/// Builds the right `CommandSet` implementation for an ASIC family. Two
/// families get a fully independent implementation; the other four share
/// one generic implementation parameterized by [`FamilyQuirks`].
pub fn command_set_for(family: AsicFamily) -> Box<dyn CommandSet> {
    match family {
        AsicFamily::Gl843 => Box::new(Gl843),
        AsicFamily::Gl646 => Box::new(Gl646),
        AsicFamily::Gl841 => Box::new(Gl841),
        AsicFamily::Gl846 => Box::new(Gl846),
        AsicFamily::Gl847 => Box::new(Gl847),
        AsicFamily::Gl124 => Box::new(Gl124),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_set_for_returns_matching_family() {
        for family in [
            AsicFamily::Gl646,
            AsicFamily::Gl841,
            AsicFamily::Gl843,
            AsicFamily::Gl846,
            AsicFamily::Gl847,
            AsicFamily::Gl124,
        ] {
            assert_eq!(command_set_for(family).family(), family);
        }
    }
}
