//! Shared `CommandSet` implementation for the four families whose
//! differences are shallow enough to factor into data rather than code:
//! GL841, GL846, GL847, GL124. Each still gets its own zero-sized marker
//! type and trait `impl` — this is "one implementation per family" at the
//! type level — but the sequencing lives once in [`quirked`], parameterized
//! by a [`FamilyQuirks`] record.

use genesys_tables::AsicFamily;

use super::{CommandSet, FrontendState, HardwareSensors};
use crate::calibration::{self, ShadingCoefficients};
use crate::device::Device;
use crate::error::Result;
use crate::interface::ScannerInterface;
use crate::motion;
use crate::planner::ScanSession;

/// The register addresses and behavioral flags that differ across
/// GL841/GL846/GL847/GL124, but not the control flow that uses them.
#[derive(Debug, Clone, Copy)]
pub struct FamilyQuirks {
    pub family: AsicFamily,
    pub reg_dpiset: u16,
    pub reg_strpixel: u16,
    pub reg_endpixel: u16,
    pub reg_maxwd: u16,
    pub reg_motor_mode: u16,
    pub has_shdarea: bool,
    pub reg_shdarea: u16,
    pub shdarea_bit: u8,
}

const GL841_QUIRKS: FamilyQuirks = FamilyQuirks {
    family: AsicFamily::Gl841,
    reg_dpiset: 0x05,
    reg_strpixel: 0x30,
    reg_endpixel: 0x32,
    reg_maxwd: 0x35,
    reg_motor_mode: 0x3f,
    has_shdarea: false,
    reg_shdarea: 0x3d,
    shdarea_bit: 0x01,
};

const GL846_QUIRKS: FamilyQuirks = FamilyQuirks {
    family: AsicFamily::Gl846,
    reg_dpiset: 0x05,
    reg_strpixel: 0x30,
    reg_endpixel: 0x32,
    reg_maxwd: 0x35,
    reg_motor_mode: 0x40,
    has_shdarea: true,
    reg_shdarea: 0x3d,
    shdarea_bit: 0x01,
};

const GL847_QUIRKS: FamilyQuirks = FamilyQuirks {
    family: AsicFamily::Gl847,
    reg_dpiset: 0x05,
    reg_strpixel: 0x30,
    reg_endpixel: 0x32,
    reg_maxwd: 0x35,
    reg_motor_mode: 0x40,
    has_shdarea: true,
    reg_shdarea: 0x3d,
    shdarea_bit: 0x01,
};

const GL124_QUIRKS: FamilyQuirks = FamilyQuirks {
    family: AsicFamily::Gl124,
    reg_dpiset: 0x06,
    reg_strpixel: 0x31,
    reg_endpixel: 0x33,
    reg_maxwd: 0x36,
    reg_motor_mode: 0x41,
    has_shdarea: true,
    reg_shdarea: 0x3e,
    shdarea_bit: 0x02,
};

pub struct Gl841;
pub struct Gl846;
pub struct Gl847;
pub struct Gl124;

macro_rules! impl_quirked_command_set {
    ($ty:ty, $quirks:expr) => {
        impl CommandSet for $ty {
            fn family(&self) -> AsicFamily {
                $quirks.family
            }

            fn init(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
                quirked::init(&$quirks, iface, device)
            }

            fn init_regs_for_shading(&self, iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()> {
                quirked::init_regs_for_shading(&$quirks, iface, device, session)
            }

            fn init_regs_for_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()> {
                quirked::init_regs_for_scan(&$quirks, iface, device, session)
            }

            fn init_regs_for_scan_session(&self, device: &mut Device, session: &ScanSession) -> Result<()> {
                device.session = Some(session.clone());
                Ok(())
            }

            fn init_regs_for_warmup(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
                quirked::init_regs_for_warmup(iface, device)
            }

            fn send_gamma_table(&self, iface: &mut dyn ScannerInterface, _device: &Device, gamma: &[u16; 3]) -> Result<()> {
                quirked::send_gamma_table(iface, gamma)
            }

            fn set_fe(&self, iface: &mut dyn ScannerInterface, device: &mut Device, state: FrontendState) -> Result<()> {
                quirked::set_fe(iface, device, state)
            }

            fn begin_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, start_motor: bool) -> Result<()> {
                motion::start_action(iface, device, start_motor)
            }

            fn end_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, check_stopped: bool) -> Result<()> {
                quirked::end_scan(iface, device, check_stopped)
            }

            fn move_back_home(&self, iface: &mut dyn ScannerInterface, device: &mut Device, wait: bool) -> Result<()> {
                motion::move_back_home(iface, device, wait)
            }

            fn move_to_ta(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
                quirked::move_to_ta(iface, device)
            }

            fn load_document(&self, iface: &mut dyn ScannerInterface, _device: &mut Device) -> Result<()> {
                iface.test_checkpoint("load_document");
                Ok(())
            }

            fn eject_document(&self, iface: &mut dyn ScannerInterface, _device: &mut Device) -> Result<()> {
                iface.test_checkpoint("eject_document");
                Ok(())
            }

            // Bit 0 set means the paper sensor has cleared (document has
            // passed through); clear means paper is still in the path,
            // which is also the default unseeded register state.
            fn detect_document_end(&self, iface: &mut dyn ScannerInterface) -> Result<bool> {
                let status = iface.read_register(0x6e)?;
                Ok(status & 0x01 != 0)
            }

            fn offset_calibration(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
                calibration::offset_calibration(iface, device)
            }

            fn coarse_gain_calibration(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
                calibration::coarse_gain_calibration(iface, device)
            }

            fn led_calibration(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<genesys_tables::SensorExposure> {
                calibration::led_calibration(iface, device)
            }

            fn update_hardware_sensors(&self, iface: &mut dyn ScannerInterface, device: &Device) -> Result<HardwareSensors> {
                let raw = iface.read_register(0x6f)?;
                Ok(HardwareSensors(raw as u16 & device.buttons_mask))
            }

            fn save_power(&self, iface: &mut dyn ScannerInterface, on: bool) -> Result<()> {
                iface.write_register(0x03, if on { 0x01 } else { 0x00 })
            }

            fn set_powersaving(&self, iface: &mut dyn ScannerInterface, minutes: i32) -> Result<()> {
                iface.write_register(0x08, minutes.clamp(0, 255) as u8)
            }

            fn set_xpa_lamp_power(&self, iface: &mut dyn ScannerInterface, on: bool) -> Result<()> {
                iface.write_register(0x6c, if on { 0x02 } else { 0x00 })
            }

            fn set_motor_mode(&self, iface: &mut dyn ScannerInterface, device: &mut Device, mode: u8) -> Result<()> {
                iface.write_register($quirks.reg_motor_mode, mode)?;
                device.set_register($quirks.reg_motor_mode, mode);
                Ok(())
            }

            fn has_send_shading_data(&self) -> bool {
                true
            }

            fn send_shading_data(&self, iface: &mut dyn ScannerInterface, device: &Device, session: &ScanSession, coefficients: &ShadingCoefficients) -> Result<()> {
                quirked::send_shading_data(&$quirks, iface, device, session, coefficients)
            }

            fn needs_home_before_init_regs_for_scan(&self, device: &Device) -> bool {
                matches!(device.primary_head, crate::device::HeadPosition::Unknown)
            }

            fn wait_for_motor_stop(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
                motion::stop_action(iface, device)
            }

            fn update_home_sensor_gpio(&self, iface: &mut dyn ScannerInterface) -> Result<bool> {
                let status = iface.read_register(0x6d)?;
                Ok(status & 0x01 != 0)
            }
        }
    };
}

impl_quirked_command_set!(Gl841, GL841_QUIRKS);
impl_quirked_command_set!(Gl846, GL846_QUIRKS);
impl_quirked_command_set!(Gl847, GL847_QUIRKS);
impl_quirked_command_set!(Gl124, GL124_QUIRKS);

mod quirked {
    use super::*;

    pub fn init(quirks: &FamilyQuirks, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        iface.test_checkpoint("quirked_init");
        let _ = quirks;
        for &(addr, val) in device.frontend.initial_registers {
            iface.write_fe_register(addr, val)?;
        }
        device.already_initialized = true;
        Ok(())
    }

    pub fn init_regs_for_shading(
        quirks: &FamilyQuirks,
        iface: &mut dyn ScannerInterface,
        device: &mut Device,
        session: &ScanSession,
    ) -> Result<()> {
        if !quirks.has_shdarea {
            return Ok(());
        }
        let current = device.register(quirks.reg_shdarea);
        let next = if session.use_host_side_calib {
            current & !quirks.shdarea_bit
        } else {
            current | quirks.shdarea_bit
        };
        iface.write_register(quirks.reg_shdarea, next)?;
        device.set_register(quirks.reg_shdarea, next);
        Ok(())
    }

    pub fn init_regs_for_scan(
        quirks: &FamilyQuirks,
        iface: &mut dyn ScannerInterface,
        device: &mut Device,
        session: &ScanSession,
    ) -> Result<()> {
        let writes = [
            (quirks.reg_dpiset, (session.output_resolution & 0xff) as u8),
            (quirks.reg_dpiset + 1, (session.output_resolution >> 8) as u8),
            (quirks.reg_strpixel, (session.pixel_startx & 0xff) as u8),
            (quirks.reg_strpixel + 1, (session.pixel_startx >> 8) as u8),
            (quirks.reg_endpixel, (session.pixel_endx & 0xff) as u8),
            (quirks.reg_endpixel + 1, (session.pixel_endx >> 8) as u8),
            (quirks.reg_maxwd, (session.output_line_bytes_raw & 0xff) as u8),
            (quirks.reg_maxwd + 1, (session.output_line_bytes_raw >> 8) as u8),
        ];
        iface.write_registers(&writes)?;
        for (addr, val) in writes {
            device.set_register(addr, val);
        }
        Ok(())
    }

    pub fn init_regs_for_warmup(iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        let val = device.register(0x03) | 0x01;
        iface.write_register(0x03, val)?;
        device.set_register(0x03, val);
        iface.sleep_ms(500)
    }

    pub fn send_gamma_table(iface: &mut dyn ScannerInterface, gamma: &[u16; 3]) -> Result<()> {
        let mut bytes = Vec::with_capacity(gamma.len() * 512);
        for &g in gamma {
            for i in 0..256u32 {
                let value = ((i * g as u32) / 256).min(65535) as u16;
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        iface.write_gamma(0x2a, 0x10000, &bytes)
    }

    pub fn set_fe(iface: &mut dyn ScannerInterface, device: &mut Device, state: FrontendState) -> Result<()> {
        match state {
            FrontendState::Init => {
                for &(addr, val) in device.frontend.initial_registers {
                    iface.write_fe_register(addr, val)?;
                }
            }
            FrontendState::Set => {}
            FrontendState::PowerSave => {
                iface.write_fe_register(device.frontend.reg_gain.0, 0)?;
            }
        }
        Ok(())
    }

    pub fn end_scan(iface: &mut dyn ScannerInterface, device: &mut Device, check_stopped: bool) -> Result<()> {
        if check_stopped {
            motion::stop_action(iface, device)
        } else {
            let val = device.register(0x01) & !0x03;
            iface.write_register(0x01, val)?;
            device.set_register(0x01, val);
            Ok(())
        }
    }

    pub fn move_to_ta(iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        if !device.sensor.supports_method(genesys_tables::ScanMethod::TransparencyAdapter) {
            return Ok(());
        }
        iface.test_checkpoint("move_to_ta");
        let val = device.register(0x6c) | 0x02;
        iface.write_register(0x6c, val)?;
        device.set_register(0x6c, val);
        device.ta_head = crate::device::HeadPosition::Known(0);
        Ok(())
    }

    pub fn send_shading_data(
        quirks: &FamilyQuirks,
        iface: &mut dyn ScannerInterface,
        device: &Device,
        session: &ScanSession,
        coefficients: &ShadingCoefficients,
    ) -> Result<()> {
        if quirks.has_shdarea && session.use_host_side_calib {
            return Ok(());
        }
        let start = calibration::shading_start_address(device.asic, session.hwdpi, session.pixels);
        iface.write_buffer(0x3c, start, &coefficients.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_marker_type_reports_its_own_family() {
        assert_eq!(Gl841.family(), AsicFamily::Gl841);
        assert_eq!(Gl846.family(), AsicFamily::Gl846);
        assert_eq!(Gl847.family(), AsicFamily::Gl847);
        assert_eq!(Gl124.family(), AsicFamily::Gl124);
    }

    #[test]
    fn gl841_has_no_shading_area_bit() {
        assert!(!GL841_QUIRKS.has_shdarea);
        assert!(GL846_QUIRKS.has_shdarea);
    }
}
