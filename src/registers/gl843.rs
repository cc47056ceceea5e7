//! GL843 `CommandSet`: the most common family in this pack (Canon LiDE,
//! Plustek OpticFilm). Exposes the `SHDAREA` bit, so shading RAM addressing
//! needs no dpihw-bucket offset.

use genesys_tables::AsicFamily;

use super::{CommandSet, FrontendState, HardwareSensors};
use crate::calibration::{self, ShadingCoefficients};
use crate::device::Device;
use crate::error::Result;
use crate::interface::ScannerInterface;
use crate::motion;
use crate::planner::ScanSession;

const REG_DPISET: u16 = 0x05;
const REG_STRPIXEL: u16 = 0x30;
const REG_ENDPIXEL: u16 = 0x32;
const REG_MAXWD: u16 = 0x35;
const REG_LPERIOD: u16 = 0x38;
const REG_SHDAREA: u16 = 0x3d;
const SHDAREA_ENABLE_BIT: u8 = 0x01;
const REG_LAMP_POWER: u16 = 0x03;
const LAMP_ON_BIT: u8 = 0x01;
const REG_MOTOR_MODE: u16 = 0x40;
const REG_XPA_LAMP: u16 = 0x6c;
const XPA_LAMP_BIT: u8 = 0x02;
const REG_GPIO_HOME: u16 = 0x6d;
const HOME_GPIO_BIT: u8 = 0x01;
const REG_PAPER_SENSOR: u16 = 0x6e;
const PAPER_SENSOR_CLEAR_BIT: u8 = 0x01;

pub struct Gl843;

impl CommandSet for Gl843 {
    fn family(&self) -> AsicFamily {
        AsicFamily::Gl843
    }

    fn init(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        iface.test_checkpoint("gl843_init");
        self.set_fe(iface, device, FrontendState::Init)?;
        device.already_initialized = true;
        Ok(())
    }

    fn init_regs_for_shading(&self, iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()> {
        let shdarea = if session.use_host_side_calib {
            device.register(REG_SHDAREA) & !SHDAREA_ENABLE_BIT
        } else {
            device.register(REG_SHDAREA) | SHDAREA_ENABLE_BIT
        };
        iface.write_register(REG_SHDAREA, shdarea)?;
        device.set_register(REG_SHDAREA, shdarea);
        Ok(())
    }

    fn init_regs_for_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()> {
        write_optical_registers(iface, device, session)
    }

    fn init_regs_for_scan_session(&self, device: &mut Device, session: &ScanSession) -> Result<()> {
        device.session = Some(session.clone());
        Ok(())
    }

    fn init_regs_for_warmup(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        let val = device.register(REG_LAMP_POWER) | LAMP_ON_BIT;
        iface.write_register(REG_LAMP_POWER, val)?;
        device.set_register(REG_LAMP_POWER, val);
        iface.sleep_ms(500)?;
        Ok(())
    }

    fn send_gamma_table(&self, iface: &mut dyn ScannerInterface, _device: &Device, gamma: &[u16; 3]) -> Result<()> {
        let mut bytes = Vec::with_capacity(gamma.len() * 512);
        for &g in gamma {
            for i in 0..256u32 {
                let value = ((i * g as u32) / 256).min(65535) as u16;
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        iface.write_gamma(0x2a, 0x10000, &bytes)
    }

    fn set_fe(&self, iface: &mut dyn ScannerInterface, device: &mut Device, state: FrontendState) -> Result<()> {
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

    fn begin_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, start_motor: bool) -> Result<()> {
        motion::start_action(iface, device, start_motor)
    }

    fn end_scan(&self, iface: &mut dyn ScannerInterface, device: &mut Device, check_stopped: bool) -> Result<()> {
        if check_stopped {
            motion::stop_action(iface, device)
        } else {
            let val = device.register(0x01) & !0x03;
            iface.write_register(0x01, val)?;
            device.set_register(0x01, val);
            Ok(())
        }
    }

    fn move_back_home(&self, iface: &mut dyn ScannerInterface, device: &mut Device, wait: bool) -> Result<()> {
        motion::move_back_home(iface, device, wait)
    }

    fn move_to_ta(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        iface.test_checkpoint("move_to_ta");
        let val = device.register(REG_XPA_LAMP) | XPA_LAMP_BIT;
        iface.write_register(REG_XPA_LAMP, val)?;
        device.set_register(REG_XPA_LAMP, val);
        device.ta_head = crate::device::HeadPosition::Known(0);
        Ok(())
    }

    fn load_document(&self, iface: &mut dyn ScannerInterface, _device: &mut Device) -> Result<()> {
        iface.test_checkpoint("load_document");
        Ok(())
    }

    fn eject_document(&self, iface: &mut dyn ScannerInterface, _device: &mut Device) -> Result<()> {
        iface.test_checkpoint("eject_document");
        Ok(())
    }

    // Bit set means the paper sensor has cleared; clear (the default
    // unseeded register state) means paper is still in the path.
    fn detect_document_end(&self, iface: &mut dyn ScannerInterface) -> Result<bool> {
        let status = iface.read_register(REG_PAPER_SENSOR)?;
        Ok(status & PAPER_SENSOR_CLEAR_BIT != 0)
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
        let val: u8 = if on { LAMP_ON_BIT } else { 0 };
        iface.write_register(REG_LAMP_POWER, val)
    }

    fn set_powersaving(&self, iface: &mut dyn ScannerInterface, minutes: i32) -> Result<()> {
        iface.write_register(0x08, minutes.clamp(0, 255) as u8)
    }

    fn set_xpa_lamp_power(&self, iface: &mut dyn ScannerInterface, on: bool) -> Result<()> {
        iface.write_register(REG_XPA_LAMP, if on { XPA_LAMP_BIT } else { 0 })
    }

    fn set_motor_mode(&self, iface: &mut dyn ScannerInterface, device: &mut Device, mode: u8) -> Result<()> {
        iface.write_register(REG_MOTOR_MODE, mode)?;
        device.set_register(REG_MOTOR_MODE, mode);
        Ok(())
    }

    fn has_send_shading_data(&self) -> bool {
        true
    }

    fn send_shading_data(&self, iface: &mut dyn ScannerInterface, device: &Device, session: &ScanSession, coefficients: &ShadingCoefficients) -> Result<()> {
        if session.use_host_side_calib {
            return Ok(());
        }
        let start = calibration::shading_start_address(device.asic, session.hwdpi, session.pixels);
        iface.write_buffer(0x3c, start, &coefficients.to_le_bytes())
    }

    fn needs_home_before_init_regs_for_scan(&self, device: &Device) -> bool {
        matches!(device.primary_head, crate::device::HeadPosition::Unknown)
    }

    fn wait_for_motor_stop(&self, iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
        motion::stop_action(iface, device)
    }

    fn update_home_sensor_gpio(&self, iface: &mut dyn ScannerInterface) -> Result<bool> {
        let status = iface.read_register(REG_GPIO_HOME)?;
        Ok(status & HOME_GPIO_BIT != 0)
    }
}

fn write_optical_registers(iface: &mut dyn ScannerInterface, device: &mut Device, session: &ScanSession) -> Result<()> {
    let writes = [
        (REG_DPISET, (session.output_resolution & 0xff) as u8),
        (REG_DPISET + 1, (session.output_resolution >> 8) as u8),
        (REG_STRPIXEL, (session.pixel_startx & 0xff) as u8),
        (REG_STRPIXEL + 1, (session.pixel_startx >> 8) as u8),
        (REG_ENDPIXEL, (session.pixel_endx & 0xff) as u8),
        (REG_ENDPIXEL + 1, (session.pixel_endx >> 8) as u8),
        (REG_MAXWD, (session.output_line_bytes_raw & 0xff) as u8),
        (REG_MAXWD + 1, (session.output_line_bytes_raw >> 8) as u8),
        (REG_LPERIOD, 0),
    ];
    iface.write_registers(&writes)?;
    for (addr, val) in writes {
        device.set_register(addr, val);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MockInterface;
    use crate::planner::{ModelGeometry, Settings};

    fn lide_device() -> Device {
        Device::from_model(genesys_tables::lookup_model(0x04a9, 0x190e).unwrap())
    }

    #[test]
    fn init_marks_device_initialized() {
        let mut device = lide_device();
        let mut iface = MockInterface::new();
        Gl843.init(&mut iface, &mut device).unwrap();
        assert!(device.already_initialized);
    }

    #[test]
    fn shading_area_bit_cleared_for_host_side_calibration() {
        let model = genesys_tables::lookup_model(0x07b3, 0x0c16).unwrap();
        let mut device = Device::from_model(model);
        let session = crate::planner::plan(
            &Settings {
                xres: 3600,
                yres: 3600,
                tl_x_mm: 0.0,
                tl_y_mm: 0.0,
                br_x_mm: 20.0,
                br_y_mm: 20.0,
                depth: 16,
                scan_mode: genesys_tables::ScanMode::Color,
                scan_method: genesys_tables::ScanMethod::TransparencyAdapter,
                color_filter: genesys_tables::ColorFilter::None,
                threshold: 128,
            },
            model.sensor,
            model.motor,
            model.asic,
            ModelGeometry {
                x_offset_mm: 0.0,
                y_offset_mm: 0.0,
            },
        );
        let mut iface = MockInterface::new();
        Gl843.init_regs_for_shading(&mut iface, &mut device, &session).unwrap();
        assert_eq!(device.register(REG_SHDAREA) & SHDAREA_ENABLE_BIT, 0);
    }
}
