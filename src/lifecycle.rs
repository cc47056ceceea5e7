//! Scan Lifecycle: the top-level per-handle state machine composing every
//! other component — `CLOSED → OPEN → READY ⇄ SCANNING → READY → CLOSED`.

use std::path::PathBuf;

use genesys_tables::{Model, ScanMethod};

use crate::calibration::{self, cache, CalibrationCacheEntry, ExpirationPolicy};
use crate::device::Device;
use crate::error::{GenesysError, Result};
use crate::interface::ScannerInterface;
use crate::motion;
use crate::pipeline::{PipelineBuilder, PipelineState};
use crate::planner::{ScanSession, Settings};
use crate::registers::{command_set_for, CommandSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Closed,
    Open,
    Ready,
    Scanning,
}

/// Best-effort cleanup on abnormal exit: if a scan is still armed when this
/// drops (an early `?` return escaped `start`/`read` without reaching the
/// normal end-of-scan path), issue a motor stop so nothing is ever left
/// running. Call [`ScanGuard::disarm`] once the caller has handled the
/// cleanup itself.
pub struct ScanGuard<'a> {
    iface: &'a mut dyn ScannerInterface,
    device: &'a mut Device,
    armed: bool,
}

impl<'a> ScanGuard<'a> {
    pub fn new(iface: &'a mut dyn ScannerInterface, device: &'a mut Device) -> Self {
        ScanGuard {
            iface,
            device,
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<'a> Drop for ScanGuard<'a> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("scan guard dropped while armed, forcing motor stop");
            let _ = motion::stop_action(self.iface, self.device);
        }
    }
}

/// One open scanner handle. Owns the `Device` and its `CommandSet`, and
/// drives them through the lifecycle state machine. Not `Send`/`Sync`: the
/// concurrency model is single-threaded cooperative per handle.
pub struct Scanner {
    device: Device,
    command_set: Box<dyn CommandSet>,
    state: LifecycleState,
    cancelled: bool,
    cache_path: PathBuf,
    bytes_delivered: u64,
    total_bytes: u64,
    pipeline: Option<PipelineState>,
}

impl Scanner {
    /// `OPEN → READY`: cold-boots the ASIC, homes the flatbed head if
    /// present, loads the calibration cache, installs the default gamma
    /// table.
    pub fn open(iface: &mut dyn ScannerInterface, model: &'static Model, cache_path: PathBuf) -> Result<Self> {
        let mut device = Device::from_model(model);
        let command_set = command_set_for(model.asic);

        command_set.init(iface, &mut device)?;
        if device.sensor.supports_method(ScanMethod::Flatbed) {
            command_set.move_back_home(iface, &mut device, true)?;
        }
        device.cache = cache::read_calibration(&cache_path);

        let gamma = device.sensor.gamma;
        command_set.send_gamma_table(iface, &device, &[gamma.0, gamma.1, gamma.2])?;

        Ok(Scanner {
            device,
            command_set,
            state: LifecycleState::Ready,
            cancelled: false,
            cache_path,
            bytes_delivered: 0,
            total_bytes: 0,
            pipeline: None,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Polls the front-panel button/status sensors. Safe to call in any
    /// state; callers typically use it to populate the `sensors` option
    /// group between scans.
    pub fn poll_sensors(&mut self, iface: &mut dyn ScannerInterface) -> Result<crate::registers::HardwareSensors> {
        self.command_set.update_hardware_sensors(iface, &self.device)
    }

    /// `READY → SCANNING`: plans the session, runs or reuses calibration,
    /// programs the optical/motor registers, and starts the motor.
    pub fn start(
        &mut self,
        iface: &mut dyn ScannerInterface,
        settings: &Settings,
        expiration: ExpirationPolicy,
        now_minutes: u64,
        timestamp: u64,
    ) -> Result<ScanSession> {
        if self.state != LifecycleState::Ready {
            return Err(GenesysError::DeviceBusy);
        }
        if !self.device.sensor.supports_method(settings.scan_method) {
            return Err(GenesysError::Unsupported("scan method not supported by this sensor"));
        }

        let session = self.command_set.calculate_scan_session(&self.device, settings);

        if settings.scan_method != ScanMethod::Flatbed {
            self.command_set.move_to_ta(iface, &mut self.device)?;
        }

        let coefficients = match calibration::find_cached(&self.device.cache, &session, expiration, now_minutes) {
            Some(entry) => {
                log::debug!("reusing cached calibration for {}x{} dpi", session.xres, session.yres);
                calibration::compute_coefficients(&entry.dark_average_data, &entry.white_average_data)
            }
            None => {
                log::info!("no usable cache entry, running calibration for {}x{} dpi", session.xres, session.yres);
                let command_set = self.command_set.as_ref();
                let (dark, white) = motion::with_fail_policy(iface, &mut self.device, |iface, device| {
                    run_calibration(command_set, iface, device, &session)
                })?;
                let coefficients = calibration::compute_coefficients(&dark, &white);
                self.device
                    .cache
                    .push(CalibrationCacheEntry::from_session(&session, &dark, &white, timestamp));
                coefficients
            }
        };

        self.command_set.init_regs_for_scan_session(&mut self.device, &session)?;
        self.command_set.init_regs_for_shading(iface, &mut self.device, &session)?;
        self.command_set.init_regs_for_scan(iface, &mut self.device, &session)?;
        self.command_set.init_regs_for_warmup(iface, &mut self.device)?;

        if self.command_set.has_send_shading_data() {
            self.command_set
                .send_shading_data(iface, &self.device, &session, &coefficients)?;
        }

        let profile = self.device.motor.default_profile();
        let lperiod = self.device.sensor.lperiod_for(session.xres).unwrap_or(4000);
        let table = motion::load_slope_table(
            iface,
            profile,
            lperiod,
            session.yres,
            self.device.motor.base_ydpi,
            1,
            self.device.asic.max_slope_entries(),
            motion::TableSlot::Scan,
        )?;
        motion::program_z1z2(iface, &table, table.len(), 1, 1, lperiod, session.yres)?;

        self.command_set.begin_scan(iface, &mut self.device, true)?;

        let host_shading = if session.use_host_side_calib { Some(coefficients.clone()) } else { None };

        self.state = LifecycleState::Scanning;
        self.cancelled = false;
        self.bytes_delivered = 0;
        self.total_bytes = session.output_line_bytes as u64 * session.output_line_count as u64;
        self.pipeline = Some(PipelineBuilder::build(&session, host_shading));
        self.device.session = Some(session.clone());

        Ok(session)
    }

    /// `sane_read`: delivers up to `out.len()` pipeline-corrected bytes, or
    /// `Ok(0)` at end of scan. A sheet-fed unit's early paper-out is treated
    /// as a clean EOF, not an error, once at least one line has been read.
    pub fn read(&mut self, iface: &mut dyn ScannerInterface, out: &mut [u8]) -> Result<usize> {
        if self.cancelled {
            self.finish_scan(iface)?;
            return Err(GenesysError::Cancelled);
        }
        if self.state != LifecycleState::Scanning {
            return Ok(0);
        }

        if self.device.is_sheetfed() && self.command_set.detect_document_end(iface)? {
            self.total_bytes = self.bytes_delivered;
            self.finish_scan(iface)?;
            return Ok(0);
        }

        let remaining = self.total_bytes.saturating_sub(self.bytes_delivered);
        if remaining == 0 {
            self.finish_scan(iface)?;
            return Ok(0);
        }

        let want = (out.len() as u64).min(remaining) as usize;
        let pipeline = self.pipeline.as_mut().expect("pipeline built in start()");
        let n = pipeline.pull(iface, &mut out[..want])?;
        self.bytes_delivered += n as u64;
        if n == 0 {
            self.finish_scan(iface)?;
        }
        Ok(n)
    }

    /// `sane_cancel`: asynchronous-safe — sets the cancel flag and issues a
    /// stop without waiting for the poll loop. The next `read` surfaces
    /// `CANCELLED`.
    pub fn cancel(&mut self, iface: &mut dyn ScannerInterface) -> Result<()> {
        if self.state == LifecycleState::Scanning {
            self.cancelled = true;
            self.command_set.end_scan(iface, &mut self.device, false)?;
        }
        Ok(())
    }

    /// `SCANNING → READY`: stop motor, end scan, background park (no wait)
    /// unless the model has no flatbed path at all.
    fn finish_scan(&mut self, iface: &mut dyn ScannerInterface) -> Result<()> {
        self.command_set.end_scan(iface, &mut self.device, true)?;
        if self.device.sensor.supports_method(ScanMethod::Flatbed) {
            let _ = self.command_set.move_back_home(iface, &mut self.device, false);
        }
        self.state = LifecycleState::Ready;
        self.cancelled = false;
        self.pipeline = None;
        Ok(())
    }

    /// Closes the handle: ends any in-progress scan, best-effort persists
    /// the calibration cache (never fatal), and transitions to `CLOSED`.
    pub fn close(&mut self, iface: &mut dyn ScannerInterface) -> Result<()> {
        if self.state == LifecycleState::Scanning {
            let _ = self.finish_scan(iface);
        }
        if let Err(err) = cache::write_calibration(&self.cache_path, &self.device.cache) {
            log::warn!("calibration cache write failed: {err}");
        }
        self.state = LifecycleState::Closed;
        Ok(())
    }
}

/// Runs the calibration sequence in the order the component design
/// specifies for GL843-class hardware: LED → offset → coarse-gain, twice,
/// then dark/white shading. Returns the raw averages, not yet reduced to
/// coefficients, so they can be cached as-is.
fn run_calibration(
    command_set: &dyn CommandSet,
    iface: &mut dyn ScannerInterface,
    device: &mut Device,
    session: &ScanSession,
) -> Result<(Vec<u16>, Vec<u16>)> {
    command_set.begin_scan(iface, device, false)?;
    for _ in 0..2 {
        let _ = command_set.led_calibration(iface, device)?;
        command_set.offset_calibration(iface, device)?;
        command_set.coarse_gain_calibration(iface, device)?;
    }
    let dark = calibration::dark_shading(iface, device, session)?.unwrap_or_default();
    let white = calibration::white_shading(iface, device, session)?;
    command_set.end_scan(iface, device, true)?;
    Ok((dark, white))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MockInterface;
    use genesys_tables::{ColorFilter, ScanMode};

    fn lide_settings(scan_method: ScanMethod) -> Settings {
        Settings {
            xres: 75,
            yres: 75,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 215.0,
            br_y_mm: 297.0,
            depth: 8,
            scan_mode: ScanMode::Color,
            scan_method,
            color_filter: ColorFilter::None,
            threshold: 128,
        }
    }

    #[test]
    fn open_transitions_to_ready() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut iface = MockInterface::new();
        let scanner = Scanner::open(&mut iface, model, "/tmp/does-not-exist.cal".into()).unwrap();
        assert_eq!(scanner.state(), LifecycleState::Ready);
    }

    #[test]
    fn start_then_read_delivers_bytes_then_eof() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut iface = MockInterface::new();
        iface.push_bulk_data(&vec![7u8; 1 << 20]);
        let mut scanner = Scanner::open(&mut iface, model, "/tmp/does-not-exist.cal".into()).unwrap();

        let session = scanner
            .start(&mut iface, &lide_settings(ScanMethod::Flatbed), ExpirationPolicy(0), 0, 0)
            .unwrap();
        assert_eq!(scanner.state(), LifecycleState::Scanning);

        let mut buf = vec![0u8; 4096];
        let n = scanner.read(&mut iface, &mut buf).unwrap();
        assert!(n > 0);
        assert!((session.output_pixels as i64 - 635).abs() <= 3);
    }

    #[test]
    fn cancel_forces_next_read_to_return_cancelled() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut iface = MockInterface::new();
        iface.push_bulk_data(&vec![7u8; 1 << 20]);
        let mut scanner = Scanner::open(&mut iface, model, "/tmp/does-not-exist.cal".into()).unwrap();
        scanner
            .start(&mut iface, &lide_settings(ScanMethod::Flatbed), ExpirationPolicy(0), 0, 0)
            .unwrap();

        let mut buf = vec![0u8; 64];
        scanner.read(&mut iface, &mut buf).unwrap();
        scanner.cancel(&mut iface).unwrap();

        let result = scanner.read(&mut iface, &mut buf);
        assert!(matches!(result, Err(GenesysError::Cancelled)));
        assert_eq!(scanner.state(), LifecycleState::Ready);
    }

    #[test]
    fn sheetfed_paper_out_is_clean_eof_not_error() {
        let model = genesys_tables::lookup_model(0x04a9, 0x2218).unwrap();
        let mut iface = MockInterface::new();
        iface.push_bulk_data(&vec![7u8; 1 << 20]);
        let mut scanner = Scanner::open(&mut iface, model, "/tmp/does-not-exist.cal".into()).unwrap();
        scanner
            .start(
                &mut iface,
                &Settings {
                    xres: 150,
                    yres: 150,
                    tl_x_mm: 0.0,
                    tl_y_mm: 0.0,
                    br_x_mm: 215.0,
                    br_y_mm: 100.0,
                    depth: 8,
                    scan_mode: ScanMode::Gray,
                    scan_method: ScanMethod::Flatbed,
                    color_filter: ColorFilter::None,
                    threshold: 128,
                },
                ExpirationPolicy(0),
                0,
                0,
            )
            .unwrap();

        iface.seed_register(0x6e, 0x01);
        let mut buf = vec![0u8; 64];
        let n = scanner.read(&mut iface, &mut buf).unwrap();
        assert_eq!(n, 0);
        assert_eq!(scanner.state(), LifecycleState::Ready);
    }
}
