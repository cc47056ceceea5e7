//! Calibration Engine: LED, offset, coarse-gain, dark-shading, and
//! white-shading passes, plus the keyed on-disk cache that lets most scans
//! skip them entirely.

pub mod cache;

use genesys_tables::FrontendKind;

use crate::device::Device;
use crate::error::Result;
use crate::interface::ScannerInterface;
use crate::planner::ScanSession;

/// A persisted calibration result, keyed to the session shape it was
/// computed for. Compared for compatibility whenever a new scan starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationCacheEntry {
    pub resolution: u16,
    pub channels: u8,
    pub mode: u8,
    pub method: u8,
    pub startx: u32,
    pub pixels: u32,
    pub depth: u8,
    pub timestamp: u64,
    pub average_size: usize,
    pub dark_average_data: Vec<u16>,
    pub white_average_data: Vec<u16>,
}

impl CalibrationCacheEntry {
    /// Builds a fresh cache entry from a just-completed calibration pass's
    /// raw dark/white reference averages (not yet reduced to coefficients —
    /// that reduction happens again on every cache hit via
    /// [`compute_coefficients`], so the stored averages are the
    /// reusable artifact).
    pub fn from_session(
        session: &ScanSession,
        dark_average: &[u16],
        white_average: &[u16],
        timestamp: u64,
    ) -> Self {
        CalibrationCacheEntry {
            resolution: session.xres,
            channels: session.channels,
            mode: scan_mode_tag(session.scan_mode),
            method: scan_method_tag(session.scan_method),
            startx: session.startx,
            pixels: session.pixels,
            depth: session.depth,
            timestamp,
            average_size: dark_average.len(),
            dark_average_data: dark_average.to_vec(),
            white_average_data: white_average.to_vec(),
        }
    }

    /// Whether this entry's fingerprint matches a session about to start:
    /// same resolution, channels, mode, method, startx, pixels, and depth.
    pub fn matches(&self, session: &ScanSession) -> bool {
        self.resolution == session.xres
            && self.channels == session.channels
            && self.mode == scan_mode_tag(session.scan_mode)
            && self.method == scan_method_tag(session.scan_method)
            && self.startx == session.startx
            && self.pixels == session.pixels
            && self.depth == session.depth
    }
}

fn scan_mode_tag(mode: genesys_tables::ScanMode) -> u8 {
    use genesys_tables::ScanMode::*;
    match mode {
        Lineart => 0,
        Halftone => 1,
        Gray => 2,
        Color => 3,
    }
}

fn scan_method_tag(method: genesys_tables::ScanMethod) -> u8 {
    use genesys_tables::ScanMethod::*;
    match method {
        Flatbed => 0,
        TransparencyAdapter => 1,
        TransparencyAdapterInfrared => 2,
    }
}

/// Expiration policy for cache reuse, in minutes. Negative means never
/// expire; zero disables caching entirely.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationPolicy(pub i32);

impl ExpirationPolicy {
    pub fn allows_reuse(self, entry_age_minutes: u64) -> bool {
        match self.0 {
            0 => false,
            n if n < 0 => true,
            n => entry_age_minutes < n as u64,
        }
    }
}

/// Looks up the first cache entry compatible with `session`, honoring the
/// expiration policy against `now_minutes` (seconds-since-epoch / 60,
/// passed in rather than read from the clock so this stays pure and
/// testable).
pub fn find_cached(
    cache: &[CalibrationCacheEntry],
    session: &ScanSession,
    policy: ExpirationPolicy,
    now_minutes: u64,
) -> Option<&CalibrationCacheEntry> {
    cache.iter().find(|entry| {
        entry.matches(session) && policy.allows_reuse(now_minutes.saturating_sub(entry.timestamp / 60))
    })
}

const LED_TARGET_TOLERANCE_PCT: f32 = 0.05;
const LED_MIN_EXPOSURE: u16 = 50;
const LED_MAX_EXPOSURE: u16 = 3000;
const LED_MAX_PASSES: u32 = 100;

/// Runs iterative LED exposure-time convergence for CIS sensors: adjusts
/// each channel's exposure until all three channel means are within 5% of
/// each other, bounded to [50, 3000] line-periods, capped at 100 passes.
/// CCD sensors have no LED step and this is a no-op that returns the
/// descriptor's existing exposure unchanged.
pub fn led_calibration(
    iface: &mut dyn ScannerInterface,
    device: &Device,
) -> Result<genesys_tables::SensorExposure> {
    if !device.sensor.is_cis {
        return Ok(device.sensor.exposure);
    }
    iface.test_checkpoint("led_calibration_start");

    let mut exposure = device.sensor.exposure;
    for _ in 0..LED_MAX_PASSES {
        let means = scan_one_line_means(iface, exposure)?;
        let max_mean = means.0.max(means.1).max(means.2);
        let min_mean = means.0.min(means.1).min(means.2);
        if max_mean == 0 || (max_mean - min_mean) as f32 / max_mean as f32 <= LED_TARGET_TOLERANCE_PCT {
            break;
        }
        exposure.r = adjust_exposure(exposure.r, means.0, max_mean);
        exposure.g = adjust_exposure(exposure.g, means.1, max_mean);
        exposure.b = adjust_exposure(exposure.b, means.2, max_mean);
    }
    iface.test_checkpoint("led_calibration_done");
    Ok(exposure)
}

fn adjust_exposure(current: u16, mean: u16, target_mean: u16) -> u16 {
    if mean == 0 {
        return (current.saturating_mul(2)).clamp(LED_MIN_EXPOSURE, LED_MAX_EXPOSURE);
    }
    let scaled = (current as u32 * target_mean as u32 / mean.max(1) as u32) as u16;
    scaled.clamp(LED_MIN_EXPOSURE, LED_MAX_EXPOSURE)
}

/// Scans one calibration line and returns the per-channel mean. Lives
/// behind the Scanner Interface so it is exercised identically against
/// real and mock hardware; exposure is not yet wired into a register write
/// here because that is ASIC-specific and belongs to the `CommandSet`
/// layer that calls this function.
fn scan_one_line_means(
    iface: &mut dyn ScannerInterface,
    _exposure: genesys_tables::SensorExposure,
) -> Result<(u16, u16, u16)> {
    let mut buf = [0u8; 192];
    let n = iface.bulk_read(&mut buf)?;
    let chunk = n / 3;
    let mean = |bytes: &[u8]| -> u16 {
        if bytes.is_empty() {
            0
        } else {
            (bytes.iter().map(|&b| b as u32).sum::<u32>() / bytes.len() as u32) as u16
        }
    };
    Ok((
        mean(&buf[0..chunk]),
        mean(&buf[chunk..2 * chunk]),
        mean(&buf[2 * chunk..3 * chunk.max(1).min(buf.len())]),
    ))
}

const OFFSET_MIN: u8 = 10;
const OFFSET_MAX: u8 = 255;
const OFFSET_MAX_ITERATIONS: u32 = 32;

/// Binary-searches each channel's frontend offset register so the
/// dark-pixel mean lands near zero. Analog-Devices frontends self-
/// calibrate and this is skipped entirely.
pub fn offset_calibration(iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
    if device.frontend.kind.self_calibrates() {
        return Ok(());
    }
    iface.test_checkpoint("offset_calibration_start");

    let regs = [
        device.frontend.reg_offset.0,
        device.frontend.reg_offset.1,
        device.frontend.reg_offset.2,
    ];
    for &reg in &regs {
        let mut lo = OFFSET_MIN;
        let mut hi = OFFSET_MAX;
        for _ in 0..OFFSET_MAX_ITERATIONS {
            if hi.saturating_sub(lo) <= 1 {
                break;
            }
            let mid = lo + (hi - lo) / 2;
            iface.write_fe_register(reg, mid)?;
            let (mean, _, _) = scan_one_line_means(iface, device.sensor.exposure)?;
            if mean > 128 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        iface.write_fe_register(reg, lo)?;
    }
    iface.test_checkpoint("offset_calibration_done");
    Ok(())
}

/// 95th-percentile pixel value of a byte slice, used instead of the
/// maximum to reject noise and hot pixels.
fn percentile_95(samples: &mut [u8]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let idx = ((samples.len() as f32 - 1.0) * 0.95).round() as usize;
    samples[idx.min(samples.len() - 1)]
}

/// Scans the white reference strip and sets each channel's gain register so
/// its 95th-percentile value maps to `gain_white_ref * coeff`. CIS sensors
/// additionally unify the three channel gains to the minimum, since a
/// single LED drives all three colors through one optical path.
pub fn coarse_gain_calibration(iface: &mut dyn ScannerInterface, device: &mut Device) -> Result<()> {
    iface.test_checkpoint("coarse_gain_calibration_start");

    let mut buf = [0u8; 300];
    iface.bulk_read(&mut buf)?;
    let third = buf.len() / 3;
    let mut r: Vec<u8> = buf[0..third].to_vec();
    let mut g: Vec<u8> = buf[third..2 * third].to_vec();
    let mut b: Vec<u8> = buf[2 * third..].to_vec();

    let target = (device.sensor.white_gain_reference as f32 * device.sensor.gain_white_ref_coeff) as u32;
    let gain_for = |p95: u8| -> u8 {
        if p95 == 0 {
            return 255;
        }
        ((target.min(0xff_ff) / p95.max(1) as u32).min(255)) as u8
    };

    let mut gain_r = gain_for(percentile_95(&mut r));
    let mut gain_g = gain_for(percentile_95(&mut g));
    let mut gain_b = gain_for(percentile_95(&mut b));

    if device.sensor.is_cis {
        let min_gain = gain_r.min(gain_g).min(gain_b);
        gain_r = min_gain;
        gain_g = min_gain;
        gain_b = min_gain;
    }

    iface.write_fe_register(device.frontend.reg_gain.0, gain_r)?;
    iface.write_fe_register(device.frontend.reg_gain.1, gain_g)?;
    iface.write_fe_register(device.frontend.reg_gain.2, gain_b)?;

    iface.test_checkpoint("coarse_gain_calibration_done");
    Ok(())
}

/// Scans N reference lines and returns the per-pixel median across them.
fn median_aggregate(lines: &[Vec<u16>]) -> Vec<u16> {
    if lines.is_empty() {
        return Vec::new();
    }
    let width = lines[0].len();
    let mut out = vec![0u16; width];
    let mut column = Vec::with_capacity(lines.len());
    for x in 0..width {
        column.clear();
        column.extend(lines.iter().map(|line| line[x]));
        column.sort_unstable();
        out[x] = column[column.len() / 2];
    }
    out
}

const SHADING_SCAN_LINES: usize = 12;

/// Dark-shading pass: lamp off on flatbed, lamp on for sheet-fed (using the
/// guaranteed-black strip on the calibration sheet). Skipped entirely for
/// infrared transparency scans, which have no meaningful dark reference.
pub fn dark_shading(
    iface: &mut dyn ScannerInterface,
    device: &Device,
    session: &ScanSession,
) -> Result<Option<Vec<u16>>> {
    if session.scan_method == genesys_tables::ScanMethod::TransparencyAdapterInfrared {
        return Ok(None);
    }
    iface.test_checkpoint("dark_shading_start");
    let lines = scan_calibration_lines(iface, session, SHADING_SCAN_LINES)?;
    iface.test_checkpoint("dark_shading_done");
    Ok(Some(median_aggregate(&lines)))
}

/// White-shading pass: lamp on, motor state per model, scan the white
/// reference strip.
pub fn white_shading(
    iface: &mut dyn ScannerInterface,
    _device: &Device,
    session: &ScanSession,
) -> Result<Vec<u16>> {
    iface.test_checkpoint("white_shading_start");
    let lines = scan_calibration_lines(iface, session, SHADING_SCAN_LINES)?;
    iface.test_checkpoint("white_shading_done");
    Ok(median_aggregate(&lines))
}

fn scan_calibration_lines(
    iface: &mut dyn ScannerInterface,
    session: &ScanSession,
    n: usize,
) -> Result<Vec<Vec<u16>>> {
    let width = session.pixels.max(1) as usize;
    let mut lines = Vec::with_capacity(n);
    for _ in 0..n {
        let mut raw = vec![0u8; width * 2];
        iface.bulk_read(&mut raw)?;
        let line: Vec<u16> = raw.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
        lines.push(line);
    }
    Ok(lines)
}

/// Per-pixel shading coefficients: one (dark-offset, gain) pair per pixel
/// per channel, laid out as two little-endian 16-bit values each, ready to
/// write to shading RAM (ASIC-side) or keep in host memory (host-side).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShadingCoefficients {
    pub dark_offset: Vec<u16>,
    pub gain: Vec<u16>,
}

const TARGET_DARK: f32 = 0.0;
const TARGET_BRIGHT: f32 = 65535.0;
const GAIN_COEFF: f32 = 1.0;

/// Computes per-pixel shading coefficients from the dark and white
/// averages: `gain = clamp((bright - dark) * coeff / (br - dk), 0, 65535)`,
/// `off = clamp((dk*bright - br*dark) / (bright - dark), 0, 65535)`.
pub fn compute_coefficients(dark_average: &[u16], white_average: &[u16]) -> ShadingCoefficients {
    let len = dark_average.len().min(white_average.len());
    let mut dark_offset = Vec::with_capacity(len);
    let mut gain = Vec::with_capacity(len);
    for i in 0..len {
        let dk = dark_average[i] as f32;
        let br = white_average[i] as f32;
        let denom = (br - dk).max(1.0);
        let g = ((TARGET_BRIGHT - TARGET_DARK) * GAIN_COEFF / denom).clamp(0.0, 65535.0);
        let o = ((dk * TARGET_BRIGHT - br * TARGET_DARK) / (TARGET_BRIGHT - TARGET_DARK)).clamp(0.0, 65535.0);
        gain.push(g as u16);
        dark_offset.push(o as u16);
    }
    ShadingCoefficients { dark_offset, gain }
}

impl ShadingCoefficients {
    /// Serializes as two little-endian 16-bit values per pixel, the layout
    /// `write_buffer(0x3c, start_addr, bytes)` expects.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.dark_offset.len() * 4);
        for i in 0..self.dark_offset.len() {
            out.extend_from_slice(&self.dark_offset[i].to_le_bytes());
            out.extend_from_slice(&self.gain.get(i).copied().unwrap_or(0).to_le_bytes());
        }
        out
    }
}

/// Shading RAM start offset for a given dpihw bucket; families with
/// `has_shading_area` (the `SHDAREA` bit) skip this entirely since the
/// ASIC applies shading only within the active scan window.
pub fn shading_start_address(asic: genesys_tables::AsicFamily, dpihw: u16, words_per_color: u32) -> u32 {
    if asic.has_shading_area() {
        return 0;
    }
    let bucket_index = match dpihw {
        0..=600 => 0,
        601..=1200 => 1,
        _ => 2,
    };
    bucket_index * words_per_color * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MockInterface;
    use genesys_tables::ScanMethod;

    fn session_for(xres: u16) -> ScanSession {
        crate::planner::plan(
            &crate::planner::Settings {
                xres,
                yres: xres,
                tl_x_mm: 0.0,
                tl_y_mm: 0.0,
                br_x_mm: 50.0,
                br_y_mm: 50.0,
                depth: 8,
                scan_mode: genesys_tables::ScanMode::Gray,
                scan_method: ScanMethod::Flatbed,
                color_filter: genesys_tables::ColorFilter::None,
                threshold: 128,
            },
            genesys_tables::lookup_model(0x03f0, 0x4105).unwrap().sensor,
            genesys_tables::lookup_model(0x03f0, 0x4105).unwrap().motor,
            genesys_tables::AsicFamily::Gl847,
            crate::planner::ModelGeometry {
                x_offset_mm: 0.0,
                y_offset_mm: 0.0,
            },
        )
    }

    #[test]
    fn cache_entry_matches_identical_session_shape() {
        let session = session_for(400);
        let entry = CalibrationCacheEntry {
            resolution: session.xres,
            channels: session.channels,
            mode: scan_mode_tag(session.scan_mode),
            method: scan_method_tag(session.scan_method),
            startx: session.startx,
            pixels: session.pixels,
            depth: session.depth,
            timestamp: 0,
            average_size: 0,
            dark_average_data: vec![],
            white_average_data: vec![],
        };
        assert!(entry.matches(&session));
    }

    #[test]
    fn expiration_policy_semantics() {
        assert!(!ExpirationPolicy(0).allows_reuse(0));
        assert!(ExpirationPolicy(-1).allows_reuse(1_000_000));
        assert!(ExpirationPolicy(60).allows_reuse(10));
        assert!(!ExpirationPolicy(60).allows_reuse(61));
    }

    #[test]
    fn coefficient_computation_is_monotonic_in_contrast() {
        let dark = vec![100, 100, 100];
        let white_high_contrast = vec![60000, 50000, 40000];
        let coeffs = compute_coefficients(&dark, &white_high_contrast);
        assert_eq!(coeffs.gain.len(), 3);
        assert!(coeffs.gain[0] <= coeffs.gain[1]);
        assert!(coeffs.gain[1] <= coeffs.gain[2]);
    }

    #[test]
    fn offset_calibration_skipped_for_self_calibrating_frontend() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        assert!(matches!(model.frontend.kind, FrontendKind::AnalogDevices));
        let mut device = Device::from_model(model);
        let mut iface = MockInterface::new();
        offset_calibration(&mut iface, &mut device).unwrap();
        assert!(iface.trace.is_empty());
    }
}
