//! Scan Session Planner: resolves a user-level [`Settings`] request plus the
//! active sensor/motor descriptors into a fully-resolved [`ScanSession`].
//!
//! The planner is a pure function of its inputs — same settings, same
//! sensor, same motor, same ASIC family always produce a byte-identical
//! session — which is what makes calibration cache lookup sound.

use genesys_math::{ceil_div, ceil_to, round_down_to};
use genesys_tables::{AsicFamily, ColorFilter, MotorDescriptor, ScanMethod, ScanMode, SensorDescriptor};

/// One of the fixed hardware-clocking resolutions a sensor can be driven
/// at; the planner always rounds a requested `xres` up to the smallest of
/// these that can serve it.
const HWDPI_LADDER: [u16; 5] = [300, 600, 1200, 2400, 4800];

/// User-level scan request, mirroring the `mode`/`geometry` SANE option
/// groups once resolved to millimeters and enum values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub xres: u16,
    pub yres: u16,
    pub tl_x_mm: f32,
    pub tl_y_mm: f32,
    pub br_x_mm: f32,
    pub br_y_mm: f32,
    pub depth: u8,
    pub scan_mode: ScanMode,
    pub scan_method: ScanMethod,
    pub color_filter: ColorFilter,
    pub threshold: u8,
}

/// The planner's output: every derived quantity the register model and
/// image pipeline need, computed once and treated as read-only afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    // Requested params, carried through verbatim for cache fingerprinting.
    pub xres: u16,
    pub yres: u16,
    pub startx: u32,
    pub starty: u32,
    pub pixels: u32,
    pub lines: u32,
    pub depth: u8,
    pub channels: u8,
    pub scan_method: ScanMethod,
    pub scan_mode: ScanMode,
    pub color_filter: ColorFilter,
    pub threshold: u8,

    // Derived optical parameters.
    pub optical_resolution: u16,
    pub hwdpi: u16,
    pub hwdpi_divisor: u16,
    pub ccd_size_divisor: u16,
    pub optical_pixels: u32,
    pub optical_pixels_raw: u32,
    pub optical_line_count: u32,

    // Derived output parameters.
    pub output_resolution: u16,
    pub output_pixels: u32,
    pub output_channel_bytes: u32,
    pub output_line_bytes: u32,
    pub output_line_bytes_raw: u32,
    pub output_line_count: u32,

    // Stagger / color shift.
    pub num_staggered_lines: u8,
    pub color_shift_lines_r: u16,
    pub color_shift_lines_g: u16,
    pub color_shift_lines_b: u16,
    pub max_color_shift_lines: u16,

    // Segmentation.
    pub segment_count: usize,
    pub segment_size: u16,
    pub segment_order: &'static [u8],
    pub conseq_pixel_dist: u16,
    pub output_segment_pixel_group_count: u32,
    pub output_segment_start_offset: u32,

    // Pixel range on-wire.
    pub pixel_startx: u32,
    pub pixel_endx: u32,
    pub pixel_count_multiplier: u32,

    // Buffering.
    pub buffer_size_read: u32,

    // Booleans.
    pub enable_ledadd: bool,
    pub use_host_side_calib: bool,
    pub pipeline_needs_reorder: bool,
    pub pipeline_needs_ccd: bool,
    pub pipeline_needs_shrink: bool,
}

/// Everything the planner needs about the physical model beyond the
/// sensor/motor descriptors themselves: offsets baked into the deck, not
/// the sensor.
#[derive(Debug, Clone, Copy)]
pub struct ModelGeometry {
    pub x_offset_mm: f32,
    pub y_offset_mm: f32,
}

const MM_PER_INCH: f32 = 25.4;

/// Rounds a pixel-per-line count down to the packer alignment the ASIC
/// requires: 16-wide at high xres, 8-wide otherwise (a simplification of
/// the per-family table that is conservative for every supported family).
fn packer_alignment(xres: u16) -> u32 {
    if xres >= 1200 {
        16
    } else {
        8
    }
}

/// Runs the planner algorithm described in the component design: resolution
/// divisors, area-to-pixel conversion, depth/channel resolution,
/// segmentation, stagger, color shift, pipeline stage decisions, and
/// buffer sizing, in that order.
pub fn plan(
    settings: &Settings,
    sensor: &'static SensorDescriptor,
    motor: &'static MotorDescriptor,
    asic: AsicFamily,
    geometry: ModelGeometry,
) -> ScanSession {
    // 1. Resolution divisors.
    let optical_resolution = sensor.optical_resolution;
    let ccd_size_divisor = [4u16, 2, 1]
        .into_iter()
        .find(|&d| settings.xres * d <= optical_resolution)
        .unwrap_or(1);
    let hwdpi = HWDPI_LADDER
        .into_iter()
        .find(|&d| d >= settings.xres)
        .unwrap_or(*HWDPI_LADDER.last().unwrap());
    let hwdpi_divisor = (optical_resolution / hwdpi).max(1);

    // 2. Area to pixels.
    let startx_f = (settings.tl_x_mm + geometry.x_offset_mm) * settings.xres as f32 / MM_PER_INCH;
    let starty_f =
        (settings.tl_y_mm + geometry.y_offset_mm) * motor.base_ydpi as f32 / MM_PER_INCH;
    let startx = startx_f.max(0.0).round() as u32;
    let starty = starty_f.max(0.0).round() as u32;

    let width_mm = (settings.br_x_mm - settings.tl_x_mm).max(0.0);
    let height_mm = (settings.br_y_mm - settings.tl_y_mm).max(0.0);
    let pixels_raw = (width_mm * settings.xres as f32 / MM_PER_INCH).round() as u32;
    let alignment = packer_alignment(settings.xres);
    let pixels = round_down_to(pixels_raw, alignment).max(alignment);
    let lines = (height_mm * settings.yres as f32 / MM_PER_INCH).round() as u32;

    // 3. Depth & channels.
    let (depth, channels) = match settings.scan_mode {
        ScanMode::Lineart | ScanMode::Halftone => (1u8, 1u8),
        ScanMode::Gray => (settings.depth, 1),
        ScanMode::Color => (settings.depth, 3),
    };
    let output_channel_bytes = ceil_div(depth as u32, 8).max(1);

    // 4. Segmentation.
    let (segment_count, segment_size, segment_order, conseq_pixel_dist) =
        if !sensor.segment_order.is_empty() {
            (
                sensor.segment_count(),
                sensor.segment_size,
                sensor.segment_order,
                sensor.segment_size,
            )
        } else {
            (1, 0, &[][..], 0)
        };

    // 5. Stagger.
    let num_staggered_lines = sensor.stagger_config.stagger_at(settings.xres, settings.yres);

    // 6. Color shift, from the physical CCD row spacing: a small fixed
    // number of lines at the requested yres, not a resolution ratio.
    let (color_shift_lines_r, color_shift_lines_g, color_shift_lines_b) = if sensor.is_cis {
        (0, 0, 0)
    } else {
        let (g_mm, b_mm) = sensor.color_row_spacing_mm;
        let g = (g_mm * settings.yres as f32 / MM_PER_INCH).round().max(0.0) as u16;
        let b = (b_mm * settings.yres as f32 / MM_PER_INCH).round().max(0.0) as u16;
        (0, g, b)
    };
    let max_color_shift_lines = color_shift_lines_r
        .max(color_shift_lines_g)
        .max(color_shift_lines_b);

    let optical_pixels = pixels * ccd_size_divisor as u32;
    let optical_pixels_raw = optical_pixels + sensor.black_pixels as u32 + sensor.dummy_pixels as u32;
    let optical_line_count = lines + max_color_shift_lines as u32 + num_staggered_lines as u32;

    let output_resolution = settings.xres;
    let output_pixels = pixels;
    let output_line_bytes = ceil_div(output_pixels * channels as u32 * depth as u32, 8);
    let output_line_bytes_raw = if segment_count > 1 {
        segment_size as u32 * segment_count as u32 * channels as u32 * output_channel_bytes
    } else {
        output_pixels * channels as u32 * output_channel_bytes
    };
    let output_line_count = lines + max_color_shift_lines as u32 + num_staggered_lines as u32;

    // 7. Pipeline decisions.
    let pipeline_needs_reorder = segment_count > 1;
    let pipeline_needs_ccd = num_staggered_lines > 0 || max_color_shift_lines > 0;
    let pipeline_needs_shrink = (output_resolution as u32) < optical_resolution as u32;

    // 8. Buffer size: scale per-ASIC bulk-write ceiling.
    let asic_lines_per_read: u32 = 8;
    let bulk_max = asic.bulk_write_max() as u32;
    let buffer_size_read = ceil_to(output_line_bytes_raw * asic_lines_per_read, bulk_max);

    let pixel_startx = startx;
    let pixel_endx = pixel_startx + optical_pixels.max(1);
    let pixel_count_multiplier = ccd_size_divisor as u32;

    ScanSession {
        xres: settings.xres,
        yres: settings.yres,
        startx,
        starty,
        pixels,
        lines,
        depth,
        channels,
        scan_method: settings.scan_method,
        scan_mode: settings.scan_mode,
        color_filter: settings.color_filter,
        threshold: settings.threshold,

        optical_resolution,
        hwdpi,
        hwdpi_divisor,
        ccd_size_divisor,
        optical_pixels,
        optical_pixels_raw,
        optical_line_count,

        output_resolution,
        output_pixels,
        output_channel_bytes,
        output_line_bytes,
        output_line_bytes_raw,
        output_line_count,

        num_staggered_lines,
        color_shift_lines_r,
        color_shift_lines_g,
        color_shift_lines_b,
        max_color_shift_lines,

        segment_count,
        segment_size,
        segment_order,
        conseq_pixel_dist,
        output_segment_pixel_group_count: if segment_count > 1 {
            pixels / segment_count as u32
        } else {
            pixels
        },
        output_segment_start_offset: 0,

        pixel_startx,
        pixel_endx,
        pixel_count_multiplier,

        buffer_size_read,

        enable_ledadd: sensor.is_cis,
        use_host_side_calib: sensor.use_host_side_calib,
        pipeline_needs_reorder,
        pipeline_needs_ccd,
        pipeline_needs_shrink,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lide_220_geometry() -> (
        &'static SensorDescriptor,
        &'static MotorDescriptor,
        AsicFamily,
        ModelGeometry,
    ) {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        (
            model.sensor,
            model.motor,
            model.asic,
            ModelGeometry {
                x_offset_mm: model.x_offset_mm,
                y_offset_mm: model.y_offset_mm,
            },
        )
    }

    fn a4_color_preview() -> Settings {
        Settings {
            xres: 75,
            yres: 75,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 215.0,
            br_y_mm: 297.0,
            depth: 8,
            scan_mode: ScanMode::Color,
            scan_method: ScanMethod::Flatbed,
            color_filter: ColorFilter::None,
            threshold: 128,
        }
    }

    #[test]
    fn planner_is_deterministic() {
        let (sensor, motor, asic, geometry) = lide_220_geometry();
        let settings = a4_color_preview();
        let a = plan(&settings, sensor, motor, asic, geometry);
        let b = plan(&settings, sensor, motor, asic, geometry);
        assert_eq!(a, b);
    }

    #[test]
    fn area_invariant_holds_within_one_pixel() {
        let (sensor, motor, asic, geometry) = lide_220_geometry();
        let settings = a4_color_preview();
        let session = plan(&settings, sensor, motor, asic, geometry);
        let reconstructed_mm = session.output_pixels as f32 * MM_PER_INCH / settings.xres as f32;
        let requested_mm = settings.br_x_mm - settings.tl_x_mm;
        let one_pixel_mm = MM_PER_INCH / settings.xres as f32;
        assert!((reconstructed_mm - requested_mm).abs() <= one_pixel_mm);
    }

    #[test]
    fn output_line_count_matches_invariant() {
        let (sensor, motor, asic, geometry) = lide_220_geometry();
        let settings = a4_color_preview();
        let session = plan(&settings, sensor, motor, asic, geometry);
        assert_eq!(
            session.output_line_count,
            session.lines + session.max_color_shift_lines as u32 + session.num_staggered_lines as u32
        );
    }

    #[test]
    fn color_preview_matches_scenario_one_shape() {
        let (sensor, motor, asic, geometry) = lide_220_geometry();
        let settings = a4_color_preview();
        let session = plan(&settings, sensor, motor, asic, geometry);
        assert_eq!(session.channels, 3);
        assert!((session.output_pixels as i64 - 635).abs() <= 3);
        assert_eq!(session.output_line_bytes, session.output_pixels * 3);
    }

    #[test]
    fn opticfilm_ta_scan_uses_host_side_shading_and_stagger() {
        let model = genesys_tables::lookup_model(0x07b3, 0x0c16).unwrap();
        let settings = Settings {
            xres: 7200,
            yres: 7200,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 24.0,
            br_y_mm: 36.0,
            depth: 16,
            scan_mode: ScanMode::Color,
            scan_method: ScanMethod::TransparencyAdapter,
            color_filter: ColorFilter::None,
            threshold: 128,
        };
        let session = plan(
            &settings,
            model.sensor,
            model.motor,
            model.asic,
            ModelGeometry {
                x_offset_mm: model.x_offset_mm,
                y_offset_mm: model.ta_y_offset_mm,
            },
        );
        assert!(session.use_host_side_calib);
        assert_eq!(session.num_staggered_lines, 2);
    }
}
