//! `SANE_Parameters`: the frame shape a caller can expect from
//! `sane_read` once a scan is under way, or the best guess beforehand.

use genesys_tables::ColorFilter;

use crate::planner::ScanSession;

/// `SANE_Frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Gray,
    Rgb,
    Red,
    Green,
    Blue,
}

/// `SANE_Parameters`. This backend always delivers one frame per scan
/// (`last_frame` is always true) — there is no three-pass single-channel
/// mode to support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    pub format: Frame,
    pub last_frame: bool,
    pub bytes_per_line: u32,
    pub pixels_per_line: u32,
    pub lines: i32,
    pub depth: u8,
}

/// Derives `Parameters` from a resolved session. `lines` is `-1` when the
/// session describes a hand-fed source whose page length is not known in
/// advance, matching how sheet-fed SANE backends report unknown length.
pub fn parameters_for_session(session: &ScanSession, is_sheetfed: bool) -> Parameters {
    let format = match (session.channels, session.color_filter) {
        (3, _) => Frame::Rgb,
        (_, ColorFilter::Red) => Frame::Red,
        (_, ColorFilter::Green) => Frame::Green,
        (_, ColorFilter::Blue) => Frame::Blue,
        _ => Frame::Gray,
    };
    Parameters {
        format,
        last_frame: true,
        bytes_per_line: session.output_line_bytes,
        pixels_per_line: session.output_pixels,
        lines: if is_sheetfed { -1 } else { session.output_line_count as i32 },
        depth: session.depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesys_tables::ScanMethod;

    fn sample_session(channels: u8, color_filter: ColorFilter) -> ScanSession {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let settings = crate::planner::Settings {
            xres: 300,
            yres: 300,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 50.0,
            br_y_mm: 50.0,
            depth: 8,
            scan_mode: if channels == 3 { genesys_tables::ScanMode::Color } else { genesys_tables::ScanMode::Gray },
            scan_method: ScanMethod::Flatbed,
            color_filter,
            threshold: 128,
        };
        let geometry = crate::planner::ModelGeometry {
            x_offset_mm: model.x_offset_mm,
            y_offset_mm: model.y_offset_mm,
        };
        crate::planner::plan(&settings, model.sensor, model.motor, model.asic, geometry)
    }

    #[test]
    fn color_session_reports_rgb() {
        let session = sample_session(3, ColorFilter::None);
        let params = parameters_for_session(&session, false);
        assert_eq!(params.format, Frame::Rgb);
        assert!(params.last_frame);
        assert_eq!(params.lines, session.output_line_count as i32);
    }

    #[test]
    fn gray_with_red_filter_reports_red_frame() {
        let session = sample_session(1, ColorFilter::Red);
        let params = parameters_for_session(&session, false);
        assert_eq!(params.format, Frame::Red);
    }

    #[test]
    fn sheetfed_session_reports_unknown_line_count() {
        let session = sample_session(1, ColorFilter::None);
        let params = parameters_for_session(&session, true);
        assert_eq!(params.lines, -1);
    }
}
