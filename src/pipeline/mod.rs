//! Image Pipeline: composable per-row transforms that turn raw ASIC bytes
//! into rows matching the declared `SANE_Parameters`.
//!
//! Stages are stacked once at session start from the decisions already
//! baked into the [`ScanSession`](crate::planner::ScanSession) — no
//! runtime type queries, no stage added or skipped mid-scan.

pub mod color_shift;
pub mod desegment;
pub mod reorder;
pub mod shading;
pub mod stagger;
pub mod threshold;

use std::collections::VecDeque;

use genesys_tables::ScanMode;

use crate::calibration::ShadingCoefficients;
use crate::error::{GenesysError, Result};
use crate::interface::ScannerInterface;
use crate::planner::ScanSession;
use color_shift::ColorShiftBuffer;

/// A pull-based pipeline stage: each stage reads only as much as its
/// downstream caller demands, propagating the pull to its own upstream in
/// turn. `read` returns `Ok(0)` at end of stream, mirroring `std::io::Read`.
pub trait Stage {
    fn read(&mut self, out: &mut [u8]) -> Result<usize>;
}

/// A stage sitting directly on top of the raw byte source: no transform,
/// just a pass-through. Used as the base of every pipeline and directly
/// when a session needs none of the optional stages.
pub struct PassThrough<R> {
    inner: R,
}

impl<R> PassThrough<R> {
    pub fn new(inner: R) -> Self {
        PassThrough { inner }
    }
}

impl<R: FnMut(&mut [u8]) -> Result<usize>> Stage for PassThrough<R> {
    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        (self.inner)(out)
    }
}

/// Builds the stage stack for one session, in the fixed order the
/// component design specifies: desegment, reorder, stagger, color shift,
/// host-side shading, threshold. Each stage is included only when the
/// session's pipeline-needs flags call for it.
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Returns the ordered list of stage names this session's pipeline
    /// would install, for tests and logging that want to assert on
    /// composition without constructing the full generic stack.
    pub fn stage_names(session: &crate::planner::ScanSession) -> Vec<&'static str> {
        let mut stages = Vec::new();
        if session.pipeline_needs_reorder {
            stages.push("desegment");
        }
        stages.push("reorder");
        if session.num_staggered_lines > 0 {
            stages.push("stagger");
        }
        if session.max_color_shift_lines > 0 {
            stages.push("color_shift");
        }
        if session.use_host_side_calib {
            stages.push("shading");
        }
        if session.scan_mode == genesys_tables::ScanMode::Lineart {
            stages.push("threshold");
        }
        stages
    }

    /// Builds the live, stateful pipeline for one scan session. `shading`
    /// is `Some` only when the session's calibration is applied host-side
    /// rather than uploaded to ASIC RAM.
    pub fn build(session: &ScanSession, shading: Option<ShadingCoefficients>) -> PipelineState {
        PipelineState::for_session(session, shading)
    }
}

/// The live per-scan pipeline: pulls raw rows from the device one at a
/// time and runs each through whichever stages the session calls for,
/// in the fixed order desegment, 16-bit/lineart reorder, stagger, color
/// shift, host-side shading, threshold.
///
/// Built once at `Scanner::start`, it reads exactly `rows_remaining` raw
/// rows over the life of the scan — the same count the planner declared
/// as `output_line_count` — so stagger/color-shift priming rows (passed
/// through uncorrected until enough history has accumulated) count
/// toward the declared output, matching the bytes-per-line invariant
/// rather than being silently dropped.
pub struct PipelineState {
    raw_row_bytes: usize,
    depth: u8,
    needs_desegment: bool,
    segment_byte_size: usize,
    segment_order: &'static [u8],
    swap_16bit: bool,
    stagger_lines: usize,
    stagger_history: VecDeque<Vec<u8>>,
    color_shift: Option<ColorShiftBuffer>,
    shading_coefficients: Option<ShadingCoefficients>,
    is_lineart: bool,
    threshold_lut: Vec<u8>,
    lineart_bit_offset: u8,
    rows_remaining: u32,
    out_queue: VecDeque<u8>,
}

impl PipelineState {
    fn for_session(session: &ScanSession, shading_coefficients: Option<ShadingCoefficients>) -> Self {
        let color_shift = if session.max_color_shift_lines > 0 {
            Some(ColorShiftBuffer::new(
                session.color_shift_lines_r,
                session.color_shift_lines_g,
                session.color_shift_lines_b,
            ))
        } else {
            None
        };
        PipelineState {
            raw_row_bytes: session.output_line_bytes_raw as usize,
            depth: session.depth,
            needs_desegment: session.pipeline_needs_reorder,
            segment_byte_size: session.segment_size as usize * session.channels as usize * session.output_channel_bytes as usize,
            segment_order: session.segment_order,
            swap_16bit: session.depth == 16,
            stagger_lines: session.num_staggered_lines as usize,
            stagger_history: VecDeque::new(),
            color_shift,
            shading_coefficients,
            is_lineart: session.scan_mode == ScanMode::Lineart,
            threshold_lut: vec![session.threshold],
            lineart_bit_offset: (session.output_pixels % 8) as u8,
            rows_remaining: session.output_line_count,
            out_queue: VecDeque::new(),
        }
    }

    /// Delivers up to `out.len()` pipeline-corrected bytes, pulling and
    /// processing whole raw rows from `iface` as needed. Returns `Ok(0)`
    /// once the declared row count has been read or the device's raw
    /// byte stream ends early.
    pub fn pull(&mut self, iface: &mut dyn ScannerInterface, out: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < out.len() {
            if self.out_queue.is_empty() {
                if self.rows_remaining == 0 {
                    break;
                }
                match self.read_raw_row(iface)? {
                    Some(raw) => {
                        self.rows_remaining -= 1;
                        self.out_queue.extend(self.process_row(raw));
                    }
                    None => {
                        self.rows_remaining = 0;
                        break;
                    }
                }
            }
            let n = (out.len() - written).min(self.out_queue.len());
            for slot in out[written..written + n].iter_mut() {
                *slot = self.out_queue.pop_front().expect("just checked queue length");
            }
            written += n;
        }
        Ok(written)
    }

    /// Reads exactly one raw row from the device, or `None` if the byte
    /// stream ends before a full row has arrived.
    fn read_raw_row(&self, iface: &mut dyn ScannerInterface) -> Result<Option<Vec<u8>>> {
        let mut row = vec![0u8; self.raw_row_bytes];
        let mut filled = 0;
        while filled < row.len() {
            match iface.bulk_read(&mut row[filled..]) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(GenesysError::Eof) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
        Ok(Some(row))
    }

    fn process_row(&mut self, raw: Vec<u8>) -> Vec<u8> {
        let mut row = if self.needs_desegment {
            desegment::desegment(&raw, self.segment_byte_size, self.segment_order)
        } else {
            raw
        };

        if self.swap_16bit {
            reorder::swap_16bit_bytes(&mut row);
        }

        if self.stagger_lines > 0 {
            self.stagger_history.push_back(row.clone());
            if self.stagger_history.len() > self.stagger_lines {
                let delayed = self.stagger_history.pop_front().expect("len checked above");
                row = stagger::apply(&row, &delayed, false);
            }
        }

        if let Some(buf) = self.color_shift.as_mut() {
            if let Some(corrected) = buf.push(row.clone()) {
                row = corrected;
            }
        }

        if let Some(coefficients) = &self.shading_coefficients {
            row = apply_host_shading(&row, coefficients, self.depth);
        }

        if self.is_lineart {
            let mut packed = threshold::pack_lineart(&row, &self.threshold_lut);
            reorder::shift_lineart_bits(&mut packed, self.lineart_bit_offset);
            row = packed;
        }

        row
    }
}

/// Widens 8-bit samples to 16-bit before shading and narrows back
/// afterward; reinterprets native 16-bit rows directly, without scaling.
fn apply_host_shading(row: &[u8], coefficients: &ShadingCoefficients, depth: u8) -> Vec<u8> {
    if depth == 16 {
        let samples: Vec<u16> = row.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
        shading::apply(&samples, coefficients)
            .into_iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    } else {
        let samples: Vec<u16> = row.iter().map(|&b| b as u16 * 257).collect();
        shading::apply(&samples, coefficients)
            .into_iter()
            .map(|v| (v >> 8) as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::MockInterface;
    use crate::planner::{self, ModelGeometry, Settings};

    #[test]
    fn pass_through_forwards_reads() {
        let data = vec![1u8, 2, 3, 4];
        let mut pos = 0usize;
        let data2 = data.clone();
        let mut stage = PassThrough::new(move |out: &mut [u8]| {
            let n = out.len().min(data2.len() - pos);
            out[..n].copy_from_slice(&data2[pos..pos + n]);
            pos += n;
            Ok(n)
        });
        let mut out = [0u8; 2];
        assert_eq!(stage.read(&mut out).unwrap(), 2);
        assert_eq!(out, [1, 2]);
    }

    fn lide_session(settings: &Settings) -> ScanSession {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let geometry = ModelGeometry {
            x_offset_mm: model.x_offset_mm,
            y_offset_mm: model.y_offset_mm,
        };
        planner::plan(settings, model.sensor, model.motor, model.asic, geometry)
    }

    #[test]
    fn plain_session_delivers_raw_bytes_unmodified() {
        let settings = Settings {
            xres: 75,
            yres: 75,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 50.0,
            br_y_mm: 50.0,
            depth: 8,
            scan_mode: ScanMode::Gray,
            scan_method: genesys_tables::ScanMethod::Flatbed,
            color_filter: genesys_tables::ColorFilter::None,
            threshold: 128,
        };
        let session = lide_session(&settings);
        let mut pipeline = PipelineBuilder::build(&session, None);

        let mut iface = MockInterface::new();
        let raw_row_bytes = session.output_line_bytes_raw as usize;
        let source: Vec<u8> = (0..=255u8).cycle().take(raw_row_bytes * 4).collect();
        iface.push_bulk_data(&source);

        let mut out = vec![0u8; raw_row_bytes];
        let n = pipeline.pull(&mut iface, &mut out).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(out, source[..out.len()]);
    }

    #[test]
    fn lineart_session_packs_bits_and_honors_row_count() {
        let settings = Settings {
            xres: 75,
            yres: 75,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 50.0,
            br_y_mm: 50.0,
            depth: 1,
            scan_mode: ScanMode::Lineart,
            scan_method: genesys_tables::ScanMethod::Flatbed,
            color_filter: genesys_tables::ColorFilter::None,
            threshold: 128,
        };
        let session = lide_session(&settings);
        let mut pipeline = PipelineBuilder::build(&session, None);

        let mut iface = MockInterface::new();
        // One gray row, alternating black/white pixels, repeated for every
        // declared line; the raw wire width is one byte per pixel.
        let raw_row: Vec<u8> = (0..session.output_pixels).map(|x| if x % 2 == 0 { 0 } else { 255 }).collect();
        for _ in 0..session.output_line_count {
            iface.push_bulk_data(&raw_row);
        }

        let mut out = vec![0u8; session.output_line_bytes as usize];
        let n = pipeline.pull(&mut iface, &mut out).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(out[0], 0b1010_1010);
    }
}
