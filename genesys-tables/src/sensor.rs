/// Scan method: which optical path a request is routed through.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScanMethod {
    Flatbed,
    TransparencyAdapter,
    TransparencyAdapterInfrared,
}

/// User-selected scan mode. Lineart and Halftone are both 1-bit-per-pixel
/// single-channel modes; they differ only in the pipeline's threshold stage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScanMode {
    Lineart,
    Halftone,
    Gray,
    Color,
}

impl ScanMode {
    pub fn channels(self) -> u8 {
        match self {
            ScanMode::Color => 3,
            _ => 1,
        }
    }
}

/// Which channel a single-channel acquisition is filtered to, or none for
/// full color.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColorFilter {
    Red,
    Green,
    Blue,
    None,
}

/// Per-channel exposure (integration) time, in line-clock units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct SensorExposure {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

/// Vertical stagger behavior of a double-row CCD: above `min_resolution`,
/// `lines_at_min` rows of vertical realignment are required before a column
/// is correctly positioned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StaggerConfig {
    pub min_resolution: u16,
    pub lines_at_min: u8,
}

impl StaggerConfig {
    pub const NONE: StaggerConfig = StaggerConfig {
        min_resolution: u16::MAX,
        lines_at_min: 0,
    };

    /// Number of staggered lines needed at this resolution pair, per the
    /// planner's stagger step: zero unless `xres` has crossed the
    /// stagger threshold.
    pub fn stagger_at(&self, xres: u16, _yres: u16) -> u8 {
        if xres >= self.min_resolution {
            self.lines_at_min
        } else {
            0
        }
    }
}

/// A per-resolution register override: some ASIC registers need values that
/// depend on the requested optical resolution bucket (e.g. timing constants),
/// beyond what the general planner formulas compute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterOverride {
    pub address: u16,
    pub value: u8,
}

/// Immutable per-model sensor description. One of these exists per physical
/// sensor part number, shared by reference across every device session that
/// uses it.
pub struct SensorDescriptor {
    pub optical_resolution: u16,
    pub black_pixels: u16,
    pub dummy_pixels: u16,
    pub ccd_start_offset: u16,
    pub white_gain_reference: u16,
    pub gain_white_ref_coeff: f32,
    /// Per-resolution register overrides, keyed by xres.
    pub custom_registers: &'static [(u16, &'static [RegisterOverride])],
    /// Per-resolution exposure line period (`lperiod`), keyed by xres.
    pub lperiod_by_resolution: &'static [(u16, u32)],
    pub exposure: SensorExposure,
    /// Number of pixels in one physical sensor segment.
    pub segment_size: u16,
    /// Permutation describing which physical segment each interleaved output
    /// pixel position is read from. Empty means "no segmentation" (count 1).
    pub segment_order: &'static [u8],
    pub stagger_config: StaggerConfig,
    /// Physical row spacing of the green and blue CCD rows behind the red
    /// row, in millimeters. Zero for single-row (CIS) sensors.
    pub color_row_spacing_mm: (f32, f32),
    pub use_host_side_calib: bool,
    pub is_cis: bool,
    pub supported_channels: &'static [u8],
    pub supported_methods: &'static [ScanMethod],
    /// Default per-channel gamma exponent, in 1/100ths (e.g. 220 == 2.20).
    pub gamma: (u16, u16, u16),
}

impl SensorDescriptor {
    pub fn segment_count(&self) -> usize {
        if self.segment_order.is_empty() {
            1
        } else {
            self.segment_order.len()
        }
    }

    pub fn lperiod_for(&self, xres: u16) -> Option<u32> {
        self.lperiod_by_resolution
            .iter()
            .find(|(res, _)| *res == xres)
            .map(|(_, p)| *p)
    }

    pub fn custom_registers_for(&self, xres: u16) -> &'static [RegisterOverride] {
        self.custom_registers
            .iter()
            .find(|(res, _)| *res == xres)
            .map(|(_, regs)| *regs)
            .unwrap_or(&[])
    }

    pub fn supports_method(&self, method: ScanMethod) -> bool {
        self.supported_methods.contains(&method)
    }

    pub fn supports_channels(&self, channels: u8) -> bool {
        self.supported_channels.contains(&channels)
    }
}
