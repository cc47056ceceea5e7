//! The SANE option/parameter surface: every `{name, title, desc, type,
//! unit, size, cap_flags, constraint}` descriptor the host-facing API
//! exposes, plus the live per-handle option state backing them.

use genesys_tables::{ColorFilter, Model, ScanMethod, ScanMode};

use crate::calibration::{CalibrationCacheEntry, ExpirationPolicy};
use crate::planner::Settings;

/// `SANE_Value_Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    Bool,
    Int,
    Fixed,
    String,
    Button,
    Group,
}

/// `SANE_Unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionUnit {
    None,
    Pixel,
    Bit,
    Mm,
    Dpi,
    Percent,
    Microsecond,
}

/// `SANE_Constraint_Type` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionConstraint {
    None,
    IntRange { min: i32, max: i32, quantum: i32 },
    WordList(&'static [i32]),
    StringList(&'static [&'static str]),
}

/// `SANE_Cap` bits. Plain flags rather than a crate dependency — this is
/// the same shape as [`crate::registers::HardwareSensors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptionCap(pub u32);

impl OptionCap {
    pub const SOFT_SELECT: u32 = 1 << 0;
    pub const HARD_SELECT: u32 = 1 << 1;
    pub const SOFT_DETECT: u32 = 1 << 2;
    pub const EMULATED: u32 = 1 << 3;
    pub const AUTOMATIC: u32 = 1 << 4;
    pub const INACTIVE: u32 = 1 << 5;
    pub const ADVANCED: u32 = 1 << 6;

    pub const SETTABLE: OptionCap = OptionCap(Self::SOFT_SELECT | Self::SOFT_DETECT);
    pub const READ_ONLY: OptionCap = OptionCap(Self::SOFT_DETECT);
    pub const GROUP: OptionCap = OptionCap(0);

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// One entry in the option table. `index` matches the position
/// `sane_get_option_descriptor`/`sane_control_option` address it by.
#[derive(Debug, Clone)]
pub struct OptionDescriptor {
    pub index: usize,
    pub name: &'static str,
    pub title: &'static str,
    pub desc: &'static str,
    pub option_type: OptionType,
    pub unit: OptionUnit,
    pub size: usize,
    pub cap: OptionCap,
    pub constraint: OptionConstraint,
}

/// Every option this backend recognizes, in the order the group table in
/// the external interface contract lists them. `sane_get_option_descriptor`
/// indexes straight into this.
pub static OPTION_DESCRIPTORS: &[OptionDescriptor] = &[
    // --- mode -----------------------------------------------------------
    OptionDescriptor {
        index: 0,
        name: "",
        title: "Scan Mode",
        desc: "Scan mode options",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 1,
        name: "mode",
        title: "Mode",
        desc: "Selects the scan mode (e.g. Color, Gray, Lineart)",
        option_type: OptionType::String,
        unit: OptionUnit::None,
        size: 16,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::StringList(&["Color", "Gray", "Lineart", "Halftone"]),
    },
    OptionDescriptor {
        index: 2,
        name: "source",
        title: "Source",
        desc: "Selects the scan source (flatbed or transparency adapter)",
        option_type: OptionType::String,
        unit: OptionUnit::None,
        size: 16,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::StringList(&["Flatbed", "Transparency Adapter", "Transparency Adapter Infrared"]),
    },
    OptionDescriptor {
        index: 3,
        name: "preview",
        title: "Preview",
        desc: "Requests a fast low-resolution preview scan",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 4,
        name: "depth",
        title: "Bit Depth",
        desc: "Selects the number of bits per sample",
        option_type: OptionType::Int,
        unit: OptionUnit::Bit,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::WordList(&[1, 8, 16]),
    },
    OptionDescriptor {
        index: 5,
        name: "resolution",
        title: "Resolution",
        desc: "Sets the resolution of the scanned image",
        option_type: OptionType::Int,
        unit: OptionUnit::Dpi,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 50,
            max: 4800,
            quantum: 1,
        },
    },
    // --- geometry ---------------------------------------------------------
    OptionDescriptor {
        index: 6,
        name: "",
        title: "Geometry",
        desc: "Geometry options",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 7,
        name: "tl-x",
        title: "Top-left x",
        desc: "Top-left x position of scan area",
        option_type: OptionType::Fixed,
        unit: OptionUnit::Mm,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 500,
            quantum: 0,
        },
    },
    OptionDescriptor {
        index: 8,
        name: "tl-y",
        title: "Top-left y",
        desc: "Top-left y position of scan area",
        option_type: OptionType::Fixed,
        unit: OptionUnit::Mm,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 500,
            quantum: 0,
        },
    },
    OptionDescriptor {
        index: 9,
        name: "br-x",
        title: "Bottom-right x",
        desc: "Bottom-right x position of scan area",
        option_type: OptionType::Fixed,
        unit: OptionUnit::Mm,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 500,
            quantum: 0,
        },
    },
    OptionDescriptor {
        index: 10,
        name: "br-y",
        title: "Bottom-right y",
        desc: "Bottom-right y position of scan area",
        option_type: OptionType::Fixed,
        unit: OptionUnit::Mm,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 500,
            quantum: 0,
        },
    },
    // --- enhancement --------------------------------------------------
    OptionDescriptor {
        index: 11,
        name: "",
        title: "Enhancement",
        desc: "Enhancement options",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 12,
        name: "custom-gamma",
        title: "Custom gamma",
        desc: "Use the gamma values supplied below instead of the sensor default",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 13,
        name: "gamma-vector-r",
        title: "Red gamma",
        desc: "Gamma exponent for the red channel, in hundredths",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 50,
            max: 500,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 14,
        name: "gamma-vector-g",
        title: "Green gamma",
        desc: "Gamma exponent for the green channel, in hundredths",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 50,
            max: 500,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 15,
        name: "gamma-vector-b",
        title: "Blue gamma",
        desc: "Gamma exponent for the blue channel, in hundredths",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 50,
            max: 500,
            quantum: 1,
        },
    },
    // --- software-post ----------------------------------------------------
    OptionDescriptor {
        index: 16,
        name: "",
        title: "Software Post-processing",
        desc: "Host-side image enhancement options",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 17,
        name: "swdeskew",
        title: "Software deskew",
        desc: "Rotate the scanned image to correct paper skew",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 18,
        name: "swdespeck",
        title: "Software despeckle",
        desc: "Remove isolated dark pixels from the scanned image",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 19,
        name: "despeck-radius",
        title: "Despeckle radius",
        desc: "Maximum speckle size in pixels to remove",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 1,
            max: 9,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 20,
        name: "swcrop",
        title: "Software crop",
        desc: "Crop the scanned image to its detected content",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 21,
        name: "swskip",
        title: "Software blank page skip",
        desc: "Percentage of non-white pixels below which a page is skipped",
        option_type: OptionType::Int,
        unit: OptionUnit::Percent,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 100,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 22,
        name: "swderotate",
        title: "Software derotate",
        desc: "Automatically correct a 90/180/270 degree page rotation",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 23,
        name: "brightness",
        title: "Brightness",
        desc: "Controls the brightness of the acquired image",
        option_type: OptionType::Int,
        unit: OptionUnit::Percent,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: -100,
            max: 100,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 24,
        name: "contrast",
        title: "Contrast",
        desc: "Controls the contrast of the acquired image",
        option_type: OptionType::Int,
        unit: OptionUnit::Percent,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: -100,
            max: 100,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 25,
        name: "threshold",
        title: "Threshold",
        desc: "Select minimum brightness to get a white point in lineart mode",
        option_type: OptionType::Int,
        unit: OptionUnit::Percent,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 100,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 26,
        name: "threshold-curve",
        title: "Threshold curve",
        desc: "Dynamic threshold curve, from 0 (none) to 127 (sharp)",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 127,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 27,
        name: "color-filter",
        title: "Color filter",
        desc: "Selects a single color channel to scan in gray modes",
        option_type: OptionType::String,
        unit: OptionUnit::None,
        size: 8,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::StringList(&["None", "Red", "Green", "Blue"]),
    },
    OptionDescriptor {
        index: 28,
        name: "disable-interpolation",
        title: "Disable interpolation",
        desc: "Disable software interpolation when resolution exceeds the optical maximum",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    // --- extras ----------------------------------------------------------
    OptionDescriptor {
        index: 29,
        name: "",
        title: "Extras",
        desc: "Power and cache policy options",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 30,
        name: "lamp-off",
        title: "Lamp off",
        desc: "Turns the lamp off immediately",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 31,
        name: "lamp-off-time",
        title: "Lamp off time",
        desc: "Minutes of inactivity before the lamp is turned off automatically",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: 0,
            max: 60,
            quantum: 1,
        },
    },
    OptionDescriptor {
        index: 32,
        name: "expiration-time",
        title: "Calibration expiration time",
        desc: "Minutes before a cached calibration is considered stale; -1 never expires",
        option_type: OptionType::Int,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::IntRange {
            min: -1,
            max: 30000,
            quantum: 1,
        },
    },
    // --- sensors (read-only) ----------------------------------------------
    OptionDescriptor {
        index: 33,
        name: "",
        title: "Sensors",
        desc: "Front-panel button and status sensors",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 34,
        name: "scan-sw",
        title: "Scan button",
        desc: "Scan button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 35,
        name: "file-sw",
        title: "File button",
        desc: "File button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 36,
        name: "email-sw",
        title: "Email button",
        desc: "Email button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 37,
        name: "copy-sw",
        title: "Copy button",
        desc: "Copy button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 38,
        name: "ocr-sw",
        title: "OCR button",
        desc: "OCR button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 39,
        name: "power-sw",
        title: "Power button",
        desc: "Power button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 40,
        name: "extra-sw",
        title: "Extra button",
        desc: "Extra/custom button was pressed",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 41,
        name: "page-loaded-sw",
        title: "Page loaded",
        desc: "Document is present in the sheet feeder",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 42,
        name: "need-calibration-sw",
        title: "Needs calibration",
        desc: "No usable calibration cache entry exists for this device",
        option_type: OptionType::Bool,
        unit: OptionUnit::None,
        size: 4,
        cap: OptionCap::READ_ONLY,
        constraint: OptionConstraint::None,
    },
    // --- buttons (side-effecting) ------------------------------------------
    OptionDescriptor {
        index: 43,
        name: "",
        title: "Buttons",
        desc: "Side-effecting actions",
        option_type: OptionType::Group,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::GROUP,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 44,
        name: "calibrate",
        title: "Calibrate",
        desc: "Discards the cache entry matching the current settings and recalibrates on the next scan",
        option_type: OptionType::Button,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 45,
        name: "clear-calibration",
        title: "Clear calibration",
        desc: "Discards every cache entry for this device",
        option_type: OptionType::Button,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 46,
        name: "force-calibration",
        title: "Force calibration",
        desc: "Ignores the cache once, even on an otherwise matching fingerprint",
        option_type: OptionType::Button,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
    OptionDescriptor {
        index: 47,
        name: "ignore-offsets",
        title: "Ignore offsets",
        desc: "Skips the offset calibration pass on the next calibration run",
        option_type: OptionType::Button,
        unit: OptionUnit::None,
        size: 0,
        cap: OptionCap::SETTABLE,
        constraint: OptionConstraint::None,
    },
];

pub fn option_count() -> usize {
    OPTION_DESCRIPTORS.len()
}

pub fn descriptor(index: usize) -> Option<&'static OptionDescriptor> {
    OPTION_DESCRIPTORS.get(index)
}

fn index_of(name: &str) -> Option<usize> {
    OPTION_DESCRIPTORS.iter().position(|d| d.name == name)
}

/// A control-option get/set value, independent of C representation.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i32),
    Fixed(f64),
    String(String),
    Unit,
}

/// `sane_control_option`'s `info` out-parameter bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetInfo(pub u32);

impl SetInfo {
    pub const INEXACT: u32 = 1 << 0;
    pub const RELOAD_OPTIONS: u32 = 1 << 1;
    pub const RELOAD_PARAMS: u32 = 1 << 2;
}

/// Software post-processing option state. Stored and reported faithfully;
/// none of it is wired into the image pipeline — deskew/despeckle/crop/
/// derotate are peripheral collaborators this backend never implements,
/// per the external interface contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftwarePost {
    pub swdeskew: bool,
    pub swdespeck: bool,
    pub despeck_radius: i32,
    pub swcrop: bool,
    pub swskip_pct: i32,
    pub swderotate: bool,
    pub brightness: i32,
    pub contrast: i32,
    pub threshold_curve: i32,
    pub disable_interpolation: bool,
}

impl Default for SoftwarePost {
    fn default() -> Self {
        SoftwarePost {
            swdeskew: false,
            swdespeck: false,
            despeck_radius: 2,
            swcrop: false,
            swskip_pct: 0,
            swderotate: false,
            brightness: 0,
            contrast: 0,
            threshold_curve: 0,
            disable_interpolation: false,
        }
    }
}

/// Every knob a handle carries between `sane_open` and `sane_start`:
/// the resolved [`Settings`] fields plus the peripheral option groups.
#[derive(Debug, Clone)]
pub struct OptionTable {
    pub xres: u16,
    pub yres: u16,
    pub tl_x_mm: f32,
    pub tl_y_mm: f32,
    pub br_x_mm: f32,
    pub br_y_mm: f32,
    pub depth: u8,
    pub scan_mode: ScanMode,
    pub scan_method: ScanMethod,
    pub preview: bool,
    pub color_filter: ColorFilter,
    pub threshold: u8,

    pub custom_gamma: bool,
    pub gamma_r: i32,
    pub gamma_g: i32,
    pub gamma_b: i32,

    pub software_post: SoftwarePost,

    pub lamp_off: bool,
    pub lamp_off_time: i32,
    pub expiration_time: i32,

    /// Set by the `force-calibration` button; consumed (reset to `false`)
    /// by the next `sane_start`.
    pub force_calibration: bool,
    /// Set by `ignore-offsets`; consumed by the next calibration run.
    pub ignore_offsets: bool,
}

impl OptionTable {
    pub fn for_model(model: &'static Model) -> Self {
        OptionTable {
            xres: 75,
            yres: 75,
            tl_x_mm: 0.0,
            tl_y_mm: 0.0,
            br_x_mm: 215.0,
            br_y_mm: 297.0,
            depth: 8,
            scan_mode: ScanMode::Color,
            scan_method: ScanMethod::Flatbed,
            preview: false,
            color_filter: ColorFilter::None,
            threshold: 128,
            custom_gamma: false,
            gamma_r: model.sensor.gamma.0 as i32,
            gamma_g: model.sensor.gamma.1 as i32,
            gamma_b: model.sensor.gamma.2 as i32,
            software_post: SoftwarePost::default(),
            lamp_off: false,
            lamp_off_time: 15,
            expiration_time: 60,
            force_calibration: false,
            ignore_offsets: false,
        }
    }

    /// Resolves the live option state into the [`Settings`] the planner
    /// consumes. `preview` forces a fast low resolution regardless of the
    /// stored `resolution` option, matching common frontend behavior.
    pub fn to_settings(&self) -> Settings {
        let (xres, yres) = if self.preview { (75, 75) } else { (self.xres, self.yres) };
        Settings {
            xres,
            yres,
            tl_x_mm: self.tl_x_mm,
            tl_y_mm: self.tl_y_mm,
            br_x_mm: self.br_x_mm,
            br_y_mm: self.br_y_mm,
            depth: self.depth,
            scan_mode: self.scan_mode,
            scan_method: self.scan_method,
            color_filter: self.color_filter,
            threshold: self.threshold,
        }
    }

    pub fn expiration_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy(self.expiration_time)
    }

    fn mode_name(mode: ScanMode) -> &'static str {
        match mode {
            ScanMode::Color => "Color",
            ScanMode::Gray => "Gray",
            ScanMode::Lineart => "Lineart",
            ScanMode::Halftone => "Halftone",
        }
    }

    fn mode_from_name(name: &str) -> Option<ScanMode> {
        match name {
            "Color" => Some(ScanMode::Color),
            "Gray" => Some(ScanMode::Gray),
            "Lineart" => Some(ScanMode::Lineart),
            "Halftone" => Some(ScanMode::Halftone),
            _ => None,
        }
    }

    fn source_name(method: ScanMethod) -> &'static str {
        match method {
            ScanMethod::Flatbed => "Flatbed",
            ScanMethod::TransparencyAdapter => "Transparency Adapter",
            ScanMethod::TransparencyAdapterInfrared => "Transparency Adapter Infrared",
        }
    }

    fn source_from_name(name: &str) -> Option<ScanMethod> {
        match name {
            "Flatbed" => Some(ScanMethod::Flatbed),
            "Transparency Adapter" => Some(ScanMethod::TransparencyAdapter),
            "Transparency Adapter Infrared" => Some(ScanMethod::TransparencyAdapterInfrared),
            _ => None,
        }
    }

    fn color_filter_name(filter: ColorFilter) -> &'static str {
        match filter {
            ColorFilter::None => "None",
            ColorFilter::Red => "Red",
            ColorFilter::Green => "Green",
            ColorFilter::Blue => "Blue",
        }
    }

    fn color_filter_from_name(name: &str) -> Option<ColorFilter> {
        match name {
            "None" => Some(ColorFilter::None),
            "Red" => Some(ColorFilter::Red),
            "Green" => Some(ColorFilter::Green),
            "Blue" => Some(ColorFilter::Blue),
            _ => None,
        }
    }

    /// `sane_control_option(..., GET_VALUE, ...)`.
    pub fn get(&self, name: &str) -> Option<OptionValue> {
        Some(match name {
            "mode" => OptionValue::String(Self::mode_name(self.scan_mode).to_string()),
            "source" => OptionValue::String(Self::source_name(self.scan_method).to_string()),
            "preview" => OptionValue::Bool(self.preview),
            "depth" => OptionValue::Int(self.depth as i32),
            "resolution" => OptionValue::Int(self.xres as i32),
            "tl-x" => OptionValue::Fixed(self.tl_x_mm as f64),
            "tl-y" => OptionValue::Fixed(self.tl_y_mm as f64),
            "br-x" => OptionValue::Fixed(self.br_x_mm as f64),
            "br-y" => OptionValue::Fixed(self.br_y_mm as f64),
            "custom-gamma" => OptionValue::Bool(self.custom_gamma),
            "gamma-vector-r" => OptionValue::Int(self.gamma_r),
            "gamma-vector-g" => OptionValue::Int(self.gamma_g),
            "gamma-vector-b" => OptionValue::Int(self.gamma_b),
            "swdeskew" => OptionValue::Bool(self.software_post.swdeskew),
            "swdespeck" => OptionValue::Bool(self.software_post.swdespeck),
            "despeck-radius" => OptionValue::Int(self.software_post.despeck_radius),
            "swcrop" => OptionValue::Bool(self.software_post.swcrop),
            "swskip" => OptionValue::Int(self.software_post.swskip_pct),
            "swderotate" => OptionValue::Bool(self.software_post.swderotate),
            "brightness" => OptionValue::Int(self.software_post.brightness),
            "contrast" => OptionValue::Int(self.software_post.contrast),
            "threshold" => OptionValue::Int(self.threshold as i32),
            "threshold-curve" => OptionValue::Int(self.software_post.threshold_curve),
            "color-filter" => OptionValue::String(Self::color_filter_name(self.color_filter).to_string()),
            "disable-interpolation" => OptionValue::Bool(self.software_post.disable_interpolation),
            "lamp-off" => OptionValue::Bool(self.lamp_off),
            "lamp-off-time" => OptionValue::Int(self.lamp_off_time),
            "expiration-time" => OptionValue::Int(self.expiration_time),
            _ => return None,
        })
    }

    /// `sane_control_option(..., SET_VALUE, ...)`. Returns the `info`
    /// bits the caller should OR into its out-parameter, or `None` if
    /// `name` is not a settable option.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Option<SetInfo> {
        let mut info = 0u32;
        match (name, value) {
            ("mode", OptionValue::String(s)) => {
                self.scan_mode = Self::mode_from_name(&s)?;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("source", OptionValue::String(s)) => {
                self.scan_method = Self::source_from_name(&s)?;
                info |= SetInfo::RELOAD_PARAMS | SetInfo::RELOAD_OPTIONS;
            }
            ("preview", OptionValue::Bool(b)) => {
                self.preview = b;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("depth", OptionValue::Int(n)) => {
                if ![1, 8, 16].contains(&n) {
                    return None;
                }
                self.depth = n as u8;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("resolution", OptionValue::Int(n)) => {
                let clamped = n.clamp(50, 4800) as u16;
                if clamped as i32 != n {
                    info |= SetInfo::INEXACT;
                }
                self.xres = clamped;
                self.yres = clamped;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("tl-x", OptionValue::Fixed(f)) => {
                self.tl_x_mm = f as f32;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("tl-y", OptionValue::Fixed(f)) => {
                self.tl_y_mm = f as f32;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("br-x", OptionValue::Fixed(f)) => {
                self.br_x_mm = f as f32;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("br-y", OptionValue::Fixed(f)) => {
                self.br_y_mm = f as f32;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("custom-gamma", OptionValue::Bool(b)) => {
                self.custom_gamma = b;
                info |= SetInfo::RELOAD_OPTIONS;
            }
            ("gamma-vector-r", OptionValue::Int(n)) => self.gamma_r = n,
            ("gamma-vector-g", OptionValue::Int(n)) => self.gamma_g = n,
            ("gamma-vector-b", OptionValue::Int(n)) => self.gamma_b = n,
            ("swdeskew", OptionValue::Bool(b)) => self.software_post.swdeskew = b,
            ("swdespeck", OptionValue::Bool(b)) => self.software_post.swdespeck = b,
            ("despeck-radius", OptionValue::Int(n)) => self.software_post.despeck_radius = n.clamp(1, 9),
            ("swcrop", OptionValue::Bool(b)) => self.software_post.swcrop = b,
            ("swskip", OptionValue::Int(n)) => self.software_post.swskip_pct = n.clamp(0, 100),
            ("swderotate", OptionValue::Bool(b)) => self.software_post.swderotate = b,
            ("brightness", OptionValue::Int(n)) => self.software_post.brightness = n.clamp(-100, 100),
            ("contrast", OptionValue::Int(n)) => self.software_post.contrast = n.clamp(-100, 100),
            ("threshold", OptionValue::Int(n)) => self.threshold = n.clamp(0, 100) as u8,
            ("threshold-curve", OptionValue::Int(n)) => self.software_post.threshold_curve = n.clamp(0, 127),
            ("color-filter", OptionValue::String(s)) => {
                self.color_filter = Self::color_filter_from_name(&s)?;
                info |= SetInfo::RELOAD_PARAMS;
            }
            ("disable-interpolation", OptionValue::Bool(b)) => self.software_post.disable_interpolation = b,
            ("lamp-off", OptionValue::Bool(b)) => self.lamp_off = b,
            ("lamp-off-time", OptionValue::Int(n)) => self.lamp_off_time = n.clamp(0, 60),
            ("expiration-time", OptionValue::Int(n)) => self.expiration_time = n.clamp(-1, 30000),
            _ => return None,
        }
        Some(SetInfo(info))
    }
}

/// Evaluates the four `sensors` read-only booleans backed by the device's
/// button mask, plus `need-calibration-sw` backed by cache occupancy.
pub fn sensor_value(name: &str, buttons_mask: u16, hardware: crate::registers::HardwareSensors, cache_empty: bool) -> Option<bool> {
    use genesys_tables::buttons;
    let has = |bit: u16| buttons_mask & bit != 0;
    Some(match name {
        "scan-sw" => has(buttons::HAS_SCAN_SW) && hardware.0 & buttons::HAS_SCAN_SW != 0,
        "file-sw" => has(buttons::HAS_FILE_SW) && hardware.0 & buttons::HAS_FILE_SW != 0,
        "email-sw" => has(buttons::HAS_EMAIL_SW) && hardware.0 & buttons::HAS_EMAIL_SW != 0,
        "copy-sw" => has(buttons::HAS_COPY_SW) && hardware.0 & buttons::HAS_COPY_SW != 0,
        "ocr-sw" => has(buttons::HAS_OCR_SW) && hardware.0 & buttons::HAS_OCR_SW != 0,
        "power-sw" => has(buttons::HAS_POWER_SW) && hardware.0 & buttons::HAS_POWER_SW != 0,
        "extra-sw" => has(buttons::HAS_EXTRA_SW) && hardware.0 & buttons::HAS_EXTRA_SW != 0,
        "page-loaded-sw" => has(buttons::HAS_PAGE_LOADED_SW) && hardware.0 & buttons::HAS_PAGE_LOADED_SW != 0,
        "need-calibration-sw" => cache_empty,
        _ => return None,
    })
}

/// Applies the effect of one of the `buttons` group's side-effecting
/// options. Returns `false` for an unrecognized name.
pub fn apply_button(
    name: &str,
    table: &mut OptionTable,
    cache: &mut Vec<CalibrationCacheEntry>,
    pending_session: Option<&crate::planner::ScanSession>,
) -> bool {
    match name {
        "calibrate" => {
            if let Some(session) = pending_session {
                cache.retain(|entry| !entry.matches(session));
            }
            true
        }
        "clear-calibration" => {
            cache.clear();
            true
        }
        "force-calibration" => {
            table.force_calibration = true;
            true
        }
        "ignore-offsets" => {
            table.ignore_offsets = true;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_are_contiguous_from_zero() {
        for (i, d) in OPTION_DESCRIPTORS.iter().enumerate() {
            assert_eq!(d.index, i);
        }
    }

    #[test]
    fn get_set_round_trips_resolution() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut table = OptionTable::for_model(model);
        let info = table.set("resolution", OptionValue::Int(300)).unwrap();
        assert_eq!(info.0 & SetInfo::RELOAD_PARAMS, SetInfo::RELOAD_PARAMS);
        assert_eq!(table.get("resolution"), Some(OptionValue::Int(300)));
    }

    #[test]
    fn out_of_range_resolution_is_clamped_and_marked_inexact() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut table = OptionTable::for_model(model);
        let info = table.set("resolution", OptionValue::Int(100_000)).unwrap();
        assert_eq!(info.0 & SetInfo::INEXACT, SetInfo::INEXACT);
        assert_eq!(table.xres, 4800);
    }

    #[test]
    fn unknown_option_name_returns_none() {
        let model = genesys_tables::lookup_model(0x04a9, 0x190e).unwrap();
        let mut table = OptionTable::for_model(model);
        assert!(table.set("not-a-real-option", OptionValue::Bool(true)).is_none());
        assert!(table.get("not-a-real-option").is_none());
    }

    #[test]
    fn index_of_finds_named_options() {
        assert_eq!(index_of("mode"), Some(1));
        assert_eq!(index_of("calibrate"), Some(44));
        assert_eq!(index_of("does-not-exist"), None);
    }
}
