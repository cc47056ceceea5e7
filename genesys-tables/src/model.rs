use once_cell::sync::Lazy;

use crate::buttons;
use crate::family::AsicFamily;
use crate::frontend::{FrontendDescriptor, FrontendKind};
use crate::motor::MotorDescriptor;
use crate::sensor::{ScanMethod, SensorDescriptor, SensorExposure, StaggerConfig};
use genesys_math::{CurveShape, MotorProfile, StepType};

/// A fully-resolved device model: USB identity, ASIC family, and the
/// sensor/motor/frontend descriptors that describe it. One static `Model`
/// exists per supported product; `Device::attach` looks one up by
/// vendor/product id.
pub struct Model {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub asic: AsicFamily,
    /// Scan-area offset of the optical origin from the physical deck edge,
    /// in millimeters.
    pub x_offset_mm: f32,
    pub y_offset_mm: f32,
    pub ta_y_offset_mm: f32,
    pub sensor: &'static SensorDescriptor,
    pub motor: &'static MotorDescriptor,
    pub frontend: &'static FrontendDescriptor,
    pub buttons_mask: u16,
    pub is_sheetfed: bool,
}

macro_rules! motor_profile {
    ($slow_start:expr, $max_speed:expr, $decay:expr, $vref:expr) => {
        MotorProfile {
            max_speed_w: $max_speed,
            step_type: StepType::Eighth,
            curve: CurveShape {
                slow_start_period: $slow_start,
                decay_shift: $decay,
            },
            motor_vref: $vref,
        }
    };
}

// --- Canon LiDE 220 (CIS sensor, GL843, flatbed only) -----------------

static LIDE_220_PROFILES: &[MotorProfile] = &[motor_profile!(8000, 300, 3, 2)];
static LIDE_220_FAST_PROFILES: &[MotorProfile] = &[motor_profile!(4000, 120, 4, 3)];

static LIDE_220_MOTOR: MotorDescriptor = MotorDescriptor {
    base_ydpi: 4800,
    profiles: LIDE_220_PROFILES,
    fast_profiles: LIDE_220_FAST_PROFILES,
};

static LIDE_220_LPERIOD: &[(u16, u32)] = &[(75, 8000), (150, 6000), (300, 4000), (600, 2500)];

static LIDE_220_SENSOR: SensorDescriptor = SensorDescriptor {
    optical_resolution: 4800,
    black_pixels: 48,
    dummy_pixels: 6,
    ccd_start_offset: 32,
    white_gain_reference: 0x3dc0,
    gain_white_ref_coeff: 1.03,
    custom_registers: &[],
    lperiod_by_resolution: LIDE_220_LPERIOD,
    exposure: SensorExposure {
        r: 400,
        g: 400,
        b: 400,
    },
    segment_size: 0,
    segment_order: &[],
    stagger_config: StaggerConfig::NONE,
    color_row_spacing_mm: (0.0, 0.0),
    use_host_side_calib: false,
    is_cis: true,
    supported_channels: &[1, 3],
    supported_methods: &[ScanMethod::Flatbed],
    gamma: (220, 220, 220),
};

static LIDE_220_FRONTEND: FrontendDescriptor = FrontendDescriptor {
    kind: FrontendKind::AnalogDevices,
    reg_offset: (0x20, 0x21, 0x22),
    reg_gain: (0x28, 0x29, 0x2a),
    initial_registers: &[(0x00, 0x00), (0x01, 0x00), (0x02, 0x00)],
};

// --- HP ScanJet G4050 (CCD sensor, GL847, flatbed + TA) ---------------

static G4050_PROFILES: &[MotorProfile] = &[motor_profile!(12000, 500, 3, 2)];
static G4050_FAST_PROFILES: &[MotorProfile] = &[motor_profile!(5000, 200, 4, 3)];

static G4050_MOTOR: MotorDescriptor = MotorDescriptor {
    base_ydpi: 2400,
    profiles: G4050_PROFILES,
    fast_profiles: G4050_FAST_PROFILES,
};

static G4050_LPERIOD: &[(u16, u32)] = &[(100, 9000), (200, 7000), (400, 5000), (600, 4200)];

static G4050_SEGMENT_ORDER: &[u8] = &[0, 1];

static G4050_SENSOR: SensorDescriptor = SensorDescriptor {
    optical_resolution: 4800,
    black_pixels: 64,
    dummy_pixels: 8,
    ccd_start_offset: 48,
    white_gain_reference: 0x3a00,
    gain_white_ref_coeff: 1.0,
    custom_registers: &[],
    lperiod_by_resolution: G4050_LPERIOD,
    exposure: SensorExposure {
        r: 600,
        g: 500,
        b: 700,
    },
    segment_size: 2592,
    segment_order: G4050_SEGMENT_ORDER,
    stagger_config: StaggerConfig::NONE,
    color_row_spacing_mm: (0.0847, 0.1694),
    use_host_side_calib: false,
    is_cis: false,
    supported_channels: &[1, 3],
    supported_methods: &[ScanMethod::Flatbed, ScanMethod::TransparencyAdapter],
    gamma: (220, 220, 220),
};

static G4050_FRONTEND: FrontendDescriptor = FrontendDescriptor {
    kind: FrontendKind::Wolfson,
    reg_offset: (0x00, 0x01, 0x02),
    reg_gain: (0x03, 0x04, 0x05),
    initial_registers: &[(0x00, 0x80), (0x01, 0x80), (0x02, 0x80)],
};

// --- Plustek OpticFilm 7300 (CCD sensor, GL843, TA-only film scanner) --

static OPTICFILM_7300_PROFILES: &[MotorProfile] = &[motor_profile!(20000, 900, 2, 1)];
static OPTICFILM_7300_FAST_PROFILES: &[MotorProfile] = &[motor_profile!(9000, 400, 3, 2)];

static OPTICFILM_7300_MOTOR: MotorDescriptor = MotorDescriptor {
    base_ydpi: 7200,
    profiles: OPTICFILM_7300_PROFILES,
    fast_profiles: OPTICFILM_7300_FAST_PROFILES,
};

static OPTICFILM_7300_LPERIOD: &[(u16, u32)] = &[(1200, 15000), (2400, 12000), (3600, 10000)];

static OPTICFILM_7300_SENSOR: SensorDescriptor = SensorDescriptor {
    optical_resolution: 7200,
    black_pixels: 32,
    dummy_pixels: 4,
    ccd_start_offset: 16,
    white_gain_reference: 0x3c40,
    gain_white_ref_coeff: 1.08,
    custom_registers: &[],
    lperiod_by_resolution: OPTICFILM_7300_LPERIOD,
    exposure: SensorExposure {
        r: 1800,
        g: 1600,
        b: 2000,
    },
    segment_size: 0,
    segment_order: &[],
    stagger_config: StaggerConfig {
        min_resolution: 7200,
        lines_at_min: 2,
    },
    color_row_spacing_mm: (0.0635, 0.127),
    use_host_side_calib: true,
    is_cis: false,
    supported_channels: &[1, 3],
    supported_methods: &[
        ScanMethod::TransparencyAdapter,
        ScanMethod::TransparencyAdapterInfrared,
    ],
    gamma: (180, 180, 180),
};

static OPTICFILM_7300_FRONTEND: FrontendDescriptor = FrontendDescriptor {
    kind: FrontendKind::Wolfson,
    reg_offset: (0x00, 0x01, 0x02),
    reg_gain: (0x03, 0x04, 0x05),
    initial_registers: &[(0x00, 0x80), (0x01, 0x80), (0x02, 0x80)],
};

// --- Canoscan 8400F (CCD sensor, GL846, flatbed + TA) -----------------
//
// GPIO sequence at 3200dpi TA writes `0x6c |= 0x02` once; see the open
// question in the design notes about level- vs edge-triggering. We treat it
// as level-triggered (write once, leave set) until hardware testing says
// otherwise.

static CANOSCAN_8400F_PROFILES: &[MotorProfile] = &[motor_profile!(10000, 450, 3, 2)];
static CANOSCAN_8400F_FAST_PROFILES: &[MotorProfile] = &[motor_profile!(4500, 180, 4, 3)];

static CANOSCAN_8400F_MOTOR: MotorDescriptor = MotorDescriptor {
    base_ydpi: 3200,
    profiles: CANOSCAN_8400F_PROFILES,
    fast_profiles: CANOSCAN_8400F_FAST_PROFILES,
};

static CANOSCAN_8400F_LPERIOD: &[(u16, u32)] = &[(300, 8200), (600, 6200), (1200, 4800)];

static CANOSCAN_8400F_SENSOR: SensorDescriptor = SensorDescriptor {
    optical_resolution: 3200,
    black_pixels: 40,
    dummy_pixels: 6,
    ccd_start_offset: 24,
    white_gain_reference: 0x3b80,
    gain_white_ref_coeff: 1.02,
    custom_registers: &[],
    lperiod_by_resolution: CANOSCAN_8400F_LPERIOD,
    exposure: SensorExposure {
        r: 500,
        g: 450,
        b: 600,
    },
    segment_size: 0,
    segment_order: &[],
    stagger_config: StaggerConfig::NONE,
    color_row_spacing_mm: (0.0635, 0.127),
    use_host_side_calib: false,
    is_cis: false,
    supported_channels: &[1, 3],
    supported_methods: &[ScanMethod::Flatbed, ScanMethod::TransparencyAdapter],
    gamma: (220, 220, 220),
};

static CANOSCAN_8400F_FRONTEND: FrontendDescriptor = FrontendDescriptor {
    kind: FrontendKind::Wolfson,
    reg_offset: (0x00, 0x01, 0x02),
    reg_gain: (0x03, 0x04, 0x05),
    initial_registers: &[(0x00, 0x80), (0x01, 0x80), (0x02, 0x80)],
};

// --- Canon DR-2010C (CIS sensor, GL841, sheet-fed document scanner) ---

static DR_2010C_PROFILES: &[MotorProfile] = &[motor_profile!(6000, 250, 3, 2)];
static DR_2010C_FAST_PROFILES: &[MotorProfile] = &[motor_profile!(3000, 100, 4, 3)];

static DR_2010C_MOTOR: MotorDescriptor = MotorDescriptor {
    base_ydpi: 1200,
    profiles: DR_2010C_PROFILES,
    fast_profiles: DR_2010C_FAST_PROFILES,
};

static DR_2010C_LPERIOD: &[(u16, u32)] = &[(150, 5200), (300, 3800), (600, 2600)];

static DR_2010C_SENSOR: SensorDescriptor = SensorDescriptor {
    optical_resolution: 1200,
    black_pixels: 32,
    dummy_pixels: 4,
    ccd_start_offset: 16,
    white_gain_reference: 0x3900,
    gain_white_ref_coeff: 1.0,
    custom_registers: &[],
    lperiod_by_resolution: DR_2010C_LPERIOD,
    exposure: SensorExposure {
        r: 350,
        g: 350,
        b: 350,
    },
    segment_size: 0,
    segment_order: &[],
    stagger_config: StaggerConfig::NONE,
    color_row_spacing_mm: (0.0, 0.0),
    use_host_side_calib: false,
    is_cis: true,
    supported_channels: &[1, 3],
    supported_methods: &[ScanMethod::Flatbed],
    gamma: (220, 220, 220),
};

static DR_2010C_FRONTEND: FrontendDescriptor = FrontendDescriptor {
    kind: FrontendKind::AnalogDevices,
    reg_offset: (0x20, 0x21, 0x22),
    reg_gain: (0x28, 0x29, 0x2a),
    initial_registers: &[(0x00, 0x00), (0x01, 0x00)],
};

/// All statically-known models, built once and shared by reference from
/// every `Device`.
pub static MODEL_REGISTRY: Lazy<Vec<Model>> = Lazy::new(|| {
    vec![
        Model {
            name: "Canon LiDE 220",
            vendor_id: 0x04a9,
            product_id: 0x190e,
            asic: AsicFamily::Gl843,
            x_offset_mm: 2.0,
            y_offset_mm: 7.0,
            ta_y_offset_mm: 0.0,
            sensor: &LIDE_220_SENSOR,
            motor: &LIDE_220_MOTOR,
            frontend: &LIDE_220_FRONTEND,
            buttons_mask: buttons::HAS_SCAN_SW | buttons::HAS_COPY_SW | buttons::HAS_FILE_SW,
            is_sheetfed: false,
        },
        Model {
            name: "HP ScanJet G4050",
            vendor_id: 0x03f0,
            product_id: 0x4105,
            asic: AsicFamily::Gl847,
            x_offset_mm: 4.5,
            y_offset_mm: 8.0,
            ta_y_offset_mm: 2.0,
            sensor: &G4050_SENSOR,
            motor: &G4050_MOTOR,
            frontend: &G4050_FRONTEND,
            buttons_mask: buttons::HAS_SCAN_SW
                | buttons::HAS_COPY_SW
                | buttons::HAS_EMAIL_SW
                | buttons::HAS_OCR_SW,
            is_sheetfed: false,
        },
        Model {
            name: "Plustek OpticFilm 7300",
            vendor_id: 0x07b3,
            product_id: 0x0c16,
            asic: AsicFamily::Gl843,
            x_offset_mm: 0.0,
            y_offset_mm: 0.0,
            ta_y_offset_mm: 1.5,
            sensor: &OPTICFILM_7300_SENSOR,
            motor: &OPTICFILM_7300_MOTOR,
            frontend: &OPTICFILM_7300_FRONTEND,
            buttons_mask: buttons::HAS_NO_BUTTONS,
            is_sheetfed: false,
        },
        Model {
            name: "Canoscan 8400F",
            vendor_id: 0x04a9,
            product_id: 0x2213,
            asic: AsicFamily::Gl846,
            x_offset_mm: 3.0,
            y_offset_mm: 6.0,
            ta_y_offset_mm: 1.0,
            sensor: &CANOSCAN_8400F_SENSOR,
            motor: &CANOSCAN_8400F_MOTOR,
            frontend: &CANOSCAN_8400F_FRONTEND,
            buttons_mask: buttons::HAS_SCAN_SW | buttons::HAS_COPY_SW,
            is_sheetfed: false,
        },
        Model {
            name: "Canon DR-2010C",
            vendor_id: 0x04a9,
            product_id: 0x2218,
            asic: AsicFamily::Gl841,
            x_offset_mm: 1.0,
            y_offset_mm: 2.0,
            ta_y_offset_mm: 0.0,
            sensor: &DR_2010C_SENSOR,
            motor: &DR_2010C_MOTOR,
            frontend: &DR_2010C_FRONTEND,
            buttons_mask: buttons::HAS_SCAN_SW | buttons::HAS_PAGE_LOADED_SW,
            is_sheetfed: true,
        },
    ]
});

/// Finds the static model matching a USB vendor/product id pair, as
/// `genesys.conf` entries are resolved against.
pub fn lookup_model(vendor_id: u16, product_id: u16) -> Option<&'static Model> {
    MODEL_REGISTRY
        .iter()
        .find(|m| m.vendor_id == vendor_id && m.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lide_220_is_registered() {
        let model = lookup_model(0x04a9, 0x190e).expect("LiDE 220 present");
        assert_eq!(model.asic, AsicFamily::Gl843);
        assert!(model.sensor.is_cis);
    }

    #[test]
    fn unknown_device_is_absent() {
        assert!(lookup_model(0xffff, 0xffff).is_none());
    }

    #[test]
    fn dr_2010c_is_registered_as_sheetfed() {
        let model = lookup_model(0x04a9, 0x2218).expect("DR-2010C present");
        assert!(model.is_sheetfed);
        assert_eq!(model.asic, AsicFamily::Gl841);
    }

    #[test]
    fn opticfilm_uses_host_side_calibration() {
        let model = lookup_model(0x07b3, 0x0c16).unwrap();
        assert!(model.sensor.use_host_side_calib);
        assert_eq!(model.sensor.stagger_config.stagger_at(7200, 7200), 2);
        assert_eq!(model.sensor.stagger_config.stagger_at(3600, 3600), 0);
    }
}
