/// Analog frontend kind. Wolfson frontends need host-driven offset/gain
/// calibration; Analog-Devices frontends self-calibrate and skip the offset
/// pass entirely.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrontendKind {
    Wolfson,
    AnalogDevices,
}

impl FrontendKind {
    pub fn self_calibrates(self) -> bool {
        matches!(self, FrontendKind::AnalogDevices)
    }
}

/// Immutable per-model analog-frontend description: which FE register
/// addresses hold the per-channel offset/gain, and the values to load at
/// `set_fe(Init)`.
pub struct FrontendDescriptor {
    pub kind: FrontendKind,
    pub reg_offset: (u8, u8, u8),
    pub reg_gain: (u8, u8, u8),
    pub initial_registers: &'static [(u8, u8)],
}
