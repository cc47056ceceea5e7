//! Motor slope-table arithmetic for the Genesys backend.
//!
//! This crate is deliberately hardware-independent: it knows nothing about
//! USB, registers, or ASIC families, only the numeric relationships between a
//! motor profile, a target line speed, and the step-period table the ASIC
//! expects in RAM. That separation lets the slope and Z1/Z2 algorithms be
//! tested on the host in isolation from the rest of the driver.

/// Stepping mode. Each step multiplies the physical feed distance per pulse
/// by `2^n`, so `Eighth` moves 1/8th as far per pulse as `Full`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepType {
    Full,
    Half,
    Quarter,
    Eighth,
}

impl StepType {
    /// The `2^s` feed-distance scale named in the motion spec.
    pub fn distance_scale(self) -> u32 {
        1 << (self as u32)
    }
}

/// Shape of the acceleration/deceleration curve used to build a slope table.
///
/// `slow_start_period` is the step period (in line-clock units) the motor
/// starts at from a dead stop. Each subsequent table entry decays towards the
/// target speed by shaving off `max(1, period >> decay_shift)` per step,
/// which gives an exponential-ish ramp: big jumps while slow, fine-grained
/// correction as the motor approaches full speed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CurveShape {
    pub slow_start_period: u16,
    pub decay_shift: u8,
}

/// The parts of a motor profile the slope-table algorithm needs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MotorProfile {
    /// Fastest step period this profile is willing to command, i.e. the
    /// `v_max` floor from the spec. Smaller period == faster motor.
    pub max_speed_w: u16,
    pub step_type: StepType,
    pub curve: CurveShape,
    pub motor_vref: u8,
}

/// A generated step-period table, ready to be serialized little-endian into
/// one of the five ASIC RAM slots.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SlopeTable(pub Vec<u16>);

impl SlopeTable {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The floor period the table settles on, i.e. its last entry.
    pub fn final_period(&self) -> Option<u16> {
        self.0.last().copied()
    }

    /// Serializes the table little-endian, the byte order every ASIC family
    /// expects in its RAM slots.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 2);
        for word in &self.0 {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// Computes the target step period from the planned exposure and motor base
/// resolution: `v_target = exposure_lperiod * yres / base_ydpi`.
pub fn target_period(exposure_lperiod: u32, yres: u16, base_ydpi: u16) -> u16 {
    let target = (exposure_lperiod as u64 * yres as u64) / base_ydpi.max(1) as u64;
    target.min(u16::MAX as u64) as u16
}

/// Builds a monotonically non-increasing step-period table.
///
/// The sequence starts at `profile.curve.slow_start_period` and decays to
/// `max(v_target, profile.max_speed_w)` — the *slower* of the requested
/// target and the profile's hard speed limit, so a motor is never commanded
/// faster than either constraint allows. The result is padded (by repeating
/// its final entry) to a multiple of `step_multiplier`, and never exceeds
/// `max_entries`.
pub fn generate_slope_table(
    profile: &MotorProfile,
    v_target: u16,
    step_multiplier: u8,
    max_entries: usize,
) -> SlopeTable {
    let step_multiplier = step_multiplier.max(1) as usize;
    let floor = v_target.max(profile.max_speed_w);

    let mut entries = Vec::new();
    let mut current = profile.curve.slow_start_period.max(floor);
    entries.push(current);

    while current > floor && entries.len() < max_entries {
        let shave = (current >> profile.curve.decay_shift).max(1);
        current = current.saturating_sub(shave).max(floor);
        entries.push(current);
    }

    entries.truncate(max_entries);
    if let Some(&last) = entries.last() {
        while entries.len() % step_multiplier != 0 {
            if entries.len() >= max_entries {
                break;
            }
            entries.push(last);
        }
    }

    SlopeTable(entries)
}

/// Computes the Z1/Z2 phase-correction registers described in the motion
/// spec:
///
/// ```text
/// Z1 = (sum(slope[0..stepno]) + fwdstep * slope[stepno-1]) mod exposure
/// Z2 = (sum(slope[0..stepno]) + max(feedl, 1) * slope[stepno-1]) mod exposure
/// ```
///
/// For `yres > 600` the ASIC no longer cares about per-line phase, so both
/// values are forced to zero regardless of the other inputs.
pub fn compute_z1z2(
    slope: &[u16],
    stepno: usize,
    fwdstep: u32,
    feedl: u32,
    exposure: u32,
    yres: u16,
) -> (u32, u32) {
    if yres > 600 || exposure == 0 {
        return (0, 0);
    }

    let stepno = stepno.min(slope.len());
    let prefix_sum: u64 = slope[..stepno].iter().map(|&s| s as u64).sum();
    let last_step = if stepno > 0 {
        slope[stepno - 1] as u64
    } else {
        0
    };

    let z1 = (prefix_sum + fwdstep as u64 * last_step) % exposure as u64;
    let z2 = (prefix_sum + feedl.max(1) as u64 * last_step) % exposure as u64;
    (z1 as u32, z2 as u32)
}

/// Rounds `value` down to the nearest multiple of `granularity`, the pixel
/// packer alignment constraint referenced by the planner (e.g. pixel counts
/// must be a multiple of 4, 8, or 16 depending on ASIC/resolution).
pub fn round_down_to(value: u32, granularity: u32) -> u32 {
    if granularity == 0 {
        return value;
    }
    (value / granularity) * granularity
}

/// Divides rounding up, used throughout the planner for byte-size
/// computations (`bytes_per_line = ceil(pixels * channels * depth / 8)`).
pub fn ceil_div(numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return 0;
    }
    (numerator + denominator - 1) / denominator
}

/// Rounds `value` up to the next multiple of `granularity`, used to size
/// bulk-read buffers against the USB transfer ceiling.
pub fn ceil_to(value: u32, granularity: u32) -> u32 {
    if granularity == 0 {
        return value;
    }
    ceil_div(value, granularity) * granularity
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile(slow_start: u16, max_speed: u16, decay_shift: u8) -> MotorProfile {
        MotorProfile {
            max_speed_w: max_speed,
            step_type: StepType::Full,
            curve: CurveShape {
                slow_start_period: slow_start,
                decay_shift,
            },
            motor_vref: 2,
        }
    }

    #[test]
    fn step_type_distance_scale() {
        assert_eq!(StepType::Full.distance_scale(), 1);
        assert_eq!(StepType::Half.distance_scale(), 2);
        assert_eq!(StepType::Quarter.distance_scale(), 4);
        assert_eq!(StepType::Eighth.distance_scale(), 8);
    }

    #[test]
    fn slope_table_reaches_floor_and_pads() {
        let p = profile(4000, 200, 2);
        let table = generate_slope_table(&p, 300, 4, 1024);
        assert_eq!(table.final_period(), Some(300));
        assert_eq!(table.len() % 4, 0);
    }

    #[test]
    fn slope_table_capped_at_max_entries() {
        let p = profile(60000, 1, 8);
        let table = generate_slope_table(&p, 1, 1, 16);
        assert!(table.len() <= 16);
    }

    proptest! {
        #[test]
        fn slope_is_monotonic_non_increasing(
            slow_start in 100u16..60000,
            max_speed in 1u16..5000,
            decay_shift in 1u8..6,
            v_target in 1u16..5000,
        ) {
            let p = profile(slow_start, max_speed, decay_shift);
            let table = generate_slope_table(&p, v_target, 1, 1024);
            for w in table.0.windows(2) {
                prop_assert!(w[0] >= w[1]);
            }
            let floor = v_target.max(max_speed);
            prop_assert_eq!(table.final_period(), Some(floor));
        }

        #[test]
        fn z1z2_forced_zero_above_600_yres(
            exposure in 1u32..20000,
            fwdstep in 0u32..64,
            feedl in 0u32..64,
            yres in 601u16..2400,
        ) {
            let slope = vec![100u16, 90, 80, 70];
            let (z1, z2) = compute_z1z2(&slope, 3, fwdstep, feedl, exposure, yres);
            prop_assert_eq!(z1, 0);
            prop_assert_eq!(z2, 0);
        }

        #[test]
        fn z1z2_matches_closed_form(
            exposure in 1u32..20000,
            fwdstep in 0u32..64,
            feedl in 0u32..64,
            yres in 75u16..600,
        ) {
            let slope = vec![100u16, 90, 80, 70, 60];
            let stepno = 3;
            let (z1, z2) = compute_z1z2(&slope, stepno, fwdstep, feedl, exposure, yres);

            let prefix: u64 = slope[..stepno].iter().map(|&s| s as u64).sum();
            let last = slope[stepno - 1] as u64;
            let expect_z1 = ((prefix + fwdstep as u64 * last) % exposure as u64) as u32;
            let expect_z2 = ((prefix + feedl.max(1) as u64 * last) % exposure as u64) as u32;
            prop_assert_eq!(z1, expect_z1);
            prop_assert_eq!(z2, expect_z2);
        }
    }

    #[test]
    fn ceil_div_and_ceil_to() {
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_to(10, 8), 16);
        assert_eq!(ceil_to(16, 8), 16);
        assert_eq!(round_down_to(19, 4), 16);
    }
}
