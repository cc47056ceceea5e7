use genesys_math::MotorProfile;

/// Immutable per-model motor description.
///
/// `profiles` are used for normal scan-speed ramps; `fast_profiles` are used
/// for home-search and sheet feed moves, which want to get to speed quickly
/// and don't care about per-line phase.
pub struct MotorDescriptor {
    pub base_ydpi: u16,
    pub profiles: &'static [MotorProfile],
    pub fast_profiles: &'static [MotorProfile],
}

impl MotorDescriptor {
    /// Picks the slowest (most conservative) scan profile, used as the
    /// starting point for a motion-controller ramp when no finer-grained
    /// resolution-specific profile is given.
    pub fn default_profile(&self) -> &'static MotorProfile {
        self.profiles
            .iter()
            .max_by_key(|p| p.curve.slow_start_period)
            .expect("a motor descriptor always has at least one profile")
    }

    pub fn default_fast_profile(&self) -> &'static MotorProfile {
        self.fast_profiles
            .iter()
            .min_by_key(|p| p.max_speed_w)
            .unwrap_or_else(|| self.default_profile())
    }
}
