/// Genesys-Logic ASIC family. Register names, bit positions, and protocol
/// preludes differ enough between these that the backend keeps one
/// `CommandSet` implementation per family rather than a single unified
/// register layout (see the polymorphism rationale in the design notes).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AsicFamily {
    Gl646,
    Gl841,
    Gl843,
    Gl846,
    Gl847,
    Gl124,
}

impl AsicFamily {
    /// ASIC-specific ceiling on generated slope-table length.
    pub fn max_slope_entries(self) -> usize {
        match self {
            AsicFamily::Gl646 => 512,
            AsicFamily::Gl841 => 1024,
            AsicFamily::Gl843 => 1024,
            AsicFamily::Gl846 => 1024,
            AsicFamily::Gl847 => 1024,
            AsicFamily::Gl124 => 1024,
        }
    }

    /// Whether this family exposes the `SHDAREA` bit, which lets the ASIC
    /// apply shading only within the active scan window (and so needs no
    /// dpihw-bucket start-address offset in shading RAM).
    pub fn has_shading_area(self) -> bool {
        !matches!(self, AsicFamily::Gl646)
    }

    /// Maximum single bulk write, used to chunk `write_buffer`/`write_gamma`
    /// payloads.
    pub fn bulk_write_max(self) -> usize {
        0xF000
    }
}
