//! Front-panel button/sensor bitmask, mirroring the original backend's
//! `GENESYS_HAS_*` constants. Exposed as the `sensors` SANE option group's
//! read-only booleans.

pub const HAS_NO_BUTTONS: u16 = 0;
pub const HAS_SCAN_SW: u16 = 1 << 0;
pub const HAS_FILE_SW: u16 = 1 << 1;
pub const HAS_COPY_SW: u16 = 1 << 2;
pub const HAS_EMAIL_SW: u16 = 1 << 3;
pub const HAS_PAGE_LOADED_SW: u16 = 1 << 4;
pub const HAS_OCR_SW: u16 = 1 << 5;
pub const HAS_POWER_SW: u16 = 1 << 6;
pub const HAS_CALIBRATE: u16 = 1 << 7;
pub const HAS_EXTRA_SW: u16 = 1 << 8;
