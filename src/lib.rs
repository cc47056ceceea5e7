//! SANE backend for Genesys-Logic GL646/GL841/GL843/GL846/GL847/GL124 USB
//! scanner ASICs.
//!
//! Built as both a `cdylib` (the shared object a SANE frontend dlopens via
//! the `extern "C"` surface in [`sane::ffi`]) and an `rlib` (so the whole
//! driver is exercised by ordinary `cargo test`).

pub mod calibration;
pub mod config;
pub mod device;
pub mod error;
pub mod interface;
pub mod lifecycle;
pub mod motion;
pub mod pipeline;
pub mod planner;
pub mod registers;
pub mod sane;

pub use device::Device;
pub use error::{GenesysError, Result};
pub use lifecycle::{LifecycleState, ScanGuard, Scanner};
pub use planner::{ScanSession, Settings};
