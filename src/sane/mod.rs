//! SANE API surface: option/parameter model plus the `extern "C"` entry
//! points a frontend dlopens this backend for.

pub mod ffi;
pub mod options;
pub mod params;

pub use options::{OptionCap, OptionConstraint, OptionDescriptor, OptionTable, OptionType, OptionUnit, OptionValue, SetInfo};
pub use params::{parameters_for_session, Frame, Parameters};
