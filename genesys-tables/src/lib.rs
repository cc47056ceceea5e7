//! Immutable per-model registries for the Genesys backend: which sensor,
//! motor, and analog frontend a given USB vendor/product id carries, plus
//! the front-panel button mask it reports.
//!
//! Everything here is `'static` data, built once at first access via
//! `once_cell::sync::Lazy` and shared by reference for the lifetime of the
//! process. Nothing in this crate talks to hardware; `sane-genesys` looks a
//! model up by USB id and hands the returned descriptors to the register,
//! motor, and calibration layers.

pub mod buttons;
pub mod family;
pub mod frontend;
pub mod model;
pub mod motor;
pub mod sensor;

pub use family::AsicFamily;
pub use frontend::{FrontendDescriptor, FrontendKind};
pub use model::{lookup_model, Model, MODEL_REGISTRY};
pub use motor::MotorDescriptor;
pub use sensor::{
    ColorFilter, RegisterOverride, ScanMethod, ScanMode, SensorDescriptor, SensorExposure,
    StaggerConfig,
};
