//! Indicator-light detection engine for panel verification rigs.
//!
//! A camera watches a panel; each light is sampled at a calibrated pixel
//! position and must show its expected color once per test run. The modules
//! split that into layout data, per-frame classification, run bookkeeping,
//! and the loop that ties them to a frame source.

pub mod layout;
pub mod notify;
pub mod prelude;
pub mod processing;
pub mod source;
pub mod telemetry;

pub use prelude::{
    ClassifierConfig, FrameSource, LightCheckError, LightCheckResult, LightColor, Position,
    Verdict,
};
