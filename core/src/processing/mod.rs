pub mod board;
pub mod classifier;
pub mod color;
pub mod detection;
pub mod overlay;
pub mod state;

pub use board::{SampleBoard, SamplePoint};
pub use classifier::{LightClassifier, RegionStats};
pub use color::{ColorRange, ColorRangeTable, HsvPixel};
pub use detection::{
    DetectionConfig, DetectionLoop, FrameReport, LoopSummary, ResetScheduler, SharedBoard,
    SharedTest, StopHandle,
};
pub use state::{LightStatus, TestStateMachine, Transition};
