use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pixel coordinate of a sample point in frame space.
///
/// Coordinates are signed because a point can be dragged past the frame edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Color a light is expected to show when lit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Yellow,
    Green,
    Blue,
    White,
}

impl LightColor {
    pub fn name(&self) -> &'static str {
        match self {
            LightColor::Red => "red",
            LightColor::Yellow => "yellow",
            LightColor::Green => "green",
            LightColor::Blue => "blue",
            LightColor::White => "white",
        }
    }
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of classifying one light in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Unlit,
    WrongColor,
    Correct,
}

/// Parameters of the region-of-interest classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Half the side of the sampled square, in pixels.
    pub roi_half_width: u32,
    /// Mean value-channel level (0-255) below which a light counts as off.
    pub brightness_threshold: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            roi_half_width: 10,
            brightness_threshold: 100.0,
        }
    }
}

/// Common error type for the detection engine.
#[derive(thiserror::Error, Debug)]
pub enum LightCheckError {
    #[error("unknown layout: {0}")]
    UnknownLayout(String),
    #[error("position store {path} is corrupt: {source}")]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("camera failure: {0}")]
    Camera(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type LightCheckResult<T> = Result<T, LightCheckError>;

/// Source of sequential color frames, such as a camera or a recording.
///
/// `Ok(None)` means the source is exhausted; the detection loop stops on it
/// as it does on an error.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> LightCheckResult<Option<image::RgbImage>>;
}
