use lightcore::notify::Notification;
use lightcore::telemetry::MetricsSnapshot;
use lightcore::LightColor;
use serde::{Deserialize, Serialize};

/// One light as shown by the control surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightView {
    pub label: String,
    pub x: i32,
    pub y: i32,
    pub expected: LightColor,
    pub checked: bool,
    pub wrong: bool,
    pub success: bool,
}

/// Snapshot served at `GET /status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusModel {
    pub layouts: Vec<String>,
    pub layout: Option<String>,
    pub running: bool,
    pub complete: bool,
    pub reset_pending: bool,
    pub generation: u64,
    /// Size the bridge frames are resized to; light positions use this space.
    pub frame_size: Option<(u32, u32)>,
    pub lights: Vec<LightView>,
    pub metrics: MetricsSnapshot,
    pub events: Vec<Notification>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRequest {
    pub layout: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragPhase {
    Begin,
    Move,
    End,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DragRequest {
    pub phase: DragPhase,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}
