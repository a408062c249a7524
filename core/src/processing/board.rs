use crate::layout::{LayoutCatalog, PositionMap, PositionStore};
use crate::prelude::{LightCheckResult, Position};
use log::debug;

/// Half side of the square used to pick a sample point with the pointer.
pub const HIT_TOLERANCE: i32 = 10;

/// Runtime sample location of one light.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePoint {
    pub label: String,
    pub position: Position,
    /// Opaque id of whatever draws this point, if anything does.
    pub handle: Option<u64>,
}

/// Sample points of the active layout, movable by dragging.
#[derive(Debug, Clone, Default)]
pub struct SampleBoard {
    layout_id: Option<String>,
    points: Vec<SamplePoint>,
    active: Option<String>,
}

impl SampleBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the board for `layout_id`: catalog defaults first, then
    /// whatever the store remembers. An unknown layout leaves the board as is.
    pub fn initialize(
        &mut self,
        catalog: &LayoutCatalog,
        store: Option<&PositionStore>,
        layout_id: &str,
    ) -> LightCheckResult<()> {
        let definition = catalog.definition(layout_id)?;
        let saved = store
            .map(|store| store.load_for(definition))
            .unwrap_or_default();

        self.points = definition
            .lights
            .iter()
            .map(|light| SamplePoint {
                label: light.label.clone(),
                position: saved.get(&light.label).copied().unwrap_or(light.position),
                handle: None,
            })
            .collect();
        self.layout_id = Some(definition.id.clone());
        self.active = None;
        debug!(
            "board initialized for {} ({} points, {} restored)",
            definition.id,
            self.points.len(),
            saved.len()
        );
        Ok(())
    }

    pub fn layout_id(&self) -> Option<&str> {
        self.layout_id.as_deref()
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    pub fn position_of(&self, label: &str) -> Option<Position> {
        self.point(label).map(|point| point.position)
    }

    pub fn set_handle(&mut self, label: &str, handle: u64) {
        if let Some(point) = self.points.iter_mut().find(|point| point.label == label) {
            point.handle = Some(handle);
        }
    }

    /// First declared point whose position is within the tolerance square.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<&str> {
        self.points
            .iter()
            .find(|point| {
                (point.position.x - x).abs() <= HIT_TOLERANCE
                    && (point.position.y - y).abs() <= HIT_TOLERANCE
            })
            .map(|point| point.label.as_str())
    }

    pub fn begin_drag(&mut self, label: &str) -> bool {
        if self.point(label).is_some() {
            self.active = Some(label.to_string());
            true
        } else {
            false
        }
    }

    /// Hit-tests the pointer and starts dragging whatever it landed on.
    pub fn begin_drag_at(&mut self, x: i32, y: i32) -> Option<String> {
        let label = self.hit_test(x, y)?.to_string();
        self.active = Some(label.clone());
        Some(label)
    }

    pub fn active_drag(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Moves the dragged point. Ignored unless `label` is the active drag.
    pub fn update_position(&mut self, label: &str, x: i32, y: i32) -> bool {
        if self.active.as_deref() != Some(label) {
            return false;
        }
        match self.points.iter_mut().find(|point| point.label == label) {
            Some(point) => {
                point.position = Position::new(x, y);
                true
            }
            None => false,
        }
    }

    pub fn end_drag(&mut self) {
        self.active = None;
    }

    pub fn current_positions(&self) -> PositionMap {
        self.points
            .iter()
            .map(|point| (point.label.clone(), point.position))
            .collect()
    }

    fn point(&self, label: &str) -> Option<&SamplePoint> {
        self.points.iter().find(|point| point.label == label)
    }
}
