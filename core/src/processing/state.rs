use crate::layout::LayoutCatalog;
use crate::prelude::{LightCheckResult, Verdict};
use log::info;
use serde::{Deserialize, Serialize};

/// Status flags of one light within a test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightStatus {
    pub checked: bool,
    pub wrong: bool,
    /// Latched once the light showed its expected color.
    pub success: bool,
}

/// Effect of one `apply` call on a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Light had already passed or is unknown; nothing changed.
    Unchanged,
    Pending,
    BecameWrong,
    StillWrong,
    Passed,
}

/// Pass/fail bookkeeping for the lights of the active layout.
#[derive(Debug, Clone, Default)]
pub struct TestStateMachine {
    layout_id: Option<String>,
    statuses: Vec<(String, LightStatus)>,
    generation: u64,
    announced: bool,
}

impl TestStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run for `layout_id` with every flag cleared.
    pub fn reset(&mut self, catalog: &LayoutCatalog, layout_id: &str) -> LightCheckResult<u64> {
        let definition = catalog.definition(layout_id)?;
        self.statuses = definition
            .labels()
            .map(|label| (label.to_string(), LightStatus::default()))
            .collect();
        self.layout_id = Some(definition.id.clone());
        self.generation += 1;
        self.announced = false;
        info!("test reset for layout {}", definition.id);
        Ok(self.generation)
    }

    pub fn layout_id(&self) -> Option<&str> {
        self.layout_id.as_deref()
    }

    /// Identifies the current run; bumped by every reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn apply(&mut self, label: &str, verdict: Verdict) -> Transition {
        let Some(status) = self.status_mut(label) else {
            return Transition::Unchanged;
        };
        if status.success {
            return Transition::Unchanged;
        }

        let was_wrong = status.wrong;
        match verdict {
            Verdict::Unlit => {
                status.checked = false;
                status.wrong = false;
                Transition::Pending
            }
            Verdict::WrongColor => {
                status.checked = false;
                status.wrong = true;
                if was_wrong {
                    Transition::StillWrong
                } else {
                    Transition::BecameWrong
                }
            }
            Verdict::Correct => {
                status.checked = true;
                status.wrong = false;
                status.success = true;
                Transition::Passed
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.statuses.is_empty() && self.statuses.iter().all(|(_, status)| status.checked)
    }

    /// True the first time it is called on a completed run, false afterwards.
    pub fn mark_announced(&mut self) -> bool {
        if !self.is_complete() || self.announced {
            return false;
        }
        self.announced = true;
        true
    }

    pub fn status(&self, label: &str) -> Option<LightStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, status)| *status)
    }

    pub fn is_passed(&self, label: &str) -> bool {
        self.status(label).is_some_and(|status| status.success)
    }

    /// Statuses in layout order.
    pub fn statuses(&self) -> &[(String, LightStatus)] {
        &self.statuses
    }

    pub fn passed_count(&self) -> usize {
        self.statuses
            .iter()
            .filter(|(_, status)| status.success)
            .count()
    }

    fn status_mut(&mut self, label: &str) -> Option<&mut LightStatus> {
        self.statuses
            .iter_mut()
            .find(|(name, _)| name == label)
            .map(|(_, status)| status)
    }
}
