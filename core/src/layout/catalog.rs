use crate::prelude::{LightCheckError, LightCheckResult, LightColor, Position};
use crate::processing::color::{ColorRange, ColorRangeTable};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One light of a layout: where it sits by default and what it must show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSpec {
    pub label: String,
    pub position: Position,
    pub color: LightColor,
}

impl LightSpec {
    pub fn new(label: &str, position: (i32, i32), color: LightColor) -> Self {
        Self {
            label: label.to_string(),
            position: position.into(),
            color,
        }
    }
}

/// Ordered set of lights for one panel type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDefinition {
    pub id: String,
    pub lights: Vec<LightSpec>,
}

impl LayoutDefinition {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.lights.iter().map(|light| light.label.as_str())
    }

    pub fn light(&self, label: &str) -> Option<&LightSpec> {
        self.lights.iter().find(|light| light.label == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.light(label).is_some()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    layouts: Vec<LayoutEntry>,
    #[serde(default)]
    color_ranges: Option<Vec<ColorRange>>,
}

#[derive(Debug, Deserialize)]
struct LayoutEntry {
    id: String,
    lights: Vec<LightEntry>,
}

#[derive(Debug, Deserialize)]
struct LightEntry {
    label: String,
    position: [i32; 2],
    color: LightColor,
}

/// Registry of known layouts and the color table used to classify them.
#[derive(Debug, Clone)]
pub struct LayoutCatalog {
    layouts: Vec<LayoutDefinition>,
    color_ranges: ColorRangeTable,
}

impl LayoutCatalog {
    pub fn new(
        layouts: Vec<LayoutDefinition>,
        color_ranges: ColorRangeTable,
    ) -> LightCheckResult<Self> {
        let catalog = Self {
            layouts,
            color_ranges,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The CILOW and CICON panels with the stock color table.
    pub fn builtin() -> Self {
        let layouts = vec![
            LayoutDefinition {
                id: "CILOW".into(),
                lights: vec![
                    LightSpec::new("SERVICE OUT", (150, 50), LightColor::Red),
                    LightSpec::new("D3BUS CIDIS", (300, 50), LightColor::Green),
                    LightSpec::new("D3BUS SHAFT", (450, 50), LightColor::Yellow),
                    LightSpec::new("SAFE TO SHAFT", (150, 250), LightColor::Red),
                    LightSpec::new("SAFE TO SAFE", (300, 250), LightColor::Yellow),
                    LightSpec::new("OPTION SENSE", (450, 250), LightColor::Red),
                ],
            },
            LayoutDefinition {
                id: "CICON".into(),
                lights: vec![
                    LightSpec::new("LIGHT 1", (100, 50), LightColor::Yellow),
                    LightSpec::new("LIGHT 2", (200, 50), LightColor::Yellow),
                    LightSpec::new("LIGHT 3", (300, 50), LightColor::Yellow),
                ],
            },
        ];
        Self {
            layouts,
            color_ranges: ColorRangeTable::default(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> LightCheckResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> LightCheckResult<Self> {
        let file: CatalogFile = serde_yaml::from_str(contents)
            .map_err(|err| LightCheckError::InvalidConfig(err.to_string()))?;
        let layouts = file
            .layouts
            .into_iter()
            .map(|entry| LayoutDefinition {
                id: entry.id,
                lights: entry
                    .lights
                    .into_iter()
                    .map(|light| LightSpec {
                        label: light.label,
                        position: Position::new(light.position[0], light.position[1]),
                        color: light.color,
                    })
                    .collect(),
            })
            .collect();
        let color_ranges = file
            .color_ranges
            .map(ColorRangeTable::new)
            .unwrap_or_default();
        Self::new(layouts, color_ranges)
    }

    pub fn layouts(&self) -> Vec<&str> {
        self.layouts.iter().map(|layout| layout.id.as_str()).collect()
    }

    pub fn definition(&self, layout_id: &str) -> LightCheckResult<&LayoutDefinition> {
        self.layouts
            .iter()
            .find(|layout| layout.id == layout_id)
            .ok_or_else(|| LightCheckError::UnknownLayout(layout_id.to_string()))
    }

    pub fn color_ranges(&self) -> &ColorRangeTable {
        &self.color_ranges
    }

    fn validate(&self) -> LightCheckResult<()> {
        let mut ids = HashSet::new();
        for layout in &self.layouts {
            if !ids.insert(layout.id.as_str()) {
                return Err(LightCheckError::InvalidConfig(format!(
                    "layout {} declared twice",
                    layout.id
                )));
            }
            if layout.lights.is_empty() {
                return Err(LightCheckError::InvalidConfig(format!(
                    "layout {} has no lights",
                    layout.id
                )));
            }
            let mut labels = HashSet::new();
            for light in &layout.lights {
                if !labels.insert(light.label.as_str()) {
                    return Err(LightCheckError::InvalidConfig(format!(
                        "label {} repeated in layout {}",
                        light.label, layout.id
                    )));
                }
                if !self.color_ranges.covers(light.color) {
                    return Err(LightCheckError::InvalidConfig(format!(
                        "no color range for {} ({} in {})",
                        light.color, light.label, layout.id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for LayoutCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
