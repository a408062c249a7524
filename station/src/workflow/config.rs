use anyhow::Context;
use lightcore::layout::LayoutCatalog;
use lightcore::processing::DetectionConfig;
use lightcore::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Generated panel images; see `generator::panel`.
    Synthetic {
        #[serde(default)]
        scenario: Scenario,
        #[serde(default = "default_warmup")]
        warmup_frames: usize,
        #[serde(default)]
        frame_limit: Option<usize>,
        #[serde(default)]
        seed: u64,
    },
    /// Still images replayed from a directory.
    Images {
        dir: PathBuf,
        #[serde(default)]
        repeat: bool,
    },
    /// Video4Linux device, available with the `camera` feature.
    Camera {
        device: String,
        #[serde(default = "default_resolution")]
        resolution: (u32, u32),
    },
}

/// Lighting pattern of the synthetic panel once warm-up is over.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Scenario {
    /// Every light shows its expected color.
    #[default]
    Pass,
    /// The named light shows a different color; the rest pass.
    Fail { label: String },
    /// Nothing is lit.
    Dark,
}

fn default_warmup() -> usize {
    5
}

fn default_resolution() -> (u32, u32) {
    (1280, 720)
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StationConfig {
    pub layout: String,
    /// YAML layout catalog; the built-in panels are used when absent.
    #[serde(default)]
    pub layouts_file: Option<PathBuf>,
    pub store: PathBuf,
    pub source: SourceConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Annotated evidence frames are written here on pass/fail events.
    #[serde(default)]
    pub annotate_dir: Option<PathBuf>,
}

impl StationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading station config {}", path_ref.display()))?;
        let config: StationConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing station config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(layout: &str, store: PathBuf, source: SourceConfig) -> Self {
        Self {
            layout: layout.to_string(),
            layouts_file: None,
            store,
            source,
            classifier: ClassifierConfig::default(),
            detection: DetectionConfig::default(),
            bind: default_bind(),
            annotate_dir: None,
        }
    }

    pub fn load_catalog(&self) -> anyhow::Result<LayoutCatalog> {
        match &self.layouts_file {
            Some(path) => LayoutCatalog::load(path)
                .with_context(|| format!("loading layouts from {}", path.display())),
            None => Ok(LayoutCatalog::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_uses_defaults() {
        let cfg = StationConfig::from_args(
            "CILOW",
            PathBuf::from("positions.json"),
            SourceConfig::Images {
                dir: PathBuf::from("frames"),
                repeat: false,
            },
        );
        assert_eq!(cfg.detection.reset_delay_ms, 3000);
        assert_eq!(cfg.classifier.roi_half_width, 10);
        assert_eq!(cfg.bind.port(), 9000);
        assert!(cfg.load_catalog().unwrap().definition("CILOW").is_ok());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"layout: CICON\nstore: /tmp/positions.json\nsource:\n  kind: synthetic\n  scenario:\n    mode: fail\n    label: LIGHT 2\n  frame_limit: 12\ndetection:\n  reset_delay_ms: 500\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = StationConfig::load(&path).unwrap();
        assert_eq!(cfg.layout, "CICON");
        assert_eq!(cfg.detection.reset_delay_ms, 500);
        assert_eq!(cfg.detection.frame_size, Some((1280, 720)));
        assert_eq!(
            cfg.source,
            SourceConfig::Synthetic {
                scenario: Scenario::Fail {
                    label: "LIGHT 2".into()
                },
                warmup_frames: 5,
                frame_limit: Some(12),
                seed: 0,
            }
        );
    }

    #[test]
    fn bundled_configs_parse() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let mut cfg = StationConfig::load(root.join("config/station.yaml")).unwrap();
        assert_eq!(cfg.layout, "CILOW");
        assert_eq!(cfg.annotate_dir, Some(PathBuf::from("captures")));
        cfg.layouts_file = Some(root.join("config/layouts.yaml"));
        let catalog = cfg.load_catalog().unwrap();
        assert_eq!(catalog.layouts(), vec!["CILOW", "CICON"]);
        assert_eq!(catalog.color_ranges(), LayoutCatalog::builtin().color_ranges());
    }
}
