use crate::layout::catalog::LayoutDefinition;
use crate::prelude::{LightCheckError, LightCheckResult, Position};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Label to position mapping for a single layout.
pub type PositionMap = BTreeMap<String, Position>;

type StoreContents = BTreeMap<String, PositionMap>;

/// JSON file holding calibrated sample positions for every layout.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored positions for `layout_id`; empty when nothing was saved yet.
    pub fn load(&self, layout_id: &str) -> LightCheckResult<PositionMap> {
        let mut contents = self.read_all()?;
        Ok(contents.remove(layout_id).unwrap_or_default())
    }

    /// Stored positions restricted to the labels the layout still declares.
    ///
    /// A corrupt store is logged and treated as empty.
    pub fn load_for(&self, definition: &LayoutDefinition) -> PositionMap {
        match self.load(&definition.id) {
            Ok(mut positions) => {
                positions.retain(|label, _| definition.contains(label));
                if positions.is_empty() {
                    info!("no saved positions for layout {}", definition.id);
                }
                positions
            }
            Err(err) => {
                warn!("ignoring position store: {}", err);
                PositionMap::new()
            }
        }
    }

    /// Replaces the entry for `layout_id`, leaving other layouts untouched.
    pub fn save(&self, layout_id: &str, positions: &PositionMap) -> LightCheckResult<()> {
        let mut contents = self.read_all()?;
        contents.insert(layout_id.to_string(), positions.clone());
        let serialized =
            serde_json::to_string_pretty(&contents).map_err(|err| LightCheckError::StoreCorrupt {
                path: self.path.clone(),
                source: err,
            })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut staged = NamedTempFile::new_in(&dir)?;
        staged.write_all(serialized.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|err| LightCheckError::Io(err.error))?;
        info!("positions saved for layout {}", layout_id);
        Ok(())
    }

    fn read_all(&self) -> LightCheckResult<StoreContents> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StoreContents::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| LightCheckError::StoreCorrupt {
            path: self.path.clone(),
            source: err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::catalog::LayoutCatalog;
    use tempfile::tempdir;

    fn positions(entries: &[(&str, i32, i32)]) -> PositionMap {
        entries
            .iter()
            .map(|(label, x, y)| (label.to_string(), Position::new(*x, *y)))
            .collect()
    }

    #[test]
    fn missing_store_loads_empty() {
        let dir = tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions.json"));
        assert!(store.load("CILOW").unwrap().is_empty());
    }

    #[test]
    fn save_then_load_returns_known_labels() {
        let dir = tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions.json"));
        let catalog = LayoutCatalog::builtin();
        let cicon = catalog.definition("CICON").unwrap();

        let saved = positions(&[("LIGHT 1", 11, 12), ("LIGHT 3", 31, 32), ("GONE", 1, 1)]);
        store.save("CICON", &saved).unwrap();

        let loaded = store.load_for(cicon);
        assert_eq!(loaded, positions(&[("LIGHT 1", 11, 12), ("LIGHT 3", 31, 32)]));
    }

    #[test]
    fn save_preserves_other_layouts() {
        let dir = tempdir().unwrap();
        let store = PositionStore::new(dir.path().join("positions.json"));
        store
            .save("CILOW", &positions(&[("SERVICE OUT", 1, 2)]))
            .unwrap();
        store.save("CICON", &positions(&[("LIGHT 2", 3, 4)])).unwrap();
        store.save("CICON", &positions(&[("LIGHT 2", 5, 6)])).unwrap();

        assert_eq!(
            store.load("CILOW").unwrap(),
            positions(&[("SERVICE OUT", 1, 2)])
        );
        assert_eq!(store.load("CICON").unwrap(), positions(&[("LIGHT 2", 5, 6)]));
    }

    #[test]
    fn corrupt_store_is_reported_and_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.json");
        fs::write(&path, "{ not json").unwrap();
        let store = PositionStore::new(&path);

        assert!(matches!(
            store.load("CILOW"),
            Err(LightCheckError::StoreCorrupt { .. })
        ));
        let catalog = LayoutCatalog::builtin();
        assert!(store.load_for(catalog.definition("CILOW").unwrap()).is_empty());
        assert!(store.save("CILOW", &PositionMap::new()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn save_under_a_file_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "plain file").unwrap();
        let store = PositionStore::new(blocker.join("positions.json"));

        assert!(store.save("CICON", &positions(&[("LIGHT 1", 1, 1)])).is_err());
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "plain file");
    }

    #[cfg(unix)]
    #[test]
    fn failed_save_keeps_existing_store() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        let path = locked.join("positions.json");
        let store = PositionStore::new(&path);
        store.save("CICON", &positions(&[("LIGHT 1", 7, 8)])).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        // Privileged users ignore directory permissions; nothing to check then.
        if fs::write(locked.join("write-check"), "").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = store.save("CICON", &positions(&[("LIGHT 1", 70, 80)]));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(LightCheckError::Io(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(store.load("CICON").unwrap(), positions(&[("LIGHT 1", 7, 8)]));
    }

    #[test]
    fn store_file_is_readable_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("positions.json");
        let store = PositionStore::new(&path);
        store.save("CICON", &positions(&[("LIGHT 1", 7, 8)])).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["CICON"]["LIGHT 1"]["x"], 7);
        assert_eq!(value["CICON"]["LIGHT 1"]["y"], 8);
    }
}
