use crate::generator::panel::SyntheticPanel;
use crate::gui_bridge::model::{LightView, StatusModel};
use crate::workflow::config::{SourceConfig, StationConfig};
use crate::workflow::sink::StationSink;
use anyhow::{anyhow, bail, Context};
use lightcore::layout::{LayoutCatalog, PositionStore};
use lightcore::notify::Notifier;
use lightcore::processing::detection::lock_test;
use lightcore::processing::{
    DetectionLoop, LightClassifier, LoopSummary, ResetScheduler, SampleBoard, SharedBoard,
    SharedTest, StopHandle, TestStateMachine,
};
use lightcore::source::ImageSequence;
use lightcore::telemetry::MetricsRecorder;
use lightcore::FrameSource;
use log::{info, warn};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use tokio::runtime::Handle;

struct Session {
    layout_id: String,
    stop: StopHandle,
    worker: JoinHandle<LoopSummary>,
}

/// Control surface of the station: owns the shared board and test state,
/// and starts, resets and saves detection runs on request.
pub struct Runner {
    config: StationConfig,
    catalog: Arc<LayoutCatalog>,
    store: PositionStore,
    board: SharedBoard,
    test: SharedTest,
    scheduler: ResetScheduler,
    sink: Arc<StationSink>,
    metrics: Arc<MetricsRecorder>,
    session: Mutex<Option<Session>>,
}

impl Runner {
    pub fn new(config: StationConfig, runtime: Handle) -> anyhow::Result<Self> {
        let catalog = Arc::new(config.load_catalog()?);
        let store = PositionStore::new(config.store.clone());
        let sink = Arc::new(StationSink::new(config.annotate_dir.clone()));
        let runner = Self {
            catalog,
            store,
            board: Arc::new(RwLock::new(SampleBoard::new())),
            test: Arc::new(Mutex::new(TestStateMachine::new())),
            scheduler: ResetScheduler::new(runtime),
            sink,
            metrics: Arc::new(MetricsRecorder::new()),
            session: Mutex::new(None),
            config,
        };
        let layout = runner.config.layout.clone();
        runner.select_layout(&layout)?;
        Ok(runner)
    }

    pub fn sink(&self) -> &StationSink {
        &self.sink
    }

    /// Loads the board for `layout_id` and starts a fresh run.
    fn select_layout(&self, layout_id: &str) -> anyhow::Result<()> {
        self.catalog
            .definition(layout_id)
            .with_context(|| format!("selecting layout {}", layout_id))?;
        self.scheduler.cancel();
        self.board_mut()
            .initialize(&self.catalog, Some(&self.store), layout_id)?;
        lock_test(&self.test).reset(&self.catalog, layout_id)?;
        info!("selected layout {}", layout_id);
        Ok(())
    }

    /// Starts the detection loop for `layout_id` on its own thread, stopping
    /// any loop already running.
    pub fn start_detection(&self, layout_id: &str) -> anyhow::Result<()> {
        self.stop_detection();
        self.select_layout(layout_id)?;

        let detection = DetectionLoop::new(
            self.catalog.clone(),
            layout_id,
            LightClassifier::new(
                self.config.classifier.clone(),
                self.catalog.color_ranges().clone(),
            ),
            self.board.clone(),
            self.test.clone(),
            self.sink.clone() as Arc<dyn Notifier>,
            self.scheduler.clone(),
            self.config.detection.clone(),
        )?
        .with_metrics(self.metrics.clone());
        let stop = detection.stop_handle();
        let source_config = self.config.source.clone();
        let catalog = self.catalog.clone();
        let frame_size = self.config.detection.frame_size;
        let layout = layout_id.to_string();

        let worker = thread::Builder::new()
            .name(format!("detect-{}", layout_id))
            .spawn(move || {
                let mut detection = detection;
                match open_source(&source_config, &catalog, &layout, frame_size) {
                    Ok(mut source) => detection.run(source.as_mut()),
                    Err(err) => {
                        warn!("could not open frame source: {:#}", err);
                        LoopSummary::default()
                    }
                }
            })
            .context("spawning detection thread")?;

        *self.session_guard() = Some(Session {
            layout_id: layout_id.to_string(),
            stop,
            worker,
        });
        Ok(())
    }

    /// Signals the running loop to stop and waits for it to release the source.
    pub fn stop_detection(&self) -> Option<LoopSummary> {
        let session = self.session_guard().take()?;
        session.stop.stop();
        match session.worker.join() {
            Ok(summary) => {
                info!(
                    "detection for {} ended: {} frames, {} passes",
                    session.layout_id, summary.frames, summary.passes
                );
                Some(summary)
            }
            Err(_) => {
                warn!("detection thread for {} panicked", session.layout_id);
                None
            }
        }
    }

    /// Waits for a loop whose source ends on its own.
    pub fn wait(&self) -> Option<LoopSummary> {
        let session = self.session_guard().take()?;
        session.worker.join().ok()
    }

    fn running_layout(&self) -> Option<String> {
        self.session_guard()
            .as_ref()
            .filter(|session| !session.worker.is_finished())
            .map(|session| session.layout_id.clone())
    }

    pub fn is_running(&self) -> bool {
        self.session_guard()
            .as_ref()
            .is_some_and(|session| !session.worker.is_finished())
    }

    /// Starts a fresh run for `layout_id`. A loop running another layout is
    /// restarted on this one so its lights get checked.
    pub fn reset_test(&self, layout_id: &str) -> anyhow::Result<()> {
        self.catalog
            .definition(layout_id)
            .with_context(|| format!("resetting layout {}", layout_id))?;
        if self
            .running_layout()
            .is_some_and(|running| running != layout_id)
        {
            info!("switching running detection to {}", layout_id);
            return self.start_detection(layout_id);
        }
        let board_layout = self.active_layout();
        if board_layout.as_deref() != Some(layout_id) {
            return self.select_layout(layout_id);
        }
        self.scheduler.cancel();
        lock_test(&self.test).reset(&self.catalog, layout_id)?;
        Ok(())
    }

    pub fn save_positions(&self, layout_id: &str) -> anyhow::Result<()> {
        let positions = {
            let board = self.board.read().unwrap_or_else(PoisonError::into_inner);
            if board.layout_id() != Some(layout_id) {
                bail!("layout {} is not active", layout_id);
            }
            board.current_positions()
        };
        self.store
            .save(layout_id, &positions)
            .with_context(|| format!("saving positions to {}", self.store.path().display()))
    }

    pub fn begin_drag_at(&self, x: i32, y: i32) -> Option<String> {
        self.board_mut().begin_drag_at(x, y)
    }

    pub fn drag_to(&self, x: i32, y: i32) -> anyhow::Result<()> {
        let mut board = self.board_mut();
        let label = board
            .active_drag()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no drag in progress"))?;
        board.update_position(&label, x, y);
        Ok(())
    }

    pub fn end_drag(&self) {
        self.board_mut().end_drag();
    }

    pub fn active_layout(&self) -> Option<String> {
        self.board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .layout_id()
            .map(str::to_string)
    }

    pub fn status(&self) -> StatusModel {
        let layout = self.active_layout();
        let positions = self
            .board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current_positions();
        let test = lock_test(&self.test);
        let lights = layout
            .as_deref()
            .and_then(|id| self.catalog.definition(id).ok())
            .map(|definition| {
                definition
                    .lights
                    .iter()
                    .map(|light| {
                        let position = positions.get(&light.label).copied().unwrap_or(light.position);
                        let status = test.status(&light.label).unwrap_or_default();
                        LightView {
                            label: light.label.clone(),
                            x: position.x,
                            y: position.y,
                            expected: light.color,
                            checked: status.checked,
                            wrong: status.wrong,
                            success: status.success,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        StatusModel {
            layouts: self.catalog.layouts().into_iter().map(str::to_string).collect(),
            layout,
            running: self.is_running(),
            complete: test.is_complete(),
            reset_pending: self.scheduler.is_pending(),
            generation: test.generation(),
            frame_size: self.config.detection.frame_size,
            lights,
            metrics: self.metrics.snapshot(),
            events: self.sink.events(),
        }
    }

    fn board_mut(&self) -> RwLockWriteGuard<'_, SampleBoard> {
        self.board.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_guard(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.scheduler.cancel();
        self.stop_detection();
    }
}

fn open_source(
    config: &SourceConfig,
    catalog: &LayoutCatalog,
    layout_id: &str,
    frame_size: Option<(u32, u32)>,
) -> anyhow::Result<Box<dyn FrameSource>> {
    match config {
        SourceConfig::Synthetic {
            scenario,
            warmup_frames,
            frame_limit,
            seed,
        } => {
            let definition = catalog.definition(layout_id)?;
            let size = frame_size.unwrap_or((1280, 720));
            Ok(Box::new(
                SyntheticPanel::for_layout(definition, scenario, size, *seed)
                    .with_warmup(*warmup_frames)
                    .with_frame_limit(*frame_limit),
            ))
        }
        SourceConfig::Images { dir, repeat } => Ok(Box::new(
            ImageSequence::open(dir, *repeat)
                .with_context(|| format!("opening image directory {}", dir.display()))?,
        )),
        #[cfg(feature = "camera")]
        SourceConfig::Camera { device, resolution } => Ok(Box::new(
            crate::camera::V4lCamera::open(device, *resolution)?,
        )),
        #[cfg(not(feature = "camera"))]
        SourceConfig::Camera { device, .. } => Err(anyhow!(
            "camera {} requested but the station was built without the `camera` feature",
            device
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::config::Scenario;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::runtime::{Builder, Runtime};

    fn runtime() -> Runtime {
        Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    fn config(store: &Path, scenario: Scenario, frame_limit: usize) -> StationConfig {
        let mut cfg = StationConfig::from_args(
            "CILOW",
            store.to_path_buf(),
            SourceConfig::Synthetic {
                scenario,
                warmup_frames: 1,
                frame_limit: Some(frame_limit),
                seed: 3,
            },
        );
        cfg.detection.frame_size = Some((640, 360));
        cfg.detection.reset_delay_ms = 60_000;
        cfg
    }

    #[test]
    fn runner_passes_synthetic_panel() {
        let rt = runtime();
        let dir = tempdir().unwrap();
        let runner = Runner::new(
            config(&dir.path().join("p.json"), Scenario::Pass, 3),
            rt.handle().clone(),
        )
        .unwrap();
        runner.start_detection("CILOW").unwrap();
        let summary = runner.wait().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.passes, 1);

        let status = runner.status();
        assert!(status.complete);
        assert!(status.reset_pending);
        assert!(status.lights.iter().all(|light| light.success));
        assert_eq!(status.metrics.frames, 3);
    }

    #[test]
    fn runner_reports_wrong_light() {
        let rt = runtime();
        let dir = tempdir().unwrap();
        let scenario = Scenario::Fail {
            label: "OPTION SENSE".into(),
        };
        let runner =
            Runner::new(config(&dir.path().join("p.json"), scenario, 4), rt.handle().clone())
                .unwrap();
        runner.start_detection("CILOW").unwrap();
        let summary = runner.wait().unwrap();
        assert_eq!(summary.failures, 1);

        let status = runner.status();
        assert!(!status.complete);
        let wrong: Vec<_> = status
            .lights
            .iter()
            .filter(|light| light.wrong)
            .map(|light| light.label.as_str())
            .collect();
        assert_eq!(wrong, vec!["OPTION SENSE"]);
    }

    #[test]
    fn drag_save_and_reload_positions() {
        let rt = runtime();
        let dir = tempdir().unwrap();
        let store = dir.path().join("p.json");
        let runner =
            Runner::new(config(&store, Scenario::Pass, 1), rt.handle().clone()).unwrap();

        assert_eq!(runner.begin_drag_at(152, 48).as_deref(), Some("SERVICE OUT"));
        runner.drag_to(170, 60).unwrap();
        runner.end_drag();
        assert!(runner.drag_to(1, 1).is_err());
        runner.save_positions("CILOW").unwrap();
        assert!(runner.save_positions("CICON").is_err());

        runner.select_layout("CICON").unwrap();
        runner.select_layout("CILOW").unwrap();
        let status = runner.status();
        let service = &status.lights[0];
        assert_eq!((service.x, service.y), (170, 60));
    }

    #[test]
    fn reset_clears_run_and_switches_layout() {
        let rt = runtime();
        let dir = tempdir().unwrap();
        let runner = Runner::new(
            config(&dir.path().join("p.json"), Scenario::Pass, 2),
            rt.handle().clone(),
        )
        .unwrap();
        runner.start_detection("CILOW").unwrap();
        runner.wait();
        assert!(runner.status().complete);

        runner.reset_test("CILOW").unwrap();
        let status = runner.status();
        assert!(!status.complete);
        assert!(!status.reset_pending);

        runner.reset_test("CICON").unwrap();
        assert_eq!(runner.status().layout.as_deref(), Some("CICON"));
        assert!(runner.reset_test("NOPE").is_err());
        assert_eq!(runner.status().layout.as_deref(), Some("CICON"));
    }

    #[test]
    fn reset_to_another_layout_restarts_running_detection() {
        let rt = runtime();
        let dir = tempdir().unwrap();
        let mut cfg = config(&dir.path().join("p.json"), Scenario::Pass, 1);
        cfg.source = SourceConfig::Synthetic {
            scenario: Scenario::Pass,
            warmup_frames: 1,
            frame_limit: None,
            seed: 5,
        };
        let runner = Runner::new(cfg, rt.handle().clone()).unwrap();
        runner.start_detection("CILOW").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert!(runner.reset_test("NOPE").is_err());
        assert_eq!(runner.running_layout().as_deref(), Some("CILOW"));

        runner.reset_test("CICON").unwrap();
        assert_eq!(runner.running_layout().as_deref(), Some("CICON"));

        let mut status = runner.status();
        for _ in 0..100 {
            if status.complete {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
            status = runner.status();
        }
        assert_eq!(status.layout.as_deref(), Some("CICON"));
        assert!(status.running);
        assert!(status.complete);
        let labels: Vec<_> = status.lights.iter().map(|light| light.label.as_str()).collect();
        assert_eq!(labels, vec!["LIGHT 1", "LIGHT 2", "LIGHT 3"]);
        assert!(status.lights.iter().all(|light| light.success));

        assert!(runner.stop_detection().is_some());
    }

    #[test]
    fn missing_image_directory_ends_the_run_quietly() {
        let rt = runtime();
        let dir = tempdir().unwrap();
        let mut cfg = config(&dir.path().join("p.json"), Scenario::Pass, 1);
        cfg.source = SourceConfig::Images {
            dir: dir.path().join("absent"),
            repeat: false,
        };
        let runner = Runner::new(cfg, rt.handle().clone()).unwrap();
        runner.start_detection("CILOW").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runner.wait().unwrap().frames, 0);
    }
}
