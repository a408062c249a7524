use crate::layout::{LayoutCatalog, LayoutDefinition};
use crate::notify::{Notification, Notifier};
use crate::prelude::{FrameSource, LightCheckResult, LightColor, Position, Verdict};
use crate::processing::board::SampleBoard;
use crate::processing::classifier::LightClassifier;
use crate::processing::overlay;
use crate::processing::state::{LightStatus, TestStateMachine, Transition};
use crate::telemetry::{LogManager, MetricsRecorder};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type SharedBoard = Arc<RwLock<SampleBoard>>;
pub type SharedTest = Arc<Mutex<TestStateMachine>>;

pub fn lock_test(test: &SharedTest) -> MutexGuard<'_, TestStateMachine> {
    test.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loop parameters that are not part of classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Frames are resized to this before sampling, if set.
    pub frame_size: Option<(u32, u32)>,
    /// Panel guide rectangle drawn on annotated frames.
    pub guide_size: Option<(u32, u32)>,
    pub reset_delay_ms: u64,
}

impl DetectionConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            frame_size: Some((1280, 720)),
            guide_size: Some((600, 300)),
            reset_delay_ms: 3000,
        }
    }
}

/// Deferred reset of a completed run, executed on a tokio runtime.
///
/// A pending reset only fires if the run it was scheduled for is still the
/// current one; `cancel` aborts it outright.
#[derive(Clone)]
pub struct ResetScheduler {
    runtime: Handle,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ResetScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn schedule(
        &self,
        test: SharedTest,
        catalog: Arc<LayoutCatalog>,
        layout_id: String,
        generation: u64,
        delay: Duration,
    ) {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = lock_test(&test);
            if guard.generation() == generation {
                if let Err(err) = guard.reset(&catalog, &layout_id) {
                    log::warn!("deferred reset failed: {}", err);
                }
            }
        });
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Cooperative stop flag checked between frames.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-frame outcome, mainly for callers that drive frames themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub verdicts: Vec<(String, Verdict)>,
    pub newly_wrong: Vec<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub frames: usize,
    pub passes: usize,
    pub failures: usize,
}

/// Drives classification for one layout from a frame source.
pub struct DetectionLoop {
    catalog: Arc<LayoutCatalog>,
    definition: LayoutDefinition,
    classifier: LightClassifier,
    board: SharedBoard,
    test: SharedTest,
    notifier: Arc<dyn Notifier>,
    scheduler: ResetScheduler,
    config: DetectionConfig,
    stop: StopHandle,
    metrics: Arc<MetricsRecorder>,
    logger: LogManager,
}

impl DetectionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<LayoutCatalog>,
        layout_id: &str,
        classifier: LightClassifier,
        board: SharedBoard,
        test: SharedTest,
        notifier: Arc<dyn Notifier>,
        scheduler: ResetScheduler,
        config: DetectionConfig,
    ) -> LightCheckResult<Self> {
        let definition = catalog.definition(layout_id)?.clone();
        Ok(Self {
            catalog,
            definition,
            classifier,
            board,
            test,
            notifier,
            scheduler,
            config,
            stop: StopHandle::default(),
            metrics: Arc::new(MetricsRecorder::new()),
            logger: LogManager::new("detection"),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn layout_id(&self) -> &str {
        &self.definition.id
    }

    /// Pulls frames until the source ends, fails, or a stop is requested.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> LoopSummary {
        let mut summary = LoopSummary::default();
        self.logger
            .record(&format!("detection started for {}", self.definition.id));

        while !self.stop.is_stopped() {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.logger.record("frame source exhausted");
                    break;
                }
                Err(err) => {
                    self.metrics.record_camera_error();
                    self.logger.warn(&format!("failed to grab frame: {}", err));
                    break;
                }
            };

            let report = self.process_frame(&frame);
            summary.frames += 1;
            summary.failures += report.newly_wrong.len();
            if report.completed {
                summary.passes += 1;
            }
        }

        self.logger.record(&format!(
            "detection stopped for {} after {} frames",
            self.definition.id, summary.frames
        ));
        summary
    }

    pub fn process_frame(&self, frame: &RgbImage) -> FrameReport {
        let resized;
        let frame = match self.config.frame_size {
            Some((width, height)) if frame.dimensions() != (width, height) => {
                resized = imageops::resize(frame, width, height, FilterType::Triangle);
                &resized
            }
            _ => frame,
        };
        self.metrics.record_frame();

        let (generation, verdicts) = self.evaluate(frame);
        let mut report = self.commit(generation, verdicts);

        let announce = {
            let mut test = lock_test(&self.test);
            test.generation() == generation && test.mark_announced()
        };
        if announce {
            self.metrics.record_pass();
            let delay = self.config.reset_delay();
            self.logger.record(&format!(
                "all lights passed for {}, resetting in {:?}",
                self.definition.id, delay
            ));
            self.notifier
                .notify(Notification::success(&self.definition.id, delay.as_secs()));
            self.scheduler.schedule(
                self.test.clone(),
                self.catalog.clone(),
                self.definition.id.clone(),
                generation,
                delay,
            );
            report.completed = true;
        }

        if self.notifier.wants_frames() {
            let annotated = overlay::annotate(frame, self.config.guide_size, &self.overlay_points());
            self.notifier.frame(&self.definition.id, &annotated);
        }
        report
    }

    /// Classifies the pending lights with no lock held. The returned
    /// generation identifies the run the verdicts belong to.
    fn evaluate(&self, frame: &RgbImage) -> (u64, Vec<(String, Verdict)>) {
        let (generation, targets) = self.pending_targets();
        let verdicts = targets
            .into_iter()
            .map(|(label, position, color)| {
                let verdict = self.classifier.classify(frame, position, color);
                (label, verdict)
            })
            .collect();
        (generation, verdicts)
    }

    /// Applies verdicts to the run they were computed for. Verdicts for a
    /// run that has since been reset are dropped.
    fn commit(&self, generation: u64, verdicts: Vec<(String, Verdict)>) -> FrameReport {
        let mut report = FrameReport::default();
        for (label, verdict) in &verdicts {
            let transition = {
                let mut test = lock_test(&self.test);
                if test.generation() != generation {
                    self.logger.trace("run was reset mid-frame; dropping verdicts");
                    break;
                }
                test.apply(label, *verdict)
            };
            if transition == Transition::BecameWrong {
                self.metrics.record_failure();
                self.notifier
                    .notify(Notification::failure(&self.definition.id, label));
                report.newly_wrong.push(label.clone());
            }
        }
        report.verdicts = verdicts;
        report
    }

    /// Run generation and the lights still to be evaluated, with their
    /// current sample position.
    fn pending_targets(&self) -> (u64, Vec<(String, Position, LightColor)>) {
        let positions = self
            .board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current_positions();
        let test = lock_test(&self.test);
        let targets = self
            .definition
            .lights
            .iter()
            .filter(|light| !test.is_passed(&light.label))
            .filter_map(|light| {
                positions
                    .get(&light.label)
                    .map(|position| (light.label.clone(), *position, light.color))
            })
            .collect();
        (test.generation(), targets)
    }

    fn overlay_points(&self) -> Vec<(Position, LightStatus)> {
        let positions = self
            .board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current_positions();
        let test = lock_test(&self.test);
        self.definition
            .lights
            .iter()
            .filter_map(|light| {
                let position = positions.get(&light.label)?;
                Some((*position, test.status(&light.label).unwrap_or_default()))
            })
            .collect()
    }
}
