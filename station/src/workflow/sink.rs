use image::RgbImage;
use lightcore::notify::{LogNotifier, Notification, Notifier};
use log::warn;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

const EVENT_HISTORY: usize = 20;

/// Notification sink of the station: logs every event, keeps recent events
/// and the latest annotated frame for the bridge, and optionally writes
/// the frame that triggered a pass/fail event to disk.
pub struct StationSink {
    log: LogNotifier,
    events: Mutex<VecDeque<Notification>>,
    latest_frame: Mutex<Option<RgbImage>>,
    annotate_dir: Option<PathBuf>,
    capture_next: AtomicBool,
    captured: AtomicUsize,
}

impl StationSink {
    pub fn new(annotate_dir: Option<PathBuf>) -> Self {
        Self {
            log: LogNotifier,
            events: Mutex::new(VecDeque::with_capacity(EVENT_HISTORY)),
            latest_frame: Mutex::new(None),
            annotate_dir,
            capture_next: AtomicBool::new(false),
            captured: AtomicUsize::new(0),
        }
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest_frame(&self) -> Option<RgbImage> {
        self.latest_frame
            .lock()
            .ok()
            .and_then(|frame| frame.clone())
    }

    pub fn captured(&self) -> usize {
        self.captured.load(Ordering::SeqCst)
    }
}

impl Notifier for StationSink {
    fn notify(&self, notification: Notification) {
        self.log.notify(notification.clone());
        if let Ok(mut events) = self.events.lock() {
            if events.len() == EVENT_HISTORY {
                events.pop_front();
            }
            events.push_back(notification);
        }
        if self.annotate_dir.is_some() {
            self.capture_next.store(true, Ordering::SeqCst);
        }
    }

    fn wants_frames(&self) -> bool {
        true
    }

    fn frame(&self, layout_id: &str, frame: &RgbImage) {
        if let Ok(mut latest) = self.latest_frame.lock() {
            *latest = Some(frame.clone());
        }
        let Some(dir) = &self.annotate_dir else {
            return;
        };
        if !self.capture_next.swap(false, Ordering::SeqCst) {
            return;
        }
        let index = self.captured.fetch_add(1, Ordering::SeqCst);
        let path = dir.join(format!("{}-{:05}.png", layout_id, index));
        if let Err(err) = std::fs::create_dir_all(dir).map_err(|e| e.to_string()).and_then(|_| {
            frame.save(&path).map_err(|e| e.to_string())
        }) {
            warn!("could not write {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn event_history_is_bounded() {
        let sink = StationSink::new(None);
        for index in 0..25 {
            sink.notify(Notification::failure("CICON", &format!("L{}", index)));
        }
        let events = sink.events();
        assert_eq!(events.len(), EVENT_HISTORY);
        assert_eq!(events[0], Notification::failure("CICON", "L5"));
    }

    #[test]
    fn only_event_frames_are_written() {
        let dir = tempdir().unwrap();
        let sink = StationSink::new(Some(dir.path().to_path_buf()));
        let frame = RgbImage::new(8, 8);

        sink.frame("CICON", &frame);
        assert_eq!(sink.captured(), 0);
        sink.notify(Notification::success("CICON", 3));
        sink.frame("CICON", &frame);
        sink.frame("CICON", &frame);

        assert_eq!(sink.captured(), 1);
        assert!(dir.path().join("CICON-00000.png").exists());
        assert!(sink.latest_frame().is_some());
    }
}
