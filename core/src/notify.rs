//! Success/failure signalling out of the detection loop.
//!
//! Notifications are fire-and-forget: a sink must never block the loop.

use image::RgbImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// One beep: frequency in Hz and duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

const fn tone(frequency_hz: u32, duration_ms: u32) -> Tone {
    Tone {
        frequency_hz,
        duration_ms,
    }
}

pub const SUCCESS_TONES: [Tone; 3] = [tone(1000, 200), tone(1500, 200), tone(2000, 300)];
pub const FAILURE_TONES: [Tone; 3] = [tone(500, 300), tone(400, 300), tone(300, 300)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Success {
        layout_id: String,
        message: String,
        tones: Vec<Tone>,
    },
    Failure {
        layout_id: String,
        label: String,
        tones: Vec<Tone>,
    },
}

impl Notification {
    pub fn success(layout_id: &str, reset_delay_secs: u64) -> Self {
        Notification::Success {
            layout_id: layout_id.to_string(),
            message: format!("Success! Test will reset in {} seconds...", reset_delay_secs),
            tones: SUCCESS_TONES.to_vec(),
        }
    }

    pub fn failure(layout_id: &str, label: &str) -> Self {
        Notification::Failure {
            layout_id: layout_id.to_string(),
            label: label.to_string(),
            tones: FAILURE_TONES.to_vec(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    /// Whether `frame` should be called with annotated frames.
    fn wants_frames(&self) -> bool {
        false
    }

    fn frame(&self, _layout_id: &str, _frame: &RgbImage) {}
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Success {
                layout_id, message, ..
            } => info!("[{}] {}", layout_id, message),
            Notification::Failure {
                layout_id, label, ..
            } => warn!("[{}] {} shows the wrong color", layout_id, label),
        }
    }
}

/// Forwards notifications to an async consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(sender: UnboundedSender<Notification>) -> Self {
        Self { sender }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            warn!("notification dropped: receiver closed");
        }
    }
}
