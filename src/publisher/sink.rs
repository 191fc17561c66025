use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::error::PublishError;
use crate::telemetry::Reading;

/// Receives the outcome of every publish issued by the recurring cycle.
///
/// Called from the spawned publish tasks, possibly concurrently and in any
/// order across topics. Implementations must not block.
pub trait PublishSink: Send + Sync {
    fn published(&self, _topic: &str, _reading: &Reading) {}

    fn publish_failed(&self, topic: &str, error: &PublishError);
}

#[derive(Clone, Debug, Default)]
pub struct PublishStats {
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub last_error: Option<String>,
    pub last_activity: Option<DateTime<Local>>,
}

/// Default sink: logs through `tracing` and keeps [`PublishStats`].
#[derive(Debug, Default)]
pub struct LoggingSink {
    sent: AtomicUsize,
    failed: AtomicUsize,
    last: Mutex<(Option<String>, Option<DateTime<Local>>)>,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> PublishStats {
        let (last_error, last_activity) = self
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        PublishStats {
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_failed: self.failed.load(Ordering::Relaxed),
            last_error,
            last_activity,
        }
    }

    fn touch(&self, error: Option<String>) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if error.is_some() {
            last.0 = error;
        }
        last.1 = Some(Local::now());
    }
}

impl PublishSink for LoggingSink {
    fn published(&self, topic: &str, reading: &Reading) {
        let sent = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Published to {}: temp={} hum={} ({} sent)",
            topic, reading.temperature, reading.humidity, sent
        );
        self.touch(None);
    }

    fn publish_failed(&self, topic: &str, error: &PublishError) {
        let failed = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
        error!("Publish to {} failed: {} ({} failed)", topic, error, failed);
        self.touch(Some(error.to_string()));
    }
}

/// Outcome forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum PublishReport {
    Published { topic: String, reading: Reading },
    Failed { topic: String, error: String },
}

/// Forwards outcomes to an mpsc channel for a host that wants to react to
/// them (UI, metrics, tests). Reports are dropped when the channel is full
/// or closed; the cycle never waits on the receiver.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PublishReport>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PublishReport>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn forward(&self, report: PublishReport) {
        if let Err(e) = self.tx.try_send(report) {
            warn!("Dropping publish report: {}", e);
        }
    }
}

impl PublishSink for ChannelSink {
    fn published(&self, topic: &str, reading: &Reading) {
        self.forward(PublishReport::Published {
            topic: topic.to_string(),
            reading: *reading,
        });
    }

    fn publish_failed(&self, topic: &str, error: &PublishError) {
        self.forward(PublishReport::Failed {
            topic: topic.to_string(),
            error: error.to_string(),
        });
    }
}
