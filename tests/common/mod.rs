#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use telemetry_publisher::mqtt::{Connector, TransportError};
use telemetry_publisher::telemetry::Reading;

/// In-memory connector that records every publish call.
#[derive(Default)]
pub struct RecordingConnector {
    calls: Mutex<Vec<(String, Reading)>>,
    failing_topics: HashSet<String>,
    delay: Option<Duration>,
    closed: AtomicBool,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(topics: &[&str]) -> Self {
        Self {
            failing_topics: topics.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Every publish takes `delay` before it resolves.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, Reading)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let reading: Reading = serde_json::from_slice(&payload).expect("payload is a reading");
        self.calls
            .lock()
            .unwrap()
            .push((topic.to_string(), reading));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_topics.contains(topic) {
            return Err(TransportError::Rejected(format!("{topic} not allowed")));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub const TOPICS: [&str; 2] = ["devices/temp-1", "devices/humidity-1"];

pub fn topics() -> Vec<String> {
    TOPICS.iter().map(|t| t.to_string()).collect()
}

/// Lets paused time run forward by `ms`, firing every timer on the way.
pub async fn elapse(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
