//! Publishing Controller - lifecycle of the recurring telemetry cycle
//!
//! Owns the session state (`active` flag and the running [`CycleHandle`]) and
//! serializes every mutation of it behind one mutex, so `start()`/`stop()` calls
//! from the host never race with each other or with a firing tick.
//!
//! ```text
//!            start() (no-op)
//!              ┌──────┐
//!              ▼      │
//!  Idle ──start()──► Running
//!   ▲ │                │
//!   │ └─stop() (no-op) │
//!   └──────stop()──────┘
//!
//!  any ──cleanup()──► Terminal
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cycle::{CycleHandle, PublishCycle};
use super::error::{PublishError, PublisherError};
use super::sink::{LoggingSink, PublishSink};
use crate::config::validate_topics;
use crate::mqtt::connector::Connector;
use crate::mqtt::mqtt_handler::ConnectionState;
use crate::telemetry::{RandomReadings, Reading, ReadingSource};

/// Fixed interval between two publish ticks.
pub const PUBLISH_PERIOD: Duration = Duration::from_millis(5_000);

#[derive(Debug, Default)]
struct Session {
    active: bool,
    cycle: Option<CycleHandle>,
    terminated: bool,
}

pub struct PublishingController {
    connector: Arc<dyn Connector>,
    source: Arc<dyn ReadingSource>,
    sink: Arc<dyn PublishSink>,
    topics: Arc<[String]>,
    runtime: Handle,
    session: Mutex<Session>,
}

impl PublishingController {
    /// Creates an idle controller publishing to `topics` through `connector`.
    ///
    /// Must be called inside a Tokio runtime; the cycle is later spawned on it.
    ///
    /// # Errors
    ///
    /// * [`PublisherError::InvalidConfig`] - empty, duplicate or wildcard topics
    /// * [`PublisherError::NoRuntime`] - called outside a Tokio runtime
    pub fn new(
        connector: Arc<dyn Connector>,
        topics: Vec<String>,
    ) -> Result<Self, PublisherError> {
        validate_topics(&topics)?;
        let runtime = Handle::try_current().map_err(|_| PublisherError::NoRuntime)?;

        info!("Publishing controller created for topics {:?}", topics);
        Ok(Self {
            connector,
            source: Arc::new(RandomReadings),
            sink: Arc::new(LoggingSink::new()),
            topics: topics.into(),
            runtime,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn with_reading_source(mut self, source: Arc<dyn ReadingSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PublishSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Arms the recurring cycle. A no-op while already running.
    ///
    /// # Errors
    ///
    /// [`PublisherError::Terminated`] after [`cleanup`](Self::cleanup).
    pub fn start(&self) -> Result<(), PublisherError> {
        let mut session = self.lock_session();

        if session.terminated {
            warn!("start() called on a cleaned up publishing controller");
            return Err(PublisherError::Terminated);
        }
        if session.active {
            debug!("Publishing already active, ignoring start()");
            return Ok(());
        }

        session.active = true;
        if let Some(stale) = session.cycle.take() {
            warn!("Cancelling stale publish cycle");
            stale.cancel();
        }

        let cycle = PublishCycle::create(
            self.connector.clone(),
            self.source.clone(),
            self.sink.clone(),
            self.topics.clone(),
        );
        session.cycle = Some(CycleHandle::spawn(&self.runtime, cycle, PUBLISH_PERIOD));

        info!(
            "Publishing started: {} topics every {} ms",
            self.topics.len(),
            PUBLISH_PERIOD.as_millis()
        );
        Ok(())
    }

    /// Cancels the cycle. Publishes of an already fired tick still complete.
    pub fn stop(&self) {
        let mut session = self.lock_session();
        let was_active = std::mem::replace(&mut session.active, false);

        if let Some(cycle) = session.cycle.take() {
            cycle.cancel();
        }
        if was_active {
            info!("Publishing stopped");
        }
    }

    /// Encodes `reading` and submits it to `topic`, independent of the cycle.
    pub async fn publish(&self, topic: &str, reading: &Reading) -> Result<(), PublishError> {
        submit(self.connector.as_ref(), topic, reading).await
    }

    pub fn get_status(&self) -> bool {
        self.lock_session().active
    }

    /// Stops publishing and closes the connection. The controller cannot be
    /// started again afterwards.
    pub async fn cleanup(&self) -> Result<(), PublisherError> {
        self.stop();
        {
            let mut session = self.lock_session();
            if session.terminated {
                debug!("Publishing controller already cleaned up");
                return Ok(());
            }
            session.terminated = true;
        }

        info!("Closing broker connection");
        self.connector.close().await?;
        Ok(())
    }

    /// Starts publishing every time `state` reports [`ConnectionState::Connected`].
    ///
    /// The task ends once the controller has been cleaned up or the sender of
    /// `state` is gone.
    pub fn follow_connection(
        self: &Arc<Self>,
        mut state: watch::Receiver<ConnectionState>,
    ) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        self.runtime.spawn(async move {
            loop {
                let connected = *state.borrow_and_update() == ConnectionState::Connected;
                if connected {
                    if let Err(e) = controller.start() {
                        debug!("Not following connection any more: {}", e);
                        break;
                    }
                }
                if state.changed().await.is_err() {
                    debug!("Connection state channel closed");
                    break;
                }
            }
        })
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) async fn submit(
    connector: &dyn Connector,
    topic: &str,
    reading: &Reading,
) -> Result<(), PublishError> {
    let payload = reading.to_payload().map_err(|source| PublishError::Encode {
        topic: topic.to_string(),
        source,
    })?;

    connector
        .publish(topic, payload)
        .await
        .map_err(|source| PublishError::Transport {
            topic: topic.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::connector::TransportError;
    use async_trait::async_trait;

    struct RejectingConnector;

    #[async_trait]
    impl Connector for RejectingConnector {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), TransportError> {
            Err(TransportError::Rejected("quota exceeded".into()))
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn controller() -> PublishingController {
        PublishingController::new(
            Arc::new(RejectingConnector),
            vec!["devices/temp-1".into()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn new_controller_is_idle() {
        assert!(!controller().get_status());
    }

    #[tokio::test]
    async fn invalid_topics_prevent_construction() {
        let result = PublishingController::new(Arc::new(RejectingConnector), Vec::new());
        assert!(matches!(result, Err(PublisherError::InvalidConfig(_))));
    }

    #[test]
    fn construction_outside_runtime_fails() {
        let result =
            PublishingController::new(Arc::new(RejectingConnector), vec!["a".into()]);
        assert!(matches!(result, Err(PublisherError::NoRuntime)));
    }

    #[tokio::test]
    async fn publish_surfaces_transport_error_with_topic() {
        let controller = controller();
        let err = controller
            .publish("devices/temp-1", &Reading::new(1, 10.0, 40.0))
            .await
            .unwrap_err();

        assert_eq!(err.topic(), "devices/temp-1");
        assert!(matches!(
            err,
            PublishError::Transport {
                source: TransportError::Rejected(_),
                ..
            }
        ));
        assert!(!controller.get_status());
    }

    #[tokio::test]
    async fn start_after_cleanup_is_rejected() {
        let controller = controller();
        controller.start().unwrap();
        controller.cleanup().await.unwrap();

        assert!(!controller.get_status());
        assert!(matches!(controller.start(), Err(PublisherError::Terminated)));
        // cleanup is idempotent
        controller.cleanup().await.unwrap();
    }
}
