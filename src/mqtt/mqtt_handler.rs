use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::BrokerConfig;
use super::connector::{ConnectError, Connector, TransportError};
use crate::config::ConfigError;

/// Capacity of the request channel between [`AsyncClient`] and its event loop.
const REQUEST_CAPACITY: usize = 100;

/// How long `close()` waits for the DISCONNECT to be flushed.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

/// [`Connector`] backed by a rumqttc [`AsyncClient`].
///
/// The event loop runs in its own task and owns reconnecting: after a
/// connection error it waits `reconnect_period_ms` and polls again, which makes
/// rumqttc dial the broker anew. Every successful CONNACK is announced as
/// [`ConnectionState::Connected`] on the watch channel returned by
/// [`MqttConnector::connection_state`].
pub struct MqttConnector {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    closing: Arc<AtomicBool>,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttConnector {
    /// Starts connecting in the background. Must be called inside a Tokio runtime.
    pub fn connect(config: &BrokerConfig) -> Result<Self, ConfigError> {
        let options = config.mqtt_options()?;
        info!(
            "Connecting to MQTT broker at {} as {}",
            config.endpoint,
            options.client_id()
        );

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        eventloop.set_network_options(config.network_options());

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let closing = Arc::new(AtomicBool::new(false));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_event_loop(
            eventloop,
            state_tx,
            config.reconnect_period(),
            closing.clone(),
            shutdown.clone(),
        ));
        debug!("MQTT event loop spawned");

        Ok(Self {
            client,
            state_rx,
            closing,
            shutdown,
            event_loop: Mutex::new(Some(handle)),
        })
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        // try_publish fails fast while the request queue is full (e.g. broker
        // unreachable) instead of parking one task per message
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            debug!("MQTT connection already closed");
            return Ok(());
        }
        info!("Closing MQTT connection");

        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let loop_finished = handle.as_ref().map_or(true, |h| h.is_finished());

        if !loop_finished {
            if let Err(e) = self.client.disconnect().await {
                debug!("DISCONNECT not sent, event loop already gone: {}", e);
            }
        }

        if let Some(handle) = handle {
            if tokio::time::timeout(CLOSE_GRACE, handle).await.is_err() {
                warn!(
                    "MQTT event loop did not stop within {} ms, cancelling",
                    CLOSE_GRACE.as_millis()
                );
            }
        }
        self.shutdown.cancel();

        Ok(())
    }
}

impl Drop for MqttConnector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_period: Option<Duration>,
    closing: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    info!("MQTT event loop started");
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("MQTT event loop cancelled");
                break;
            }
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!(
                        "Connected to MQTT broker (session present: {})",
                        ack.session_present
                    );
                    state_tx.send_replace(ConnectionState::Connected);
                } else {
                    warn!("{}", ConnectError::Refused(ack.code));
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) if closing.load(Ordering::SeqCst) => {
                info!("Disconnected from MQTT broker");
                break;
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    debug!("Connection ended while closing: {}", e);
                    break;
                }

                let err = ConnectError::from(e);
                match reconnect_period {
                    Some(period) => {
                        warn!("{}, reconnecting in {} ms", err, period.as_millis());
                        state_tx.send_replace(ConnectionState::Reconnecting);
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(period) => {}
                        }
                    }
                    None => {
                        error!("{}, reconnecting is disabled", err);
                        state_tx.send_replace(ConnectionState::Failed);
                        info!("MQTT event loop finished");
                        return;
                    }
                }
            }
        }
    }

    state_tx.send_replace(ConnectionState::Disconnected);
    info!("MQTT event loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_broker() -> BrokerConfig {
        BrokerConfig {
            // nothing listens on the tcpmux port
            endpoint: "mqtt://127.0.0.1:1".into(),
            client_id: Some("telemetry-test".into()),
            connect_timeout_ms: 1_000,
            reconnect_period_ms: 0,
            ..BrokerConfig::default()
        }
    }

    async fn wait_for(
        state: &mut watch::Receiver<ConnectionState>,
        wanted: ConnectionState,
    ) -> bool {
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == wanted))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn refused_connection_without_reconnect_fails() {
        let connector = MqttConnector::connect(&unreachable_broker()).unwrap();
        let mut state = connector.connection_state();

        assert!(wait_for(&mut state, ConnectionState::Failed).await);
        connector.close().await.unwrap();
    }

    #[tokio::test]
    async fn publish_after_close_is_rejected() {
        let connector = MqttConnector::connect(&unreachable_broker()).unwrap();
        connector.close().await.unwrap();

        let result = connector.publish("devices/temp-1", b"{}".to_vec()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
        // second close is a no-op
        connector.close().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_with_reconnect_keeps_retrying() {
        let config = BrokerConfig {
            reconnect_period_ms: 50,
            ..unreachable_broker()
        };
        let connector = MqttConnector::connect(&config).unwrap();
        let mut state = connector.connection_state();

        assert!(wait_for(&mut state, ConnectionState::Reconnecting).await);
        connector.close().await.unwrap();
        assert!(wait_for(&mut state, ConnectionState::Disconnected).await);
    }

    #[tokio::test]
    async fn publish_while_reconnecting_is_only_queued() {
        let config = BrokerConfig {
            reconnect_period_ms: 50,
            ..unreachable_broker()
        };
        let connector = MqttConnector::connect(&config).unwrap();
        let mut state = connector.connection_state();
        assert!(wait_for(&mut state, ConnectionState::Reconnecting).await);

        // nothing reached a broker, the request only sits in the client queue
        let result = connector.publish("devices/temp-1", b"{}".to_vec()).await;
        assert!(result.is_ok());
        connector.close().await.unwrap();
    }
}
