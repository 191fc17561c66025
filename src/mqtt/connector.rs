use async_trait::async_trait;

/// Failure of a single transport operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The client could not hand the request to its event loop
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Connection already closed")]
    Closed,

    #[error("Broker rejected the request: {0}")]
    Rejected(String),
}

/// Connection could not be established or was lost.
///
/// Raised inside the connector's event loop and handled by its reconnect
/// policy; the publishing side only sees the resulting connection state.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Broker refused connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),
}

/// The capability the publishing controller consumes: submit a payload to a
/// topic and release the connection at shutdown.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Resolves once the message is accepted into the client's outgoing queue.
    ///
    /// QoS 0 has no broker acknowledgement. A message queued while the link is
    /// down is sent after reconnecting or dropped, without a second report.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}
