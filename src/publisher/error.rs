use crate::config::ConfigError;
use crate::mqtt::connector::TransportError;

/// A single publish attempt failed. Scoped to one topic of one tick.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode reading for {topic}: {source}")]
    Encode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Publish to {topic} failed: {source}")]
    Transport {
        topic: String,
        #[source]
        source: TransportError,
    },
}

impl PublishError {
    pub fn topic(&self) -> &str {
        match self {
            Self::Encode { topic, .. } | Self::Transport { topic, .. } => topic,
        }
    }
}

/// Errors from constructing or driving the publishing controller.
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Publishing controller requires a Tokio runtime")]
    NoRuntime,

    #[error("Publishing controller was cleaned up; create a new one")]
    Terminated,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
