use std::time::Duration;

use rand::Rng;
use rumqttc::{MqttOptions, NetworkOptions, Transport};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "wss://broker.emqx.io:8084/mqtt";

/// Connection settings handed to the MQTT connector.
///
/// Field names follow the TOML file; everything except `endpoint` is optional
/// and falls back to the defaults below.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker URL, e.g. `mqtt://localhost:1883` or `wss://host:8084/mqtt`
    pub endpoint: String,
    /// Generated as `telemetry_<8 hex chars>` when absent
    pub client_id: Option<String>,
    pub clean_session: bool,
    pub connect_timeout_ms: u64,
    pub keep_alive_sec: u64,
    /// Delay between reconnect attempts; `0` disables reconnecting
    pub reconnect_period_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client_id: None,
            clean_session: true,
            connect_timeout_ms: 30_000,
            keep_alive_sec: 60,
            reconnect_period_ms: 1_000,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "mqtt" | "tcp" => Some(Self::Tcp),
            "mqtts" | "ssl" | "tls" => Some(Self::Tls),
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            _ => None,
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Self::Tcp => 1883,
            Self::Tls => 8883,
            Self::Ws => 80,
            Self::Wss => 443,
        }
    }
}

/// Validated form of [`BrokerConfig::endpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Full URL, used as the broker address for websocket transports
    pub url: String,
}

impl BrokerEndpoint {
    pub fn parse(endpoint: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| ConfigError::Invalid(format!("endpoint '{endpoint}': {e}")))?;

        let scheme = Scheme::parse(url.scheme()).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "endpoint '{endpoint}': unsupported scheme '{}'",
                url.scheme()
            ))
        })?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "endpoint '{endpoint}': missing host"
                )))
            }
        };

        Ok(Self {
            scheme,
            port: url.port().unwrap_or_else(|| scheme.default_port()),
            host,
            url: url.to_string(),
        })
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<BrokerEndpoint, ConfigError> {
        let endpoint = BrokerEndpoint::parse(&self.endpoint)?;

        if let Some(id) = &self.client_id {
            if id.is_empty() || id.starts_with(' ') {
                return Err(ConfigError::Invalid(format!("invalid client id '{id}'")));
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        // MQTT carries keep-alive as a 16 bit field
        if self.keep_alive_sec > u64::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "keep_alive_sec must be at most {}",
                u16::MAX
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::Invalid(
                "password given without username".to_string(),
            ));
        }

        Ok(endpoint)
    }

    /// Builds the rumqttc options for this broker.
    ///
    /// Connect timeout is applied separately through [`Self::network_options`]
    /// because rumqttc keeps it on the event loop.
    pub fn mqtt_options(&self) -> Result<MqttOptions, ConfigError> {
        let endpoint = self.validate()?;
        let client_id = self.client_id.clone().unwrap_or_else(generate_client_id);

        let mut options = match endpoint.scheme {
            Scheme::Tcp => MqttOptions::new(client_id, endpoint.host, endpoint.port),
            Scheme::Tls => {
                let mut options = MqttOptions::new(client_id, endpoint.host, endpoint.port);
                options.set_transport(Transport::tls_with_default_config());
                options
            }
            Scheme::Ws => {
                let mut options = MqttOptions::new(client_id, endpoint.url, endpoint.port);
                options.set_transport(Transport::Ws);
                options
            }
            Scheme::Wss => {
                let mut options = MqttOptions::new(client_id, endpoint.url, endpoint.port);
                options.set_transport(Transport::wss_with_default_config());
                options
            }
        };

        options
            .set_clean_session(self.clean_session)
            .set_keep_alive(Duration::from_secs(self.keep_alive_sec));

        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }

        Ok(options)
    }

    pub fn network_options(&self) -> NetworkOptions {
        let mut network = NetworkOptions::new();
        // rumqttc takes whole seconds
        network.set_connection_timeout(self.connect_timeout_ms.div_ceil(1000).max(1));
        network
    }

    pub fn reconnect_period(&self) -> Option<Duration> {
        match self.reconnect_period_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

fn generate_client_id() -> String {
    format!("telemetry_{:08x}", rand::thread_rng().gen::<u32>())
}
