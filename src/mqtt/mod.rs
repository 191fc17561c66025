//! # MQTT Transport
//!
//! The broker side of the publisher. The publishing controller only depends on
//! the [`Connector`] trait; everything rumqttc-specific stays in this module.
//!
//! ```text
//! mqtt/
//! ├── config.rs        - Broker settings, endpoint parsing, rumqttc options
//! ├── connector.rs     - Connector trait and transport error types
//! └── mqtt_handler.rs  - rumqttc client, event loop and connection state
//! ```
//!
//! ## Connection lifecycle
//!
//! [`MqttConnector::connect`] returns immediately and dials the broker from a
//! background event loop. Each successful CONNACK (the first one and every one
//! after a reconnect) flips the watch channel from
//! [`MqttConnector::connection_state`] to [`ConnectionState::Connected`]. The
//! host process wires that signal to the controller's `start()`.

pub mod config;
pub mod connector;
pub mod mqtt_handler;

pub use config::{BrokerConfig, BrokerEndpoint, Scheme};
pub use connector::{ConnectError, Connector, TransportError};
pub use mqtt_handler::{ConnectionState, MqttConnector};
