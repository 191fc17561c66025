//! Synthetic telemetry publisher
//!
//! Connects to an MQTT broker and publishes a simulated temperature/humidity
//! reading to every configured device topic every five seconds.
//!
//! - [`config`] - TOML configuration file
//! - [`mqtt`] - Broker connection (rumqttc) behind the [`mqtt::Connector`] trait
//! - [`telemetry`] - Reading type, wire format and generator
//! - [`publisher`] - The publishing controller and its recurring cycle

pub mod config;
pub mod mqtt;
pub mod publisher;
pub mod telemetry;
