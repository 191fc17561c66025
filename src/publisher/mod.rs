//! Publishing subsystem
//!
//! 1. [`controller`] - Session state, start/stop/cleanup and one-off publishes
//! 2. [`cycle`] - Timer-driven fan-out of one reading per topic and tick
//! 3. [`sink`] - Where the outcome of every cycle publish is reported
//!
//! # Architecture
//!
//! ```text
//! ConnectionState::Connected ──► PublishingController::start()
//!                                        │
//!                                  CycleHandle (5 s)
//!                                        │
//!                 ┌──────────────────────┼──────────────────────┐
//!                 ▼                      ▼                      ▼
//!           publish(topic 1)      publish(topic 2)   ...  publish(topic n)
//!                 │                      │                      │
//!                 └────────► PublishSink (ok / failed) ◄────────┘
//! ```
//!
//! Publish failures inside the cycle never reach the timer: each one is
//! caught in its own task and reported to the sink.

pub mod controller;
pub mod cycle;
pub mod error;
pub mod sink;

pub use controller::{PublishingController, PUBLISH_PERIOD};
pub use cycle::CycleHandle;
pub use error::{PublishError, PublisherError};
pub use sink::{ChannelSink, LoggingSink, PublishReport, PublishSink, PublishStats};
