//! Simulated sensor data
//!
//! [`reading`] defines the value published on every tick and its wire format,
//! [`generator`] produces fresh readings for the publish cycle.

pub mod generator;
pub mod reading;

pub use generator::{RandomReadings, ReadingSource};
pub use reading::Reading;
