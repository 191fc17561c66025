use rand::Rng;

use super::reading::{Reading, HUMIDITY_RANGE, TEMPERATURE_RANGE};

/// Produces one fresh [`Reading`] per call.
///
/// Called from the publish cycle once per topic and tick, so implementations
/// must be cheap and must not block.
pub trait ReadingSource: Send + Sync {
    fn next_reading(&self) -> Reading;
}

/// Uniformly distributed temperature and humidity stamped with the wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomReadings;

impl ReadingSource for RandomReadings {
    fn next_reading(&self) -> Reading {
        let mut rng = rand::thread_rng();
        let temperature = rng.gen_range(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1);
        let humidity = rng.gen_range(HUMIDITY_RANGE.0..=HUMIDITY_RANGE.1);

        Reading::new(chrono::Utc::now().timestamp_millis(), temperature, humidity)
    }
}
