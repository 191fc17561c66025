use serde::{Deserialize, Serialize};

/// Lower and upper bound of a simulated temperature in °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 40.0);

/// Lower and upper bound of a simulated relative humidity in %.
pub const HUMIDITY_RANGE: (f64, f64) = (30.0, 80.0);

/// One simulated sensor sample.
///
/// Serialized as `{"time": <ms>, "temp": <number>, "hum": <number>}` with no
/// envelope. Values are rounded to two decimals on construction and clamped
/// into [`TEMPERATURE_RANGE`] / [`HUMIDITY_RANGE`]; a NaN input becomes the
/// lower bound. Deserializing goes through [`Reading::new`] as well.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(from = "WireReading")]
pub struct Reading {
    /// Milliseconds since the Unix epoch
    pub time: i64,
    #[serde(rename = "temp")]
    pub temperature: f64,
    #[serde(rename = "hum")]
    pub humidity: f64,
}

/// Unchecked shape of a received payload.
#[derive(Deserialize)]
struct WireReading {
    time: i64,
    temp: f64,
    hum: f64,
}

impl From<WireReading> for Reading {
    fn from(wire: WireReading) -> Self {
        Reading::new(wire.time, wire.temp, wire.hum)
    }
}

impl Reading {
    pub fn new(time: i64, temperature: f64, humidity: f64) -> Self {
        Self {
            time,
            temperature: bounded(temperature, TEMPERATURE_RANGE),
            humidity: bounded(humidity, HUMIDITY_RANGE),
        }
    }

    /// Encodes the reading as the UTF-8 JSON message body.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn bounded(value: f64, (min, max): (f64, f64)) -> f64 {
    // clamp() lets NaN through and serde_json would write it as null
    if value.is_nan() {
        return min;
    }
    round2(value.clamp(min, max))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
