//! Simulated sensor readings.

use std::ops::Range;

use lib_telemetry::{Reading, Recipient, SensorType};
use rand::Rng;
use rand::seq::IndexedRandom;

/// Plausible value range for each sensor type.
pub fn value_range(sensor_type: SensorType) -> Range<f64> {
    match sensor_type {
        SensorType::Temperature => 15.0..40.0,
        SensorType::Pressure => 740.0..780.0,
        SensorType::Humidity => 30.0..90.0,
    }
}

/// A random reading for a random recipient, or `None` without recipients.
pub fn random_reading<R: Rng + ?Sized>(rng: &mut R, recipients: &[Recipient], captured_at: i64) -> Option<Reading> {
    let recipient = recipients.choose(rng)?.clone();
    let sensor_type = *SensorType::ALL.choose(rng)?;
    let raw = rng.random_range(value_range(sensor_type));
    let value = (raw * 100.0).round() / 100.0;
    let sequence: u32 = rng.random_range(0..100);

    Some(Reading::new(sensor_type, value, captured_at, recipient).with_id(format!("{}-{}", sensor_type, sequence)))
}
