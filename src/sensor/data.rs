//! Sensor measurement types.

use serde::{Deserialize, Serialize};

/// One validated sensor measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Temperature in degrees Celsius
    pub temperature_c: f64,
    /// Relative humidity (0.0 to 100.0)
    pub humidity_percent: f64,
    /// Sensor reported a measurement still in progress
    pub busy: bool,
}

impl Reading {
    /// Temperature in degrees Fahrenheit.
    pub fn temperature_f(&self) -> f64 {
        self.temperature_c * 9.0 / 5.0 + 32.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fahrenheit() {
        let reading = Reading {
            temperature_c: 25.0,
            humidity_percent: 40.0,
            busy: false,
        };
        assert_eq!(reading.temperature_f(), 77.0);
    }
}
