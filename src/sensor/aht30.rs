//! AHT30 temperature and humidity sensor driver.

use crate::error::{PeripheralError, Result};
use crate::sensor::bus::I2cBus;
use crate::sensor::data::Reading;
use std::time::Duration;
use tracing::debug;

/// Factory-set I2C address.
pub const DEFAULT_ADDRESS: u16 = 0x38;

/// Trigger-measurement command.
pub const MEASURE_CMD: [u8; 3] = [0xAC, 0x33, 0x00];

/// Time the sensor needs between trigger and read-out.
pub const MEASURE_DELAY: Duration = Duration::from_millis(80);

/// Status byte, five data bytes and a CRC.
pub const RESPONSE_LEN: usize = 7;

const FULL_SCALE: f64 = 1_048_576.0; // 2^20

/// CRC-8 with polynomial 0x31 and initial value 0xFF, MSB first.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Validate and convert a raw 7-byte measurement.
pub fn decode(frame: &[u8; RESPONSE_LEN]) -> Result<Reading> {
    let busy = frame[0] & 0x80 != 0;

    let expected = crc8(&frame[..6]);
    if expected != frame[6] {
        return Err(PeripheralError::ChecksumMismatch {
            expected,
            actual: frame[6],
        });
    }

    let rh_raw = (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let t_raw =
        ((u32::from(frame[3]) & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

    Ok(Reading {
        temperature_c: f64::from(t_raw) / FULL_SCALE * 200.0 - 50.0,
        humidity_percent: f64::from(rh_raw) / FULL_SCALE * 100.0,
        busy,
    })
}

/// One AHT30 on an I2C bus.
pub struct Aht30<B> {
    bus: B,
    measure_delay: Duration,
}

impl<B: I2cBus> Aht30<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            measure_delay: MEASURE_DELAY,
        }
    }

    pub fn with_measure_delay(mut self, delay: Duration) -> Self {
        self.measure_delay = delay;
        self
    }

    /// Trigger a measurement, wait for it, read it back and verify the CRC.
    ///
    /// Checksum failures are returned as errors, never retried.
    pub async fn read(&mut self) -> Result<Reading> {
        if self.bus.write(&MEASURE_CMD)? != MEASURE_CMD.len() {
            return Err(PeripheralError::device_error(
                "Failed to write measurement command",
            ));
        }

        tokio::time::sleep(self.measure_delay).await;

        let mut frame = [0u8; RESPONSE_LEN];
        if self.bus.read(&mut frame)? != RESPONSE_LEN {
            return Err(PeripheralError::device_error(
                "Failed to read data from sensor",
            ));
        }
        debug!("AHT30 raw frame: {:02x?}", frame);

        decode(&frame)
    }
}
