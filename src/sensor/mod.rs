//! AHT30 temperature/humidity sensor access.
//!
//! A single [`Sensor`] owns the bus for the lifetime of the daemon. The
//! device is not reentrant, so every measurement holds the sensor lock from
//! trigger to read-out and concurrent callers queue behind it.

pub mod aht30;
pub mod bus;
pub mod data;

// Re-export commonly used items
pub use aht30::Aht30;
pub use bus::{DefaultBus, I2cBus};
pub use data::Reading;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Location and timing of the sensor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorConfig {
    /// I2C bus number (`/dev/i2c-<bus>`)
    pub bus: u8,
    /// 7-bit peripheral address
    pub address: u16,
    /// Wait between trigger and read-out in milliseconds
    pub measure_delay_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            address: aht30::DEFAULT_ADDRESS,
            measure_delay_ms: aht30::MEASURE_DELAY.as_millis() as u64,
        }
    }
}

impl SensorConfig {
    pub fn new(bus: u8, address: u16) -> Self {
        Self {
            bus,
            address,
            ..Default::default()
        }
    }
}

/// Shared, serialized handle to the sensor.
pub struct Sensor {
    device: Mutex<Aht30<Box<dyn I2cBus>>>,
}

impl Sensor {
    /// Open the configured bus. Failure here is meant to abort startup.
    pub fn open(config: &SensorConfig) -> Result<Self> {
        let bus = DefaultBus::open(config.bus, config.address)?;
        info!(
            "AHT30 opened on /dev/i2c-{} at {:#04x}",
            config.bus, config.address
        );
        Ok(Self::with_bus(Box::new(bus), config))
    }

    /// Build a sensor over an already opened bus.
    pub fn with_bus(bus: Box<dyn I2cBus>, config: &SensorConfig) -> Self {
        let device = Aht30::new(bus).with_measure_delay(Duration::from_millis(config.measure_delay_ms));
        Self {
            device: Mutex::new(device),
        }
    }

    /// Take one measurement, waiting for any in-flight one to finish first.
    pub async fn read(&self) -> Result<Reading> {
        let mut device = self.device.lock().await;
        device.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::aht30::crc8;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts overlapping transactions.
    struct OverlapBus {
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
    }

    impl I2cBus for OverlapBus {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            Ok(data.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let data = [0x1C, 0x80, 0x00, 0x05, 0x00, 0x00];
            buf[..6].copy_from_slice(&data);
            buf[6] = crc8(&data);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(7)
        }
    }

    #[tokio::test]
    async fn test_concurrent_reads_are_serialized() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let bus = OverlapBus {
            active: active.clone(),
            max_active: max_active.clone(),
        };
        let config = SensorConfig {
            measure_delay_ms: 5,
            ..Default::default()
        };
        let sensor = Arc::new(Sensor::with_bus(Box::new(bus), &config));

        let reads = (0..4).map(|_| {
            let sensor = sensor.clone();
            tokio::spawn(async move { sensor.read().await })
        });
        for handle in reads.collect::<Vec<_>>() {
            assert_eq!(handle.await.unwrap().unwrap().humidity_percent, 50.0);
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_config() {
        let config = SensorConfig::default();
        assert_eq!(config.bus, 1);
        assert_eq!(config.address, 0x38);
        assert_eq!(config.measure_delay_ms, 80);
    }
}
