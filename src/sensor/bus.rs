//! I2C bus access for the sensor driver.
//!
//! The real bus is feature-gated so the crate builds and runs on machines
//! without `/dev/i2c-*`.

use crate::error::Result;

/// Raw byte transfers to a single I2C peripheral.
pub trait I2cBus: Send {
    /// Write `data`, returning how many bytes the device accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read into `buf`, returning how many bytes arrived.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }
}

#[cfg(feature = "hardware")]
mod raspberry_pi {
    use super::*;
    use crate::error::PeripheralError;
    use rppal::i2c::I2c;

    /// `/dev/i2c-<bus>` opened through rppal.
    pub struct RppalBus {
        i2c: I2c,
    }

    impl RppalBus {
        /// Open the bus and select the peripheral at `address`.
        pub fn open(bus: u8, address: u16) -> Result<Self> {
            let mut i2c = I2c::with_bus(bus).map_err(|e| {
                PeripheralError::device_error(format!(
                    "Failed to open I2C device: /dev/i2c-{}: {}",
                    bus, e
                ))
            })?;
            i2c.set_slave_address(address).map_err(|e| {
                PeripheralError::device_error(format!("Failed to set I2C address: {}", e))
            })?;
            Ok(Self { i2c })
        }
    }

    impl I2cBus for RppalBus {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            self.i2c.write(data).map_err(|e| {
                PeripheralError::device_error(format!("Failed to write measurement command: {}", e))
            })
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.i2c.read(buf).map_err(|e| {
                PeripheralError::device_error(format!("Failed to read data from sensor: {}", e))
            })
        }
    }
}

#[cfg(not(feature = "hardware"))]
mod simulated {
    use super::*;
    use crate::sensor::aht30::crc8;

    /// Stand-in bus answering every measurement with the same valid frame.
    pub struct SimulatedBus {
        frame: [u8; 7],
    }

    impl SimulatedBus {
        pub fn open(bus: u8, address: u16) -> Result<Self> {
            tracing::warn!(
                "I2C support not compiled in; simulating sensor at {:#04x} on bus {}",
                address,
                bus
            );
            // Roughly 22.5 C and 45 % RH.
            let mut frame = [0x1C, 0x73, 0x33, 0x35, 0xCC, 0xCD, 0x00];
            frame[6] = crc8(&frame[..6]);
            Ok(Self { frame })
        }
    }

    impl I2cBus for SimulatedBus {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            Ok(data.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = buf.len().min(self.frame.len());
            buf[..n].copy_from_slice(&self.frame[..n]);
            Ok(n)
        }
    }
}

// Re-export the appropriate bus
#[cfg(feature = "hardware")]
pub use raspberry_pi::RppalBus as DefaultBus;

#[cfg(not(feature = "hardware"))]
pub use simulated::SimulatedBus as DefaultBus;

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_simulated_bus_answers_full_frame() {
        let mut bus = DefaultBus::open(1, 0x38).unwrap();
        assert_eq!(bus.write(&[0xAC, 0x33, 0x00]).unwrap(), 3);

        let mut buf = [0u8; 7];
        assert_eq!(bus.read(&mut buf).unwrap(), 7);
        assert_eq!(crate::sensor::aht30::crc8(&buf[..6]), buf[6]);
    }
}
