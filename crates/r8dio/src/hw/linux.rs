//! Raspberry Pi backend: GPIO character device lines and `/dev/i2c-*`.
//!
//! Input pull-ups are not requested here; the v1 line ABI has no bias
//! flags, so they come from the board's device-tree overlay.

use std::collections::HashMap;
use std::path::Path;

use embedded_hal::digital::{InputPin, OutputPin};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::{CdevPin, I2cdev};
use r8dio_proto::config::GpioConfig;
use tracing::debug;

use super::{DigitalIo, Direction, HwError, Level, Line};

const CONSUMER: &str = "r8dio";

pub struct CdevIo {
    chip: Chip,
    gpio: GpioConfig,
    pins: HashMap<Line, CdevPin>,
}

impl CdevIo {
    pub fn open(chip: &Path, gpio: GpioConfig) -> Result<Self, HwError> {
        let chip = Chip::new(chip)
            .map_err(|e| HwError::Unavailable(format!("{}: {}", chip.display(), e)))?;
        Ok(Self {
            chip,
            gpio,
            pins: HashMap::new(),
        })
    }

    fn pin(&mut self, line: Line) -> Result<&mut CdevPin, HwError> {
        self.pins
            .get_mut(&line)
            .ok_or(HwError::LineNotConfigured(line))
    }
}

impl DigitalIo for CdevIo {
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), HwError> {
        let offset = line.offset(&self.gpio);
        let (flags, initial) = match direction {
            Direction::Input => (LineRequestFlags::INPUT, 0),
            Direction::Output(level) => (LineRequestFlags::OUTPUT, level.is_high() as u8),
        };

        // re-requesting a held line fails, so drop any previous handle first
        self.pins.remove(&line);
        let handle = self
            .chip
            .get_line(offset)
            .and_then(|l| l.request(flags, initial, CONSUMER))
            .map_err(|e| HwError::Gpio(format!("{:?} (line {}): {}", line, offset, e)))?;
        let pin = CdevPin::new(handle)
            .map_err(|e| HwError::Gpio(format!("{:?} (line {}): {:?}", line, offset, e)))?;

        debug!("gpio: {:?} on line {} as {:?}", line, offset, direction);
        self.pins.insert(line, pin);
        Ok(())
    }

    fn read_level(&mut self, line: Line) -> Result<Level, HwError> {
        let high = self
            .pin(line)?
            .is_high()
            .map_err(|e| HwError::Gpio(format!("read {:?}: {:?}", line, e)))?;
        Ok(Level::from_bool(high))
    }

    fn write_level(&mut self, line: Line, level: Level) -> Result<(), HwError> {
        let pin = self.pin(line)?;
        let result = match level {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        };
        result.map_err(|e| HwError::Gpio(format!("write {:?}: {:?}", line, e)))
    }
}

pub fn open_i2c(bus: &Path) -> Result<I2cdev, HwError> {
    I2cdev::new(bus).map_err(|e| HwError::Bus(format!("{}: {}", bus.display(), e)))
}
