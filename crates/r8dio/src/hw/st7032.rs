//! ST7032 (AQM0802A) 8x2 character controller on I²C.
//!
//! Every transfer is a control byte followed by payload: `0x00` for an
//! instruction, `0x40` for DDRAM data.

use std::time::Duration;

use embedded_hal::i2c::{Error as _, I2c};

use super::{DisplayBus, HwError};

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

const SET_DDRAM_ADDRESS: u8 = 0x80;
const ROW_STRIDE: u8 = 0x40;
const DISPLAY_ON: u8 = 0x0c;
const DISPLAY_OFF: u8 = 0x08;

/// Function set (normal/extended), internal OSC, contrast, power/icon,
/// follower, display on, clear.
const INIT_SEQUENCE: [u8; 8] = [0x38, 0x39, 0x14, 0x70, 0x56, 0x6c, 0x0c, 0x01];
const FOLLOWER_CONTROL: u8 = 0x6c;

const COLUMNS: u8 = 8;
const ROWS: u8 = 2;

pub struct St7032<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> St7032<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Run the power-on sequence. The follower circuit needs ~200 ms to
    /// stabilise; other instructions take under 30 µs.
    pub fn init(&mut self) -> Result<(), HwError> {
        std::thread::sleep(Duration::from_millis(50));
        for cmd in INIT_SEQUENCE {
            self.command(cmd)?;
            if cmd == FOLLOWER_CONTROL {
                std::thread::sleep(Duration::from_millis(300));
            } else {
                std::thread::sleep(Duration::from_micros(30));
            }
        }
        // clear display takes 1.08 ms
        std::thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    fn command(&mut self, cmd: u8) -> Result<(), HwError> {
        self.transfer(&[CONTROL_COMMAND, cmd])
    }

    fn transfer(&mut self, bytes: &[u8]) -> Result<(), HwError> {
        self.i2c
            .write(self.address, bytes)
            .map_err(|e| HwError::Bus(format!("i2c write to {:#04x}: {:?}", self.address, e.kind())))
    }
}

impl<I2C: I2c + Send> DisplayBus for St7032<I2C> {
    fn write_at(&mut self, row: u8, col: u8, bytes: &[u8]) -> Result<(), HwError> {
        if row >= ROWS || col >= COLUMNS {
            return Err(HwError::Position { row, col });
        }
        self.command(SET_DDRAM_ADDRESS + row * ROW_STRIDE + col)?;
        std::thread::sleep(Duration::from_micros(30));

        let visible = bytes.len().min((COLUMNS - col) as usize);
        let mut frame = Vec::with_capacity(visible + 1);
        frame.push(CONTROL_DATA);
        frame.extend_from_slice(&bytes[..visible]);
        self.transfer(&frame)
    }

    fn set_enabled(&mut self, on: bool) -> Result<(), HwError> {
        self.command(if on { DISPLAY_ON } else { DISPLAY_OFF })
    }
}
