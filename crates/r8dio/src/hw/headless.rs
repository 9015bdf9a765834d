//! Board stand-in for development machines. Outputs are remembered and
//! logged, inputs read their pulled-up idle level.

use std::collections::HashMap;

use tracing::debug;

use super::{DigitalIo, Direction, DisplayBus, HwError, Level, Line};

#[derive(Debug, Default)]
pub struct HeadlessIo {
    levels: HashMap<Line, Level>,
}

impl HeadlessIo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DigitalIo for HeadlessIo {
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), HwError> {
        let level = match direction {
            Direction::Input => Level::High,
            Direction::Output(level) => level,
        };
        self.levels.insert(line, level);
        Ok(())
    }

    fn read_level(&mut self, line: Line) -> Result<Level, HwError> {
        self.levels
            .get(&line)
            .copied()
            .ok_or(HwError::LineNotConfigured(line))
    }

    fn write_level(&mut self, line: Line, level: Level) -> Result<(), HwError> {
        match self.levels.get_mut(&line) {
            Some(current) => {
                if *current != level {
                    debug!("gpio: {:?} -> {:?}", line, level);
                }
                *current = level;
                Ok(())
            }
            None => Err(HwError::LineNotConfigured(line)),
        }
    }
}

/// Keeps a copy of the two rows so the log shows whole lines.
#[derive(Debug)]
pub struct HeadlessDisplay {
    rows: [[u8; 8]; 2],
    enabled: bool,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self {
            rows: [[b' '; 8]; 2],
            enabled: true,
        }
    }

    #[cfg(test)]
    pub fn row(&self, row: usize) -> &[u8; 8] {
        &self.rows[row]
    }
}

impl Default for HeadlessDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayBus for HeadlessDisplay {
    fn write_at(&mut self, row: u8, col: u8, bytes: &[u8]) -> Result<(), HwError> {
        if row > 1 || col > 7 {
            return Err(HwError::Position { row, col });
        }
        let target = &mut self.rows[row as usize][col as usize..];
        let n = bytes.len().min(target.len());
        target[..n].copy_from_slice(&bytes[..n]);
        debug!(
            "lcd[{}]: |{}|",
            row,
            String::from_utf8_lossy(&self.rows[row as usize])
        );
        Ok(())
    }

    fn set_enabled(&mut self, on: bool) -> Result<(), HwError> {
        self.enabled = on;
        debug!("lcd: display {}", if on { "on" } else { "off" });
        Ok(())
    }
}
