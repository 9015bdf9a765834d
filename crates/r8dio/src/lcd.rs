//! Two rows of eight: row 0 carries station names and scrolling titles,
//! row 1 the clock.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::charset;
use crate::hw::{DisplayBus, HwError};

pub const WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Top,
    Bottom,
}

impl Row {
    fn index(self) -> u8 {
        match self {
            Row::Top => 0,
            Row::Bottom => 1,
        }
    }
}

/// Pad or cut to exactly one row.
fn page(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.resize(WIDTH, b' ');
    bytes
}

/// Row-0 contents. Text longer than a row keeps a copy of its first eight
/// bytes appended so the window can be sliced without wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollBuffer {
    bytes: Vec<u8>,
    len: usize,
    offset: usize,
}

impl ScrollBuffer {
    pub fn new(encoded: Vec<u8>, scroll: bool) -> Self {
        let len = encoded.len();
        if scroll && len > WIDTH {
            let mut bytes = encoded;
            bytes.extend_from_within(..WIDTH);
            Self {
                bytes,
                len,
                offset: 0,
            }
        } else {
            Self {
                bytes: page(encoded),
                len: WIDTH,
                offset: 0,
            }
        }
    }

    pub fn blank() -> Self {
        Self::new(Vec::new(), false)
    }

    pub fn scrolls(&self) -> bool {
        self.len > WIDTH
    }

    #[cfg(test)]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn window(&self) -> &[u8] {
        &self.bytes[self.offset..self.offset + WIDTH]
    }

    pub fn advance(&mut self) {
        if !self.scrolls() {
            return;
        }
        self.offset += 1;
        if self.offset + WIDTH >= self.len {
            self.offset = 0;
        }
    }
}

/// Encoder + scroll state in front of the bus.
pub struct TextDisplay {
    bus: Box<dyn DisplayBus>,
    top: ScrollBuffer,
}

impl TextDisplay {
    pub fn new(bus: Box<dyn DisplayBus>) -> Self {
        Self {
            bus,
            top: ScrollBuffer::blank(),
        }
    }

    /// Encode and draw `text`. Only row 0 scrolls; row 1 shows the first
    /// eight encoded bytes.
    pub fn show(&mut self, row: Row, text: &str, scroll: bool) -> Result<(), HwError> {
        let encoded = charset::encode(text);
        match row {
            Row::Top => {
                self.top = ScrollBuffer::new(encoded, scroll);
                self.bus.write_at(0, 0, self.top.window())
            }
            Row::Bottom => self.bus.write_at(row.index(), 0, &page(encoded)),
        }
    }

    pub fn scroll_tick(&mut self) -> Result<(), HwError> {
        if !self.top.scrolls() {
            return Ok(());
        }
        self.top.advance();
        self.bus.write_at(Row::Top.index(), 0, self.top.window())
    }

    pub fn power_off(&mut self) -> Result<(), HwError> {
        self.top = ScrollBuffer::blank();
        self.bus.set_enabled(false)
    }
}

pub type SharedDisplay = Arc<Mutex<TextDisplay>>;

pub fn lock(display: &SharedDisplay) -> MutexGuard<'_, TextDisplay> {
    display.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
