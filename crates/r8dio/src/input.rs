//! Rotary encoder + push-button decoding.
//!
//! ```text
//!   sampler task (every sample_period_ms)
//!     read EncoderA, EncoderB, Button ──► InputDecoder::sample ──► PanelEvent::Input
//! ```
//!
//! The decoder is pure; the task around it only does I/O and queueing.

use std::time::Duration;

use r8dio_proto::config::InputConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::core::PanelEvent;
use crate::hw::{self, HwError, Level, Line, SharedIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    RotateCw,
    RotateCcw,
    Click,
    LongPressRepeat,
    LongPressEnd,
    /// Never produced by the decoder; the signal task sends it.
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub click_samples: u32,
    pub long_press_samples: u32,
    pub steps_per_detent: i8,
}

impl From<&InputConfig> for Thresholds {
    fn from(config: &InputConfig) -> Self {
        Self {
            click_samples: config.click_samples,
            long_press_samples: config.long_press_samples.max(1),
            steps_per_detent: config.steps_per_detent.clamp(1, 16) as i8,
        }
    }
}

/// Line levels read in one sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub a: Level,
    pub b: Level,
    pub button: Level,
}

// Indexed by (previous << 2) | current. 00→01→11→10→00 counts up.
const GRAY_STEP: [i8; 16] = [
    0, 1, -1, 0, //
    -1, 0, 0, 1, //
    1, 0, 0, -1, //
    0, -1, 1, 0, //
];

pub struct InputDecoder {
    thresholds: Thresholds,
    quad: Option<u8>,
    steps: i8,
    held: Option<u32>,
}

impl InputDecoder {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            quad: None,
            steps: 0,
            held: None,
        }
    }

    /// Feed one sample; detected events are appended to `out` in the order
    /// rotation, then button.
    pub fn sample(&mut self, sample: Sample, out: &mut Vec<ButtonEvent>) {
        let state = ((sample.a.is_high() as u8) << 1) | sample.b.is_high() as u8;
        if let Some(evt) = self.rotate(state) {
            out.push(evt);
        }
        // pull-up: pressed reads low
        if let Some(evt) = self.button(sample.button == Level::Low) {
            out.push(evt);
        }
    }

    fn rotate(&mut self, state: u8) -> Option<ButtonEvent> {
        let prev = self.quad.replace(state)?;
        if prev == state {
            return None;
        }
        let step = GRAY_STEP[((prev << 2) | state) as usize];
        if step == 0 {
            // two-bit jump: missed a sample, direction unknown
            return None;
        }

        self.steps += step;
        let detent = self.thresholds.steps_per_detent;
        if self.steps >= detent {
            self.steps = 0;
            Some(ButtonEvent::RotateCw)
        } else if self.steps <= -detent {
            self.steps = 0;
            Some(ButtonEvent::RotateCcw)
        } else {
            None
        }
    }

    fn button(&mut self, pressed: bool) -> Option<ButtonEvent> {
        let long = self.thresholds.long_press_samples;
        match (self.held, pressed) {
            (None, false) => None,
            (Some(n), true) => {
                let n = n.saturating_add(1).min(long);
                self.held = Some(n);
                (n >= long).then_some(ButtonEvent::LongPressRepeat)
            }
            (None, true) => {
                self.held = Some(1);
                (long <= 1).then_some(ButtonEvent::LongPressRepeat)
            }
            (Some(n), false) => {
                self.held = None;
                if n >= long {
                    Some(ButtonEvent::LongPressEnd)
                } else if n >= self.thresholds.click_samples {
                    Some(ButtonEvent::Click)
                } else {
                    None
                }
            }
        }
    }
}

fn read_sample(io: &SharedIo) -> Result<Sample, HwError> {
    let mut io = hw::lock_io(io);
    Ok(Sample {
        a: io.read_level(Line::EncoderA)?,
        b: io.read_level(Line::EncoderB)?,
        button: io.read_level(Line::Button)?,
    })
}

/// Poll the input lines forever. Backpressure from a full queue stalls
/// sampling rather than dropping events.
pub fn spawn_sampler(
    io: SharedIo,
    config: &InputConfig,
    tx: mpsc::Sender<PanelEvent>,
) -> JoinHandle<()> {
    let thresholds = Thresholds::from(config);
    let period = Duration::from_millis(config.sample_period_ms.max(1));

    tokio::spawn(async move {
        let mut decoder = InputDecoder::new(thresholds);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events = Vec::new();
        let mut failing = false;

        loop {
            interval.tick().await;

            let sample = match read_sample(&io) {
                Ok(sample) => {
                    if failing {
                        info!("sampler: input lines readable again");
                        failing = false;
                    }
                    sample
                }
                Err(e) => {
                    if !failing {
                        warn!("sampler: read failed: {}", e);
                        failing = true;
                    }
                    continue;
                }
            };

            decoder.sample(sample, &mut events);
            for evt in events.drain(..) {
                if tx.send(PanelEvent::Input(evt)).await.is_err() {
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Level = Level::High;

    fn decoder() -> InputDecoder {
        InputDecoder::new(Thresholds::from(&InputConfig::default()))
    }

    fn quad(d: &mut InputDecoder, states: &[u8]) -> Vec<ButtonEvent> {
        let mut out = Vec::new();
        for &s in states {
            let sample = Sample {
                a: Level::from_bool(s & 0b10 != 0),
                b: Level::from_bool(s & 0b01 != 0),
                button: IDLE,
            };
            d.sample(sample, &mut out);
        }
        out
    }

    fn hold(d: &mut InputDecoder, samples: u32) -> Vec<ButtonEvent> {
        let mut out = Vec::new();
        let pressed = Sample {
            a: IDLE,
            b: IDLE,
            button: Level::Low,
        };
        let released = Sample {
            button: IDLE,
            ..pressed
        };
        for _ in 0..samples {
            d.sample(pressed, &mut out);
        }
        d.sample(released, &mut out);
        out
    }

    #[test]
    fn test_one_event_per_detent() {
        let mut d = decoder();
        // first sample only seeds the state
        let cw = quad(&mut d, &[0b00, 0b01, 0b11, 0b10, 0b00]);
        assert_eq!(cw, vec![ButtonEvent::RotateCw]);

        let ccw = quad(&mut d, &[0b10, 0b11, 0b01, 0b00]);
        assert_eq!(ccw, vec![ButtonEvent::RotateCcw]);

        let two = quad(&mut d, &[0b01, 0b11, 0b10, 0b00, 0b01, 0b11, 0b10, 0b00]);
        assert_eq!(two, vec![ButtonEvent::RotateCw, ButtonEvent::RotateCw]);
    }

    #[test]
    fn test_partial_detent_emits_nothing() {
        let mut d = decoder();
        assert!(quad(&mut d, &[0b00, 0b01, 0b11, 0b10]).is_empty());
        // bounce back
        assert!(quad(&mut d, &[0b11, 0b01, 0b00]).is_empty());
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let mut d = decoder();
        assert!(quad(&mut d, &[0b00, 0b11, 0b00, 0b11, 0b00]).is_empty());
        assert!(quad(&mut d, &[0b01, 0b10, 0b01, 0b10]).is_empty());
    }

    #[test]
    fn test_short_press_is_nothing() {
        let mut d = decoder();
        assert!(hold(&mut d, 4).is_empty());
    }

    #[test]
    fn test_click_between_thresholds() {
        for held in [5, 10, 24] {
            let mut d = decoder();
            assert_eq!(hold(&mut d, held), vec![ButtonEvent::Click], "held {}", held);
        }
    }

    #[test]
    fn test_long_press_repeats_then_ends_once() {
        let mut d = decoder();
        let out = hold(&mut d, 30);
        let repeats = out
            .iter()
            .filter(|e| **e == ButtonEvent::LongPressRepeat)
            .count();
        assert_eq!(repeats, 6);
        assert_eq!(out.last(), Some(&ButtonEvent::LongPressEnd));
        assert_eq!(
            out.iter().filter(|e| **e == ButtonEvent::LongPressEnd).count(),
            1
        );
        assert!(!out.contains(&ButtonEvent::Click));

        // next cycle starts clean
        assert_eq!(hold(&mut d, 6), vec![ButtonEvent::Click]);
    }
}
