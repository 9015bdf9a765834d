use crate::lcd::Row;

/// Effects requested by the panel state machine. The core loop performs
/// them in order; the state machine itself never touches hardware or mpv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Active-high request; the core inverts for the active-low LEDs.
    Leds { green: bool, red: bool },
    Amplifier(bool),
    Show { row: Row, text: String, scroll: bool },
    /// Re-render row 1 (and the date on row 0 while the radio is off).
    RedrawClock,
    /// Resolve and play the station at this index.
    Tune(usize),
    StopPlayback,
    /// Linear level, mapped through the volume curve by the media client.
    SetVolume(u8),
    PowerOff,
}

impl Action {
    pub fn leds_off() -> Self {
        Action::Leds {
            green: false,
            red: false,
        }
    }
}
