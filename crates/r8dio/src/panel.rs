//! Front-panel state machine.
//!
//! One knob, one button, five modes. Each mode is a [`ModeHandler`]; the
//! handlers mutate [`ApplianceState`] and push [`Action`]s, which the core
//! loop performs. Nothing in here does I/O; time comes in as an argument.
//!
//! ```text
//!   mode            click                 long-press end   rotate
//!   RadioOff        → VolumeControl       power off        -
//!   VolumeControl   → StationTuning       → RadioOff       volume
//!   StationTuning   → FunctionSelect      → VolumeControl  station
//!   FunctionSelect  cycle A/S flags       → VolumeControl  -
//!   AlarmTimeSet    hour → minute → back  -                alarm time
//! ```

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use r8dio_proto::config::ClockConfig;
use r8dio_proto::protocol::{VOLUME_MAX, VOLUME_MIN};
use r8dio_proto::stations::Station;
use tracing::{debug, info};

use crate::action::Action;
use crate::input::ButtonEvent;
use crate::lcd::Row;

const WEEKDAYS: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    RadioOff,
    VolumeControl,
    StationTuning,
    FunctionSelect,
    AlarmTimeSet,
}

impl Mode {
    fn handler(self) -> &'static dyn ModeHandler {
        match self {
            Mode::RadioOff => &RadioOffMode,
            Mode::VolumeControl => &VolumeMode,
            Mode::StationTuning => &TuningMode,
            Mode::FunctionSelect => &FunctionMode,
            Mode::AlarmTimeSet => &AlarmSetMode,
        }
    }
}

/// Alarm/sleep bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockFlags(u8);

impl ClockFlags {
    pub const NONE: Self = Self(0);
    pub const ALARM: Self = Self(0b01);
    pub const SLEEP: Self = Self(0b10);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// none → alarm → sleep → both → none
    fn cycle(self) -> Self {
        Self((self.0 + 1) & 0b11)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmField {
    Hour,
    Minute,
}

#[derive(Debug, Clone)]
pub struct ApplianceState {
    pub mode: Mode,
    pub volume: u8,
    pub station_index: usize,
    pub clock_flags: ClockFlags,
    pub alarm_time: NaiveTime,
    pub sleep_deadline: NaiveTime,
    pub alarm_field: AlarmField,
    pub radio_enabled: bool,
    /// Station last handed to mpv.
    pub tuned_index: Option<usize>,
    /// Colon blink phase.
    pub colon: bool,
}

impl ApplianceState {
    fn new(alarm_time: NaiveTime) -> Self {
        Self {
            mode: Mode::RadioOff,
            volume: VOLUME_MAX / 2,
            station_index: 0,
            clock_flags: ClockFlags::NONE,
            alarm_time,
            sleep_deadline: NaiveTime::default(),
            alarm_field: AlarmField::Hour,
            radio_enabled: false,
            tuned_index: None,
            colon: false,
        }
    }

    /// Row 1: `[A| ][S| ] HH:MM`. While the alarm is being edited it shows
    /// the alarm time with the field under edit blinking.
    pub fn clock_row(&self, now: NaiveTime) -> String {
        let alarm = if self.clock_flags.contains(ClockFlags::ALARM) {
            'A'
        } else {
            ' '
        };
        let sleep = if self.clock_flags.contains(ClockFlags::SLEEP) {
            'S'
        } else {
            ' '
        };

        let time = if self.mode == Mode::AlarmTimeSet {
            let (h, m) = (self.alarm_time.hour(), self.alarm_time.minute());
            match (self.colon, self.alarm_field) {
                (true, AlarmField::Hour) => format!("   :{:02}", m),
                (true, AlarmField::Minute) => format!(" {:02}:  ", h),
                (false, _) => format!(" {:02}:{:02}", h, m),
            }
        } else {
            let sep = if self.colon { ':' } else { ' ' };
            format!(" {:02}{}{:02}", now.hour(), sep, now.minute())
        };

        format!("{}{}{}", alarm, sleep, time)
    }

    /// Row 0 while the radio is off: `MM-DD Wd`.
    pub fn date_row(now: NaiveDateTime) -> String {
        let weekday = WEEKDAYS[now.weekday().num_days_from_sunday() as usize];
        format!("{:02}-{:02} {}", now.month(), now.day(), weekday)
    }

    fn playing(&self) -> bool {
        self.radio_enabled && self.tuned_index == Some(self.station_index)
    }
}

fn same_minute(a: NaiveTime, b: NaiveTime) -> bool {
    a.hour() == b.hour() && a.minute() == b.minute()
}

// ── ModeHandler ───────────────────────────────────────────────────────────────

/// Per-mode reactions. Defaults ignore the input.
trait ModeHandler {
    fn on_click(&self, _panel: &mut Panel, _now: NaiveDateTime, _out: &mut Vec<Action>) {}
    fn on_rotate_cw(&self, _panel: &mut Panel, _now: NaiveDateTime, _out: &mut Vec<Action>) {}
    fn on_rotate_ccw(&self, _panel: &mut Panel, _now: NaiveDateTime, _out: &mut Vec<Action>) {}
    fn on_long_press_end(&self, _panel: &mut Panel, _now: NaiveDateTime, _out: &mut Vec<Action>) {}
    fn on_enter(&self, panel: &mut Panel, out: &mut Vec<Action>);
    fn on_exit(&self, _panel: &mut Panel, _out: &mut Vec<Action>) {}
}

struct RadioOffMode;
struct VolumeMode;
struct TuningMode;
struct FunctionMode;
struct AlarmSetMode;

impl ModeHandler for RadioOffMode {
    fn on_click(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.transition(Mode::VolumeControl, out);
    }

    fn on_long_press_end(&self, _panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        out.push(Action::PowerOff);
    }

    fn on_enter(&self, panel: &mut Panel, out: &mut Vec<Action>) {
        panel.state.radio_enabled = false;
        out.push(Action::leds_off());
        out.push(Action::StopPlayback);
        out.push(Action::Show {
            row: Row::Top,
            text: String::new(),
            scroll: false,
        });
        out.push(Action::Amplifier(false));
    }
}

impl ModeHandler for VolumeMode {
    fn on_click(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.transition(Mode::StationTuning, out);
    }

    fn on_rotate_cw(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        let state = &mut panel.state;
        state.volume = state.volume.saturating_add(1).min(VOLUME_MAX);
        out.push(Action::SetVolume(state.volume));
    }

    fn on_rotate_ccw(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        if panel.state.volume > VOLUME_MIN {
            panel.state.volume -= 1;
            out.push(Action::SetVolume(panel.state.volume));
        } else if panel.state.radio_enabled {
            // turning further down at the floor switches the radio off
            panel.transition(Mode::RadioOff, out);
        }
    }

    fn on_long_press_end(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.transition(Mode::RadioOff, out);
    }

    fn on_enter(&self, panel: &mut Panel, out: &mut Vec<Action>) {
        out.push(Action::Leds {
            green: true,
            red: false,
        });
        if !panel.state.playing() {
            out.push(Action::Tune(panel.state.station_index));
        }
    }

    fn on_exit(&self, _panel: &mut Panel, out: &mut Vec<Action>) {
        out.push(Action::leds_off());
    }
}

impl ModeHandler for TuningMode {
    fn on_click(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.transition(Mode::FunctionSelect, out);
    }

    fn on_rotate_cw(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        let count = panel.stations.len();
        panel.state.station_index = (panel.state.station_index + 1) % count;
        out.push(panel.station_name_action());
    }

    fn on_rotate_ccw(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        let count = panel.stations.len();
        panel.state.station_index = (panel.state.station_index + count - 1) % count;
        out.push(panel.station_name_action());
    }

    fn on_long_press_end(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.transition(Mode::VolumeControl, out);
    }

    fn on_enter(&self, panel: &mut Panel, out: &mut Vec<Action>) {
        out.push(Action::Leds {
            green: false,
            red: true,
        });
        out.push(panel.station_name_action());
    }

    fn on_exit(&self, _panel: &mut Panel, out: &mut Vec<Action>) {
        out.push(Action::leds_off());
    }
}

impl ModeHandler for FunctionMode {
    fn on_click(&self, panel: &mut Panel, now: NaiveDateTime, out: &mut Vec<Action>) {
        let flags = panel.state.clock_flags.cycle();
        panel.state.clock_flags = flags;
        if flags.contains(ClockFlags::SLEEP) {
            panel.state.sleep_deadline = now.time() + panel.sleep_after;
        }
        debug!("panel: clock flags {:?}", flags);

        if flags.is_empty() {
            panel.transition(Mode::AlarmTimeSet, out);
        } else {
            out.push(Action::RedrawClock);
        }
    }

    fn on_long_press_end(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.transition(Mode::VolumeControl, out);
    }

    fn on_enter(&self, _panel: &mut Panel, out: &mut Vec<Action>) {
        out.push(Action::Leds {
            green: true,
            red: true,
        });
        out.push(Action::RedrawClock);
    }

    fn on_exit(&self, _panel: &mut Panel, out: &mut Vec<Action>) {
        out.push(Action::leds_off());
    }
}

impl ModeHandler for AlarmSetMode {
    fn on_click(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        match panel.state.alarm_field {
            AlarmField::Hour => {
                panel.state.alarm_field = AlarmField::Minute;
                out.push(Action::RedrawClock);
            }
            AlarmField::Minute => panel.transition(Mode::FunctionSelect, out),
        }
    }

    fn on_rotate_cw(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.state.alarm_time += panel.alarm_step();
        out.push(Action::RedrawClock);
    }

    fn on_rotate_ccw(&self, panel: &mut Panel, _now: NaiveDateTime, out: &mut Vec<Action>) {
        panel.state.alarm_time -= panel.alarm_step();
        out.push(Action::RedrawClock);
    }

    fn on_enter(&self, panel: &mut Panel, out: &mut Vec<Action>) {
        panel.state.alarm_field = AlarmField::Hour;
        out.push(Action::Leds {
            green: true,
            red: true,
        });
        out.push(Action::RedrawClock);
    }
}

// ── Panel ─────────────────────────────────────────────────────────────────────

pub struct Panel {
    state: ApplianceState,
    stations: Vec<Station>,
    sleep_after: Duration,
}

impl Panel {
    pub fn new(stations: Vec<Station>, clock: &ClockConfig) -> anyhow::Result<Self> {
        if stations.is_empty() {
            anyhow::bail!("panel needs at least one station");
        }
        Ok(Self {
            state: ApplianceState::new(clock.alarm),
            stations,
            sleep_after: Duration::minutes(i64::from(clock.sleep_minutes)),
        })
    }

    pub fn state(&self) -> &ApplianceState {
        &self.state
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn current_station(&self) -> &Station {
        &self.stations[self.state.station_index]
    }

    /// Run the initial mode's entry hook.
    pub fn start(&mut self) -> Vec<Action> {
        let mut out = Vec::new();
        let mode = self.state.mode;
        info!("panel: starting in {:?}", mode);
        mode.handler().on_enter(self, &mut out);
        out
    }

    pub fn handle_input(&mut self, evt: ButtonEvent, now: NaiveDateTime) -> Vec<Action> {
        let mut out = Vec::new();
        let handler = self.state.mode.handler();
        match evt {
            ButtonEvent::Click => handler.on_click(self, now, &mut out),
            ButtonEvent::RotateCw => handler.on_rotate_cw(self, now, &mut out),
            ButtonEvent::RotateCcw => handler.on_rotate_ccw(self, now, &mut out),
            ButtonEvent::LongPressEnd => handler.on_long_press_end(self, now, &mut out),
            // repeats only matter to the backlight; shutdown belongs to the core
            ButtonEvent::LongPressRepeat | ButtonEvent::Shutdown => {}
        }
        out
    }

    /// Periodic tick: flip the colon, redraw, then fire alarm/sleep at most
    /// once per matching minute.
    pub fn handle_tick(&mut self, now: NaiveDateTime) -> Vec<Action> {
        let mut out = Vec::new();
        self.state.colon = !self.state.colon;
        out.push(Action::RedrawClock);

        if self.state.mode == Mode::AlarmTimeSet {
            return out;
        }

        let time = now.time();
        if self.state.clock_flags.contains(ClockFlags::ALARM)
            && same_minute(self.state.alarm_time, time)
        {
            info!("panel: alarm at {}", self.state.alarm_time.format("%H:%M"));
            self.state.clock_flags.remove(ClockFlags::ALARM);
            self.transition(Mode::VolumeControl, &mut out);
        }
        if self.state.clock_flags.contains(ClockFlags::SLEEP)
            && same_minute(self.state.sleep_deadline, time)
        {
            info!("panel: sleep timer expired");
            self.state.clock_flags.remove(ClockFlags::SLEEP);
            self.transition(Mode::RadioOff, &mut out);
        }
        out
    }

    /// Stream title from mpv. Ignored while the radio is off.
    pub fn handle_title(&self, title: &str) -> Vec<Action> {
        if !self.state.radio_enabled {
            return Vec::new();
        }
        let name = &self.current_station().name;
        let text = if title.is_empty() {
            name.clone()
        } else {
            format!("{}  {}  ", name, title)
        };
        vec![Action::Show {
            row: Row::Top,
            text,
            scroll: true,
        }]
    }

    /// The core reports a successful tune.
    pub fn mark_tuned(&mut self, index: usize) {
        self.state.radio_enabled = true;
        self.state.tuned_index = Some(index);
    }

    /// mpv was restarted underneath us; whatever it was playing is gone.
    pub fn media_restarted(&mut self) -> Vec<Action> {
        self.state.tuned_index = None;
        if self.state.radio_enabled {
            vec![Action::Tune(self.state.station_index)]
        } else {
            Vec::new()
        }
    }

    fn transition(&mut self, to: Mode, out: &mut Vec<Action>) {
        let from = self.state.mode;
        info!("panel: {:?} → {:?}", from, to);
        from.handler().on_exit(self, out);
        self.state.mode = to;
        to.handler().on_enter(self, out);
    }

    fn station_name_action(&self) -> Action {
        Action::Show {
            row: Row::Top,
            text: self.current_station().name.clone(),
            scroll: false,
        }
    }

    fn alarm_step(&self) -> Duration {
        match self.state.alarm_field {
            AlarmField::Hour => Duration::hours(1),
            AlarmField::Minute => Duration::minutes(1),
        }
    }
}
