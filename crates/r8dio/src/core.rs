//! PanelCore: single-owner event loop for the appliance.
//!
//! Every task talks to the loop through one bounded `mpsc` queue of
//! [`PanelEvent`]s: the input sampler, the ticker, the mpv reader and the
//! signal listener. PanelCore owns the [`Panel`] state machine and the
//! [`MediaClient`] exclusively and is the only writer of LEDs, amplifier and
//! backlight. The display is shared with the ticker behind one mutex.
//!
//! Work that waits on an outside process (plugin resolution, reconnecting to
//! mpv) runs in its own task and reports back as `Resolved` /
//! `MediaReconnected`, so input keeps flowing meanwhile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Local, NaiveDateTime, Utc};
use r8dio_proto::config::{ClockConfig, Config};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::hw::{self, Level, Line, SharedIo};
use crate::input::ButtonEvent;
use crate::lcd::{self, Row, SharedDisplay};
use crate::mpv::{self, MediaClient, MediaError, Reconnect};
use crate::panel::{ApplianceState, Mode, Panel};
use crate::plugin::{PluginResolver, ResolveError};

/// Shown on row 0 when mpv cannot be reached again at runtime.
pub const SOCKET_ERROR: &str = "ｿｹｯﾄｴﾗｰ";

// ── PanelEvent ────────────────────────────────────────────────────────────────

/// All inputs into the PanelCore loop.
#[derive(Debug)]
pub enum PanelEvent {
    /// Decoded knob/button input, or `Shutdown` from the signal task.
    Input(ButtonEvent),
    /// Colon blink / clock scan.
    Tick,
    /// Filtered text from the mpv reader.
    MediaTitle(String),
    /// The mpv reader hit EOF or a read error.
    MediaLost,
    /// A `plugin:` station finished resolving. Results whose `seq` is no
    /// longer current are dropped.
    Resolved {
        seq: u64,
        index: usize,
        url: Result<String, ResolveError>,
    },
    /// A background reconnect to mpv finished.
    MediaReconnected(Result<UnixStream, MediaError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

// ── WallClock ─────────────────────────────────────────────────────────────────

/// Local time, or a fixed offset for boards without a timezone database.
pub struct WallClock {
    offset: Option<FixedOffset>,
}

impl WallClock {
    pub fn new(config: &ClockConfig) -> Self {
        let offset = config.utc_offset_minutes.and_then(|minutes| {
            let offset = FixedOffset::east_opt(minutes.saturating_mul(60));
            if offset.is_none() {
                warn!("clock: ignoring out-of-range utc offset {} min", minutes);
            }
            offset
        });
        Self { offset }
    }

    pub fn now(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

// ── PanelCore ─────────────────────────────────────────────────────────────────

pub struct PanelCore {
    config: Config,
    panel: Panel,
    display: SharedDisplay,
    io: SharedIo,
    media: MediaClient,
    resolver: PluginResolver,
    clock: WallClock,
    /// Handed to the mpv reader on reconnect.
    event_tx: mpsc::Sender<PanelEvent>,
    backlight_timeout: Duration,
    /// `Some` while the backlight is lit.
    backlight_until: Option<Instant>,
    /// Display writes failing; logged once per streak.
    display_failing: bool,
    /// Bumped by every tune and stop; a resolve result must match it.
    tune_seq: u64,
    /// `Some` while a reconnect task is running.
    reconnect: Option<Reconnect>,
    /// Read by the media client's stop override.
    stop_suppressed: Arc<AtomicBool>,
    shutdown_done: bool,
}

impl PanelCore {
    pub fn new(
        config: Config,
        panel: Panel,
        display: SharedDisplay,
        io: SharedIo,
        mut media: MediaClient,
        event_tx: mpsc::Sender<PanelEvent>,
    ) -> Self {
        // no socket to stop on while a reconnect is in flight; the stop is
        // replayed once it lands
        let stop_suppressed = Arc::new(AtomicBool::new(false));
        let flag = stop_suppressed.clone();
        media.set_stop_override(Box::new(move || flag.load(Ordering::Relaxed)));

        Self {
            resolver: PluginResolver::new(&config.plugins),
            clock: WallClock::new(&config.clock),
            backlight_timeout: Duration::from_secs(config.display.backlight_timeout_secs),
            config,
            panel,
            display,
            io,
            media,
            event_tx,
            backlight_until: None,
            display_failing: false,
            tune_seq: 0,
            reconnect: None,
            stop_suppressed,
            shutdown_done: false,
        }
    }

    /// Run until shutdown (signal, power-off, or every sender gone), then
    /// release mpv and the hardware.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PanelEvent>) -> anyhow::Result<()> {
        info!("PanelCore: starting event loop");

        let period = Duration::from_millis(self.config.display.tick_ms.max(1));
        let ticker = spawn_ticker(self.display.clone(), period, self.event_tx.clone());

        if let Err(e) = self.media.observe_title().await {
            self.media_failed("observe icy-title", e);
        }
        let volume = self.panel.state().volume;
        if let Err(e) = self.media.set_volume(volume).await {
            self.media_failed("initial volume", e);
        }

        self.wake_backlight();
        let actions = self.panel.start();
        let mut flow = self.perform_all(actions).await;

        while flow == Flow::Continue {
            let Some(evt) = event_rx.recv().await else {
                info!("PanelCore: event channel closed, shutting down");
                break;
            };
            flow = self.handle_event(evt).await;
        }

        ticker.abort();
        self.shutdown().await;
        Ok(())
    }

    async fn handle_event(&mut self, evt: PanelEvent) -> Flow {
        match evt {
            PanelEvent::Input(ButtonEvent::Shutdown) => {
                info!("PanelCore: shutdown requested");
                Flow::Exit
            }
            PanelEvent::Input(input) => {
                debug!("PanelCore: input {:?}", input);
                self.wake_backlight();
                let actions = self.panel.handle_input(input, self.clock.now());
                self.perform_all(actions).await
            }
            PanelEvent::Tick => {
                self.check_backlight();
                let actions = self.panel.handle_tick(self.clock.now());
                self.perform_all(actions).await
            }
            PanelEvent::MediaTitle(title) => {
                info!("PanelCore: icy-title {:?}", title);
                let actions = self.panel.handle_title(&title);
                self.perform_all(actions).await
            }
            PanelEvent::MediaLost => {
                self.start_reconnect();
                Flow::Continue
            }
            PanelEvent::Resolved { seq, index, url } => {
                if seq != self.tune_seq {
                    debug!("PanelCore: dropping stale resolve for station {}", index);
                    return Flow::Continue;
                }
                match url {
                    Ok(url) => self.load(index, &url).await,
                    Err(e) => warn!("PanelCore: could not resolve station {}: {}", index, e),
                }
                Flow::Continue
            }
            PanelEvent::MediaReconnected(result) => {
                let actions = self.finish_reconnect(result).await;
                self.perform_all(actions).await
            }
        }
    }

    // ── actions ───────────────────────────────────────────────────────────────

    async fn perform_all(&mut self, actions: Vec<Action>) -> Flow {
        for action in actions {
            if self.perform(action).await == Flow::Exit {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    async fn perform(&mut self, action: Action) -> Flow {
        match action {
            Action::Leds { green, red } => {
                // active-low
                self.drive(Line::LedGreen, Level::from_bool(!green));
                self.drive(Line::LedRed, Level::from_bool(!red));
            }
            Action::Amplifier(on) => self.drive(Line::Amplifier, Level::from_bool(on)),
            Action::Show { row, text, scroll } => self.show(row, &text, scroll),
            Action::RedrawClock => self.redraw_clock(),
            Action::Tune(index) => self.tune(index).await,
            Action::StopPlayback => {
                info!("PanelCore: stopping playback");
                self.tune_seq += 1;
                if let Err(e) = self.media.stop().await {
                    self.media_failed("stop", e);
                }
            }
            Action::SetVolume(level) => {
                debug!("PanelCore: volume {}", level);
                if let Err(e) = self.media.set_volume(level).await {
                    self.media_failed("set volume", e);
                }
            }
            Action::PowerOff => {
                self.power_off().await;
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Show the name, then load. Plain URLs load straight away; `plugin:`
    /// stations resolve in a task and load on `Resolved`. The panel only
    /// learns about the tune once mpv has accepted it.
    async fn tune(&mut self, index: usize) {
        let Some(station) = self.panel.stations().get(index).cloned() else {
            warn!("PanelCore: no station at index {}", index);
            return;
        };
        info!("PanelCore: tuning '{}'", station.name.trim_end());
        self.show(Row::Top, &station.name, false);
        self.tune_seq += 1;

        if station.plugin().is_none() {
            self.load(index, &station.url).await;
            return;
        }

        let seq = self.tune_seq;
        let resolver = self.resolver.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let url = resolver.resolve(&station).await;
            let _ = tx.send(PanelEvent::Resolved { seq, index, url }).await;
        });
    }

    async fn load(&mut self, index: usize, url: &str) {
        if let Err(e) = self.media.load(url).await {
            self.media_failed("loadfile", e);
            return;
        }
        self.drive(Line::Amplifier, Level::High);
        self.panel.mark_tuned(index);
    }

    fn media_failed(&mut self, what: &str, e: MediaError) {
        warn!("PanelCore: {} failed: {}", what, e);
        if e.is_connection_fault() {
            self.start_reconnect();
        }
    }

    /// Drop the socket (restarting mpv if it died) and connect again in a
    /// task. At most one reconnect runs at a time.
    fn start_reconnect(&mut self) {
        if self.reconnect.is_some() {
            return;
        }
        warn!("PanelCore: mpv connection lost, reconnecting");
        let outcome = match self.media.prepare_reconnect() {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("PanelCore: mpv restart failed: {}", e);
                self.show(Row::Top, SOCKET_ERROR, false);
                return;
            }
        };
        self.reconnect = Some(outcome);
        self.stop_suppressed.store(true, Ordering::Relaxed);

        let opts = self.media.options().clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = mpv::connect(&opts).await;
            let _ = tx.send(PanelEvent::MediaReconnected(result)).await;
        });
    }

    async fn finish_reconnect(&mut self, result: Result<UnixStream, MediaError>) -> Vec<Action> {
        let Some(outcome) = self.reconnect.take() else {
            return Vec::new();
        };
        self.stop_suppressed.store(false, Ordering::Relaxed);

        let completed = match result {
            Ok(stream) => {
                self.media
                    .complete_reconnect(stream, self.event_tx.clone())
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = completed {
            error!("PanelCore: mpv reconnect failed: {}", e);
            self.show(Row::Top, SOCKET_ERROR, false);
            return Vec::new();
        }

        match outcome {
            Reconnect::Reattached => {
                info!("PanelCore: reattached to mpv");
                if self.panel.state().radio_enabled {
                    Vec::new()
                } else {
                    vec![Action::StopPlayback]
                }
            }
            Reconnect::Respawned => {
                info!("PanelCore: mpv restarted");
                self.panel.media_restarted()
            }
        }
    }

    async fn power_off(&mut self) {
        info!("PanelCore: power off");
        self.show(Row::Top, "shutdown", false);
        self.drive(Line::Amplifier, Level::Low);
        tokio::time::sleep(Duration::from_millis(self.config.system.settle_ms)).await;

        if let Some(cmd) = self.config.system.poweroff_command.clone() {
            info!("PanelCore: running '{}'", cmd);
            match tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&cmd)
                .status()
                .await
            {
                Ok(status) if status.success() => {}
                Ok(status) => warn!("PanelCore: '{}' exited with {}", cmd, status),
                Err(e) => warn!("PanelCore: could not run '{}': {}", cmd, e),
            }
        }
    }

    /// Stop mpv, release the socket, switch everything off. Runs once.
    async fn shutdown(&mut self) {
        if self.shutdown_done {
            return;
        }
        self.shutdown_done = true;
        info!("PanelCore: cleanup");

        if self.media.is_connected() {
            if let Err(e) = self.media.stop().await {
                debug!("PanelCore: final stop: {}", e);
            }
        }
        self.media.terminate().await;

        self.drive(Line::Amplifier, Level::Low);
        self.drive(Line::LedGreen, Level::High);
        self.drive(Line::LedRed, Level::High);
        if let Err(e) = lcd::lock(&self.display).power_off() {
            warn!("PanelCore: display off failed: {}", e);
        }
        self.drive(Line::Backlight, Level::Low);
        self.backlight_until = None;
    }

    // ── hardware helpers ──────────────────────────────────────────────────────

    fn drive(&self, line: Line, level: Level) {
        if let Err(e) = hw::lock_io(&self.io).write_level(line, level) {
            warn!("PanelCore: {:?} → {:?} failed: {}", line, level, e);
        }
    }

    fn show(&mut self, row: Row, text: &str, scroll: bool) {
        let result = lcd::lock(&self.display).show(row, text, scroll);
        match result {
            Ok(()) => {
                if self.display_failing {
                    info!("PanelCore: display writes recovered");
                    self.display_failing = false;
                }
            }
            Err(e) => {
                if !self.display_failing {
                    warn!("PanelCore: display write failed: {}", e);
                    self.display_failing = true;
                }
            }
        }
    }

    fn redraw_clock(&mut self) {
        let now = self.clock.now();
        let state = self.panel.state();
        let clock = state.clock_row(now.time());
        let date = (!state.radio_enabled && state.mode != Mode::AlarmTimeSet)
            .then(|| ApplianceState::date_row(now));

        self.show(Row::Bottom, &clock, false);
        if let Some(date) = date {
            self.show(Row::Top, &date, false);
        }
    }

    fn wake_backlight(&mut self) {
        if self.backlight_until.is_none() {
            self.drive(Line::Backlight, Level::High);
        }
        self.backlight_until = Some(Instant::now() + self.backlight_timeout);
    }

    fn check_backlight(&mut self) {
        if self.backlight_until.is_some_and(|until| Instant::now() >= until) {
            self.backlight_until = None;
            self.drive(Line::Backlight, Level::Low);
        }
    }
}

/// Advance the row-0 scroll and wake the loop, every `period`.
fn spawn_ticker(
    display: SharedDisplay,
    period: Duration,
    tx: mpsc::Sender<PanelEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the first tick is immediate
        interval.tick().await;
        loop {
            interval.tick().await;
            let scrolled = lcd::lock(&display).scroll_tick();
            if let Err(e) = scrolled {
                debug!("ticker: scroll failed: {}", e);
            }
            if tx.send(PanelEvent::Tick).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use r8dio_proto::stations::Station;
    use r8dio_proto::protocol::VOLUME_MAX;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;

    use crate::hw::{DisplayBus, HwError};
    use crate::lcd::TextDisplay;
    use crate::mpv::{icy_title_filter, MediaOptions};

    /// Keeps the last bytes written to each row.
    #[derive(Clone, Default)]
    struct RowsBus {
        rows: Arc<Mutex<[Vec<u8>; 2]>>,
    }

    impl DisplayBus for RowsBus {
        fn write_at(&mut self, row: u8, _col: u8, bytes: &[u8]) -> Result<(), HwError> {
            self.rows.lock().unwrap()[row as usize] = bytes.to_vec();
            Ok(())
        }

        fn set_enabled(&mut self, _on: bool) -> Result<(), HwError> {
            Ok(())
        }
    }

    struct Rig {
        core: PanelCore,
        io: SharedIo,
        rows: RowsBus,
        tx: mpsc::Sender<PanelEvent>,
        rx: mpsc::Receiver<PanelEvent>,
    }

    async fn rig(mut config: Config, stations: Vec<Station>, media: Option<MediaClient>) -> Rig {
        config.display.tick_ms = 60_000;
        config.system.settle_ms = 0;
        let io = hw::open_gpio(&config).await.unwrap();
        let rows = RowsBus::default();
        let display = Arc::new(Mutex::new(TextDisplay::new(Box::new(rows.clone()))));
        let (tx, rx) = mpsc::channel(16);
        let media = media.unwrap_or_else(|| {
            MediaClient::new(MediaOptions::from(&config.media), icy_title_filter())
        });
        let panel = Panel::new(stations, &config.clock).unwrap();
        let core = PanelCore::new(config, panel, display, io.clone(), media, tx.clone());
        Rig {
            core,
            io,
            rows,
            tx,
            rx,
        }
    }

    fn level(io: &SharedIo, line: Line) -> Level {
        hw::lock_io(io).read_level(line).unwrap()
    }

    /// Every JSON line the fake mpv received, up to EOF.
    async fn commands(stream: UnixStream) -> Vec<serde_json::Value> {
        let mut server = BufReader::new(stream);
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if server.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            lines.push(serde_json::from_str(&line).unwrap());
        }
        lines
    }

    fn command_name(line: &serde_json::Value) -> &str {
        line["command"][0].as_str().unwrap()
    }

    /// A fake mpv socket with `media` already attached to it.
    async fn connected_media(
        dir: &tempfile::TempDir,
        config: &mut Config,
    ) -> (UnixListener, UnixStream, MediaClient) {
        let path = dir.path().join("mpv.sock");
        let listener = UnixListener::bind(&path).unwrap();
        config.media.socket_path = path;
        let (tx_media, _rx_media) = mpsc::channel(4);
        let mut media = MediaClient::new(MediaOptions::from(&config.media), icy_title_filter());
        let (server, opened) = tokio::join!(listener.accept(), media.open(tx_media));
        opened.unwrap();
        (listener, server.unwrap().0, media)
    }

    fn script(dir: &std::path::Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn offline_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.media.socket_path = dir.path().join("absent.sock");
        config.media.connect_attempts = 1;
        config
    }

    #[tokio::test]
    async fn test_click_tunes_and_shutdown_cleans_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        let (_listener, server, media) = connected_media(&dir, &mut config).await;

        let stations = vec![Station::new("One", "http://one/stream")];
        let Rig { core, io, rows, tx, rx } = rig(config, stations, Some(media)).await;

        tx.send(PanelEvent::Input(ButtonEvent::Click)).await.unwrap();
        tx.send(PanelEvent::Input(ButtonEvent::Shutdown)).await.unwrap();
        core.run(rx).await.unwrap();

        let lines = commands(server).await;
        let names: Vec<&str> = lines.iter().map(command_name).collect();
        assert_eq!(
            names,
            vec!["observe_property_string", "set_property", "stop", "loadfile", "stop"]
        );
        assert_eq!(lines[3]["command"][1], "http://one/stream");

        assert_eq!(rows.rows.lock().unwrap()[0], b"One     ".to_vec());
        assert_eq!(level(&io, Line::Amplifier), Level::Low);
        assert_eq!(level(&io, Line::Backlight), Level::Low);
        assert_eq!(level(&io, Line::LedGreen), Level::High);
    }

    #[tokio::test]
    async fn test_failed_tune_leaves_radio_disabled() {
        let dir = tempfile::TempDir::new().unwrap();
        let stations = vec![Station::new("One", "plugin:/missing/x")];
        let Rig { mut core, io, .. } = rig(offline_config(&dir), stations, None).await;

        let now = core.clock.now();
        let actions = core.panel.handle_input(ButtonEvent::Click, now);
        core.perform_all(actions).await;
        assert_eq!(core.panel.state().mode, Mode::VolumeControl);
        assert!(!core.panel.state().radio_enabled);
        assert_eq!(level(&io, Line::Amplifier), Level::Low);
        // green on, active-low
        assert_eq!(level(&io, Line::LedGreen), Level::Low);
    }

    #[tokio::test]
    async fn test_long_press_when_off_runs_poweroff() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("powered-off");
        let mut config = offline_config(&dir);
        config.system.poweroff_command = Some(format!("touch {}", marker.display()));

        let Rig { core, rows, tx, rx, .. } =
            rig(config, vec![Station::new("One", "http://one")], None).await;
        tx.send(PanelEvent::Input(ButtonEvent::LongPressEnd))
            .await
            .unwrap();
        core.run(rx).await.unwrap();

        assert!(marker.exists());
        assert_eq!(rows.rows.lock().unwrap()[0], b"shutdown".to_vec());
    }

    #[tokio::test]
    async fn test_reconnect_failure_shows_socket_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let Rig { mut core, rows, mut rx, .. } =
            rig(offline_config(&dir), vec![Station::new("One", "http://one")], None).await;

        assert_eq!(core.handle_event(PanelEvent::MediaLost).await, Flow::Continue);
        let evt = rx.recv().await.unwrap();
        assert!(matches!(evt, PanelEvent::MediaReconnected(Err(_))));
        assert_eq!(core.handle_event(evt).await, Flow::Continue);

        let mut expected = crate::charset::encode(SOCKET_ERROR);
        expected.resize(crate::lcd::WIDTH, b' ');
        assert_eq!(rows.rows.lock().unwrap()[0], expected);
        assert!(core.reconnect.is_none());
    }

    #[tokio::test]
    async fn test_stop_during_reconnect_is_sent_after_reattach() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        let (listener, first, media) = connected_media(&dir, &mut config).await;
        let Rig { mut core, mut rx, .. } =
            rig(config, vec![Station::new("One", "http://one")], Some(media)).await;

        core.handle_event(PanelEvent::MediaLost).await;
        assert!(!core.media.is_connected());
        // nothing to write to, and nothing fails
        core.media.stop().await.unwrap();

        let (second, evt) = tokio::join!(listener.accept(), rx.recv());
        let evt = evt.unwrap();
        assert!(matches!(evt, PanelEvent::MediaReconnected(Ok(_))));
        core.handle_event(evt).await;
        assert!(core.media.is_connected());
        assert!(core.reconnect.is_none());

        drop(core);
        assert!(commands(first).await.is_empty());
        let lines = commands(second.unwrap().0).await;
        let names: Vec<&str> = lines.iter().map(command_name).collect();
        assert_eq!(names, vec!["observe_property_string", "stop"]);
    }

    #[tokio::test]
    async fn test_input_handled_while_plugin_runs() {
        let dir = tempfile::TempDir::new().unwrap();
        script(dir.path(), "slow", "sleep 5");
        let mut config = offline_config(&dir);
        config.plugins.dir = dir.path().to_path_buf();
        config.plugins.timeout_secs = 10;
        let Rig { mut core, .. } =
            rig(config, vec![Station::new("Slow", "plugin:/slow/x")], None).await;

        tokio::time::timeout(Duration::from_secs(1), async {
            core.handle_event(PanelEvent::Input(ButtonEvent::Click)).await;
            core.handle_event(PanelEvent::Input(ButtonEvent::RotateCcw)).await;
        })
        .await
        .unwrap();

        let state = core.panel.state();
        assert_eq!(state.mode, Mode::VolumeControl);
        assert_eq!(state.volume, VOLUME_MAX / 2 - 1);
        assert!(!state.radio_enabled);
    }

    #[tokio::test]
    async fn test_resolved_plugin_url_is_loaded_unless_stale() {
        let dir = tempfile::TempDir::new().unwrap();
        script(dir.path(), "echo", "echo \"http://resolved/$1\"");
        let mut config = Config::default();
        config.plugins.dir = dir.path().to_path_buf();
        let (_listener, server, media) = connected_media(&dir, &mut config).await;
        let stations = vec![Station::new("Echo", "plugin:/echo/AFN")];
        let Rig { mut core, io, mut rx, .. } = rig(config, stations, Some(media)).await;

        core.handle_event(PanelEvent::Input(ButtonEvent::Click)).await;
        let evt = rx.recv().await.unwrap();
        core.handle_event(evt).await;
        assert!(core.panel.state().radio_enabled);
        assert_eq!(level(&io, Line::Amplifier), Level::High);

        // off, on again, and off before the second resolve lands
        core.handle_event(PanelEvent::Input(ButtonEvent::LongPressEnd)).await;
        core.handle_event(PanelEvent::Input(ButtonEvent::Click)).await;
        core.handle_event(PanelEvent::Input(ButtonEvent::LongPressEnd)).await;
        let evt = rx.recv().await.unwrap();
        assert!(matches!(evt, PanelEvent::Resolved { url: Ok(_), .. }));
        core.handle_event(evt).await;
        assert!(!core.panel.state().radio_enabled);
        assert_eq!(level(&io, Line::Amplifier), Level::Low);

        drop(core);
        let lines = commands(server).await;
        let names: Vec<&str> = lines.iter().map(command_name).collect();
        assert_eq!(names, vec!["loadfile", "stop", "stop"]);
        assert_eq!(lines[0]["command"][1], "http://resolved/AFN");
    }

    #[tokio::test]
    async fn test_backlight_follows_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = offline_config(&dir);
        config.display.backlight_timeout_secs = 0;
        let Rig { mut core, io, .. } = rig(config, vec![Station::new("One", "http://one")], None).await;

        assert_eq!(level(&io, Line::Backlight), Level::Low);
        core.wake_backlight();
        assert_eq!(level(&io, Line::Backlight), Level::High);
        core.check_backlight();
        assert_eq!(level(&io, Line::Backlight), Level::Low);
    }

    #[tokio::test]
    async fn test_tick_draws_clock_and_date_while_off() {
        let dir = tempfile::TempDir::new().unwrap();
        let Rig { mut core, rows, .. } =
            rig(offline_config(&dir), vec![Station::new("One", "http://one")], None).await;

        core.handle_event(PanelEvent::Tick).await;
        let rows = rows.rows.lock().unwrap();
        assert_eq!(rows[1].len(), 8);
        assert_eq!(rows[0][2], b'-');
    }

    #[test]
    fn test_fixed_offset_clock() {
        let clock = WallClock::new(&ClockConfig {
            utc_offset_minutes: Some(540),
            ..ClockConfig::default()
        });
        let expected = (Utc::now() + chrono::Duration::hours(9)).naive_utc();
        let diff = (clock.now() - expected).num_seconds().abs();
        assert!(diff <= 2);
    }
}
