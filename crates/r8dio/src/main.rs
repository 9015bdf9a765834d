mod action;
mod charset;
mod core;
mod hw;
mod input;
mod lcd;
mod mpv;
mod panel;
mod plugin;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use r8dio_proto::config::Config;
use r8dio_proto::stations;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::{PanelCore, PanelEvent};
use crate::hw::{HwError, Level, Line, SharedIo};
use crate::input::ButtonEvent;
use crate::lcd::{Row, SharedDisplay, TextDisplay};
use crate::mpv::{MediaClient, MediaError, MediaOptions};
use crate::panel::Panel;

/// Startup failures that end the process. Each carries the two rows left on
/// the display.
#[derive(Debug, thiserror::Error)]
enum Fatal {
    #[error("gpio unavailable: {0}")]
    Gpio(#[source] HwError),
    #[error("mpv could not be started: {0}")]
    MediaSpawn(#[source] MediaError),
    #[error("mpv socket unreachable: {0}")]
    MediaConnect(#[source] MediaError),
}

impl Fatal {
    fn codes(&self) -> (&'static str, &'static str) {
        match self {
            Fatal::Gpio(_) => ("rpioｴﾗｰ", "HUP"),
            Fatal::MediaSpawn(_) => ("mpv ﾌｫﾙﾄ", "HUP"),
            Fatal::MediaConnect(_) => ("mpv ｴﾗｰ", "HUP"),
        }
    }

    fn show(&self, display: &SharedDisplay) {
        let (top, bottom) = self.codes();
        let mut display = lcd::lock(display);
        if let Err(e) = display
            .show(Row::Top, top, false)
            .and_then(|()| display.show(Row::Bottom, bottom, false))
        {
            warn!("could not show error code: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging, as on the appliance there is no terminal to read.
    let data_dir = r8dio_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("r8dio.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,r8dio=debug")),
        )
        .init();

    eprintln!("r8dio: logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;
    info!("Config loaded from: {:?}", config_path);

    let stations = stations::load_playlist(&config.stations.playlist)?;
    info!(
        "{} stations from {}",
        stations.len(),
        config.stations.playlist.display()
    );

    // ── hardware ──────────────────────────────────────────────────────────────

    let gpio = hw::open_gpio(&config).await;
    let bus = hw::init_display(&config, gpio.as_ref().ok().cloned())
        .await
        .map_err(|e| {
            error!("display bus unavailable: {}", e);
            e
        })?;
    let display: SharedDisplay = Arc::new(Mutex::new(TextDisplay::new(bus)));

    let io = match gpio {
        Ok(io) => io,
        Err(e) => return Err(fail(&display, Fatal::Gpio(e))),
    };
    set_backlight(&io, Level::High);
    if let Err(e) = lcd::lock(&display).show(Row::Top, &config.display.banner, false) {
        warn!("banner: {}", e);
    }

    // ── mpv ───────────────────────────────────────────────────────────────────

    let (event_tx, event_rx) = mpsc::channel::<PanelEvent>(config.core.queue_capacity.max(1));

    let mut media = MediaClient::new(MediaOptions::from(&config.media), mpv::icy_title_filter());
    if let Err(e) = media.spawn() {
        return Err(fail(&display, Fatal::MediaSpawn(e)));
    }
    if let Err(e) = media.open(event_tx.clone()).await {
        media.terminate().await;
        return Err(fail(&display, Fatal::MediaConnect(e)));
    }

    // ── tasks ─────────────────────────────────────────────────────────────────

    let panel = Panel::new(stations, &config.clock)?;
    let _sampler = input::spawn_sampler(io.clone(), &config.input, event_tx.clone());
    forward_signals(event_tx.clone());

    info!("r8dio initialised, running event loop");
    PanelCore::new(config, panel, display, io, media, event_tx)
        .run(event_rx)
        .await
}

fn fail(display: &SharedDisplay, fatal: Fatal) -> anyhow::Error {
    error!("{}", fatal);
    fatal.show(display);
    fatal.into()
}

fn set_backlight(io: &SharedIo, level: Level) {
    if let Err(e) = hw::lock_io(io).write_level(Line::Backlight, level) {
        warn!("backlight: {}", e);
    }
}

/// SIGINT, SIGTERM, SIGHUP and SIGQUIT all end the loop the same way.
fn forward_signals(tx: mpsc::Sender<PanelEvent>) {
    use tokio::signal::unix::{signal, SignalKind};

    for kind in [
        SignalKind::interrupt(),
        SignalKind::terminate(),
        SignalKind::hangup(),
        SignalKind::quit(),
    ] {
        let mut stream = match signal(kind) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("signal handler {:?}: {}", kind, e);
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            if stream.recv().await.is_some() {
                warn!("Shutdown signal received ({:?}).", kind);
                let _ = tx.send(PanelEvent::Input(ButtonEvent::Shutdown)).await;
            }
        });
    }
}
