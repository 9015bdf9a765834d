//! mpv process + IPC socket.
//!
//! ```text
//!   MediaClient::spawn()      mpv --idle --input-ipc-server=<socket> ...
//!   MediaClient::open(tx)     connect with retry
//!         ├── writes          send() under a write timeout
//!         └── reader_task     JSON lines → MediaEvent → filter → PanelEvent::MediaTitle
//!                             EOF / read error        → PanelEvent::MediaLost
//! ```
//!
//! Writes are fire-and-forget: replies come back on the reader, are decoded
//! and dropped by the filter like any other uninteresting line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use r8dio_proto::config::MediaConfig;
use r8dio_proto::platform;
use r8dio_proto::protocol::{volume_to_mpv, MediaCommand, MediaEvent, ICY_TITLE_PROPERTY};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::PanelEvent;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("mpv binary not found")]
    BinaryNotFound,
    #[error("failed to spawn mpv: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("mpv socket not reachable after {attempts} attempts")]
    ConnectTimeout { attempts: u32 },
    #[error("not connected to mpv")]
    NotConnected,
    #[error("mpv write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("mpv write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to encode command: {0}")]
    Encode(String),
}

impl MediaError {
    /// The socket was dropped and needs a reconnect.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, MediaError::Write(_) | MediaError::WriteTimeout(_))
    }
}

/// Longest event line kept; anything longer is skipped up to its newline.
const MAX_LINE: usize = 1024;

/// Maps an incoming event to the text worth forwarding, if any.
pub type EventFilter = Arc<dyn Fn(&MediaEvent) -> Option<String> + Send + Sync>;

/// When it returns true, `stop()` sends nothing.
pub type StopOverride = Box<dyn Fn() -> bool + Send>;

/// Forward ICY title changes only.
pub fn icy_title_filter() -> EventFilter {
    Arc::new(|evt: &MediaEvent| evt.icy_title().map(str::to_string))
}

#[derive(Debug, Clone)]
pub struct MediaOptions {
    pub binary: Option<PathBuf>,
    pub socket_path: PathBuf,
    pub connect_attempts: u32,
    pub connect_retry: Duration,
    pub write_timeout: Duration,
    pub stream_buffer_size: String,
}

impl From<&MediaConfig> for MediaOptions {
    fn from(config: &MediaConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            socket_path: config.socket_path.clone(),
            connect_attempts: config.connect_attempts.max(1),
            connect_retry: Duration::from_millis(config.connect_retry_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            stream_buffer_size: config.stream_buffer_size.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Same process, new socket connection.
    Reattached,
    /// The process had died and was started again; playback is gone.
    Respawned,
}

pub struct MediaClient {
    opts: MediaOptions,
    process: Option<Child>,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
    filter: EventFilter,
    stop_override: Option<StopOverride>,
    /// Last linear level sent, restored after a reconnect.
    volume: Option<u8>,
}

impl MediaClient {
    pub fn new(opts: MediaOptions, filter: EventFilter) -> Self {
        Self {
            opts,
            process: None,
            writer: None,
            reader: None,
            filter,
            stop_override: None,
            volume: None,
        }
    }

    pub fn set_stop_override(&mut self, f: StopOverride) {
        self.stop_override = Some(f);
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    // ── process ───────────────────────────────────────────────────────────────

    /// Start mpv idle, listening on the configured socket.
    pub fn spawn(&mut self) -> Result<(), MediaError> {
        if let Some(mut p) = self.process.take() {
            let _ = p.start_kill();
        }
        remove_socket_file(&self.opts.socket_path);

        let binary = platform::find_mpv_binary(self.opts.binary.as_deref())
            .ok_or(MediaError::BinaryNotFound)?;

        let child = Command::new(&binary)
            .arg("--idle")
            .arg(format!(
                "--input-ipc-server={}",
                self.opts.socket_path.display()
            ))
            .arg("--no-video")
            .arg("--no-cache")
            .arg(format!("--stream-buffer-size={}", self.opts.stream_buffer_size))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(MediaError::Spawn)?;
        info!("mpv: spawned {} with pid {:?}", binary.display(), child.id());
        self.process = Some(child);
        Ok(())
    }

    pub fn process_alive(&mut self) -> bool {
        let Some(child) = self.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                match status.code() {
                    Some(code) => warn!("mpv: process exited with code {}", code),
                    None => warn!("mpv: process terminated by signal"),
                }
                false
            }
            Err(e) => {
                warn!("mpv: process_alive check failed: {}", e);
                false
            }
        }
    }

    // ── connection ────────────────────────────────────────────────────────────

    /// Connect to the socket, retrying while mpv starts up. On success the
    /// reader task is running and feeding `tx`.
    pub async fn open(&mut self, tx: mpsc::Sender<PanelEvent>) -> Result<(), MediaError> {
        let stream = connect(&self.opts).await?;
        self.attach(stream, tx);
        Ok(())
    }

    pub fn attach(&mut self, stream: UnixStream, tx: mpsc::Sender<PanelEvent>) {
        let (read_half, write_half) = stream.into_split();
        self.writer = Some(write_half);
        self.reader = Some(tokio::spawn(reader_task(
            read_half,
            self.filter.clone(),
            tx,
        )));
    }

    /// Drop the socket. The reader is stopped first so no `MediaLost`
    /// follows a deliberate close.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.writer.take().is_some() {
            debug!("mpv: socket closed");
        }
    }

    pub fn options(&self) -> &MediaOptions {
        &self.opts
    }

    /// First half of a reconnect: drop the socket and restart mpv if it has
    /// died. The caller then runs [`connect`] wherever it likes.
    pub fn prepare_reconnect(&mut self) -> Result<Reconnect, MediaError> {
        self.close();
        if self.process.is_some() && !self.process_alive() {
            info!("mpv: process gone, respawning");
            self.spawn()?;
            Ok(Reconnect::Respawned)
        } else {
            Ok(Reconnect::Reattached)
        }
    }

    /// Second half: adopt the new connection, observe the title again and
    /// restore the last volume.
    pub async fn complete_reconnect(
        &mut self,
        stream: UnixStream,
        tx: mpsc::Sender<PanelEvent>,
    ) -> Result<(), MediaError> {
        self.attach(stream, tx);
        self.observe_title().await?;
        if let Some(level) = self.volume {
            self.set_volume(level).await?;
        }
        Ok(())
    }

    /// Close the socket, kill mpv and remove its socket file.
    pub async fn terminate(&mut self) {
        self.close();
        if let Some(mut p) = self.process.take() {
            if let Err(e) = p.kill().await {
                warn!("mpv: kill failed: {}", e);
            }
        }
        remove_socket_file(&self.opts.socket_path);
    }

    // ── commands ──────────────────────────────────────────────────────────────

    pub async fn send(&mut self, cmd: &MediaCommand) -> Result<(), MediaError> {
        let writer = self.writer.as_mut().ok_or(MediaError::NotConnected)?;
        let line = cmd
            .to_line()
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        debug!("mpv ← {}", line.trim_end());

        let limit = self.opts.write_timeout;
        let err = match tokio::time::timeout(limit, writer.write_all(line.as_bytes())).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => MediaError::Write(e),
            Err(_) => MediaError::WriteTimeout(limit),
        };
        // a partial line may be on the wire; anything sent after it would be garbage
        warn!("mpv: {}, dropping connection", err);
        self.close();
        Err(err)
    }

    pub async fn observe_title(&mut self) -> Result<(), MediaError> {
        self.send(&MediaCommand::ObserveProperty(ICY_TITLE_PROPERTY.to_string()))
            .await
    }

    pub async fn load(&mut self, url: &str) -> Result<(), MediaError> {
        self.send(&MediaCommand::LoadFile(url.to_string())).await
    }

    pub async fn stop(&mut self) -> Result<(), MediaError> {
        if self.stop_override.as_ref().is_some_and(|suppress| suppress()) {
            debug!("mpv: stop suppressed");
            return Ok(());
        }
        self.send(&MediaCommand::Stop).await
    }

    /// `level` is linear in `[VOLUME_MIN, VOLUME_MAX]`.
    pub async fn set_volume(&mut self, level: u8) -> Result<(), MediaError> {
        self.volume = Some(level);
        self.send(&MediaCommand::SetVolume(volume_to_mpv(i32::from(level))))
            .await
    }
}

/// Connect to mpv's socket, retrying every `connect_retry` up to
/// `connect_attempts` times. Borrows nothing from the client so it can run
/// in its own task.
pub async fn connect(opts: &MediaOptions) -> Result<UnixStream, MediaError> {
    let attempts = opts.connect_attempts;
    for attempt in 1..=attempts {
        match UnixStream::connect(&opts.socket_path).await {
            Ok(stream) => {
                info!(
                    "mpv: connected to {} (attempt {})",
                    opts.socket_path.display(),
                    attempt
                );
                return Ok(stream);
            }
            Err(e) => debug!("mpv: connect attempt {}/{}: {}", attempt, attempts, e),
        }
        if attempt < attempts {
            tokio::time::sleep(opts.connect_retry).await;
        }
    }
    Err(MediaError::ConnectTimeout { attempts })
}

fn remove_socket_file(path: &std::path::Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("mpv: removed socket file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("mpv: could not remove {}: {}", path.display(), e),
    }
}

async fn reader_task(read_half: OwnedReadHalf, filter: EventFilter, tx: mpsc::Sender<PanelEvent>) {
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::with_capacity(MAX_LINE);
    let mut skipping = false;

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE as u64)
            .read_until(b'\n', &mut buf)
            .await;
        match read {
            Ok(0) => {
                info!("mpv reader: connection closed");
                break;
            }
            Ok(_) => {
                let complete = buf.last() == Some(&b'\n');
                if skipping {
                    skipping = !complete;
                    continue;
                }
                if !complete && buf.len() >= MAX_LINE {
                    debug!("mpv reader: skipping line longer than {} bytes", MAX_LINE);
                    skipping = true;
                    continue;
                }

                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(evt) = MediaEvent::decode(line) else {
                    debug!("mpv reader: ignoring {}", line);
                    continue;
                };
                if let Some(text) = filter(&evt) {
                    debug!("mpv reader: forwarding {:?}", text);
                    if tx.send(PanelEvent::MediaTitle(text)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                break;
            }
        }
    }

    let _ = tx.send(PanelEvent::MediaLost).await;
}
