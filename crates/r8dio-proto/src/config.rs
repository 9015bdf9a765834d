use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub core: CoreConfig,
}

/// Which hardware backend drives the pins and the display bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// No hardware: display writes go to the log, input lines read idle.
    #[default]
    Headless,
    /// GPIO character device + i2c-dev.
    Linux,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: PathBuf,
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: PathBuf,
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,
    /// GPIO open is polled at startup; the device node may appear late on boot.
    #[serde(default = "default_open_attempts")]
    pub open_attempts: u32,
    #[serde(default = "default_open_retry_secs")]
    pub open_retry_secs: u64,
}

/// BCM line numbers of every named line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpioConfig {
    #[serde(default = "default_encoder_a")]
    pub encoder_a: u32,
    #[serde(default = "default_encoder_b")]
    pub encoder_b: u32,
    #[serde(default = "default_button")]
    pub button: u32,
    #[serde(default = "default_amplifier")]
    pub amplifier: u32,
    #[serde(default = "default_display_reset")]
    pub display_reset: u32,
    #[serde(default = "default_backlight")]
    pub backlight: u32,
    #[serde(default = "default_led_green")]
    pub led_green: u32,
    #[serde(default = "default_led_red")]
    pub led_red: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,
    /// Minimum held samples for a click.
    #[serde(default = "default_click_samples")]
    pub click_samples: u32,
    /// Held samples after which a press becomes a long press.
    #[serde(default = "default_long_press_samples")]
    pub long_press_samples: u32,
    /// Gray-code steps per mechanical detent.
    #[serde(default = "default_steps_per_detent")]
    pub steps_per_detent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_backlight_timeout_secs")]
    pub backlight_timeout_secs: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Shown on row 0 while starting up.
    #[serde(default = "default_banner")]
    pub banner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Explicit mpv binary; searched on PATH when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default = "platform::default_mpv_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_stream_buffer_size")]
    pub stream_buffer_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// m3u playlist with `#EXTINF:` entries.
    #[serde(default = "default_playlist")]
    pub playlist: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Fixed UTC offset for the wall clock; system local time when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default = "default_sleep_minutes")]
    pub sleep_minutes: u32,
    #[serde(default = "default_alarm")]
    pub alarm: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory holding `plugin:` resolvers, one executable per plugin name.
    #[serde(default = "default_plugins_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_plugin_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Run after the power-off sequence, e.g. `/sbin/poweroff`.
    #[serde(default)]
    pub poweroff_command: Option<String>,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            gpio_chip: default_gpio_chip(),
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
            open_attempts: default_open_attempts(),
            open_retry_secs: default_open_retry_secs(),
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            encoder_a: default_encoder_a(),
            encoder_b: default_encoder_b(),
            button: default_button(),
            amplifier: default_amplifier(),
            display_reset: default_display_reset(),
            backlight: default_backlight(),
            led_green: default_led_green(),
            led_red: default_led_red(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: default_sample_period_ms(),
            click_samples: default_click_samples(),
            long_press_samples: default_long_press_samples(),
            steps_per_detent: default_steps_per_detent(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backlight_timeout_secs: default_backlight_timeout_secs(),
            tick_ms: default_tick_ms(),
            banner: default_banner(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary: None,
            socket_path: platform::default_mpv_socket_path(),
            connect_attempts: default_connect_attempts(),
            connect_retry_ms: default_connect_retry_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            stream_buffer_size: default_stream_buffer_size(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            playlist: default_playlist(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            sleep_minutes: default_sleep_minutes(),
            alarm: default_alarm(),
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: default_plugins_dir(),
            timeout_secs: default_plugin_timeout_secs(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            poweroff_command: None,
            settle_ms: default_settle_ms(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_gpio_chip() -> PathBuf {
    PathBuf::from("/dev/gpiochip0")
}

fn default_i2c_bus() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}

fn default_i2c_address() -> u8 {
    0x3e
}

fn default_open_attempts() -> u32 {
    12
}

fn default_open_retry_secs() -> u64 {
    5
}

fn default_encoder_a() -> u32 {
    19
}

fn default_encoder_b() -> u32 {
    26
}

fn default_button() -> u32 {
    13
}

fn default_amplifier() -> u32 {
    12
}

fn default_display_reset() -> u32 {
    17
}

fn default_backlight() -> u32 {
    4
}

fn default_led_green() -> u32 {
    5
}

fn default_led_red() -> u32 {
    6
}

fn default_sample_period_ms() -> u64 {
    10
}

fn default_click_samples() -> u32 {
    5
}

fn default_long_press_samples() -> u32 {
    25
}

fn default_steps_per_detent() -> u8 {
    4
}

fn default_backlight_timeout_secs() -> u64 {
    10
}

fn default_tick_ms() -> u64 {
    500
}

fn default_banner() -> String {
    "ﾗｼﾞｵ r8".to_string()
}

fn default_connect_attempts() -> u32 {
    60
}

fn default_connect_retry_ms() -> u64 {
    200
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_stream_buffer_size() -> String {
    "256KiB".to_string()
}

fn default_playlist() -> PathBuf {
    platform::config_dir().join("radio.m3u")
}

fn default_sleep_minutes() -> u32 {
    30
}

fn default_alarm() -> NaiveTime {
    NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default()
}

fn default_plugins_dir() -> PathBuf {
    platform::config_dir().join("plugins")
}

fn default_plugin_timeout_secs() -> u64 {
    5
}

fn default_settle_ms() -> u64 {
    700
}

fn default_queue_capacity() -> usize {
    64
}

impl Config {
    /// Load from the default location. A missing file yields the defaults;
    /// the appliance never writes its own config.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
