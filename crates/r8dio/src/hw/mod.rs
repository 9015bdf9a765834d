//! Seams to the physical board: named GPIO lines and the character display bus.
//!
//! ```text
//!   DigitalIo   ← sampler task reads EncoderA/EncoderB/Button
//!               ← event loop drives LEDs, amplifier, backlight
//!   DisplayBus  ← TextDisplay (behind the display mutex)
//! ```
//!
//! Backends: `headless` (always built) and `linux` (feature `linux`).

pub mod headless;
#[cfg(feature = "linux")]
pub mod linux;
#[cfg_attr(not(feature = "linux"), allow(dead_code))]
pub mod st7032;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use r8dio_proto::config::{Backend, Config, GpioConfig};
use tracing::{info, warn};

/// Every line the appliance knows about, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    EncoderA,
    EncoderB,
    Button,
    Amplifier,
    DisplayReset,
    Backlight,
    LedGreen,
    LedRed,
}

impl Line {
    pub const INPUTS: [Line; 3] = [Line::EncoderA, Line::EncoderB, Line::Button];
    pub const OUTPUTS: [Line; 5] = [
        Line::Amplifier,
        Line::DisplayReset,
        Line::Backlight,
        Line::LedGreen,
        Line::LedRed,
    ];

    /// BCM line offset from config.
    #[cfg_attr(not(feature = "linux"), allow(dead_code))]
    pub fn offset(self, gpio: &GpioConfig) -> u32 {
        match self {
            Line::EncoderA => gpio.encoder_a,
            Line::EncoderB => gpio.encoder_b,
            Line::Button => gpio.button,
            Line::Amplifier => gpio.amplifier,
            Line::DisplayReset => gpio.display_reset,
            Line::Backlight => gpio.backlight,
            Line::LedGreen => gpio.led_green,
            Line::LedRed => gpio.led_red,
        }
    }

    /// Level a line is driven to when first configured as an output.
    /// LEDs are active-low, everything else starts off.
    pub fn idle_level(self) -> Level {
        match self {
            Line::LedGreen | Line::LedRed => Level::High,
            _ => Level::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output(Level),
}

#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("gpio unavailable: {0}")]
    Unavailable(String),
    #[error("line {0:?} is not configured")]
    LineNotConfigured(Line),
    #[error("gpio: {0}")]
    Gpio(String),
    #[error("display bus: {0}")]
    Bus(String),
    #[error("display position row={row} col={col} out of range")]
    Position { row: u8, col: u8 },
}

/// Raw access to named digital lines.
pub trait DigitalIo: Send {
    fn set_direction(&mut self, line: Line, direction: Direction) -> Result<(), HwError>;
    fn read_level(&mut self, line: Line) -> Result<Level, HwError>;
    fn write_level(&mut self, line: Line, level: Level) -> Result<(), HwError>;
}

/// The display controller's write primitive. Rows 0–1, columns 0–7.
pub trait DisplayBus: Send {
    fn write_at(&mut self, row: u8, col: u8, bytes: &[u8]) -> Result<(), HwError>;
    fn set_enabled(&mut self, on: bool) -> Result<(), HwError>;
}

/// GPIO is shared between the sampler task (reads) and the event loop
/// (writes); each access is a single short call under the lock.
pub type SharedIo = Arc<Mutex<Box<dyn DigitalIo>>>;

pub fn lock_io(io: &SharedIo) -> MutexGuard<'_, Box<dyn DigitalIo>> {
    io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn open_backend_io(config: &Config) -> Result<Box<dyn DigitalIo>, HwError> {
    match config.hardware.backend {
        Backend::Headless => Ok(Box::new(headless::HeadlessIo::new())),
        #[cfg(feature = "linux")]
        Backend::Linux => Ok(Box::new(linux::CdevIo::open(
            &config.hardware.gpio_chip,
            config.gpio.clone(),
        )?)),
        #[cfg(not(feature = "linux"))]
        Backend::Linux => Err(HwError::Unavailable(
            "built without the `linux` feature".to_string(),
        )),
    }
}

/// Open GPIO, polling while the device is missing, then put every line in
/// its direction and idle level.
pub async fn open_gpio(config: &Config) -> Result<SharedIo, HwError> {
    let attempts = config.hardware.open_attempts.max(1);
    let retry = Duration::from_secs(config.hardware.open_retry_secs);

    let mut attempt = 1;
    let mut io = loop {
        match open_backend_io(config) {
            Ok(io) => break io,
            Err(e) if attempt < attempts => {
                warn!("gpio: open attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(retry).await;
            }
            Err(e) => return Err(e),
        }
    };

    for line in Line::INPUTS {
        io.set_direction(line, Direction::Input)?;
    }
    for line in Line::OUTPUTS {
        io.set_direction(line, Direction::Output(line.idle_level()))?;
    }
    info!("gpio: {:?} backend ready", config.hardware.backend);

    Ok(Arc::new(Mutex::new(io)))
}

/// Pulse the controller's reset line (low ≥ 100 µs).
pub fn reset_display(io: &SharedIo) -> Result<(), HwError> {
    let mut io = lock_io(io);
    io.write_level(Line::DisplayReset, Level::Low)?;
    std::thread::sleep(Duration::from_micros(150));
    io.write_level(Line::DisplayReset, Level::High)
}

/// Open the display bus and initialise the controller.
pub fn open_display(config: &Config) -> Result<Box<dyn DisplayBus>, HwError> {
    match config.hardware.backend {
        Backend::Headless => Ok(Box::new(headless::HeadlessDisplay::new())),
        #[cfg(feature = "linux")]
        Backend::Linux => {
            let i2c = linux::open_i2c(&config.hardware.i2c_bus)?;
            let mut lcd = st7032::St7032::new(i2c, config.hardware.i2c_address);
            lcd.init()?;
            Ok(Box::new(lcd))
        }
        #[cfg(not(feature = "linux"))]
        Backend::Linux => Err(HwError::Bus(
            "built without the `linux` feature".to_string(),
        )),
    }
}

/// Reset (when the GPIO is up) and open the display off the async workers;
/// controller init sleeps for hundreds of milliseconds.
pub async fn init_display(
    config: &Config,
    io: Option<SharedIo>,
) -> Result<Box<dyn DisplayBus>, HwError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        if let Some(io) = io {
            if let Err(e) = reset_display(&io) {
                warn!("display reset failed: {}", e);
            }
        }
        open_display(&config)
    })
    .await
    .map_err(|e| HwError::Bus(format!("display init task: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_gpio_sets_idle_levels() {
        let io = open_gpio(&Config::default()).await.unwrap();
        let mut io = lock_io(&io);
        assert_eq!(io.read_level(Line::LedGreen).unwrap(), Level::High);
        assert_eq!(io.read_level(Line::Amplifier).unwrap(), Level::Low);
        // pulled-up inputs idle high
        assert_eq!(io.read_level(Line::Button).unwrap(), Level::High);
    }

    #[cfg(not(feature = "linux"))]
    #[tokio::test]
    async fn test_linux_backend_without_feature_gives_up() {
        let mut config = Config::default();
        config.hardware.backend = Backend::Linux;
        config.hardware.open_attempts = 2;
        config.hardware.open_retry_secs = 0;
        let err = open_gpio(&config).await.err().unwrap();
        assert!(matches!(err, HwError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_init_display_resets_and_opens() {
        let config = Config::default();
        let io = open_gpio(&config).await.unwrap();
        let mut bus = init_display(&config, Some(io.clone())).await.unwrap();
        assert_eq!(lock_io(&io).read_level(Line::DisplayReset).unwrap(), Level::High);
        bus.write_at(0, 0, b"r8dio").unwrap();

        assert!(init_display(&config, None).await.is_ok());
    }
}
