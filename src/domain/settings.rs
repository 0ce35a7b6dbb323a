use crate::domain::profile::{
    ConfigurationProfile, ConnectionParameters, GasMode, LedCalibration,
};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable overriding the stored device address
pub const DEVICE_ADDRESS_ENV: &str = "THINGY_MAC_ADDRESS";

/// Subscriber configuration consumed by `logging::init_logger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub file_logging_enabled: bool,
    pub console_logging_enabled: bool,
    pub log_dir: String,
    pub file_name_prefix: String,
    pub show_file_line: bool,
    pub show_thread_ids: bool,
    pub show_target: bool,
    pub ansi_colors: bool,
    /// One of hourly, minutely, never; anything else rotates daily
    pub rotation: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging_enabled: true,
            console_logging_enabled: true,
            log_dir: "logs".to_string(),
            file_name_prefix: "thingy_monitor".to_string(),
            show_file_line: false,
            show_thread_ids: false,
            show_target: true,
            ansi_colors: true,
            rotation: "daily".to_string(),
        }
    }
}

/// Raw environment service settings, validated into a
/// [`ConfigurationProfile`] at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub temperature_interval_ms: u16,
    pub pressure_interval_ms: u16,
    pub humidity_interval_ms: u16,
    pub color_interval_ms: u16,
    pub gas_mode: u8, // 1 = 1 s, 2 = 10 s, 3 = 60 s
    pub led_red: u8,
    pub led_green: u8,
    pub led_blue: u8,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            temperature_interval_ms: 20_000,
            pressure_interval_ms: 60_000,
            humidity_interval_ms: 20_000,
            color_interval_ms: 60_000,
            gas_mode: 2,
            led_red: 0,
            led_green: 0,
            led_blue: 0,
        }
    }
}

impl EnvironmentSettings {
    pub fn to_profile(&self) -> Result<ConfigurationProfile, ValidationError> {
        ConfigurationProfile::new(
            self.temperature_interval_ms,
            self.pressure_interval_ms,
            self.humidity_interval_ms,
            self.color_interval_ms,
            GasMode::try_from(self.gas_mode)?,
            LedCalibration {
                red: self.led_red,
                green: self.led_green,
                blue: self.led_blue,
            },
        )
    }
}

/// Raw connection parameter settings, in link-layer units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub min_interval_units: u16,
    pub max_interval_units: u16,
    pub slave_latency_events: u16,
    pub supervision_timeout_units: u16,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            min_interval_units: 6,           // 7.5 ms
            max_interval_units: 3200,        // 4 s
            slave_latency_events: 0,
            supervision_timeout_units: 3200, // 32 s
        }
    }
}

impl ConnectionSettings {
    pub fn to_parameters(&self) -> Result<ConnectionParameters, ValidationError> {
        ConnectionParameters::new(
            self.min_interval_units,
            self.max_interval_units,
            self.slave_latency_events,
            self.supervision_timeout_units,
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Append readings as JSON lines here; `None` logs them instead
    pub json_lines_path: Option<String>,
}

/// Everything read from `settings.json`. Missing fields, including fields
/// of nested sections, take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device_address: String,

    pub observation_window_secs: u64,
    pub idle_period_secs: u64,
    pub connect_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub settle_delay_ms: u64,

    pub scan_timeout_secs: u64,
    /// Bound on each link step inside a connect
    pub link_timeout_secs: u64,
    pub notification_queue_capacity: usize,

    pub environment: EnvironmentSettings,
    pub connection: ConnectionSettings,
    pub sink: SinkSettings,
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: String::new(),
            observation_window_secs: 60,
            idle_period_secs: 240,
            // Covers the scan plus the connect and discovery steps
            connect_timeout_secs: 45,
            write_timeout_secs: 10,
            settle_delay_ms: 4000,
            scan_timeout_secs: 15,
            link_timeout_secs: 10,
            notification_queue_capacity: 64,
            environment: EnvironmentSettings::default(),
            connection: ConnectionSettings::default(),
            sink: SinkSettings::default(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Apply environment overrides (`THINGY_MAC_ADDRESS`).
    pub fn apply_env(&mut self) {
        if let Ok(address) = std::env::var(DEVICE_ADDRESS_ENV) {
            if !address.trim().is_empty() {
                self.device_address = address.trim().to_string();
            }
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
    load_error: Option<String>,
}

impl SettingsService {
    /// Load `<config dir>/ThingyMonitor/settings.json`. A missing file means
    /// defaults; an unreadable one also means defaults, reported by
    /// [`SettingsService::load_error`] once logging is up.
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let (settings, load_error) = Self::load_or_default(&settings_path);

        Ok(Self {
            settings,
            settings_path,
            load_error,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ThingyMonitor");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_or_default(path: &Path) -> (Settings, Option<String>) {
        match Self::load_from_file(path) {
            Ok(settings) => (settings, None),
            Err(e) if is_not_found(&e) => (Settings::default(), None),
            Err(e) => {
                let reason = format!("{}: {:#}", path.display(), e);
                warn!("Ignoring settings file {}", reason);
                (Settings::default(), Some(reason))
            }
        }
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Why the settings file was ignored, if it was.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }
}

fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
}
