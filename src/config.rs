use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::prelude::*,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    constants::{
        ANALOG_MAX, APP_NAME, CHANNEL_COUNT, CONFIG_FILE_NAME, DEFAULT_BAUD_RATE,
        DEFAULT_CHANNELS, DEFAULT_COM_PORT, DEFAULT_POLL_INTERVAL, DEFAULT_REPEAT_PERIOD_TICKS,
        DEFAULT_SENSITIVITY, DEFAULT_STOP_GRACE, LEGACY_CONFIG_FILE_NAME, SERIAL_SETTLE_DELAY,
    },
    error::ConfigError,
    log_error, log_info, log_warn,
};

/// One finger potentiometer: its telegram tag, bound key and press threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub key: String, // Empty => unbound
    pub threshold: i32,
}

impl ChannelConfig {
    pub fn default_for(index: usize) -> Self {
        let (name, threshold) = DEFAULT_CHANNELS[index % CHANNEL_COUNT];

        Self {
            name: name.to_string(),
            key: String::new(),
            threshold,
        }
    }
}

/// What a frame reports for a channel whose tag was missing from the line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsentChannels {
    /// Re-publish the last value seen for that channel
    #[default]
    Hold,
    /// Publish zero, the way the first firmware-side tools displayed it
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Serial
    pub baud_rate: u32,
    pub settle_delay_ms: u64,

    // Acquisition
    pub sensitivity: f64,
    pub poll_interval_ms: u64,
    pub repeat_period_ticks: u32,
    pub stop_grace_ms: u64,
    pub absent_channels: AbsentChannels,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            settle_delay_ms: SERIAL_SETTLE_DELAY,
            sensitivity: DEFAULT_SENSITIVITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL,
            repeat_period_ticks: DEFAULT_REPEAT_PERIOD_TICKS,
            stop_grace_ms: DEFAULT_STOP_GRACE,
            absent_channels: AbsentChannels::Hold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,
    #[serde(skip)]
    legacy_path: PathBuf,

    #[serde(default = "default_com_port")]
    pub com_port: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default = "default_fingers")]
    pub fingers: Vec<ChannelConfig>,
}

/// Shape of the JSON file older releases wrote next to the executable.
#[derive(Debug, Deserialize)]
struct LegacyConfig {
    #[serde(default = "default_com_port")]
    com_port: String,
    #[serde(default = "default_fingers")]
    fingers: Vec<ChannelConfig>,
}

/// Immutable copy of everything a session needs, taken when it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub port: String,
    pub baud_rate: u32,
    pub channels: [ChannelConfig; CHANNEL_COUNT],
    pub sensitivity: f64,
    pub poll_interval: Duration,
    pub repeat_period_ticks: u32,
    pub stop_grace: Duration,
    pub settle_delay: Duration,
    pub absent_channels: AbsentChannels,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Config::with_paths(PathBuf::new(), PathBuf::new()).session_config()
    }
}

fn default_com_port() -> String {
    DEFAULT_COM_PORT.to_string()
}

fn default_fingers() -> Vec<ChannelConfig> {
    (0..CHANNEL_COUNT).map(ChannelConfig::default_for).collect()
}

pub fn default_config_path() -> PathBuf {
    let file_name = Path::new(&APP_NAME.to_lowercase()).join(CONFIG_FILE_NAME);

    if cfg!(debug_assertions) {
        return Path::new("./target/config").join(file_name);
    }

    dirs::config_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(file_name)
}

impl Default for Config {
    fn default() -> Self {
        Self::with_paths(default_config_path(), PathBuf::from(LEGACY_CONFIG_FILE_NAME))
    }
}

impl Config {
    pub fn with_paths(file_path: PathBuf, legacy_path: PathBuf) -> Self {
        Self {
            file_path,
            legacy_path,
            com_port: default_com_port(),
            settings: Settings::default(),
            fingers: default_fingers(),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Replaces the in-memory config with the stored one. Never fails: a missing
    /// file is created (or imported from the legacy JSON), a corrupt one
    /// falls back to defaults.
    pub fn load(&mut self) {
        let loaded = if self.file_path.exists() {
            self.read()
        } else if self.legacy_path.is_file() {
            self.import_legacy()
        } else {
            log_info!(
                "No config found, writing defaults to `{}`",
                self.file_path.display()
            );

            Ok(Self::with_paths(
                self.file_path.clone(),
                self.legacy_path.clone(),
            ))
        };

        let mut config = match loaded {
            Ok(config) => config,
            Err(err) => {
                log_error!(
                    "Error reading config file `{}`, using defaults: {}",
                    self.file_path.display(),
                    err
                );

                // Keep the broken file around, the user may want to fix it by hand
                let mut config = Self::with_paths(self.file_path.clone(), self.legacy_path.clone());
                config.normalize();
                *self = config;

                return;
            }
        };

        config.normalize();

        let needs_write = !config.file_path.exists();

        *self = config;

        if needs_write {
            if let Err(err) = self.write() {
                log_error!("Error writing config: {}", err);
            }
        }
    }

    pub fn update<F>(&mut self, callback: F, write_to_file: bool) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Self),
    {
        callback(self);

        self.normalize();

        if !write_to_file {
            return Ok(());
        }

        self.write()
    }

    /// The "OK" action of a finger row: stores its key and threshold and persists.
    pub fn commit_channel(
        &mut self,
        index: usize,
        key: &str,
        threshold: i32,
    ) -> Result<(), ConfigError> {
        if index >= CHANNEL_COUNT {
            return Err(ConfigError::InvalidChannel(index));
        }

        self.update(
            |config| {
                let channel = &mut config.fingers[index];

                channel.key = key.trim().to_string();
                channel.threshold = threshold;
            },
            true,
        )?;

        log_info!(
            "Channel `{}` committed: key `{}`, threshold {}",
            self.fingers[index].name,
            self.fingers[index].key,
            self.fingers[index].threshold
        );

        Ok(())
    }

    /// The "Save" action: stores port and key bindings, thresholds stay as committed.
    pub fn save(&mut self, com_port: &str, keys: &[String]) -> Result<(), ConfigError> {
        self.update(
            |config| {
                config.com_port = com_port.trim().to_string();

                for (channel, key) in config.fingers.iter_mut().zip(keys) {
                    channel.key = key.trim().to_string();
                }
            },
            true,
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            port: self.com_port.trim().to_string(),
            baud_rate: self.settings.baud_rate,
            channels: std::array::from_fn(|i| {
                self.fingers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| ChannelConfig::default_for(i))
            }),
            sensitivity: self.settings.sensitivity,
            poll_interval: Duration::from_millis(self.settings.poll_interval_ms),
            repeat_period_ticks: self.settings.repeat_period_ticks.max(1),
            stop_grace: Duration::from_millis(self.settings.stop_grace_ms),
            settle_delay: Duration::from_millis(self.settings.settle_delay_ms),
            absent_channels: self.settings.absent_channels,
        }
    }

    fn normalize(&mut self) {
        if self.fingers.len() != CHANNEL_COUNT {
            log_warn!(
                "Config has {} finger channels, expected {}",
                self.fingers.len(),
                CHANNEL_COUNT
            );
        }

        self.fingers.truncate(CHANNEL_COUNT);

        while self.fingers.len() < CHANNEL_COUNT {
            self.fingers
                .push(ChannelConfig::default_for(self.fingers.len()));
        }

        for (index, channel) in self.fingers.iter_mut().enumerate() {
            if channel.name.trim().is_empty() {
                channel.name = ChannelConfig::default_for(index).name;
            }

            channel.name = channel.name.trim().to_string();
            channel.key = channel.key.trim().to_string();

            let clamped = channel.threshold.clamp(0, ANALOG_MAX - 1);

            if clamped != channel.threshold {
                log_warn!(
                    "Threshold {} of `{}` is out of range, clamped to {}",
                    channel.threshold,
                    channel.name,
                    clamped
                );

                channel.threshold = clamped;
            }
        }
    }

    fn read(&self) -> Result<Config, ConfigError> {
        let mut file = File::open(&self.file_path)?;

        let mut toml_str = String::new();

        file.read_to_string(&mut toml_str)?;

        let mut config: Config = toml::from_str(&toml_str)?;

        // After reading, all the serde-ignored fields are empty
        config.file_path = self.file_path.clone();
        config.legacy_path = self.legacy_path.clone();

        Ok(config)
    }

    fn import_legacy(&self) -> Result<Config, ConfigError> {
        log_info!(
            "Importing legacy config from `{}`",
            self.legacy_path.display()
        );

        let file = File::open(&self.legacy_path)?;
        let legacy: LegacyConfig = serde_json::from_reader(std::io::BufReader::new(file))?;

        let mut config = Self::with_paths(self.file_path.clone(), self.legacy_path.clone());

        config.com_port = legacy.com_port;
        config.fingers = legacy.fingers;

        Ok(config)
    }

    fn write(&self) -> Result<(), ConfigError> {
        if let Some(parent_folder) = self.file_path.parent() {
            std::fs::create_dir_all(parent_folder)?;
        }

        let toml_str = toml::to_string_pretty(&self)?;

        let mut file = File::create(&self.file_path)?;

        file.write_all(toml_str.as_bytes())?;

        Ok(())
    }
}
