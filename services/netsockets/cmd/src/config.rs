//! Configuration handling for the netsockets demo.
//!
//! Settings come from a YAML file, then `NETSOCKETS_*` environment
//! variables, then command-line flags (applied in `main`).

use anyhow::{bail, Context, Result};
use netsockets_config::{ConfigDataType, ConfigKey, ConfigScope, ConfigValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Demo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Address the echo server listens on
    pub listen: String,
    /// Messages the client sends before closing
    pub message_count: u32,
    /// Payload size of each message in bytes
    pub payload_size: usize,
    /// Pump interval, humantime format (e.g. "10ms")
    pub tick: String,
    /// Tunables applied before any socket is created
    pub overrides: Vec<ConfigOverride>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:27015".to_string(),
            message_count: 100,
            payload_size: 64,
            tick: "10ms".to_string(),
            overrides: Vec::new(),
        }
    }
}

/// One configuration override from the YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOverride {
    /// Key name, e.g. `send_buffer_size`
    pub key: String,
    /// Scope the value is set at
    #[serde(default = "default_scope")]
    pub scope: ConfigScope,
    /// Raw value, converted to the key's type
    pub value: OverrideValue,
}

fn default_scope() -> ConfigScope {
    ConfigScope::Global
}

/// Untyped value as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    /// Whole number
    Int(i64),
    /// Decimal number
    Float(f64),
    /// Text
    Text(String),
}

impl ConfigOverride {
    /// Resolve the key and convert the value to the key's declared type
    pub fn resolve(&self) -> Result<(ConfigKey, ConfigValue)> {
        let key = ConfigKey::from_name(&self.key)
            .with_context(|| format!("unknown config key '{}'", self.key))?;
        let value = match (key.data_type(), &self.value) {
            (ConfigDataType::Int32, OverrideValue::Int(v)) => ConfigValue::Int32(
                i32::try_from(*v).with_context(|| format!("{} out of range for {}", v, key))?,
            ),
            (ConfigDataType::Int64, OverrideValue::Int(v)) => ConfigValue::Int64(*v),
            (ConfigDataType::Float, OverrideValue::Int(v)) => ConfigValue::Float(*v as f32),
            (ConfigDataType::Float, OverrideValue::Float(v)) => ConfigValue::Float(*v as f32),
            (ConfigDataType::String, OverrideValue::Text(v)) => ConfigValue::String(v.clone()),
            (expected, got) => bail!("{} expects {:?}, got {:?}", key, expected, got),
        };
        Ok((key, value))
    }
}

impl DemoConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: DemoConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("failed to parse config file {:?}", path))?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read config file {:?}", path));
            }
        };

        config.apply_environment_overrides();
        info!(
            "Demo configuration: listen={} messages={} payload={}B tick={} overrides={}",
            config.listen,
            config.message_count,
            config.payload_size,
            config.tick,
            config.overrides.len()
        );
        Ok(config)
    }

    /// Pump interval
    pub fn tick_interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.tick)
            .with_context(|| format!("invalid tick interval '{}'", self.tick))
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(listen) = std::env::var("NETSOCKETS_LISTEN") {
            info!("Listen address overridden by environment: {}", listen);
            self.listen = listen;
        }

        if let Ok(count) = std::env::var("NETSOCKETS_MESSAGE_COUNT") {
            match count.parse::<u32>() {
                Ok(n) => {
                    self.message_count = n;
                    info!("Message count overridden by environment: {}", n);
                }
                Err(_) => warn!("Ignoring NETSOCKETS_MESSAGE_COUNT={:?}", count),
            }
        }

        if let Ok(size) = std::env::var("NETSOCKETS_PAYLOAD_SIZE") {
            match size.parse::<usize>() {
                Ok(n) => {
                    self.payload_size = n;
                    info!("Payload size overridden by environment: {}", n);
                }
                Err(_) => warn!("Ignoring NETSOCKETS_PAYLOAD_SIZE={:?}", size),
            }
        }

        if let Ok(tick) = std::env::var("NETSOCKETS_TICK") {
            info!("Tick interval overridden by environment: {}", tick);
            self.tick = tick;
        }
    }
}
