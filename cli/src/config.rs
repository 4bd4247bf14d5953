// Configuration management for the bifold-ble CLI
//
// Settings are a serialized BootstrapSettings stored in:
// - macOS: ~/Library/Application Support/bifold-ble/config.json
// - Linux: ~/.config/bifold-ble/config.json
// - Windows: %APPDATA%\bifold-ble\config.json

use anyhow::{Context, Result};
use bifold_ble_core::settings::BootstrapSettings;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Keys accepted by `config get` and `config set`
pub const KEYS: &[&str] = &[
    "role",
    "verification",
    "agent_endpoint",
    "handshake_timeout_secs",
    "central.auto_connect",
    "central.request_style",
    "peripheral.acceptance",
    "channel.service_uuid",
    "channel.messaging_uuid",
    "channel.indication_uuid",
];

pub struct Config {
    path: PathBuf,
    pub settings: BootstrapSettings,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("bifold-ble");
        Ok(config_dir)
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the platform location, defaults if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            BootstrapSettings::load_from(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        } else {
            BootstrapSettings::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        self.settings
            .save_to(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Restore defaults and save
    pub fn reset(&mut self) -> Result<()> {
        self.settings = BootstrapSettings::default();
        self.save()
    }

    /// Set a config value. Nothing is saved if the result does not validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut settings = self.settings.clone();
        match key {
            "role" => settings.role = parse_variant(value)?,
            "verification" => settings.verification = parse_variant(value)?,
            "agent_endpoint" => settings.agent_endpoint = value.to_string(),
            "handshake_timeout_secs" => {
                settings.handshake_timeout_secs = value.parse().context("Invalid number")?;
            }
            "central.auto_connect" => {
                settings.central.auto_connect = value.parse().context("Invalid boolean value")?;
            }
            "central.request_style" => settings.central.request_style = parse_variant(value)?,
            "peripheral.acceptance" => settings.peripheral.acceptance = parse_variant(value)?,
            "channel.service_uuid" => settings.channel.service_uuid = parse_uuid(value)?,
            "channel.messaging_uuid" => settings.channel.messaging_uuid = parse_uuid(value)?,
            "channel.indication_uuid" => settings.channel.indication_uuid = parse_uuid(value)?,
            _ => anyhow::bail!("Unknown config key: {} (expected one of {})", key, KEYS.join(", ")),
        }

        settings.validate().context("Rejected config value")?;
        self.settings = settings;
        self.save()
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        let settings = &self.settings;
        match key {
            "role" => Some(variant_name(&settings.role)),
            "verification" => Some(settings.verification.to_string()),
            "agent_endpoint" => Some(settings.agent_endpoint.clone()),
            "handshake_timeout_secs" => Some(settings.handshake_timeout_secs.to_string()),
            "central.auto_connect" => Some(settings.central.auto_connect.to_string()),
            "central.request_style" => Some(variant_name(&settings.central.request_style)),
            "peripheral.acceptance" => Some(variant_name(&settings.peripheral.acceptance)),
            "channel.service_uuid" => Some(settings.channel.service_uuid.to_string()),
            "channel.messaging_uuid" => Some(settings.channel.messaging_uuid.to_string()),
            "channel.indication_uuid" => Some(settings.channel.indication_uuid.to_string()),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }
}

fn parse_variant<T: DeserializeOwned>(value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("Invalid value: {}", value))
}

fn variant_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid UUID: {}", value))
}
