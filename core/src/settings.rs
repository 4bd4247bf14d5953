//! User-configurable bootstrap settings
//!
//! Settings that control how a device takes part in the BLE bootstrap:
//! - Which role it plays and how the other device was verified
//! - The GATT channel both sides must agree on
//! - Central auto-connect and request form
//! - Peripheral acceptance policy
//! - Agent endpoint and handshake timeout

use crate::transport::{ChannelConfig, Role};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default agent endpoint used to build out-of-band invitation URLs
pub const DEFAULT_AGENT_ENDPOINT: &str = "http://localhost:3000";

/// Upper bound for `handshake_timeout_secs`
pub const MAX_HANDSHAKE_TIMEOUT_SECS: u64 = 3600;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors that can occur during settings validation or persistence
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid agent endpoint: {0:?}")]
    InvalidEndpoint(String),

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error(
        "Invalid handshake timeout: must be <= {max}s, got {0}s",
        max = MAX_HANDSHAKE_TIMEOUT_SECS
    )]
    InvalidTimeout(u64),

    #[error("Settings I/O failed: {0}")]
    Io(String),

    #[error("Settings parse failed: {0}")]
    Parse(String),
}

// ============================================================================
// ENUMS
// ============================================================================

/// How the two devices recognised each other before going over BLE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationMethod {
    /// The channel UUIDs came from a scanned QR code
    QrCode,
    /// Plain BLE discovery with the default channel
    Bluetooth,
}

impl std::fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QrCode => write!(f, "QrCode"),
            Self::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// Form of the Central's connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStyle {
    /// `connection <peer>`
    Addressed,
    /// `<STD>0`
    Standard,
}

/// What the Peripheral does with an incoming connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptancePolicy {
    /// Start the invitation exchange straight away
    Automatic,
    /// Wait for the application to accept or reject
    Manual,
}

// ============================================================================
// ROLE SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralSettings {
    /// Connect to the first discovered peripheral without asking
    pub auto_connect: bool,
    pub request_style: RequestStyle,
}

impl Default for CentralSettings {
    fn default() -> Self {
        Self {
            auto_connect: true,
            request_style: RequestStyle::Addressed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralSettings {
    pub acceptance: AcceptancePolicy,
}

impl Default for PeripheralSettings {
    fn default() -> Self {
        Self {
            acceptance: AcceptancePolicy::Automatic,
        }
    }
}

// ============================================================================
// BOOTSTRAP SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub role: Role,
    pub verification: VerificationMethod,
    /// Channel shared through a QR code. Only used with `QrCode` verification.
    pub channel: ChannelConfig,
    pub central: CentralSettings,
    pub peripheral: PeripheralSettings,
    /// Base URL of the agent's out-of-band endpoint
    pub agent_endpoint: String,
    /// Give up on the handshake after this many seconds (0 = never)
    pub handshake_timeout_secs: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            role: Role::Central,
            verification: VerificationMethod::Bluetooth,
            channel: ChannelConfig::default(),
            central: CentralSettings::default(),
            peripheral: PeripheralSettings::default(),
            agent_endpoint: DEFAULT_AGENT_ENDPOINT.to_string(),
            handshake_timeout_secs: 60,
        }
    }
}

impl BootstrapSettings {
    /// Defaults for the given role
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        let endpoint = self.agent_endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(SettingsError::InvalidEndpoint(self.agent_endpoint.clone()));
        }

        self.channel
            .validate()
            .map_err(|e| SettingsError::InvalidChannel(e.to_string()))?;

        if self.handshake_timeout_secs > MAX_HANDSHAKE_TIMEOUT_SECS {
            return Err(SettingsError::InvalidTimeout(self.handshake_timeout_secs));
        }

        Ok(())
    }

    /// The channel the adapter registers
    pub fn active_channel(&self) -> ChannelConfig {
        match self.verification {
            VerificationMethod::QrCode => self.channel,
            VerificationMethod::Bluetooth => ChannelConfig::default(),
        }
    }

    /// Adopt the channel from a scanned QR payload and switch to QR verification
    pub fn apply_qr_payload(&mut self, payload: &serde_json::Value) -> Result<(), SettingsError> {
        self.channel = ChannelConfig::from_qr_payload(payload)
            .map_err(|e| SettingsError::InvalidChannel(e.to_string()))?;
        self.verification = VerificationMethod::QrCode;
        Ok(())
    }

    /// Payload for the QR code the other device scans
    pub fn qr_payload(&self) -> serde_json::Value {
        self.active_channel().to_qr_payload()
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        match self.handshake_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Load settings from a JSON file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io(e.to_string()))?;
        let settings: Self =
            serde_json::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| SettingsError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_default_settings_valid() {
        let settings = BootstrapSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.agent_endpoint, "http://localhost:3000");
        assert!(settings.central.auto_connect);
        assert_eq!(settings.peripheral.acceptance, AcceptancePolicy::Automatic);
    }

    #[test]
    fn test_invalid_endpoint() {
        for endpoint in ["", "   ", "localhost:3000", "ftp://agent"] {
            let settings = BootstrapSettings {
                agent_endpoint: endpoint.to_string(),
                ..BootstrapSettings::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(SettingsError::InvalidEndpoint(_))
            ));
        }
    }

    #[test]
    fn test_https_endpoint_valid() {
        let settings = BootstrapSettings {
            agent_endpoint: "https://agent.example.com".to_string(),
            ..BootstrapSettings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_channel() {
        let id = Uuid::new_v4();
        let settings = BootstrapSettings {
            channel: ChannelConfig::new(id, id, Uuid::new_v4()),
            ..BootstrapSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidChannel(_))
        ));
    }

    #[test]
    fn test_timeout_bounds() {
        let mut settings = BootstrapSettings::default();
        settings.handshake_timeout_secs = 3600;
        assert!(settings.validate().is_ok());

        settings.handshake_timeout_secs = 3601;
        assert_eq!(settings.validate(), Err(SettingsError::InvalidTimeout(3601)));
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut settings = BootstrapSettings::default();
        settings.handshake_timeout_secs = 0;
        assert_eq!(settings.handshake_timeout(), None);

        settings.handshake_timeout_secs = 30;
        assert_eq!(settings.handshake_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: BootstrapSettings =
            serde_json::from_str(r#"{"role": "Peripheral"}"#).expect("parse");
        assert_eq!(settings.role, Role::Peripheral);
        assert_eq!(settings.channel, ChannelConfig::default());
        assert_eq!(settings.handshake_timeout_secs, 60);
    }

    #[test]
    fn test_bluetooth_uses_default_channel() {
        let settings = BootstrapSettings {
            channel: ChannelConfig::random(),
            ..BootstrapSettings::default()
        };
        assert_eq!(settings.verification, VerificationMethod::Bluetooth);
        assert_eq!(settings.active_channel(), ChannelConfig::default());
    }

    #[test]
    fn test_qr_payload_selects_channel() {
        let mut issuer = BootstrapSettings::for_role(Role::Peripheral);
        issuer.verification = VerificationMethod::QrCode;
        issuer.channel = ChannelConfig::random();

        let mut scanner = BootstrapSettings::for_role(Role::Central);
        scanner
            .apply_qr_payload(&issuer.qr_payload())
            .expect("payload");
        assert_eq!(scanner.verification, VerificationMethod::QrCode);
        assert_eq!(scanner.active_channel(), issuer.active_channel());
        assert_ne!(scanner.active_channel(), ChannelConfig::default());
    }

    #[test]
    fn test_bad_qr_payload_keeps_settings() {
        let mut settings = BootstrapSettings::default();
        let result = settings.apply_qr_payload(&serde_json::json!({"wifi": {}}));
        assert!(matches!(result, Err(SettingsError::InvalidChannel(_))));
        assert_eq!(settings, BootstrapSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");

        let mut settings = BootstrapSettings::for_role(Role::Peripheral);
        settings.verification = VerificationMethod::QrCode;
        settings.channel = ChannelConfig::random();
        settings.peripheral.acceptance = AcceptancePolicy::Manual;

        settings.save_to(&path).expect("save");
        let loaded = BootstrapSettings::load_from(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = BootstrapSettings::load_from(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(matches!(
            BootstrapSettings::load_from(&path),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_save_refuses_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = BootstrapSettings {
            handshake_timeout_secs: 9999,
            ..BootstrapSettings::default()
        };
        assert!(settings.save_to(&dir.path().join("config.json")).is_err());
    }
}
