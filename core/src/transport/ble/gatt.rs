/// GATT channel definition for the bootstrap link
///
/// A channel is one service UUID plus two characteristics: the messaging
/// characteristic the central writes to, and the indication characteristic
/// the peripheral notifies on. Both sides must agree on all three before the
/// handshake can start; the values usually travel inside a QR payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default DIDComm-over-BLE service UUID
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0xa422a59a_71fe_11eb_9439_0242ac130002);

/// Default messaging (write) characteristic UUID
pub const DEFAULT_MESSAGING_UUID: Uuid = Uuid::from_u128(0xa422a59a_71fe_11eb_9439_0242ac130003);

/// Default indication (notify) characteristic UUID
pub const DEFAULT_INDICATION_UUID: Uuid = Uuid::from_u128(0xa422a59a_71fe_11eb_9439_0242ac130004);

/// Key of the channel section inside a QR payload
pub const QR_BLUETOOTH_KEY: &str = "bluetooth";

/// GATT characteristic types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GattCharacteristic {
    /// Central writes handshake lines here
    Messaging,
    /// Peripheral indicates handshake lines here
    Indication,
}

impl GattCharacteristic {
    pub fn uuid(&self, channel: &ChannelConfig) -> Uuid {
        match self {
            GattCharacteristic::Messaging => channel.messaging_uuid,
            GattCharacteristic::Indication => channel.indication_uuid,
        }
    }
}

/// Errors for GATT channel definitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error("Service and characteristic UUIDs must differ: {0}")]
    DuplicateUuid(Uuid),
    #[error("QR payload has no {0} section")]
    MissingSection(&'static str),
    #[error("Invalid channel payload: {0}")]
    InvalidPayload(String),
}

/// The service/characteristic triple identifying the bootstrap channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "serviceUUID")]
    pub service_uuid: Uuid,
    #[serde(rename = "messagingUUID")]
    pub messaging_uuid: Uuid,
    #[serde(rename = "indicationUUID")]
    pub indication_uuid: Uuid,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            messaging_uuid: DEFAULT_MESSAGING_UUID,
            indication_uuid: DEFAULT_INDICATION_UUID,
        }
    }
}

impl ChannelConfig {
    pub fn new(service_uuid: Uuid, messaging_uuid: Uuid, indication_uuid: Uuid) -> Self {
        Self {
            service_uuid,
            messaging_uuid,
            indication_uuid,
        }
    }

    /// A fresh random channel, as a QR-code issuer would generate it
    pub fn random() -> Self {
        Self::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    /// All three UUIDs must be distinct
    pub fn validate(&self) -> Result<(), GattError> {
        if self.service_uuid == self.messaging_uuid || self.service_uuid == self.indication_uuid {
            return Err(GattError::DuplicateUuid(self.service_uuid));
        }
        if self.messaging_uuid == self.indication_uuid {
            return Err(GattError::DuplicateUuid(self.messaging_uuid));
        }
        Ok(())
    }

    /// Read the channel out of a scanned QR payload:
    /// `{"bluetooth": {"serviceUUID": .., "messagingUUID": .., "indicationUUID": ..}}`
    pub fn from_qr_payload(payload: &serde_json::Value) -> Result<Self, GattError> {
        let section = payload
            .get(QR_BLUETOOTH_KEY)
            .ok_or(GattError::MissingSection(QR_BLUETOOTH_KEY))?;

        let channel: ChannelConfig = serde_json::from_value(section.clone())
            .map_err(|e| GattError::InvalidPayload(e.to_string()))?;
        channel.validate()?;
        Ok(channel)
    }

    /// The QR payload section advertising this channel
    pub fn to_qr_payload(&self) -> serde_json::Value {
        serde_json::json!({
            QR_BLUETOOTH_KEY: {
                "serviceUUID": self.service_uuid,
                "messagingUUID": self.messaging_uuid,
                "indicationUUID": self.indication_uuid,
            }
        })
    }
}
