/// BLE (Bluetooth Low Energy) Transport Module
///
/// Protocol-level abstractions for the BLE bootstrap channel:
///
/// - **bridge**: the native driver interface implemented by Swift/Kotlin bindings
/// - **adapter**: role-checked lifecycle and event normalization over a bridge
/// - **gatt**: the service/characteristic triple both sides must agree on
/// - **scanner**: discovery bookkeeping for the central role
/// - **loopback**: an in-memory link joining a central and a peripheral
///
/// The core logic here is testable without actual BLE hardware.

pub mod adapter;
pub mod bridge;
pub mod gatt;
pub mod loopback;
pub mod scanner;

// Re-export commonly used types
pub use adapter::{AdapterLifecycle, BleRoleAdapter, EventSubscription};
pub use bridge::{BlePlatformBridge, NativeEventListener};
pub use gatt::{
    ChannelConfig, GattCharacteristic, GattError, DEFAULT_INDICATION_UUID,
    DEFAULT_MESSAGING_UUID, DEFAULT_SERVICE_UUID,
};
pub use loopback::{LoopbackBridge, LoopbackLink};
pub use scanner::{ScanList, ScanResult, ScanStatus};
