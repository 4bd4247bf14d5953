// Transport module: BLE role adapter over the native central/peripheral driver

pub mod abstraction;
pub mod ble;

pub use abstraction::{AdapterEvent, NativeEvent, Role, TransportError};
pub use ble::{
    BlePlatformBridge, BleRoleAdapter, ChannelConfig, EventSubscription, LoopbackBridge,
    LoopbackLink, ScanList, ScanResult, ScanStatus,
};
