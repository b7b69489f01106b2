//! Seam to the native camera SDK
//!
//! Enumeration, the USB transport and the update protocol live in the native
//! SDK. This module defines the interface the rest of the crate consumes.
//! [`sim`] provides the in-tree backend used by tests and scenario runs; the
//! native binding implements the same traits out of tree.

pub mod sim;

use std::fmt;

/// Device attributes, queried on demand through an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraInfo {
    Name,
    SerialNumber,
    FirmwareVersion,
    RecommendedFirmwareVersion,
    ProductLine,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SdkError {
    /// Index out of range, or the device disappeared between query and open
    NoSuchDevice(usize),
    /// Attribute not supported by this handle
    InfoNotSupported(CameraInfo),
    /// Transport or protocol error, with cause text from the backend
    DeviceError(String),
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::NoSuchDevice(index) => write!(f, "No device at index {}", index),
            SdkError::InfoNotSupported(info) => {
                write!(f, "Device does not support info {:?}", info)
            }
            SdkError::DeviceError(cause) => write!(f, "Device error: {}", cause),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

/// Handle to one connected unit. Opened for a single inspection or operation
/// and released on drop; never cache one across a mode switch.
pub trait Device {
    fn supports_info(&self, info: CameraInfo) -> bool;
    fn get_info(&self, info: CameraInfo) -> SdkResult<String>;
    /// Ask the device to reboot into update mode. The handle is stale
    /// afterwards; the unit re-enumerates under a new transport identity.
    fn enter_update_mode(&self) -> SdkResult<()>;
    /// Capability cast. Some only for handles already in update mode.
    fn as_update_device(&self) -> Option<&dyn UpdateDevice>;
}

/// Update capability of a device handle in update (recovery) mode
pub trait UpdateDevice {
    /// Stream a firmware image to the device. `progress` is invoked with
    /// fractions in [0.0, 1.0] at backend-defined granularity.
    fn update(&self, image: &[u8], progress: &mut dyn FnMut(f32)) -> SdkResult<()>;
}

/// Snapshot of the devices matching a product-class filter at query time
pub trait DeviceList {
    fn count(&self) -> usize;
    fn open(&self, index: usize) -> SdkResult<Box<dyn Device>>;
}

/// Process-wide SDK context. Shared with the update worker thread.
pub trait DeviceContext: Send + Sync {
    /// `filter` is a product-class bitmask, see [`crate::product`]
    fn query_devices(&self, filter: u8) -> SdkResult<Box<dyn DeviceList>>;
    /// Register the attach/detach listener, replacing any previous one
    fn set_devices_changed_callback(&self, listener: Box<dyn DeviceListener>);
}

/// Attach/detach notifications. Fired from an SDK-owned thread; marshal to
/// the control thread before acting on them.
pub trait DeviceListener: Send {
    fn on_device_attach(&self);
    fn on_device_detach(&self);
}
