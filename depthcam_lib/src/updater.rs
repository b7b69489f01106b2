//! Drive a firmware update from admission to the terminal result
//!
//! The control thread admits the request synchronously (classification,
//! image selection, the enter-update-mode command), then a background worker
//! re-enumerates the device, streams the image and posts progress plus
//! exactly one terminal event back over a channel. A single worker slot
//! enforces the one-session-at-a-time invariant structurally.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::classify::{classify, DeviceClass};
use crate::product::{self, FirmwareImageId};
use crate::sdk::{CameraInfo, Device, DeviceContext, DeviceList, SdkError};
use crate::store::FirmwareStore;
use crate::version::VersionError;

/// How often and how long to re-query the device list while waiting for the
/// unit to come back in update mode
const REENUMERATE_ATTEMPTS: u32 = 8;
const REENUMERATE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateError {
    /// No firmware image applies to the connected device
    UnsupportedDevice,
    /// Device reported a version string that cannot be parsed or compared
    MalformedVersionString(String),
    /// Device did not re-enumerate after the update-mode request
    DeviceNotFoundAfterModeSwitch,
    /// I/O or protocol failure while reading or transferring the image,
    /// with the underlying cause
    TransferFailure(String),
    /// An update session is already running
    ConcurrentUpdateRejected,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::UnsupportedDevice => {
                write!(f, "FW update is not supported for the connected device")
            }
            UpdateError::MalformedVersionString(cause) => {
                write!(f, "Malformed firmware version: {}", cause)
            }
            UpdateError::DeviceNotFoundAfterModeSwitch => {
                write!(f, "Device not found after update mode switch")
            }
            UpdateError::TransferFailure(cause) => write!(f, "Firmware update failed: {}", cause),
            UpdateError::ConcurrentUpdateRejected => {
                write!(f, "A firmware update is already in progress")
            }
        }
    }
}

impl From<VersionError> for UpdateError {
    fn from(e: VersionError) -> Self {
        UpdateError::MalformedVersionString(e.to_string())
    }
}

impl From<SdkError> for UpdateError {
    fn from(e: SdkError) -> Self {
        UpdateError::TransferFailure(e.to_string())
    }
}

pub type UpdateResult<T> = Result<T, UpdateError>;

/// Session states, in order of progression. Succeeded and Failed are
/// terminal; the session is discarded either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    AwaitingDeviceInUpdateMode,
    Transferring,
    Succeeded,
    Failed,
}

/// Events the worker posts back to the control thread. Zero or more
/// Progress events, then exactly one terminal event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// Monotonically non-decreasing fraction in [0.0, 1.0]
    Progress(f32),
    Succeeded,
    Failed(UpdateError),
}

enum ImageSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Single-slot executor for update sessions. At most one session is active
/// at a time; a second request is rejected, never queued.
pub struct Updater {
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Arc<Mutex<UpdateState>>,
    reenumerate_attempts: u32,
    reenumerate_delay: Duration,
}

impl Default for Updater {
    fn default() -> Self {
        Updater::new()
    }
}

impl Updater {
    pub fn new() -> Self {
        Updater::with_poll(REENUMERATE_ATTEMPTS, REENUMERATE_DELAY)
    }

    /// Custom re-enumeration polling, mainly to keep tests fast
    pub fn with_poll(attempts: u32, delay: Duration) -> Self {
        Updater {
            worker: Mutex::new(None),
            state: Arc::new(Mutex::new(UpdateState::Idle)),
            reenumerate_attempts: attempts,
            reenumerate_delay: delay,
        }
    }

    pub fn state(&self) -> UpdateState {
        *self.state.lock().unwrap()
    }

    /// Admit an update request and start the session.
    ///
    /// Classification, image selection and the enter-update-mode command run
    /// on the caller's thread with a scoped device handle; unsupported
    /// devices and a busy slot are rejected synchronously without spawning a
    /// worker. Everything after the mode switch happens on the worker, which
    /// re-opens its own handle and reports through the returned receiver.
    pub fn start(
        &self,
        ctx: Arc<dyn DeviceContext>,
        serial: Option<&str>,
        image_override: Option<Vec<u8>>,
        store: &FirmwareStore,
    ) -> UpdateResult<Receiver<UpdateEvent>> {
        let mut slot = self.worker.lock().unwrap();
        if let Some(handle) = slot.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                *slot = Some(handle);
                return Err(UpdateError::ConcurrentUpdateRejected);
            }
        }

        // Scoped inspection; the handle is released before the worker starts
        let (source, needs_mode_switch, serial_hint) = {
            let list = ctx.query_devices(product::ANY)?;
            let device = open_selected(list.as_ref(), serial)?;
            match classify(device.as_ref()) {
                DeviceClass::NotUpdatable => return Err(UpdateError::UnsupportedDevice),
                DeviceClass::AlreadyInUpdateMode => {
                    // No identity change ahead, the worker can re-open the
                    // same unit by serial
                    let hint = device.get_info(CameraInfo::SerialNumber).ok();
                    (resolve_image(device.as_ref(), image_override, store)?, false, hint)
                }
                DeviceClass::UpdatableWithImage(image) => {
                    let source = match image_override {
                        Some(bytes) => ImageSource::Bytes(bytes),
                        None => ImageSource::File(store.path_for(image)),
                    };
                    device.enter_update_mode()?;
                    (source, true, None)
                }
            }
        };

        *self.state.lock().unwrap() = if needs_mode_switch {
            UpdateState::AwaitingDeviceInUpdateMode
        } else {
            UpdateState::Transferring
        };

        let (tx, rx) = channel();
        let state = Arc::clone(&self.state);
        let attempts = if needs_mode_switch {
            self.reenumerate_attempts
        } else {
            1
        };
        let delay = self.reenumerate_delay;
        let handle = thread::spawn(move || {
            let result = run_session(
                ctx.as_ref(),
                &tx,
                &state,
                source,
                serial_hint,
                attempts,
                delay,
            );
            let terminal = match result {
                Ok(()) => {
                    info!("Firmware update process finished successfully");
                    *state.lock().unwrap() = UpdateState::Succeeded;
                    UpdateEvent::Succeeded
                }
                Err(e) => {
                    error!("Firmware update process failed, error: {}", e);
                    *state.lock().unwrap() = UpdateState::Failed;
                    UpdateEvent::Failed(e)
                }
            };
            let _ = tx.send(terminal);
        });
        *slot = Some(handle);
        Ok(rx)
    }

    /// Block until the current session, if any, has posted its terminal event
    pub fn wait(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Open the device to update: by serial if one was given, else the first
fn open_selected(list: &dyn DeviceList, serial: Option<&str>) -> UpdateResult<Box<dyn Device>> {
    if list.count() == 0 {
        return Err(UpdateError::TransferFailure("No device connected".to_string()));
    }
    let serial = match serial {
        None => return Ok(list.open(0)?),
        Some(serial) => serial,
    };
    for index in 0..list.count() {
        let device = list.open(index)?;
        if device.get_info(CameraInfo::SerialNumber).ok().as_deref() == Some(serial) {
            return Ok(device);
        }
    }
    Err(UpdateError::TransferFailure(format!(
        "No device with serial number {}",
        serial
    )))
}

/// Image for a device that is already in update mode. The recovery handle's
/// product line decides unless an explicit image was supplied.
fn resolve_image(
    device: &dyn Device,
    image_override: Option<Vec<u8>>,
    store: &FirmwareStore,
) -> UpdateResult<ImageSource> {
    if let Some(bytes) = image_override {
        return Ok(ImageSource::Bytes(bytes));
    }
    let line = device
        .get_info(CameraInfo::ProductLine)
        .map_err(|_| UpdateError::UnsupportedDevice)?;
    match FirmwareImageId::for_product_line(&line) {
        Some(image) => Ok(ImageSource::File(store.path_for(image))),
        None => Err(UpdateError::UnsupportedDevice),
    }
}

fn run_session(
    ctx: &dyn DeviceContext,
    tx: &Sender<UpdateEvent>,
    state: &Mutex<UpdateState>,
    source: ImageSource,
    serial_hint: Option<String>,
    attempts: u32,
    delay: Duration,
) -> UpdateResult<()> {
    // Loaded once per attempt; a read failure is a terminal transfer failure
    let image = match source {
        ImageSource::Bytes(bytes) => bytes,
        ImageSource::File(path) => fs::read(&path).map_err(|e| {
            UpdateError::TransferFailure(format!(
                "Failed to read firmware image {}: {}",
                path.display(),
                e
            ))
        })?,
    };

    let device = find_update_device(ctx, serial_hint.as_deref(), attempts, delay)?
        .ok_or(UpdateError::DeviceNotFoundAfterModeSwitch)?;
    *state.lock().unwrap() = UpdateState::Transferring;

    let update_device = device
        .as_update_device()
        .ok_or_else(|| UpdateError::TransferFailure("Handle lost update capability".to_string()))?;

    // Observable progress never goes backwards, whatever the backend reports
    let mut last = 0.0f32;
    let mut progress = |fraction: f32| {
        let fraction = fraction.clamp(0.0, 1.0).max(last);
        last = fraction;
        let _ = tx.send(UpdateEvent::Progress(fraction));
    };
    update_device
        .update(&image, &mut progress)
        .map_err(|e| UpdateError::TransferFailure(e.to_string()))?;
    Ok(())
}

/// Poll the device list for a unit in update mode. After a mode switch the
/// unit may come back under a different transport identity, so without a
/// serial hint the first update-mode handle found is taken.
fn find_update_device(
    ctx: &dyn DeviceContext,
    serial: Option<&str>,
    attempts: u32,
    delay: Duration,
) -> UpdateResult<Option<Box<dyn Device>>> {
    for attempt in 0..attempts {
        if attempt > 0 {
            thread::sleep(delay);
        }
        let list = ctx.query_devices(product::ANY)?;
        for index in 0..list.count() {
            let device = list.open(index)?;
            if classify(device.as_ref()) != DeviceClass::AlreadyInUpdateMode {
                continue;
            }
            match serial {
                Some(serial)
                    if device.get_info(CameraInfo::SerialNumber).ok().as_deref()
                        != Some(serial) =>
                {
                    continue
                }
                _ => return Ok(Some(device)),
            }
        }
        debug!(
            "No device in update mode yet (attempt {}/{})",
            attempt + 1,
            attempts
        );
    }
    Ok(None)
}
