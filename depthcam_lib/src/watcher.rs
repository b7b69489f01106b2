//! React to device attach/detach and re-derive the applicable state
//!
//! Every attach re-runs the validation from scratch; a detach falls back to
//! waiting for a device immediately. An in-flight update session is not
//! cancelled from here, a detach during transfer surfaces as a transfer
//! failure from the transport.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::classify::{classify, DeviceClass};
use crate::product;
use crate::sdk::{CameraInfo, DeviceContext, DeviceListener};
use crate::updater::UpdateResult;
use crate::version::{is_update_required, FirmwareVersion};

/// What the control thread should do with the currently connected device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// No device connected
    WaitingForDevice,
    /// A device is in update (recovery) mode and awaits flashing
    InUpdateMode,
    /// Connected device runs firmware older than recommended
    UpdateRequired { current: String, recommended: String },
    /// Device validated, normal operation can proceed
    Ready { name: String, firmware: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Attached,
    Detached,
}

/// Re-derive the applicable state from the current device list. Nothing is
/// cached; the decision is taken from scratch on every call.
pub fn validate_device(ctx: &dyn DeviceContext) -> UpdateResult<WatchState> {
    let list = ctx.query_devices(product::ANY)?;
    if list.count() == 0 {
        return Ok(WatchState::WaitingForDevice);
    }
    let device = list.open(0)?;
    if classify(device.as_ref()) == DeviceClass::AlreadyInUpdateMode {
        return Ok(WatchState::InUpdateMode);
    }
    let name = device
        .get_info(CameraInfo::Name)
        .unwrap_or_else(|_| "unknown".to_string());
    let firmware = device.get_info(CameraInfo::FirmwareVersion)?;
    if device.supports_info(CameraInfo::RecommendedFirmwareVersion) {
        let recommended = device.get_info(CameraInfo::RecommendedFirmwareVersion)?;
        let current: FirmwareVersion = firmware.parse()?;
        let minimum: FirmwareVersion = recommended.parse()?;
        if is_update_required(&current, &minimum)? {
            return Ok(WatchState::UpdateRequired {
                current: firmware,
                recommended,
            });
        }
    }
    Ok(WatchState::Ready { name, firmware })
}

struct ChannelListener(Sender<WatchEvent>);

impl DeviceListener for ChannelListener {
    fn on_device_attach(&self) {
        let _ = self.0.send(WatchEvent::Attached);
    }

    fn on_device_detach(&self) {
        let _ = self.0.send(WatchEvent::Detached);
    }
}

/// Marshals SDK attach/detach callbacks onto the control thread
pub struct Watcher {
    ctx: Arc<dyn DeviceContext>,
    events: Receiver<WatchEvent>,
}

impl Watcher {
    pub fn register(ctx: Arc<dyn DeviceContext>) -> Watcher {
        let (tx, rx) = channel();
        ctx.set_devices_changed_callback(Box::new(ChannelListener(tx)));
        Watcher { ctx, events: rx }
    }

    /// State before any event has arrived
    pub fn current_state(&self) -> UpdateResult<WatchState> {
        validate_device(self.ctx.as_ref())
    }

    /// Block until the next attach/detach and return the re-derived state.
    /// None once the event source is gone.
    pub fn next_state(&self) -> Option<UpdateResult<WatchState>> {
        match self.events.recv() {
            Ok(WatchEvent::Detached) => Some(Ok(WatchState::WaitingForDevice)),
            Ok(WatchEvent::Attached) => Some(validate_device(self.ctx.as_ref())),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::sim::{SimContext, SimDeviceSpec, SimScenario};
    use crate::updater::UpdateError;

    fn d400(fw: &str, recommended: &str) -> SimDeviceSpec {
        let mut spec = SimDeviceSpec::new("Depth Camera D435", "A");
        spec.product_line = Some("D400".to_string());
        spec.firmware_version = Some(fw.to_string());
        spec.recommended_version = Some(recommended.to_string());
        spec
    }

    #[test]
    fn no_device_means_waiting() {
        let ctx = SimContext::empty();
        assert_eq!(
            validate_device(&ctx).unwrap(),
            WatchState::WaitingForDevice
        );
    }

    #[test]
    fn attach_revalidates_and_detach_resets() {
        let ctx = SimContext::empty();
        let watcher = Watcher::register(Arc::new(ctx.clone()));
        assert_eq!(
            watcher.current_state().unwrap(),
            WatchState::WaitingForDevice
        );

        ctx.attach(d400("5.12.7.100", "5.12.7.100"));
        assert_eq!(
            watcher.next_state().unwrap().unwrap(),
            WatchState::Ready {
                name: "Depth Camera D435".to_string(),
                firmware: "5.12.7.100".to_string(),
            }
        );

        ctx.detach("A");
        assert_eq!(
            watcher.next_state().unwrap().unwrap(),
            WatchState::WaitingForDevice
        );
    }

    #[test]
    fn outdated_firmware_requires_update() {
        let ctx = SimContext::empty();
        let watcher = Watcher::register(Arc::new(ctx.clone()));
        ctx.attach(d400("5.11.1.0", "5.12.7.100"));
        assert_eq!(
            watcher.next_state().unwrap().unwrap(),
            WatchState::UpdateRequired {
                current: "5.11.1.0".to_string(),
                recommended: "5.12.7.100".to_string(),
            }
        );
    }

    #[test]
    fn newer_firmware_passes_the_gate() {
        let ctx = SimContext::empty();
        ctx.attach(d400("2.10.0", "2.9.5"));
        assert!(matches!(
            validate_device(&ctx).unwrap(),
            WatchState::Ready { .. }
        ));
    }

    #[test]
    fn device_without_recommended_version_is_ready() {
        let ctx = SimContext::empty();
        let mut spec = SimDeviceSpec::new("Tracker", "T");
        spec.product_line = Some("T200".to_string());
        spec.firmware_version = Some("0.2.0.951".to_string());
        ctx.attach(spec);
        assert_eq!(
            validate_device(&ctx).unwrap(),
            WatchState::Ready {
                name: "Tracker".to_string(),
                firmware: "0.2.0.951".to_string(),
            }
        );
    }

    #[test]
    fn update_mode_device_is_reported_as_such() {
        let mut spec = SimDeviceSpec::new("Recovery", "R");
        spec.update_mode = true;
        let ctx = SimContext::new(SimScenario {
            devices: vec![spec],
        });
        assert_eq!(validate_device(&ctx).unwrap(), WatchState::InUpdateMode);
    }

    #[test]
    fn short_device_version_fails_explicitly() {
        let ctx = SimContext::empty();
        ctx.attach(d400("1.2", "1.2.5"));
        assert!(matches!(
            validate_device(&ctx),
            Err(UpdateError::MalformedVersionString(_))
        ));
    }
}
