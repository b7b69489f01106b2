//! Simulated SDK backend
//!
//! Stands in for the native SDK in tests and scenario runs. Devices are
//! described by [`SimDeviceSpec`]s, either built in code or loaded from a
//! TOML scenario. Entering update mode re-enumerates the unit under a
//! recovery identity (detach plus attach), like real hardware does.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::product::ProductClass;
use crate::sdk::{
    CameraInfo, Device, DeviceContext, DeviceList, DeviceListener, SdkError, SdkResult,
    UpdateDevice,
};

const TRANSFER_STEPS: u32 = 10;

/// One simulated device
#[derive(Debug, Clone, Deserialize)]
pub struct SimDeviceSpec {
    pub name: String,
    pub serial: String,
    #[serde(default)]
    pub product_line: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub recommended_version: Option<String>,
    /// Device enumerates in update (recovery) mode
    #[serde(default)]
    pub update_mode: bool,
    /// Device disappears instead of re-enumerating after the mode switch
    #[serde(default)]
    pub vanish_on_update_mode: bool,
    /// Report a transport error once transfer progress reaches this fraction
    #[serde(default)]
    pub fail_transfer_at: Option<f32>,
    /// Sleep per transfer step, to exercise concurrent requests
    #[serde(default)]
    pub transfer_delay_ms: u64,
}

impl SimDeviceSpec {
    pub fn new(name: &str, serial: &str) -> Self {
        SimDeviceSpec {
            name: name.to_string(),
            serial: serial.to_string(),
            product_line: None,
            firmware_version: None,
            recommended_version: None,
            update_mode: false,
            vanish_on_update_mode: false,
            fail_transfer_at: None,
            transfer_delay_ms: 0,
        }
    }

    fn class_bits(&self) -> u8 {
        if self.update_mode {
            return ProductClass::D400Recovery as u8;
        }
        match self.product_line.as_deref() {
            Some("D400") => ProductClass::D400 as u8,
            Some("SR300") => ProductClass::Sr300 as u8,
            Some("L500") => ProductClass::L500 as u8,
            Some("T200") => ProductClass::T200 as u8,
            _ => ProductClass::NonVendor as u8,
        }
    }
}

/// Device set for a scenario run, loadable from TOML:
///
/// ```toml
/// [[device]]
/// name = "Depth Camera D435"
/// serial = "001122334455"
/// product_line = "D400"
/// firmware_version = "5.11.1.0"
/// recommended_version = "5.12.7.100"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct SimScenario {
    #[serde(default, rename = "device")]
    pub devices: Vec<SimDeviceSpec>,
}

impl SimScenario {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

struct SimInner {
    devices: Mutex<Vec<SimDeviceSpec>>,
    listener: Mutex<Option<Box<dyn DeviceListener>>>,
    /// (serial, image) per completed transfer
    flashed: Mutex<Vec<(String, Vec<u8>)>>,
}

/// Simulated process-wide device context. Clones share state, so a test can
/// keep one clone for assertions while the updater owns another.
#[derive(Clone)]
pub struct SimContext {
    inner: Arc<SimInner>,
}

impl SimContext {
    pub fn new(scenario: SimScenario) -> Self {
        SimContext {
            inner: Arc::new(SimInner {
                devices: Mutex::new(scenario.devices),
                listener: Mutex::new(None),
                flashed: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn empty() -> Self {
        SimContext::new(SimScenario::default())
    }

    /// Plug in a device and fire the attach notification
    pub fn attach(&self, spec: SimDeviceSpec) {
        self.inner.devices.lock().unwrap().push(spec);
        self.notify(|l| l.on_device_attach());
    }

    /// Unplug the device with the given serial and fire the detach
    /// notification
    pub fn detach(&self, serial: &str) {
        self.inner
            .devices
            .lock()
            .unwrap()
            .retain(|d| d.serial != serial);
        self.notify(|l| l.on_device_detach());
    }

    /// Completed transfers, for assertions
    pub fn flashed(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.flashed.lock().unwrap().clone()
    }

    fn notify(&self, f: impl Fn(&dyn DeviceListener)) {
        let listener = self.inner.listener.lock().unwrap();
        if let Some(listener) = listener.as_ref() {
            f(listener.as_ref());
        }
    }

    fn switch_to_update_mode(&self, serial: &str) {
        let vanished = {
            let mut devices = self.inner.devices.lock().unwrap();
            match devices.iter_mut().find(|d| d.serial == serial) {
                Some(dev) if dev.vanish_on_update_mode => {
                    devices.retain(|d| d.serial != serial);
                    true
                }
                Some(dev) => {
                    // The unit comes back under a different transport identity
                    dev.update_mode = true;
                    dev.serial = format!("{}-rec", dev.serial);
                    false
                }
                None => return,
            }
        };
        // Lock released before callbacks fire, like the SDK's own thread would
        self.notify(|l| l.on_device_detach());
        if !vanished {
            self.notify(|l| l.on_device_attach());
        }
    }

    fn record_flash(&self, serial: &str, image: &[u8]) {
        self.inner
            .flashed
            .lock()
            .unwrap()
            .push((serial.to_string(), image.to_vec()));
    }
}

impl DeviceContext for SimContext {
    fn query_devices(&self, filter: u8) -> SdkResult<Box<dyn DeviceList>> {
        let devices: Vec<SimDeviceSpec> = self
            .inner
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.class_bits() & filter != 0)
            .cloned()
            .collect();
        trace!("query_devices({:#04X}) -> {} devices", filter, devices.len());
        Ok(Box::new(SimDeviceList {
            ctx: self.clone(),
            devices,
        }))
    }

    fn set_devices_changed_callback(&self, listener: Box<dyn DeviceListener>) {
        *self.inner.listener.lock().unwrap() = Some(listener);
    }
}

struct SimDeviceList {
    ctx: SimContext,
    devices: Vec<SimDeviceSpec>,
}

impl DeviceList for SimDeviceList {
    fn count(&self) -> usize {
        self.devices.len()
    }

    fn open(&self, index: usize) -> SdkResult<Box<dyn Device>> {
        let spec = self
            .devices
            .get(index)
            .ok_or(SdkError::NoSuchDevice(index))?
            .clone();
        Ok(Box::new(SimDevice {
            ctx: self.ctx.clone(),
            spec,
        }))
    }
}

/// Open handle to a simulated device. Holds a snapshot of the spec; a mode
/// switch invalidates it just like a real handle.
struct SimDevice {
    ctx: SimContext,
    spec: SimDeviceSpec,
}

impl SimDevice {
    fn info(&self, info: CameraInfo) -> Option<&str> {
        match info {
            CameraInfo::Name => Some(&self.spec.name),
            CameraInfo::SerialNumber => Some(&self.spec.serial),
            CameraInfo::FirmwareVersion => self.spec.firmware_version.as_deref(),
            CameraInfo::RecommendedFirmwareVersion => self.spec.recommended_version.as_deref(),
            CameraInfo::ProductLine => self.spec.product_line.as_deref(),
        }
    }
}

impl Device for SimDevice {
    fn supports_info(&self, info: CameraInfo) -> bool {
        self.info(info).is_some()
    }

    fn get_info(&self, info: CameraInfo) -> SdkResult<String> {
        self.info(info)
            .map(str::to_string)
            .ok_or(SdkError::InfoNotSupported(info))
    }

    fn enter_update_mode(&self) -> SdkResult<()> {
        if self.spec.update_mode {
            return Err(SdkError::DeviceError(
                "device is already in update mode".to_string(),
            ));
        }
        debug!("{}: entering update mode", self.spec.serial);
        self.ctx.switch_to_update_mode(&self.spec.serial);
        Ok(())
    }

    fn as_update_device(&self) -> Option<&dyn UpdateDevice> {
        if self.spec.update_mode {
            Some(self)
        } else {
            None
        }
    }
}

impl UpdateDevice for SimDevice {
    fn update(&self, image: &[u8], progress: &mut dyn FnMut(f32)) -> SdkResult<()> {
        for step in 1..=TRANSFER_STEPS {
            if self.spec.transfer_delay_ms > 0 {
                thread::sleep(Duration::from_millis(self.spec.transfer_delay_ms));
            }
            let fraction = step as f32 / TRANSFER_STEPS as f32;
            if let Some(fail_at) = self.spec.fail_transfer_at {
                if fraction >= fail_at {
                    return Err(SdkError::DeviceError(format!(
                        "transfer interrupted at {}%",
                        (fraction * 100.0) as u32
                    )));
                }
            }
            progress(fraction);
        }
        self.ctx.record_flash(&self.spec.serial, image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product;

    fn d400(serial: &str) -> SimDeviceSpec {
        let mut spec = SimDeviceSpec::new("Depth Camera D435", serial);
        spec.product_line = Some("D400".to_string());
        spec.firmware_version = Some("5.11.1.0".to_string());
        spec.recommended_version = Some("5.12.7.100".to_string());
        spec
    }

    #[test]
    fn scenario_toml_round_trip() {
        let scenario = SimScenario::from_toml(
            r#"
            [[device]]
            name = "Depth Camera D435"
            serial = "001122334455"
            product_line = "D400"
            firmware_version = "5.11.1.0"
            recommended_version = "5.12.7.100"

            [[device]]
            name = "Recovered unit"
            serial = "998877665544"
            product_line = "D400"
            update_mode = true
            "#,
        )
        .unwrap();
        assert_eq!(scenario.devices.len(), 2);
        assert_eq!(scenario.devices[0].serial, "001122334455");
        assert!(!scenario.devices[0].update_mode);
        assert!(scenario.devices[1].update_mode);
    }

    #[test]
    fn query_filter_separates_recovery_from_depth() {
        let ctx = SimContext::new(SimScenario::default());
        ctx.inner.devices.lock().unwrap().push(d400("A"));
        let mut rec = d400("B");
        rec.update_mode = true;
        ctx.inner.devices.lock().unwrap().push(rec);

        assert_eq!(ctx.query_devices(product::DEPTH).unwrap().count(), 1);
        assert_eq!(
            ctx.query_devices(ProductClass::D400Recovery as u8)
                .unwrap()
                .count(),
            1
        );
        assert_eq!(ctx.query_devices(product::ANY).unwrap().count(), 2);
    }

    #[test]
    fn mode_switch_reenumerates_under_new_identity() {
        let ctx = SimContext::new(SimScenario {
            devices: vec![d400("A")],
        });
        let list = ctx.query_devices(product::ANY).unwrap();
        let device = list.open(0).unwrap();
        assert!(device.as_update_device().is_none());
        device.enter_update_mode().unwrap();

        let list = ctx.query_devices(product::ANY).unwrap();
        assert_eq!(list.count(), 1);
        let device = list.open(0).unwrap();
        assert!(device.as_update_device().is_some());
        assert_eq!(
            device.get_info(CameraInfo::SerialNumber).unwrap(),
            "A-rec"
        );
    }
}
