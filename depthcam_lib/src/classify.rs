//! Decide what kind of update handling a connected device needs

use crate::product::FirmwareImageId;
use crate::sdk::{CameraInfo, Device};

/// Classification of one device handle with respect to firmware updates.
/// Always re-derived from the handle at hand; the normal-mode and
/// update-mode handles of the same unit are distinct instances with
/// different capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// Handle is already an update-mode (recovery) handle
    AlreadyInUpdateMode,
    /// Normal-mode device whose product line has a firmware image
    UpdatableWithImage(FirmwareImageId),
    /// No firmware image applies to this device
    NotUpdatable,
}

pub fn classify(device: &dyn Device) -> DeviceClass {
    if device.as_update_device().is_some() {
        return DeviceClass::AlreadyInUpdateMode;
    }
    if !device.supports_info(CameraInfo::ProductLine) {
        return DeviceClass::NotUpdatable;
    }
    match device.get_info(CameraInfo::ProductLine) {
        Ok(line) => match FirmwareImageId::for_product_line(&line) {
            Some(image) => DeviceClass::UpdatableWithImage(image),
            None => DeviceClass::NotUpdatable,
        },
        Err(e) => {
            debug!("Product line query failed: {}", e);
            DeviceClass::NotUpdatable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product;
    use crate::sdk::sim::{SimContext, SimDeviceSpec, SimScenario};
    use crate::sdk::DeviceContext;

    fn classify_spec(spec: SimDeviceSpec) -> DeviceClass {
        let ctx = SimContext::new(SimScenario {
            devices: vec![spec],
        });
        let list = ctx.query_devices(product::ANY).unwrap();
        classify(list.open(0).unwrap().as_ref())
    }

    #[test]
    fn d400_maps_to_d4xx_image() {
        let mut spec = SimDeviceSpec::new("Depth Camera D435", "A");
        spec.product_line = Some("D400".to_string());
        assert_eq!(
            classify_spec(spec),
            DeviceClass::UpdatableWithImage(FirmwareImageId::D4xx)
        );
    }

    #[test]
    fn sr300_maps_to_sr3xx_image() {
        let mut spec = SimDeviceSpec::new("SR300", "B");
        spec.product_line = Some("SR300".to_string());
        assert_eq!(
            classify_spec(spec),
            DeviceClass::UpdatableWithImage(FirmwareImageId::Sr3xx)
        );
    }

    #[test]
    fn unknown_product_line_is_not_updatable() {
        let mut spec = SimDeviceSpec::new("Mystery", "C");
        spec.product_line = Some("XYZ".to_string());
        assert_eq!(classify_spec(spec), DeviceClass::NotUpdatable);
    }

    #[test]
    fn absent_product_line_is_not_updatable() {
        assert_eq!(
            classify_spec(SimDeviceSpec::new("Webcam", "D")),
            DeviceClass::NotUpdatable
        );
    }

    #[test]
    fn update_mode_handle_wins_over_product_line() {
        let mut spec = SimDeviceSpec::new("Recovery", "E");
        spec.product_line = Some("D400".to_string());
        spec.update_mode = true;
        assert_eq!(classify_spec(spec), DeviceClass::AlreadyInUpdateMode);
    }
}
