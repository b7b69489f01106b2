//! List connected cameras directly over USB
//!
//! Works without the native SDK; reads nothing but descriptors. Units in
//! recovery (update) mode enumerate under a dedicated product id.

pub const VENDOR_VID: u16 = 0x8086;
pub const D4XX_RECOVERY_PID: u16 = 0x0ADB;
pub const SR300_RECOVERY_PID: u16 = 0x0AB3;

pub fn is_recovery_pid(pid: u16) -> bool {
    pid == D4XX_RECOVERY_PID || pid == SR300_RECOVERY_PID
}

/// Get and print name and firmware version of connected cameras
pub fn print_usb_devices() -> Result<(), rusb::Error> {
    let mut found = false;
    for dev in rusb::devices()?.iter() {
        let dev_descriptor = dev.device_descriptor()?;
        if dev_descriptor.vendor_id() != VENDOR_VID {
            debug!(
                "Skipping {:04X}:{:04X}",
                dev_descriptor.vendor_id(),
                dev_descriptor.product_id()
            );
            continue;
        }
        let handle = match dev.open() {
            Ok(handle) => handle,
            Err(e) => {
                debug!(
                    "Failed to open {:04X}:{:04X}: {}",
                    dev_descriptor.vendor_id(),
                    dev_descriptor.product_id(),
                    e
                );
                continue;
            }
        };
        found = true;

        let i_product = dev_descriptor
            .product_string_index()
            .and_then(|x| handle.read_string_descriptor_ascii(x).ok());
        println!("{}", i_product.unwrap_or_default());
        if is_recovery_pid(dev_descriptor.product_id()) {
            println!("  In recovery (update) mode");
        }
        println!("  USB Firmware Version: {}", dev_descriptor.device_version());
    }
    if !found {
        println!("No cameras found on the USB bus");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_pids() {
        assert!(is_recovery_pid(D4XX_RECOVERY_PID));
        assert!(is_recovery_pid(SR300_RECOVERY_PID));
        assert!(!is_recovery_pid(0x0B07));
    }
}
