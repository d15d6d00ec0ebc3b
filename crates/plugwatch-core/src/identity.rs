//! 设备标识构建
//!
//! - tty 且有 `usb`/`usb_interface` 祖先：使用该接口构建 USB 形式
//! - tty 且没有：`serial:<sysname>`
//! - usb：直接以该设备构建 USB 形式
//!
//! USB 形式的 vendor / product / serial 来自最近的 `usb`/`usb_device` 祖先
//! （物理设备，而不是接口本身）。

use crate::error::LookupError;
use plugwatch_registry::DeviceNode;
use plugwatch_types::Identity;
use plugwatch_types::names::{
    DEVTYPE_USB_DEVICE, DEVTYPE_USB_INTERFACE, SUBSYSTEM_TTY, SUBSYSTEM_USB, attr,
};

/// 设备标识
pub fn identity_of<D: DeviceNode>(device: &D) -> Result<Identity, LookupError> {
    if device.has_subsystem(SUBSYSTEM_TTY) {
        match device.ancestor(SUBSYSTEM_USB, Some(DEVTYPE_USB_INTERFACE)) {
            Some(interface) => usb_identity(&interface),
            None => Ok(Identity::serial(device.sysname().to_string_lossy())),
        }
    } else if device.has_subsystem(SUBSYSTEM_USB) {
        usb_identity(device)
    } else {
        Err(LookupError::UnsupportedSubsystem {
            path: device.syspath().to_path_buf(),
            subsystem: device
                .subsystem()
                .map(|s| s.to_string_lossy().into_owned()),
        })
    }
}

fn usb_identity<D: DeviceNode>(interface: &D) -> Result<Identity, LookupError> {
    let unresolvable = |what| LookupError::Unresolvable {
        path: interface.syspath().to_path_buf(),
        what,
    };

    let physical = interface
        .ancestor(SUBSYSTEM_USB, Some(DEVTYPE_USB_DEVICE))
        .ok_or_else(|| unresolvable("usb_device ancestor"))?;

    let vendor_id = physical
        .attribute_string(attr::ID_VENDOR)
        .ok_or_else(|| unresolvable(attr::ID_VENDOR))?;
    let product_id = physical
        .attribute_string(attr::ID_PRODUCT)
        .ok_or_else(|| unresolvable(attr::ID_PRODUCT))?;

    Ok(Identity::usb(
        interface.sysname().to_string_lossy(),
        vendor_id,
        product_id,
        physical.attribute_string(attr::SERIAL),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwatch_registry::MockDevice;

    fn physical(serial: Option<&str>) -> MockDevice {
        let device = MockDevice::new("/sys/devices/usb1/1-1")
            .subsystem("usb")
            .devtype("usb_device")
            .attr("idVendor", "1a2b")
            .attr("idProduct", "3c4d");
        match serial {
            Some(serial) => device.attr("serial", serial),
            None => device,
        }
    }

    fn interface(serial: Option<&str>) -> MockDevice {
        MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0")
            .subsystem("usb")
            .devtype("usb_interface")
            .parent(physical(serial))
    }

    #[test]
    fn test_usb_tty_uses_interface_location() {
        let tty = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0")
            .subsystem("tty")
            .parent(interface(Some("A50285BI")));
        assert_eq!(
            identity_of(&tty).unwrap().to_string(),
            "usb:1-1:1.0:1a2b:3c4d:A50285BI"
        );
    }

    #[test]
    fn test_usb_without_serial_keeps_trailing_separator() {
        // 位置就是传入设备的 sysname
        let device = MockDevice::new("/sys/devices/usb1/1-1")
            .subsystem("usb")
            .devtype("usb_interface")
            .parent(
                MockDevice::new("/sys/devices/usb1")
                    .subsystem("usb")
                    .devtype("usb_device")
                    .attr("idVendor", "1a2b")
                    .attr("idProduct", "3c4d"),
            );
        assert_eq!(identity_of(&device).unwrap().to_string(), "usb:1-1:1a2b:3c4d:");
    }

    #[test]
    fn test_plain_tty_is_serial_form() {
        let tty = MockDevice::new("/sys/devices/platform/soc/tty/ttyAMA0").subsystem("tty");
        assert_eq!(identity_of(&tty).unwrap().to_string(), "serial:ttyAMA0");
    }

    #[test]
    fn test_missing_usb_device_ancestor_is_unresolvable() {
        let orphan = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0")
            .subsystem("usb")
            .devtype("usb_interface");
        assert!(matches!(
            identity_of(&orphan),
            Err(LookupError::Unresolvable { what: "usb_device ancestor", .. })
        ));
    }

    #[test]
    fn test_missing_vendor_is_unresolvable() {
        let device = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0")
            .subsystem("usb")
            .devtype("usb_interface")
            .parent(
                MockDevice::new("/sys/devices/usb1/1-1")
                    .subsystem("usb")
                    .devtype("usb_device")
                    .attr("idProduct", "3c4d"),
            );
        assert!(matches!(
            identity_of(&device),
            Err(LookupError::Unresolvable { what: "idVendor", .. })
        ));
    }

    #[test]
    fn test_unsupported_subsystem() {
        let input = MockDevice::new("/sys/devices/input/event0").subsystem("input");
        match identity_of(&input) {
            Err(LookupError::UnsupportedSubsystem { subsystem, .. }) => {
                assert_eq!(subsystem.as_deref(), Some("input"));
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_identity_is_deterministic() {
        let tty = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0")
            .subsystem("tty")
            .parent(interface(None));
        assert_eq!(identity_of(&tty).unwrap(), identity_of(&tty).unwrap());
    }
}
