//! USB 描述符属性
//!
//! 接口属性来自 USB 接口（USB 转串口取其 `usb`/`usb_interface` 祖先），
//! 设备属性来自接口的 `usb`/`usb_device` 祖先。缺失的属性为 `None`，不是错误；
//! 缺少接口或物理设备祖先时无法解析。

use crate::error::LookupError;
use plugwatch_registry::DeviceNode;
use plugwatch_types::names::{
    DEVTYPE_USB_DEVICE, DEVTYPE_USB_INTERFACE, SUBSYSTEM_TTY, SUBSYSTEM_USB,
    USB_DEVICE_PROPERTY_KEYS, USB_INTERFACE_PROPERTY_KEYS, attr,
};

/// 固定键集合的 USB 属性
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsbProperties {
    pub interface_number: Option<String>,
    pub interface_class: Option<String>,
    pub interface_subclass: Option<String>,
    pub interface_protocol: Option<String>,
    pub interface_name: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub configuration_value: Option<String>,
    pub device_class: Option<String>,
    pub device_subclass: Option<String>,
    pub device_protocol: Option<String>,
}

impl UsbProperties {
    /// 所有键（sysfs 属性名），按报告顺序
    pub const KEYS: [&'static str; 14] = [
        attr::INTERFACE_NUMBER,
        attr::INTERFACE_CLASS,
        attr::INTERFACE_SUBCLASS,
        attr::INTERFACE_PROTOCOL,
        attr::INTERFACE_NAME,
        attr::ID_VENDOR,
        attr::ID_PRODUCT,
        attr::MANUFACTURER,
        attr::PRODUCT,
        attr::SERIAL,
        attr::CONFIGURATION_VALUE,
        attr::DEVICE_CLASS,
        attr::DEVICE_SUBCLASS,
        attr::DEVICE_PROTOCOL,
    ];

    /// 按 sysfs 属性名查询
    pub fn get(&self, key: &str) -> Option<&str> {
        self.slot(key).and_then(|value| value.as_deref())
    }

    /// `(键, 值)`，按报告顺序
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> + '_ {
        Self::KEYS.into_iter().map(|key| (key, self.get(key)))
    }

    fn slot(&self, key: &str) -> Option<&Option<String>> {
        Some(match key {
            attr::INTERFACE_NUMBER => &self.interface_number,
            attr::INTERFACE_CLASS => &self.interface_class,
            attr::INTERFACE_SUBCLASS => &self.interface_subclass,
            attr::INTERFACE_PROTOCOL => &self.interface_protocol,
            attr::INTERFACE_NAME => &self.interface_name,
            attr::ID_VENDOR => &self.vendor_id,
            attr::ID_PRODUCT => &self.product_id,
            attr::MANUFACTURER => &self.manufacturer,
            attr::PRODUCT => &self.product,
            attr::SERIAL => &self.serial,
            attr::CONFIGURATION_VALUE => &self.configuration_value,
            attr::DEVICE_CLASS => &self.device_class,
            attr::DEVICE_SUBCLASS => &self.device_subclass,
            attr::DEVICE_PROTOCOL => &self.device_protocol,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        Some(match key {
            attr::INTERFACE_NUMBER => &mut self.interface_number,
            attr::INTERFACE_CLASS => &mut self.interface_class,
            attr::INTERFACE_SUBCLASS => &mut self.interface_subclass,
            attr::INTERFACE_PROTOCOL => &mut self.interface_protocol,
            attr::INTERFACE_NAME => &mut self.interface_name,
            attr::ID_VENDOR => &mut self.vendor_id,
            attr::ID_PRODUCT => &mut self.product_id,
            attr::MANUFACTURER => &mut self.manufacturer,
            attr::PRODUCT => &mut self.product,
            attr::SERIAL => &mut self.serial,
            attr::CONFIGURATION_VALUE => &mut self.configuration_value,
            attr::DEVICE_CLASS => &mut self.device_class,
            attr::DEVICE_SUBCLASS => &mut self.device_subclass,
            attr::DEVICE_PROTOCOL => &mut self.device_protocol,
            _ => return None,
        })
    }

    fn fill_from<D: DeviceNode>(&mut self, device: &D, keys: &[&str]) {
        for key in keys {
            if let Some(slot) = self.slot_mut(key) {
                *slot = device.attribute_string(key);
            }
        }
    }
}

/// 读取设备的 USB 属性
///
/// 没有 USB 接口的 tty（板载串口）和没有 `usb_device` 祖先的接口都无法解析。
pub fn usb_properties_of<D: DeviceNode>(device: &D) -> Result<UsbProperties, LookupError> {
    let mut properties = UsbProperties::default();

    if device.has_subsystem(SUBSYSTEM_TTY) {
        let interface = device
            .ancestor(SUBSYSTEM_USB, Some(DEVTYPE_USB_INTERFACE))
            .ok_or_else(|| LookupError::Unresolvable {
                path: device.syspath().to_path_buf(),
                what: "usb_interface ancestor",
            })?;
        fill_interface(&mut properties, &interface)?;
    } else if device.has_subsystem(SUBSYSTEM_USB) {
        fill_interface(&mut properties, device)?;
    } else {
        return Err(LookupError::UnsupportedSubsystem {
            path: device.syspath().to_path_buf(),
            subsystem: device
                .subsystem()
                .map(|s| s.to_string_lossy().into_owned()),
        });
    }

    Ok(properties)
}

fn fill_interface<D: DeviceNode>(
    properties: &mut UsbProperties,
    interface: &D,
) -> Result<(), LookupError> {
    let physical = interface
        .ancestor(SUBSYSTEM_USB, Some(DEVTYPE_USB_DEVICE))
        .ok_or_else(|| LookupError::Unresolvable {
            path: interface.syspath().to_path_buf(),
            what: "usb_device ancestor",
        })?;
    properties.fill_from(interface, &USB_INTERFACE_PROPERTY_KEYS);
    properties.fill_from(&physical, &USB_DEVICE_PROPERTY_KEYS);
    Ok(())
}
