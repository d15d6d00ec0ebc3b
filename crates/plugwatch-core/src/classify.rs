//! 设备分类器
//!
//! 纯读取操作，不修改设备句柄。

use plugwatch_registry::DeviceNode;
use plugwatch_types::names::{ACTION_ADD, ACTION_REMOVE, SUBSYSTEM_TTY, SUBSYSTEM_USB};
use plugwatch_types::{DeviceType, EventKind};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// 设备类型
///
/// | subsystem | usb 祖先 | 结果 |
/// |---|---|---|
/// | tty | 无 | `Tty` |
/// | tty | 有 | `UsbTty` |
/// | usb | - | `Usb` |
/// | 其他 | - | `None` |
pub fn classify_type<D: DeviceNode>(device: &D) -> DeviceType {
    if device.has_subsystem(SUBSYSTEM_TTY) {
        match device.ancestor(SUBSYSTEM_USB, None) {
            Some(_) => DeviceType::UsbTty,
            None => DeviceType::Tty,
        }
    } else if device.has_subsystem(SUBSYSTEM_USB) {
        DeviceType::Usb
    } else {
        DeviceType::None
    }
}

/// 热插拔动作：`add` / `remove`，其余（包括没有动作）为 `None`
pub fn classify_event<D: DeviceNode>(device: &D) -> EventKind {
    classify_action(device.action())
}

pub fn classify_action(action: Option<&OsStr>) -> EventKind {
    match action.and_then(OsStr::to_str) {
        Some(ACTION_ADD) => EventKind::Add,
        Some(ACTION_REMOVE) => EventKind::Remove,
        _ => EventKind::None,
    }
}

/// syspath 是否标记为虚拟设备
pub fn is_virtual(path: &Path, marker: &str) -> bool {
    contains_bytes(path.as_os_str().as_bytes(), marker.as_bytes())
}

/// 子串查找（按字节）
pub(crate) fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwatch_registry::MockDevice;

    fn usb_interface() -> MockDevice {
        MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0")
            .subsystem("usb")
            .devtype("usb_interface")
    }

    #[test]
    fn test_classify_type_table() {
        let plain_tty = MockDevice::new("/sys/devices/platform/tty/ttyAMA0").subsystem("tty");
        assert_eq!(classify_type(&plain_tty), DeviceType::Tty);

        let usb_tty = MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0")
            .subsystem("tty")
            .parent(usb_interface());
        assert_eq!(classify_type(&usb_tty), DeviceType::UsbTty);

        assert_eq!(classify_type(&usb_interface()), DeviceType::Usb);

        let input = MockDevice::new("/sys/devices/input/event0").subsystem("input");
        assert_eq!(classify_type(&input), DeviceType::None);

        let no_subsystem = MockDevice::new("/sys/devices/unknown");
        assert_eq!(classify_type(&no_subsystem), DeviceType::None);
    }

    #[test]
    fn test_classify_event_table() {
        let device = MockDevice::new("/sys/x");
        assert_eq!(classify_event(&device.with_action("add")), EventKind::Add);
        assert_eq!(classify_event(&device.with_action("remove")), EventKind::Remove);
        assert_eq!(classify_event(&device.with_action("change")), EventKind::None);
        assert_eq!(classify_event(&device.with_action("ADD")), EventKind::None);
        assert_eq!(classify_event(&device), EventKind::None);
    }

    #[test]
    fn test_is_virtual() {
        assert!(is_virtual(Path::new("/sys/devices/virtual/tty/tty0"), "virtual"));
        assert!(!is_virtual(Path::new("/sys/devices/platform/tty/ttyAMA0"), "virtual"));
    }

    #[test]
    fn test_contains_bytes() {
        assert!(contains_bytes(b"/a/b/c", b"/b/"));
        assert!(contains_bytes(b"abc", b""));
        assert!(!contains_bytes(b"ab", b"abc"));
    }
}
