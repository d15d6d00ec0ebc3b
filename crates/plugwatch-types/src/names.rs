//! 子系统 / 设备类型 / sysfs 属性名称
//!
//! 这些字符串由操作系统的设备注册表分配，原样用于匹配和分类。

/// 串口子系统
pub const SUBSYSTEM_TTY: &str = "tty";

/// USB 子系统
pub const SUBSYSTEM_USB: &str = "usb";

/// USB 接口（`usb` 子系统下的 devtype）
pub const DEVTYPE_USB_INTERFACE: &str = "usb_interface";

/// USB 物理设备（`usb` 子系统下的 devtype）
pub const DEVTYPE_USB_DEVICE: &str = "usb_device";

/// 虚拟设备路径标记
///
/// syspath 中包含此子串的设备（如 `/sys/devices/virtual/tty/tty0`）不对外报告。
pub const VIRTUAL_MARKER: &str = "virtual";

/// 热插拔动作：设备接入
pub const ACTION_ADD: &str = "add";

/// 热插拔动作：设备移除
pub const ACTION_REMOVE: &str = "remove";

/// USB 物理设备属性
pub mod attr {
    pub const ID_VENDOR: &str = "idVendor";
    pub const ID_PRODUCT: &str = "idProduct";
    pub const SERIAL: &str = "serial";
    pub const MANUFACTURER: &str = "manufacturer";
    pub const PRODUCT: &str = "product";
    pub const CONFIGURATION_VALUE: &str = "bConfigurationValue";
    pub const DEVICE_CLASS: &str = "bDeviceClass";
    pub const DEVICE_SUBCLASS: &str = "bDeviceSubClass";
    pub const DEVICE_PROTOCOL: &str = "bDeviceProtocol";

    // USB 接口属性
    pub const INTERFACE_NUMBER: &str = "bInterfaceNumber";
    pub const INTERFACE_CLASS: &str = "bInterfaceClass";
    pub const INTERFACE_SUBCLASS: &str = "bInterfaceSubClass";
    pub const INTERFACE_PROTOCOL: &str = "bInterfaceProtocol";
    pub const INTERFACE_NAME: &str = "interface";
}

/// 从 USB 接口读取的属性（按报告顺序）
pub const USB_INTERFACE_PROPERTY_KEYS: [&str; 5] = [
    attr::INTERFACE_NUMBER,
    attr::INTERFACE_CLASS,
    attr::INTERFACE_SUBCLASS,
    attr::INTERFACE_PROTOCOL,
    attr::INTERFACE_NAME,
];

/// 从 USB 物理设备读取的属性（按报告顺序）
pub const USB_DEVICE_PROPERTY_KEYS: [&str; 9] = [
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
