//! 设备标识字符串
//!
//! 标识由设备的物理接入位置和描述符值决定，同一接入点、同样的描述符值
//! 总是得到同样的字符串：
//!
//! ```text
//! usb:<location>:<vendorId>:<productId>:<serial?>
//! serial:<location>
//! ```
//!
//! USB 形式始终包含四个分隔符。没有序列号时序列号字段为空，
//! 字符串以 `:` 结尾（例如 `usb:1-1:1a2b:3c4d:`）。

use std::fmt;

/// USB 标识前缀
pub const USB_PREFIX: &str = "usb";

/// 串口标识前缀
pub const SERIAL_PREFIX: &str = "serial";

/// 字段分隔符
pub const SEPARATOR: char = ':';

/// 设备标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Identity {
    /// USB 设备（或 USB 转串口）
    Usb {
        /// USB 接口的 sysname（总线拓扑位置，如 `1-1:1.0`）
        location: String,
        /// USB 物理设备的 `idVendor`
        vendor_id: String,
        /// USB 物理设备的 `idProduct`
        product_id: String,
        /// USB 物理设备的 `serial`（可能不存在）
        serial: Option<String>,
    },
    /// 板载串口
    Serial {
        /// 串口的 sysname（如 `ttyAMA0`）
        name: String,
    },
}

impl Identity {
    pub fn usb(
        location: impl Into<String>,
        vendor_id: impl Into<String>,
        product_id: impl Into<String>,
        serial: Option<String>,
    ) -> Self {
        Self::Usb {
            location: location.into(),
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
            serial,
        }
    }

    pub fn serial(name: impl Into<String>) -> Self {
        Self::Serial { name: name.into() }
    }

    pub fn is_usb(&self) -> bool {
        matches!(self, Self::Usb { .. })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb {
                location,
                vendor_id,
                product_id,
                serial,
            } => write!(
                f,
                "{USB_PREFIX}{SEPARATOR}{location}{SEPARATOR}{vendor_id}{SEPARATOR}{product_id}{SEPARATOR}{}",
                serial.as_deref().unwrap_or("")
            ),
            Self::Serial { name } => write!(f, "{SERIAL_PREFIX}{SEPARATOR}{name}"),
        }
    }
}
