//! 设备类型、事件类型、设备条目与热插拔事件

use crate::TypeError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::path::{Path, PathBuf};

/// 设备类型
///
/// 整数值是与绑定层共享的契约（`None=0, Usb=1, Tty=2, UsbTty=4`）。
///
/// `UsbTty` 只在底层分类器中出现：父设备是 USB 接口的串口。
/// 作为热插拔事件类型上报时，由调用方策略合并为 `Usb`（见 [`DeviceType::coalesced`]）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum DeviceType {
    /// 未识别
    None = 0,
    /// USB 接口（或由 USB 接口承载的串口，扫描合并后）
    Usb = 1,
    /// 板载串口（无 USB 祖先）
    Tty = 2,
    /// USB 转串口（仅分类器使用）
    UsbTty = 4,
}

impl DeviceType {
    /// 从整数值转换
    pub fn from_raw(value: i32) -> Result<Self, TypeError> {
        Self::try_from(value).map_err(|_| TypeError::InvalidDeviceType(value))
    }

    /// 转换为整数值
    pub fn as_raw(self) -> i32 {
        self.into()
    }

    /// 事件上报时的类型：`UsbTty` 合并为 `Usb`，其余不变
    pub fn coalesced(self) -> Self {
        match self {
            Self::UsbTty => Self::Usb,
            other => other,
        }
    }

    /// 诊断输出用的名称
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Usb => "USB",
            Self::Tty => "TTY",
            Self::UsbTty => "USB_TTY",
        }
    }
}

// 不使用 `#[default]`：num_enum 会把它当作未知值的兜底变体
impl Default for DeviceType {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// 热插拔事件类型
///
/// 整数值是与绑定层共享的契约（`None=0, Add=1, Remove=2`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum EventKind {
    /// 无事件（唤醒事件，或无法识别的动作）
    None = 0,
    /// 设备接入
    Add = 1,
    /// 设备移除
    Remove = 2,
}

impl EventKind {
    /// 从整数值转换
    pub fn from_raw(value: i32) -> Result<Self, TypeError> {
        Self::try_from(value).map_err(|_| TypeError::InvalidEventKind(value))
    }

    /// 转换为整数值
    pub fn as_raw(self) -> i32 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl Default for EventKind {
    fn default() -> Self {
        Self::None
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// 边界契约：编译期检查整数值
const _: () = {
    assert!(DeviceType::None as i32 == 0);
    assert!(DeviceType::Usb as i32 == 1);
    assert!(DeviceType::Tty as i32 == 2);
    assert!(DeviceType::UsbTty as i32 == 4);
    assert!(EventKind::None as i32 == 0);
    assert!(EventKind::Add as i32 == 1);
    assert!(EventKind::Remove as i32 == 2);
};

/// 扫描结果中的一个设备条目
///
/// `path` 是设备注册表中的 syspath，在设备接入期间保持稳定。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceEntry {
    pub path: PathBuf,
    pub device_type: DeviceType,
}

impl DeviceEntry {
    pub fn new(path: impl Into<PathBuf>, device_type: DeviceType) -> Self {
        Self {
            path: path.into(),
            device_type,
        }
    }
}

/// 热插拔事件
///
/// 唤醒事件（由 `unblock()` 触发）不携带设备数据：`path == None`，
/// `device_type == None`，`kind == None`。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceEvent {
    pub path: Option<PathBuf>,
    pub device_type: DeviceType,
    pub kind: EventKind,
}

impl DeviceEvent {
    /// 创建设备事件
    pub fn device(path: impl Into<PathBuf>, device_type: DeviceType, kind: EventKind) -> Self {
        Self {
            path: Some(path.into()),
            device_type,
            kind,
        }
    }

    /// 创建唤醒事件
    pub fn wakeup() -> Self {
        Self::default()
    }

    /// 是否为唤醒事件
    pub fn is_wakeup(&self) -> bool {
        self.path.is_none()
    }

    /// 设备路径（唤醒事件为 `None`）
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
