//! # Plugwatch Registry
//!
//! 设备注册表抽象层：统一操作系统设备枚举 / 热插拔通知设施的访问接口。
//!
//! ## 后端
//!
//! - `udev`（Linux，默认启用）：基于 libudev
//! - `mock`（feature `mock`）：内存设备树，用于无硬件测试
//!
//! ## 句柄生命周期
//!
//! 设备句柄只在闭包作用域内有效（[`DeviceRegistry::with_device`]、
//! [`DeviceMonitor::receive`]），闭包返回后句柄立即释放，
//! 因此任何退出路径都不会泄漏句柄。

use plugwatch_types::names::{DEVTYPE_USB_INTERFACE, SUBSYSTEM_TTY, SUBSYSTEM_USB};
use std::ffi::OsStr;
use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(all(target_os = "linux", feature = "udev"))]
pub mod udev;

#[cfg(all(target_os = "linux", feature = "udev"))]
pub use self::udev::{UdevMonitor, UdevRegistry};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{FailPoint, MockBus, MockDevice, MockMonitor, MockRegistry, MockStats};

/// 注册表层统一错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    /// 底层设施调用失败
    #[error("{op} failed. Cause: {source}")]
    Backend {
        op: String,
        #[source]
        source: io::Error,
    },

    /// syspath 无法解析为设备（可能已被移除）
    #[error("Device not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 监视器报告可读，但没有收到设备
    #[error("{op} failed. Cause: no device received")]
    NoDevice { op: String },
}

impl RegistryError {
    pub fn backend(op: impl Into<String>, source: io::Error) -> Self {
        Self::Backend {
            op: op.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// 子系统 / 设备类型匹配规则
///
/// 枚举时只使用 `subsystem`；监视器过滤器同时使用 `devtype`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MatchRule {
    pub subsystem: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub devtype: Option<String>,
}

impl MatchRule {
    /// 匹配子系统下的任意设备类型
    pub fn subsystem(subsystem: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            devtype: None,
        }
    }

    /// 匹配子系统下的指定设备类型
    pub fn subsystem_devtype(subsystem: impl Into<String>, devtype: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            devtype: Some(devtype.into()),
        }
    }

    /// 判断设备属性是否满足规则
    pub fn matches(&self, subsystem: Option<&OsStr>, devtype: Option<&OsStr>) -> bool {
        if subsystem != Some(OsStr::new(&self.subsystem)) {
            return false;
        }
        match &self.devtype {
            Some(expected) => devtype == Some(OsStr::new(expected)),
            None => true,
        }
    }

    /// 默认规则：所有 tty 设备 + usb_interface 类型的 usb 设备
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::subsystem(SUBSYSTEM_TTY),
            Self::subsystem_devtype(SUBSYSTEM_USB, DEVTYPE_USB_INTERFACE),
        ]
    }
}

/// 规则中出现的子系统（去重，保持顺序）
pub fn rule_subsystems(rules: &[MatchRule]) -> Vec<&str> {
    let mut subsystems: Vec<&str> = Vec::with_capacity(rules.len());
    for rule in rules {
        if !subsystems.contains(&rule.subsystem.as_str()) {
            subsystems.push(&rule.subsystem);
        }
    }
    subsystems
}

/// 设备句柄的只读视图
pub trait DeviceNode {
    /// 设备树路径
    fn syspath(&self) -> &Path;

    /// 短名称（syspath 最后一段，如 `ttyUSB0`、`1-1:1.0`）
    fn sysname(&self) -> &OsStr;

    fn subsystem(&self) -> Option<&OsStr>;

    fn devtype(&self) -> Option<&OsStr>;

    /// 设备节点（如 `/dev/ttyUSB0`）
    fn devnode(&self) -> Option<&Path>;

    /// 热插拔动作（仅监视器收到的设备有此属性）
    fn action(&self) -> Option<&OsStr>;

    /// sysfs 属性值
    fn attribute(&self, name: &str) -> Option<&OsStr>;

    /// 最近的满足条件的祖先设备（从父设备开始查找）
    ///
    /// `devtype == None` 时只匹配子系统。
    fn ancestor(&self, subsystem: &str, devtype: Option<&str>) -> Option<Self>
    where
        Self: Sized;

    fn has_subsystem(&self, subsystem: &str) -> bool {
        self.subsystem() == Some(OsStr::new(subsystem))
    }

    fn has_devtype(&self, devtype: &str) -> bool {
        self.devtype() == Some(OsStr::new(devtype))
    }

    /// 属性值转为 `String`（非 UTF-8 字节按 lossy 处理）
    fn attribute_string(&self, name: &str) -> Option<String> {
        self.attribute(name)
            .map(|value| value.to_string_lossy().into_owned())
    }
}

/// 设备注册表句柄
///
/// 实现必须是 `Send + Sync`：同一个注册表会被事件线程和查询线程同时使用。
pub trait DeviceRegistry: Send + Sync {
    type Device: DeviceNode;
    type Monitor: DeviceMonitor<Device = Self::Device>;

    /// 枚举当前已接入的设备
    ///
    /// 只按规则中的子系统过滤，返回注册表自身的遍历顺序（不排序）。
    fn enumerate(&self, rules: &[MatchRule]) -> Result<Vec<PathBuf>, RegistryError>;

    /// 将 syspath 解析为设备句柄，并在作用域内使用
    ///
    /// 句柄在 `f` 返回后释放，不允许逃逸出闭包。
    fn with_device<T, F>(&self, syspath: &Path, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Self::Device) -> T;

    /// 创建热插拔监视器：安装每条规则对应的过滤器并开始接收
    fn monitor(&self, rules: &[MatchRule]) -> Result<Self::Monitor, RegistryError>;
}

/// 热插拔监视器句柄
///
/// `as_fd()` 返回等待描述符：可读表示至少有一条通知待接收。
pub trait DeviceMonitor: AsFd + Send + Sync {
    type Device: DeviceNode;

    /// 接收一条通知，并在作用域内使用其设备句柄
    fn receive<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Self::Device) -> T;
}
