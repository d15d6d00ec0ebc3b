//! # Plugwatch Types
//!
//! 设备发现与热插拔事件的边界类型定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `names`: 子系统、设备类型、sysfs 属性名称常量
//! - `device`: 设备类型 / 事件类型枚举，设备条目与事件
//! - `identity`: 设备标识字符串格式
//!
//! ## 边界契约
//!
//! `DeviceType` 与 `EventKind` 的整数值是与调用方（绑定层）共享的契约，
//! 不允许修改。编译期断言保证这些值保持稳定。

pub mod device;
pub mod identity;
pub mod names;

// 重新导出常用类型
pub use device::{DeviceEntry, DeviceEvent, DeviceType, EventKind};
pub use identity::Identity;

use thiserror::Error;

/// 类型层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// 无效的设备类型整数值
    #[error("Invalid device type value: {0}")]
    InvalidDeviceType(i32),

    /// 无效的事件类型整数值
    #[error("Invalid event kind value: {0}")]
    InvalidEventKind(i32),
}
