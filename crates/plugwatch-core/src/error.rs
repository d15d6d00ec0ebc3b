//! 会话层错误类型定义

use crate::config::ConfigError;
use plugwatch_registry::RegistryError;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use thiserror::Error;

/// 会话操作错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 注册表 / 监视器初始化失败
    #[error("{0}")]
    Init(#[source] RegistryError),

    /// 唤醒通道创建失败
    #[error("{op} failed. Cause: {source}")]
    Wakeup {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// 描述符超出等待集合上限
    #[error("fd {fd} >= wait-set limit {limit}")]
    DescriptorLimit { fd: RawFd, limit: usize },

    /// 配置无效
    #[error("Invalid session config: {0}")]
    Config(#[from] ConfigError),

    /// 设备枚举失败（会话仍可用）
    #[error("{0}")]
    Scan(#[source] RegistryError),

    /// 等待就绪失败（会话仍可用）
    #[error("poll() failed. Cause: {0}")]
    Wait(#[source] nix::Error),

    /// 接收热插拔通知失败（会话仍可用）
    #[error("{0}")]
    Receive(#[source] RegistryError),

    /// 扫描结果分配失败，部分结果已丢弃
    #[error("Could not allocate result. Abort device listing")]
    OutOfMemory,

    /// 会话未初始化（或已清理）
    #[error("Session not initialized")]
    NotInitialized,
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionErrorKind {
    Init,
    Scan,
    Wait,
    Receive,
    OutOfMemory,
    NotInitialized,
}

impl SessionErrorKind {
    /// 是否致命
    ///
    /// - `Init`：会话不可再用，必须先 `cleanup()` 再重新初始化
    /// - `OutOfMemory`：本次调用不可恢复
    ///
    /// 其余错误不影响会话，调用方可以重试。
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Init | Self::OutOfMemory)
    }
}

impl SessionError {
    pub fn kind(&self) -> SessionErrorKind {
        match self {
            Self::Init(_) | Self::Wakeup { .. } | Self::DescriptorLimit { .. } | Self::Config(_) => {
                SessionErrorKind::Init
            },
            Self::Scan(_) => SessionErrorKind::Scan,
            Self::Wait(_) => SessionErrorKind::Wait,
            Self::Receive(_) => SessionErrorKind::Receive,
            Self::OutOfMemory => SessionErrorKind::OutOfMemory,
            Self::NotInitialized => SessionErrorKind::NotInitialized,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

/// 标识 / 属性查询错误
///
/// 边界形式的查询（`identity()`、`usb_properties()`）把它转换为“无结果”。
#[derive(Error, Debug)]
pub enum LookupError {
    /// 路径无法解析为设备
    #[error("Device not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 缺少必需的祖先设备或属性
    #[error("Cannot resolve {what} for {}", path.display())]
    Unresolvable { path: PathBuf, what: &'static str },

    /// 既不是 tty 也不是 usb
    #[error("Unsupported subsystem {subsystem:?} for {}", path.display())]
    UnsupportedSubsystem {
        path: PathBuf,
        subsystem: Option<String>,
    },

    /// 底层注册表错误
    #[error("{0}")]
    Registry(#[source] RegistryError),

    #[error("Session not initialized")]
    NotInitialized,
}

impl From<RegistryError> for LookupError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(path) => Self::NotFound(path),
            other => Self::Registry(other),
        }
    }
}
