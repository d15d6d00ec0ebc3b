//! 会话状态
//!
//! 会话持有注册表句柄、监视器句柄和唤醒通道，以及最近的错误消息。
//! 由调用方显式创建并传递，没有进程级全局实例。
//!
//! # 生命周期
//!
//! ```text
//! new() ──► initialize() ──► scan() / next_event() / unblock() / identity() ... ──► cleanup()
//! ```
//!
//! `initialize()` 失败时不会自行释放已获取的资源，调用方需要调用 `cleanup()`
//! （`Drop` 也会调用）。每个资源都保存在 `Option` 中，释放时 `take()`，
//! 因此部分初始化或重复清理都不会重复释放。
//!
//! # 线程安全
//!
//! `initialize()` / `cleanup()` 需要 `&mut self`，借用检查保证它们不会与其他操作并发。
//! 其余操作只需要 `&self`：一个线程阻塞在 `next_event()` 中时，其他线程可以同时调用
//! `unblock()`、`scan()` 和查询操作（`Arc<Session<R>>`）。

use crate::classify::classify_type;
use crate::config::SessionConfig;
use crate::error::{LookupError, SessionError};
use crate::error_buffer::ErrorBuffer;
use crate::event_loop;
use crate::identity::identity_of;
use crate::properties::{UsbProperties, usb_properties_of};
use crate::scanner::{self, DeviceList};
use crate::wakeup::{WakeupChannel, Waker};
use plugwatch_registry::{DeviceNode, DeviceRegistry, RegistryError};
use plugwatch_types::{DeviceEvent, DeviceType, Identity};
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// 设备发现会话
pub struct Session<R: DeviceRegistry> {
    config: SessionConfig,
    registry: Option<R>,
    monitor: Option<R::Monitor>,
    wakeup: Option<WakeupChannel>,
    last_error: ErrorBuffer,
}

impl<R: DeviceRegistry> Session<R> {
    /// 创建未初始化的会话
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: None,
            monitor: None,
            wakeup: None,
            last_error: ErrorBuffer::new(),
        }
    }

    /// 创建并初始化会话，失败时释放已获取的资源
    pub fn open<F>(config: SessionConfig, open: F) -> Result<Self, SessionError>
    where
        F: FnOnce() -> Result<R, RegistryError>,
    {
        let mut session = Self::new(config);
        if let Err(e) = session.initialize(open) {
            session.cleanup();
            return Err(e);
        }
        Ok(session)
    }

    /// 初始化会话
    ///
    /// 依次：打开注册表、创建监视器（安装过滤器并开始接收）、创建唤醒通道，
    /// 并检查每个描述符都小于 `max_descriptor`。
    ///
    /// 失败时已获取的资源保留在会话中，由 `cleanup()` 释放。
    pub fn initialize<F>(&mut self, open: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<R, RegistryError>,
    {
        self.last_error.clear();
        let result = self.try_initialize(open);
        if let Err(e) = &result {
            error!("session initialization failed: {}", e);
        }
        self.record(result)
    }

    fn try_initialize<F>(&mut self, open: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<R, RegistryError>,
    {
        if self.is_initialized() {
            debug!("session already initialized");
            return Ok(());
        }
        self.config.validate()?;

        let limit = self.config.max_descriptor;
        let check_fd = |fd: RawFd| -> Result<(), SessionError> {
            if usize::try_from(fd).map_or(true, |fd| fd >= limit) {
                return Err(SessionError::DescriptorLimit { fd, limit });
            }
            Ok(())
        };

        if self.registry.is_none() {
            self.registry = Some(open().map_err(SessionError::Init)?);
            debug!("device registry opened");
        }

        if self.monitor.is_none()
            && let Some(registry) = &self.registry
        {
            let monitor = registry
                .monitor(&self.config.monitor_rules)
                .map_err(SessionError::Init)?;
            let fd = monitor.as_fd().as_raw_fd();
            self.monitor = Some(monitor);
            debug!("hot-plug monitor receiving on fd {}", fd);
            check_fd(fd)?;
        }

        if self.wakeup.is_none() {
            let wakeup = WakeupChannel::new().map_err(|source| SessionError::Wakeup {
                op: "socketpair()",
                source,
            })?;
            let fds = wakeup.raw_fds();
            self.wakeup = Some(wakeup);
            debug!("wakeup channel created (read fd {}, write fd {})", fds[0], fds[1]);
            for fd in fds {
                check_fd(fd)?;
            }
        }

        Ok(())
    }

    /// 释放所有会话资源
    ///
    /// 部分初始化后调用也是安全的，已释放的资源不会再次释放。
    pub fn cleanup(&mut self) {
        if self.wakeup.take().is_some() {
            debug!("wakeup channel closed");
        }
        if self.monitor.take().is_some() {
            debug!("hot-plug monitor released");
        }
        if self.registry.take().is_some() {
            debug!("device registry released");
        }
    }

    /// 是否所有资源都已获取
    pub fn is_initialized(&self) -> bool {
        self.registry.is_some() && self.monitor.is_some() && self.wakeup.is_some()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 最近一次失败操作的错误消息（无错误时为空字符串）
    pub fn last_error(&self) -> String {
        self.last_error.get()
    }

    fn record<T, E: fmt::Display>(&self, result: Result<T, E>) -> Result<T, E> {
        if let Err(e) = &result {
            self.last_error.set(e);
        }
        result
    }

    fn registry(&self) -> Result<&R, SessionError> {
        self.registry.as_ref().ok_or(SessionError::NotInitialized)
    }

    /// 扫描当前已接入的设备
    pub fn scan(&self) -> Result<DeviceList, SessionError> {
        self.last_error.clear();
        let result = self
            .registry()
            .and_then(|registry| scanner::scan(registry, &self.config));
        self.record(result)
    }

    /// 阻塞等待下一个热插拔事件
    ///
    /// 返回设备事件（`UsbTty` 合并为 `Usb`），或 `unblock()` 触发的唤醒事件。
    pub fn next_event(&self) -> Result<DeviceEvent, SessionError> {
        self.last_error.clear();
        let result = match (&self.monitor, &self.wakeup) {
            (Some(monitor), Some(wakeup)) => {
                event_loop::next_event(monitor, wakeup, &self.config.virtual_marker)
            },
            _ => Err(SessionError::NotInitialized),
        };
        self.record(result)
    }

    /// 使一个阻塞中（或下一个）的 `next_event()` 返回唤醒事件
    pub fn unblock(&self) {
        match &self.wakeup {
            Some(wakeup) => {
                wakeup.waker().wake();
            },
            None => debug!("unblock on uninitialized session ignored"),
        }
    }

    /// 可跨线程使用的唤醒句柄（会话未初始化时为 `None`）
    pub fn waker(&self) -> Option<Waker> {
        self.wakeup.as_ref().map(WakeupChannel::waker)
    }

    fn lookup<T, F>(&self, path: &Path, f: F) -> Result<T, LookupError>
    where
        F: FnOnce(&R::Device) -> Result<T, LookupError>,
    {
        let registry = self.registry.as_ref().ok_or(LookupError::NotInitialized)?;
        registry.with_device(path, f)?
    }

    /// 设备标识
    pub fn try_identity(&self, path: impl AsRef<Path>) -> Result<Identity, LookupError> {
        self.lookup(path.as_ref(), identity_of)
    }

    /// 设备标识字符串（无法解析时为 `None`）
    pub fn identity(&self, path: impl AsRef<Path>) -> Option<String> {
        self.last_error.clear();
        let result = self.record(self.try_identity(path));
        result.ok().map(|identity| identity.to_string())
    }

    /// 设备节点（如 `/dev/ttyUSB0`）
    pub fn port_node(&self, path: impl AsRef<Path>) -> Option<PathBuf> {
        self.last_error.clear();
        let result = self.record(
            self.lookup(path.as_ref(), |device| Ok(device.devnode().map(Path::to_path_buf))),
        );
        result.ok().flatten()
    }

    /// 底层分类器给出的设备类型（`UsbTty` 原样返回）
    pub fn device_type(&self, path: impl AsRef<Path>) -> Option<DeviceType> {
        self.last_error.clear();
        let result = self.record(self.lookup(path.as_ref(), |device| Ok(classify_type(device))));
        result.ok()
    }

    /// USB 描述符属性
    pub fn try_usb_properties(&self, path: impl AsRef<Path>) -> Result<UsbProperties, LookupError> {
        self.lookup(path.as_ref(), usb_properties_of)
    }

    /// USB 描述符属性（无法解析时为 `None`）
    pub fn usb_properties(&self, path: impl AsRef<Path>) -> Option<UsbProperties> {
        self.last_error.clear();
        self.record(self.try_usb_properties(path)).ok()
    }
}

#[cfg(all(target_os = "linux", feature = "udev"))]
impl Session<plugwatch_registry::UdevRegistry> {
    /// 使用 libudev 创建并初始化会话
    pub fn open_udev(config: SessionConfig) -> Result<Self, SessionError> {
        Self::open(config, plugwatch_registry::UdevRegistry::open)
    }
}

impl<R: DeviceRegistry> Drop for Session<R> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<R: DeviceRegistry> fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("registry", &self.registry.is_some())
            .field("monitor", &self.monitor.is_some())
            .field("wakeup", &self.wakeup)
            .field("last_error", &self.last_error.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugwatch_registry::{FailPoint, MockBus, MockDevice, MockRegistry};

    fn open(bus: &MockBus) -> Session<MockRegistry> {
        let bus = bus.clone();
        Session::open(SessionConfig::default(), move || bus.connect()).unwrap()
    }

    #[test]
    fn test_initialize_and_cleanup() {
        let bus = MockBus::new();
        let mut session = open(&bus);
        assert!(session.is_initialized());
        assert!(session.waker().is_some());

        session.cleanup();
        assert!(!session.is_initialized());
        session.cleanup();

        let stats = bus.stats();
        assert_eq!(stats.registries_released, 1);
        assert_eq!(stats.monitors_released, 1);
    }

    #[test]
    fn test_init_failure_sets_last_error() {
        let bus = MockBus::new();
        bus.fail_at(FailPoint::CreateMonitor);
        let mut session: Session<MockRegistry> = Session::new(SessionConfig::default());
        let err = session.initialize(|| bus.connect()).unwrap_err();
        assert!(err.is_fatal());
        assert!(session.last_error().contains("udev_monitor_new_from_netlink()"));
        assert!(!session.is_initialized());

        session.cleanup();
        assert_eq!(bus.stats().registries_released, 1);
    }

    #[test]
    fn test_descriptor_limit() {
        let bus = MockBus::new();
        let config = SessionConfig {
            max_descriptor: 1,
            ..SessionConfig::default()
        };
        let err = Session::open(config, || bus.connect()).unwrap_err();
        assert!(matches!(err, SessionError::DescriptorLimit { limit: 1, .. }));
        // open() 失败时已经清理
        let stats = bus.stats();
        assert_eq!(stats.monitors_opened, stats.monitors_released);
        assert_eq!(stats.registries_opened, stats.registries_released);
    }

    #[test]
    fn test_operations_require_initialization() {
        let session: Session<MockRegistry> = Session::new(SessionConfig::default());
        assert!(matches!(session.scan(), Err(SessionError::NotInitialized)));
        assert!(matches!(session.next_event(), Err(SessionError::NotInitialized)));
        assert_eq!(session.last_error(), "Session not initialized");
        assert!(session.identity("/sys/x").is_none());
        assert!(session.waker().is_none());
        session.unblock();
    }

    #[test]
    fn test_lookup_clears_previous_error() {
        let bus = MockBus::new();
        bus.add_device(MockDevice::new("/sys/devices/platform/tty/ttyAMA0").subsystem("tty"));
        let session = open(&bus);

        assert!(session.identity("/sys/missing").is_none());
        assert!(session.last_error().starts_with("Device not found"));

        assert_eq!(
            session.identity("/sys/devices/platform/tty/ttyAMA0").as_deref(),
            Some("serial:ttyAMA0")
        );
        assert_eq!(session.last_error(), "");
    }

    #[test]
    fn test_port_node_and_device_type() {
        let bus = MockBus::new();
        bus.add_device(
            MockDevice::new("/sys/devices/platform/tty/ttyAMA0")
                .subsystem("tty")
                .devnode("/dev/ttyAMA0"),
        );
        bus.add_device(MockDevice::new("/sys/devices/usb1/1-1/1-1:1.0").subsystem("usb"));
        let session = open(&bus);

        assert_eq!(
            session.port_node("/sys/devices/platform/tty/ttyAMA0"),
            Some(PathBuf::from("/dev/ttyAMA0"))
        );
        assert_eq!(session.port_node("/sys/devices/usb1/1-1/1-1:1.0"), None);
        assert_eq!(
            session.device_type("/sys/devices/platform/tty/ttyAMA0"),
            Some(DeviceType::Tty)
        );
    }

    #[test]
    fn test_session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session<MockRegistry>>();
    }
}
