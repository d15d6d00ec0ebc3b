//! Mock 设备注册表（无硬件依赖）
//!
//! 用于测试扫描、分类、标识、事件循环等逻辑：
//!
//! - [`MockBus`]：测试侧控制器，维护内存设备树、注入事件和故障
//! - [`MockRegistry`]：会话持有的注册表句柄（由 `MockBus::connect()` 创建）
//! - [`MockMonitor`]：带真实 socket 等待描述符的监视器
//!
//! 所有句柄的打开 / 释放次数都记录在 [`MockStats`] 中。
//!
//! # 示例
//!
//! ```rust
//! use plugwatch_registry::{DeviceRegistry, MatchRule, MockBus, MockDevice};
//!
//! let bus = MockBus::new();
//! bus.add_device(MockDevice::new("/sys/devices/platform/serial8250/tty/ttyS0").subsystem("tty"));
//!
//! let registry = bus.connect().unwrap();
//! let paths = registry.enumerate(&MatchRule::defaults()).unwrap();
//! assert_eq!(paths.len(), 1);
//! ```

use crate::{DeviceMonitor, DeviceNode, DeviceRegistry, MatchRule, RegistryError, rule_subsystems};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ffi::{OsStr, OsString};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 可注入的故障点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// 创建注册表（对应 udev_new）
    Connect,
    /// 创建监视器
    CreateMonitor,
    /// 安装监视器过滤器
    InstallFilter,
    /// 开始接收
    EnableReceiving,
    /// 创建枚举
    Enumerate,
    /// 接收通知
    Receive,
}

/// 句柄计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub registries_opened: usize,
    pub registries_released: usize,
    pub monitors_opened: usize,
    pub monitors_released: usize,
    pub handles_opened: usize,
    pub handles_released: usize,
}

/// Mock 设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    syspath: PathBuf,
    sysname: OsString,
    subsystem: Option<OsString>,
    devtype: Option<OsString>,
    devnode: Option<PathBuf>,
    action: Option<OsString>,
    attributes: BTreeMap<String, OsString>,
    parent: Option<Box<MockDevice>>,
}

impl MockDevice {
    /// 创建设备，sysname 取 syspath 最后一段
    pub fn new(syspath: impl Into<PathBuf>) -> Self {
        let syspath = syspath.into();
        let sysname = syspath
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        Self {
            syspath,
            sysname,
            subsystem: None,
            devtype: None,
            devnode: None,
            action: None,
            attributes: BTreeMap::new(),
            parent: None,
        }
    }

    pub fn subsystem(mut self, subsystem: &str) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    pub fn devtype(mut self, devtype: &str) -> Self {
        self.devtype = Some(devtype.into());
        self
    }

    pub fn devnode(mut self, devnode: impl Into<PathBuf>) -> Self {
        self.devnode = Some(devnode.into());
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn parent(mut self, parent: MockDevice) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// 同一设备的副本，附带热插拔动作
    pub fn with_action(&self, action: &str) -> Self {
        self.clone().action(action)
    }
}

impl DeviceNode for MockDevice {
    fn syspath(&self) -> &Path {
        &self.syspath
    }

    fn sysname(&self) -> &OsStr {
        &self.sysname
    }

    fn subsystem(&self) -> Option<&OsStr> {
        self.subsystem.as_deref()
    }

    fn devtype(&self) -> Option<&OsStr> {
        self.devtype.as_deref()
    }

    fn devnode(&self) -> Option<&Path> {
        self.devnode.as_deref()
    }

    fn action(&self) -> Option<&OsStr> {
        self.action.as_deref()
    }

    fn attribute(&self, name: &str) -> Option<&OsStr> {
        self.attributes.get(name).map(OsString::as_os_str)
    }

    fn ancestor(&self, subsystem: &str, devtype: Option<&str>) -> Option<Self> {
        let mut current = self.parent.as_deref();
        while let Some(device) = current {
            let devtype_matches = match devtype {
                Some(expected) => device.has_devtype(expected),
                None => true,
            };
            if device.has_subsystem(subsystem) && devtype_matches {
                return Some(device.clone());
            }
            current = device.parent.as_deref();
        }
        None
    }
}

#[derive(Default)]
struct MockState {
    /// 注册表遍历顺序
    devices: Vec<MockDevice>,
    /// 出现在枚举结果中，但解析时已消失的设备
    vanished: HashSet<PathBuf>,
    failures: HashSet<FailPoint>,
    stats: MockStats,
    installed_rules: Vec<MatchRule>,
    events: VecDeque<MockDevice>,
    /// 当前监视器的通知端
    signal: Option<UnixDatagram>,
}

/// Mock 总线（测试侧控制器）
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加设备（按注册表遍历顺序）
    pub fn add_device(&self, device: MockDevice) {
        self.state.lock().devices.push(device);
    }

    /// 追加一个枚举时可见、解析时已消失的设备
    pub fn add_vanished_device(&self, device: MockDevice) {
        let mut state = self.state.lock();
        state.vanished.insert(device.syspath.clone());
        state.devices.push(device);
    }

    /// 从注册表移除设备
    pub fn remove_device(&self, syspath: impl AsRef<Path>) {
        let syspath = syspath.as_ref();
        self.state.lock().devices.retain(|d| d.syspath != syspath);
    }

    pub fn fail_at(&self, point: FailPoint) {
        self.state.lock().failures.insert(point);
    }

    pub fn clear_failure(&self, point: FailPoint) {
        self.state.lock().failures.remove(&point);
    }

    pub fn stats(&self) -> MockStats {
        self.state.lock().stats
    }

    /// 最近一次创建监视器时安装的过滤规则
    pub fn installed_rules(&self) -> Vec<MatchRule> {
        self.state.lock().installed_rules.clone()
    }

    /// 注入一条热插拔通知
    ///
    /// 如果监视器已创建，等待描述符立即变为可读；
    /// 否则通知排队，在监视器创建时一并发出信号。
    pub fn emit(&self, device: MockDevice) {
        let mut state = self.state.lock();
        state.events.push_back(device);
        if let Some(signal) = &state.signal {
            let _ = signal.send(&[1]);
        }
    }

    /// 创建注册表句柄
    pub fn connect(&self) -> Result<MockRegistry, RegistryError> {
        let mut state = self.state.lock();
        if state.failures.contains(&FailPoint::Connect) {
            return Err(injected("udev_new()"));
        }
        state.stats.registries_opened += 1;
        Ok(MockRegistry { bus: self.clone() })
    }

    fn check(&self, point: FailPoint, op: &str) -> Result<(), RegistryError> {
        if self.state.lock().failures.contains(&point) {
            return Err(injected(op));
        }
        Ok(())
    }
}

fn injected(op: &str) -> RegistryError {
    RegistryError::backend(op, io::Error::other("injected failure"))
}

/// Mock 注册表句柄
pub struct MockRegistry {
    bus: MockBus,
}

impl MockRegistry {
    pub fn bus(&self) -> &MockBus {
        &self.bus
    }
}

impl Drop for MockRegistry {
    fn drop(&mut self) {
        self.bus.state.lock().stats.registries_released += 1;
    }
}

impl DeviceRegistry for MockRegistry {
    type Device = MockDevice;
    type Monitor = MockMonitor;

    fn enumerate(&self, rules: &[MatchRule]) -> Result<Vec<PathBuf>, RegistryError> {
        self.bus.check(FailPoint::Enumerate, "udev_enumerate_scan_devices()")?;

        let subsystems = rule_subsystems(rules);
        let state = self.bus.state.lock();
        Ok(state
            .devices
            .iter()
            .filter(|d| {
                d.subsystem
                    .as_deref()
                    .is_some_and(|s| subsystems.iter().any(|wanted| s == OsStr::new(wanted)))
            })
            .map(|d| d.syspath.clone())
            .collect())
    }

    fn with_device<T, F>(&self, syspath: &Path, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Self::Device) -> T,
    {
        let device = {
            let mut state = self.bus.state.lock();
            if state.vanished.contains(syspath) {
                return Err(RegistryError::NotFound(syspath.to_path_buf()));
            }
            let device = state
                .devices
                .iter()
                .find(|d| d.syspath == syspath)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(syspath.to_path_buf()))?;
            state.stats.handles_opened += 1;
            device
        };

        // 回调在锁外执行，允许回调内部再次访问总线
        let result = f(&device);
        self.bus.state.lock().stats.handles_released += 1;
        Ok(result)
    }

    fn monitor(&self, rules: &[MatchRule]) -> Result<MockMonitor, RegistryError> {
        self.bus
            .check(FailPoint::CreateMonitor, "udev_monitor_new_from_netlink()")?;
        if !rules.is_empty() {
            self.bus.check(
                FailPoint::InstallFilter,
                "udev_monitor_filter_add_match_subsystem_devtype()",
            )?;
        }
        self.bus
            .check(FailPoint::EnableReceiving, "udev_monitor_enable_receiving()")?;

        let (readable, signal) = UnixDatagram::pair()
            .map_err(|e| RegistryError::backend("socketpair()", e))?;
        readable
            .set_nonblocking(true)
            .map_err(|e| RegistryError::backend("fcntl(O_NONBLOCK)", e))?;

        let mut state = self.bus.state.lock();
        for _ in 0..state.events.len() {
            let _ = signal.send(&[1]);
        }
        state.installed_rules = rules.to_vec();
        state.signal = Some(signal);
        state.stats.monitors_opened += 1;

        Ok(MockMonitor {
            bus: self.bus.clone(),
            readable,
        })
    }
}

/// Mock 监视器
pub struct MockMonitor {
    bus: MockBus,
    readable: UnixDatagram,
}

impl AsFd for MockMonitor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.readable.as_fd()
    }
}

impl DeviceMonitor for MockMonitor {
    type Device = MockDevice;

    fn receive<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Self::Device) -> T,
    {
        let mut buf = [0u8; 1];
        match self.readable.recv(&mut buf) {
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(RegistryError::NoDevice {
                    op: "udev_monitor_receive_device()".to_string(),
                });
            },
            Err(e) => return Err(RegistryError::backend("udev_monitor_receive_device()", e)),
        }

        let device = {
            let mut state = self.bus.state.lock();
            let event = state.events.pop_front();
            if state.failures.contains(&FailPoint::Receive) {
                return Err(injected("udev_monitor_receive_device()"));
            }
            let device = event.ok_or_else(|| RegistryError::NoDevice {
                op: "udev_monitor_receive_device()".to_string(),
            })?;
            state.stats.handles_opened += 1;
            device
        };

        let result = f(&device);
        self.bus.state.lock().stats.handles_released += 1;
        Ok(result)
    }
}

impl Drop for MockMonitor {
    fn drop(&mut self) {
        let mut state = self.bus.state.lock();
        state.signal = None;
        state.stats.monitors_released += 1;
    }
}
