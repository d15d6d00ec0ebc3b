//! libudev 设备注册表实现
//!
//! 基于 `udev` crate，提供 Linux 平台下的设备枚举与 netlink 热插拔通知。
//!
//! ## 线程模型
//!
//! libudev 对象（context、monitor、device）不是线程安全的。同一个注册表创建的
//! 所有 libudev 对象只在持有共享锁时访问，因此 [`UdevRegistry`] 和
//! [`UdevMonitor`] 可以同时被事件线程和查询线程使用。
//! 等待本身（poll 监视器描述符）不需要持锁。
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - 接收 netlink 通知需要 udev 守护进程在运行

use crate::{DeviceMonitor, DeviceNode, DeviceRegistry, MatchRule, RegistryError, rule_subsystems};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// 只在持有 libudev 锁时访问的值
struct Confined<T>(T);

// SAFETY: libudev 对象不依赖创建它的线程，只要求不被并发访问。
// `Confined` 的值只在持有同一注册表的 `LibudevLock` 时读写或释放。
unsafe impl<T> Send for Confined<T> {}
unsafe impl<T> Sync for Confined<T> {}

type LibudevLock = Arc<Mutex<Confined<::udev::Udev>>>;

/// libudev 设备注册表
pub struct UdevRegistry {
    context: LibudevLock,
}

impl UdevRegistry {
    /// 创建 libudev context
    pub fn open() -> Result<Self, RegistryError> {
        let udev = ::udev::Udev::new().map_err(|e| RegistryError::backend("udev_new()", e))?;
        debug!("udev context created");
        Ok(Self {
            context: Arc::new(Mutex::new(Confined(udev))),
        })
    }
}

impl std::fmt::Debug for UdevRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdevRegistry").finish_non_exhaustive()
    }
}

impl DeviceRegistry for UdevRegistry {
    type Device = ::udev::Device;
    type Monitor = UdevMonitor;

    fn enumerate(&self, rules: &[MatchRule]) -> Result<Vec<PathBuf>, RegistryError> {
        let context = self.context.lock();

        let mut enumerator = ::udev::Enumerator::with_udev(context.0.clone())
            .map_err(|e| RegistryError::backend("udev_enumerate_new()", e))?;

        for subsystem in rule_subsystems(rules) {
            enumerator.match_subsystem(subsystem).map_err(|e| {
                RegistryError::backend(
                    format!("udev_enumerate_add_match_subsystem({})", subsystem),
                    e,
                )
            })?;
        }

        let devices = enumerator
            .scan_devices()
            .map_err(|e| RegistryError::backend("udev_enumerate_scan_devices()", e))?;

        // 设备句柄在锁内释放，只把 syspath 带出去
        let paths: Vec<PathBuf> = devices.map(|device| device.syspath().to_path_buf()).collect();
        trace!("udev enumeration returned {} entries", paths.len());
        Ok(paths)
    }

    fn with_device<T, F>(&self, syspath: &Path, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Self::Device) -> T,
    {
        let context = self.context.lock();

        let device = ::udev::Device::from_syspath_with_context(context.0.clone(), syspath)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RegistryError::NotFound(syspath.to_path_buf()),
                _ => RegistryError::backend(
                    format!("udev_device_new_from_syspath({})", syspath.display()),
                    e,
                ),
            })?;

        let result = f(&device);
        drop(device);
        Ok(result)
    }

    fn monitor(&self, rules: &[MatchRule]) -> Result<UdevMonitor, RegistryError> {
        let context = self.context.lock();

        let mut builder = ::udev::MonitorBuilder::with_udev(context.0.clone())
            .map_err(|e| RegistryError::backend("udev_monitor_new_from_netlink()", e))?;

        for rule in rules {
            builder = match &rule.devtype {
                Some(devtype) => builder
                    .match_subsystem_devtype(&rule.subsystem, devtype)
                    .map_err(|e| {
                        RegistryError::backend(
                            format!(
                                "udev_monitor_filter_add_match_subsystem_devtype({}, {})",
                                rule.subsystem, devtype
                            ),
                            e,
                        )
                    })?,
                None => builder.match_subsystem(&rule.subsystem).map_err(|e| {
                    RegistryError::backend(
                        format!(
                            "udev_monitor_filter_add_match_subsystem_devtype({})",
                            rule.subsystem
                        ),
                        e,
                    )
                })?,
            };
        }

        let socket = builder
            .listen()
            .map_err(|e| RegistryError::backend("udev_monitor_enable_receiving()", e))?;
        let fd = socket.as_raw_fd();
        debug!("udev monitor listening on fd {}", fd);

        Ok(UdevMonitor {
            context: Arc::clone(&self.context),
            socket: Some(Confined(socket)),
            fd,
        })
    }
}

/// libudev 热插拔监视器
///
/// netlink socket 由 libudev 以非阻塞模式创建，`receive()` 只应在
/// 等待描述符可读后调用。
pub struct UdevMonitor {
    context: LibudevLock,
    socket: Option<Confined<::udev::MonitorSocket>>,
    fd: RawFd,
}

impl std::fmt::Debug for UdevMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdevMonitor").field("fd", &self.fd).finish_non_exhaustive()
    }
}

impl AsFd for UdevMonitor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: fd 属于 `socket`，在 self 存活期间保持打开
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }
}

impl DeviceMonitor for UdevMonitor {
    type Device = ::udev::Device;

    fn receive<T, F>(&self, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&Self::Device) -> T,
    {
        let _context = self.context.lock();

        let socket = self.socket.as_ref().ok_or_else(|| RegistryError::NoDevice {
            op: "udev_monitor_receive_device()".to_string(),
        })?;

        let event = socket.0.iter().next().ok_or_else(|| {
            RegistryError::backend(
                "udev_monitor_receive_device()",
                io::Error::last_os_error(),
            )
        })?;

        let device = event.device();
        let result = f(&device);
        drop(device);
        drop(event);
        Ok(result)
    }
}

impl Drop for UdevMonitor {
    fn drop(&mut self) {
        let _context = self.context.lock();
        self.socket.take();
        trace!("udev monitor released");
    }
}

impl DeviceNode for ::udev::Device {
    fn syspath(&self) -> &Path {
        ::udev::Device::syspath(self)
    }

    fn sysname(&self) -> &OsStr {
        ::udev::Device::sysname(self)
    }

    fn subsystem(&self) -> Option<&OsStr> {
        ::udev::Device::subsystem(self)
    }

    fn devtype(&self) -> Option<&OsStr> {
        ::udev::Device::devtype(self)
    }

    fn devnode(&self) -> Option<&Path> {
        ::udev::Device::devnode(self)
    }

    fn action(&self) -> Option<&OsStr> {
        ::udev::Device::action(self)
    }

    fn attribute(&self, name: &str) -> Option<&OsStr> {
        self.attribute_value(name)
    }

    fn ancestor(&self, subsystem: &str, devtype: Option<&str>) -> Option<Self> {
        let parent = match devtype {
            Some(devtype) => self.parent_with_subsystem_devtype(subsystem, devtype),
            None => self.parent_with_subsystem(subsystem),
        };
        parent.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 注意：以下测试需要运行中的 udev（容器内通常不可用）

    #[test]
    #[ignore = "requires a running udev daemon"]
    fn test_udev_registry_enumerate() {
        let registry = UdevRegistry::open().unwrap();
        let paths = registry.enumerate(&MatchRule::defaults()).unwrap();
        for path in &paths {
            assert!(path.starts_with("/sys"));
        }
    }

    #[test]
    #[ignore = "requires a running udev daemon"]
    fn test_udev_monitor_has_descriptor() {
        let registry = UdevRegistry::open().unwrap();
        let monitor = registry.monitor(&MatchRule::defaults()).unwrap();
        assert!(monitor.as_fd().as_raw_fd() >= 0);
    }
}
