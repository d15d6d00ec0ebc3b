//! 设备注册表扫描
//!
//! 一次性枚举当前已接入的设备，结果顺序就是注册表返回的遍历顺序。
//!
//! ## 合并规则
//!
//! USB 转串口在遍历中紧跟在其 USB 接口之后出现。如果 tty 条目的路径包含上一个
//! `Usb` 条目的路径，就用 tty 路径覆盖上一个条目（类型仍为 `Usb`），
//! 而不是追加新条目。只向前看一个条目。
//!
//! ## 存储
//!
//! 容量用尽时按固定增量扩容；任何一次分配失败都丢弃全部部分结果，
//! 返回 [`SessionError::OutOfMemory`]。

use crate::classify::{contains_bytes, is_virtual};
use crate::config::{ScanConfig, SessionConfig};
use crate::error::SessionError;
use plugwatch_registry::{DeviceNode, DeviceRegistry};
use plugwatch_types::names::{DEVTYPE_USB_INTERFACE, SUBSYSTEM_TTY};
use plugwatch_types::{DeviceEntry, DeviceType};
use std::ops::Deref;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// 单个枚举条目的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannedKind {
    /// tty 子系统
    Tty,
    /// devtype 为 usb_interface
    UsbInterface,
    /// 其他（忽略）
    Other,
}

impl ScannedKind {
    pub fn of<D: DeviceNode>(device: &D) -> Self {
        if device.has_subsystem(SUBSYSTEM_TTY) {
            Self::Tty
        } else if device.has_devtype(DEVTYPE_USB_INTERFACE) {
            Self::UsbInterface
        } else {
            Self::Other
        }
    }
}

/// 扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList {
    entries: Vec<DeviceEntry>,
    growth_increment: usize,
}

impl DeviceList {
    /// 创建空列表并预留初始容量
    pub fn with_config(config: &ScanConfig) -> Result<Self, SessionError> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(config.initial_capacity)
            .map_err(|_| SessionError::OutOfMemory)?;
        Ok(Self {
            entries,
            growth_increment: config.growth_increment.max(1),
        })
    }

    /// 处理一个枚举条目（合并 / 跳过 / 追加）
    pub fn accept(
        &mut self,
        path: &Path,
        kind: ScannedKind,
        virtual_marker: &str,
    ) -> Result<(), SessionError> {
        match kind {
            ScannedKind::Tty => {
                if is_virtual(path, virtual_marker) {
                    trace!("skipping virtual tty {}", path.display());
                    return Ok(());
                }
                if let Some(last) = self.entries.last_mut()
                    && last.device_type == DeviceType::Usb
                    && contains_bytes(
                        path.as_os_str().as_bytes(),
                        last.path.as_os_str().as_bytes(),
                    )
                {
                    last.path = copy_path(path)?;
                    return Ok(());
                }
                self.push(path, DeviceType::Tty)
            },
            ScannedKind::UsbInterface => self.push(path, DeviceType::Usb),
            ScannedKind::Other => Ok(()),
        }
    }

    fn push(&mut self, path: &Path, device_type: DeviceType) -> Result<(), SessionError> {
        if self.entries.len() == self.entries.capacity() {
            self.entries
                .try_reserve_exact(self.growth_increment)
                .map_err(|_| SessionError::OutOfMemory)?;
        }
        self.entries.push(DeviceEntry {
            path: copy_path(path)?,
            device_type,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[DeviceEntry] {
        &self.entries
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn into_vec(self) -> Vec<DeviceEntry> {
        self.entries
    }
}

impl Deref for DeviceList {
    type Target = [DeviceEntry];

    fn deref(&self) -> &[DeviceEntry] {
        &self.entries
    }
}

impl IntoIterator for DeviceList {
    type Item = DeviceEntry;
    type IntoIter = std::vec::IntoIter<DeviceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a DeviceEntry;
    type IntoIter = std::slice::Iter<'a, DeviceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn copy_path(path: &Path) -> Result<PathBuf, SessionError> {
    let bytes = path.as_os_str().len();
    let mut copy = PathBuf::new();
    copy.try_reserve_exact(bytes)
        .map_err(|_| SessionError::OutOfMemory)?;
    copy.push(path);
    Ok(copy)
}

/// 扫描注册表
///
/// 单个条目解析失败（设备在遍历过程中被移除）只记录日志并跳过。
pub fn scan<R: DeviceRegistry>(
    registry: &R,
    config: &SessionConfig,
) -> Result<DeviceList, SessionError> {
    let paths = registry
        .enumerate(&config.scan_rules)
        .map_err(SessionError::Scan)?;

    let mut list = DeviceList::with_config(&config.scan)?;

    for path in &paths {
        let kind = match registry.with_device(path, ScannedKind::of) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("{}. Skipping entry.", e);
                continue;
            },
        };
        list.accept(path, kind, &config.virtual_marker)?;
    }

    trace!(
        "scan: {} enumerated, {} reported",
        paths.len(),
        list.entries().len()
    );
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn list() -> DeviceList {
        DeviceList::with_config(&ScanConfig::default()).unwrap()
    }

    #[test]
    fn test_usb_interface_followed_by_tty_descendant_is_merged() {
        let mut list = list();
        list.accept(Path::new("/sys/p/tty/ttyAMA0"), ScannedKind::Tty, "virtual")
            .unwrap();
        list.accept(Path::new("/sys/u/1-1/1-1:1.0"), ScannedKind::UsbInterface, "virtual")
            .unwrap();
        list.accept(
            Path::new("/sys/u/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0"),
            ScannedKind::Tty,
            "virtual",
        )
        .unwrap();

        assert_eq!(
            list.entries(),
            &[
                DeviceEntry::new("/sys/p/tty/ttyAMA0", DeviceType::Tty),
                DeviceEntry::new("/sys/u/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0", DeviceType::Usb),
            ]
        );
    }

    #[test]
    fn test_merge_only_looks_one_entry_back() {
        let mut list = list();
        list.accept(Path::new("/sys/u/1-1/1-1:1.0"), ScannedKind::UsbInterface, "virtual")
            .unwrap();
        list.accept(Path::new("/sys/p/ttyS0"), ScannedKind::Tty, "virtual")
            .unwrap();
        list.accept(
            Path::new("/sys/u/1-1/1-1:1.0/ttyUSB0/tty/ttyUSB0"),
            ScannedKind::Tty,
            "virtual",
        )
        .unwrap();

        let types: Vec<_> = list.iter().map(|e| e.device_type).collect();
        assert_eq!(types, vec![DeviceType::Usb, DeviceType::Tty, DeviceType::Tty]);
    }

    #[test]
    fn test_unrelated_tty_after_usb_is_appended() {
        let mut list = list();
        list.accept(Path::new("/sys/u/1-1/1-1:1.0"), ScannedKind::UsbInterface, "virtual")
            .unwrap();
        list.accept(Path::new("/sys/p/ttyS0"), ScannedKind::Tty, "virtual")
            .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_virtual_tty_is_skipped() {
        let mut list = list();
        list.accept(Path::new("/sys/devices/virtual/tty/tty0"), ScannedKind::Tty, "virtual")
            .unwrap();
        list.accept(Path::new("/sys/devices/virtual/net/lo"), ScannedKind::Other, "virtual")
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_growth_by_fixed_increment() {
        let mut list = DeviceList::with_config(&ScanConfig {
            initial_capacity: 2,
            growth_increment: 3,
        })
        .unwrap();
        for i in 0..3 {
            let path = PathBuf::from(format!("/sys/p/ttyS{}", i));
            list.accept(&path, ScannedKind::Tty, "virtual").unwrap();
        }
        assert_eq!(list.len(), 3);
        assert!(list.capacity() >= 5);
    }

    fn scanned_kind() -> impl Strategy<Value = ScannedKind> {
        prop_oneof![
            Just(ScannedKind::Tty),
            Just(ScannedKind::UsbInterface),
            Just(ScannedKind::Other),
        ]
    }

    proptest! {
        #[test]
        fn prop_virtual_paths_never_reported(
            items in prop::collection::vec(
                ("(/sys/devices/)(virtual/|platform/|usb1/)[a-z0-9:/.-]{1,12}", scanned_kind()),
                0..40,
            )
        ) {
            let mut list = list();
            for (path, kind) in &items {
                list.accept(Path::new(path), *kind, "virtual").unwrap();
            }
            for entry in &list {
                if entry.device_type == DeviceType::Tty {
                    prop_assert!(!is_virtual(&entry.path, "virtual"));
                }
            }
            let reported = items
                .iter()
                .filter(|(_, kind)| *kind != ScannedKind::Other)
                .count();
            prop_assert!(list.len() <= reported);
        }

        #[test]
        fn prop_usb_then_descendant_tty_is_one_entry(
            parent in "/sys/devices/usb[0-9]/[0-9]-[0-9]/[0-9]-[0-9]:1\\.[0-9]",
            child in "tty(USB|ACM)[0-9]",
        ) {
            let mut list = list();
            list.accept(Path::new(&parent), ScannedKind::UsbInterface, "virtual").unwrap();
            let tty = format!("{}/{}/tty/{}", parent, child, child);
            list.accept(Path::new(&tty), ScannedKind::Tty, "virtual").unwrap();
            prop_assert_eq!(list.len(), 1);
            prop_assert_eq!(&list[0], &DeviceEntry::new(tty, DeviceType::Usb));
        }
    }
}
