//! # Plugwatch Core
//!
//! USB 与串口（tty）设备发现、热插拔事件循环
//!
//! ## 模块
//!
//! - `session`: 会话状态（注册表、监视器、唤醒通道、错误通道）与对外接口
//! - `scanner`: 一次性扫描当前已接入设备（tty / usb 合并规则）
//! - `event_loop`: 可取消的阻塞事件循环
//! - `classify`: 设备类型与事件类型分类
//! - `identity`: 稳定的设备标识字符串
//! - `properties`: USB 描述符属性
//! - `watcher`: 热插拔监视线程与设备清单
//!
//! ## 快速开始
//!
//! ```no_run
//! # #[cfg(all(target_os = "linux", feature = "udev"))]
//! # fn main() -> Result<(), plugwatch_core::SessionError> {
//! use plugwatch_core::{Session, SessionConfig};
//!
//! let session = Session::open_udev(SessionConfig::default())?;
//! for entry in session.scan()?.iter() {
//!     println!("{} {:?}", entry.path.display(), session.identity(&entry.path));
//! }
//!
//! let event = session.next_event()?;
//! println!("{:?}", event);
//! # Ok(())
//! # }
//! # #[cfg(not(all(target_os = "linux", feature = "udev")))]
//! # fn main() {}
//! ```

pub mod classify;
pub mod config;
mod error;
mod error_buffer;
pub mod event_loop;
pub mod identity;
pub mod properties;
pub mod scanner;
mod session;
pub mod wakeup;
pub mod watcher;

pub use classify::{classify_event, classify_type};
pub use config::{ConfigError, ScanConfig, SessionConfig};
pub use error::{LookupError, SessionError, SessionErrorKind};
pub use error_buffer::{ERROR_BUFFER_CAPACITY, ErrorBuffer};
pub use identity::identity_of;
pub use properties::{UsbProperties, usb_properties_of};
pub use scanner::{DeviceList, ScannedKind};
pub use session::Session;
pub use wakeup::{WakeupChannel, Waker};
pub use watcher::{
    HardwareDescriptor, HardwareListener, HotplugWatcher, Inventory, WatchError, WatchEvent,
    WatcherConfig,
};

// 重新导出下层类型，调用方只需依赖本 crate
pub use plugwatch_registry::{DeviceMonitor, DeviceNode, DeviceRegistry, MatchRule, RegistryError};
pub use plugwatch_types::{DeviceEntry, DeviceEvent, DeviceType, EventKind, Identity, TypeError};

#[cfg(all(target_os = "linux", feature = "udev"))]
pub use plugwatch_registry::UdevRegistry;
